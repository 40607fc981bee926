use anyhow::Context;
use std::env;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// `./logs/<timestamp>_wscleaner.log`, one file per invocation.
pub fn default_log_path() -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from("./logs").join(format!("{}_wscleaner.log", timestamp))
}

/// Pretty stdout layer plus a plain file layer, filtered by `TRACING_LEVEL`.
///
/// The returned guard flushes the file writer when dropped and must be held
/// until the process exits.
pub fn init_logger(log_file: Option<&Path>) -> anyhow::Result<WorkerGuard> {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::new(filter);

    let log_file_path = log_file
        .map(Path::to_path_buf)
        .unwrap_or_else(default_log_path);
    let directory = log_file_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_file_path
        .file_name()
        .with_context(|| format!("Invalid log file path: {}", log_file_path.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory)
        .with_context(|| format!("Failed to open log file {}", log_file_path.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(filter_layer)
        .init();

    info!("Logging to {}", log_file_path.display());

    Ok(guard)
}
