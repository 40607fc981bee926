use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::manager::RunfolderReport;

#[derive(Debug, Serialize)]
struct AuditRecord<'a> {
    timestamp: String,
    runfolder: &'a str,
    age_days: Option<u64>,
    run_type: String,
    state: &'static str,
    reasons: String,
    dry_run: bool,
}

/// Appends one CSV row per processed runfolder. The header is written only
/// when the file is created.
pub struct AuditLog {
    path: PathBuf,
    writer: csv::Writer<fs::File>,
}

impl AuditLog {
    pub fn open(path: &Path) -> Result<Self, Error> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file_exists = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let writer = csv::WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, report: &RunfolderReport, dry_run: bool) -> Result<(), Error> {
        let record = AuditRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            runfolder: &report.name,
            age_days: report.age_days,
            run_type: report
                .run_type
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_default(),
            state: report.outcome.state(),
            reasons: report.outcome.detail(),
            dry_run,
        };
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }
}
