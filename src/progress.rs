use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use wscleaner_core::ProgressReporter;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Discovery: spinner
/// - Verification: progress bar over the candidate runfolders
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.lock();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.lock().take() {
            pb.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliReporter {
    fn on_discovery_start(&self) {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars(TICK_CHARS);
        pb.set_style(style);
        pb.set_message("Looking for runfolders...");
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_discovery_complete(&self, candidates: usize, filtered_out: usize) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Discovery complete: {} candidates, {} skipped",
            candidates, filtered_out
        );
    }

    fn on_verify_start(&self, total: usize) {
        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "  {spinner:.cyan} Verifying [{bar:30.cyan/dim}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS);
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_runfolder_verified(&self, name: &str, done: usize, _total: usize) {
        if let Some(pb) = self.lock().as_ref() {
            pb.set_position(done as u64);
            pb.set_message(name.to_string());
        }
    }

    fn on_verify_complete(&self, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Verification complete in {:.2}s",
            duration_secs
        );
    }

    fn on_runfolder_deleted(&self, name: &str) {
        eprintln!("  \x1b[31m✗\x1b[0m Deleted {}", name);
    }
}
