/// Trait for reporting scan progress.
///
/// The CLI implements it with indicatif; tests use `SilentReporter`.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_discovery_start(&self) {}
    fn on_discovery_complete(&self, _candidates: usize, _filtered_out: usize) {}
    fn on_verify_start(&self, _total: usize) {}
    fn on_runfolder_verified(&self, _name: &str, _done: usize, _total: usize) {}
    fn on_verify_complete(&self, _duration_secs: f64) {}
    fn on_runfolder_deleted(&self, _name: &str) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
