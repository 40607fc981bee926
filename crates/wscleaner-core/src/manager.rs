use rayon::prelude::*;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::archive::resolver::{LogfileLayout, RemoteProjectResolver};
use crate::archive::ArchiveClient;
use crate::audit::AuditLog;
use crate::config::AppConfig;
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::runfolder::{LocalRunfolder, RunType, RunfolderLayout};
use crate::scanner;
use crate::upload_log::UploadLogInspector;
use crate::verify::{Evaluation, IneligibleReason, Verdict, VerificationEngine};

/// Runfolder names start with a six digit date (YYMMDD).
const RUNFOLDER_NAME_PATTERN: &str = "^[0-9]{6}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    NotRunfolderName,
    SequencingIncomplete,
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterReason::NotRunfolderName => write!(f, "name is not date-coded"),
            FilterReason::SequencingIncomplete => write!(f, "sequencing has not finished"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredOut {
    pub name: String,
    pub reason: FilterReason,
}

/// Result of scanning the root directory. Candidates are oldest first.
#[derive(Debug)]
pub struct Discovery {
    pub candidates: Vec<LocalRunfolder>,
    pub filtered_out: Vec<FilteredOut>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetainReason {
    TooYoung { age_days: u64, min_age_days: u64 },
    Ineligible(Vec<IneligibleReason>),
    /// Remote or local state could not be read; try again next run.
    Unverified(String),
}

impl fmt::Display for RetainReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetainReason::TooYoung {
                age_days,
                min_age_days,
            } => write!(f, "{} days old, minimum age is {} days", age_days, min_age_days),
            RetainReason::Ineligible(reasons) => {
                let reasons: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
                write!(f, "{}", reasons.join("; "))
            }
            RetainReason::Unverified(err) => write!(f, "NOT VERIFIED THIS CYCLE - {}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Delete,
    Retain(RetainReason),
}

/// Everything known about a candidate before any deletion happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub age_days: Option<u64>,
    pub run_type: Option<RunType>,
    pub decision: Decision,
}

impl Assessment {
    fn retain(age_days: Option<u64>, run_type: Option<RunType>, reason: RetainReason) -> Self {
        Self {
            age_days,
            run_type,
            decision: Decision::Retain(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Deleted,
    DryRunSkipped,
    Retained(RetainReason),
    DeleteFailed(String),
}

impl Outcome {
    pub fn state(&self) -> &'static str {
        match self {
            Outcome::Deleted => "deleted",
            Outcome::DryRunSkipped => "dry-run-skipped",
            Outcome::Retained(_) => "retained",
            Outcome::DeleteFailed(_) => "delete-failed",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Outcome::Deleted | Outcome::DryRunSkipped => String::new(),
            Outcome::Retained(RetainReason::TooYoung {
                age_days,
                min_age_days,
            }) => format!("too-young: {} < {} days", age_days, min_age_days),
            Outcome::Retained(RetainReason::Ineligible(reasons)) => reasons
                .iter()
                .map(|r| r.code())
                .collect::<Vec<_>>()
                .join(";"),
            Outcome::Retained(RetainReason::Unverified(err)) => format!("unverified: {}", err),
            Outcome::DeleteFailed(err) => err.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunfolderReport {
    pub name: String,
    pub path: PathBuf,
    pub age_days: Option<u64>,
    pub run_type: Option<RunType>,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub struct ScanSummary {
    pub reports: Vec<RunfolderReport>,
    pub deleted: Vec<String>,
    pub filtered_out: usize,
    pub duration: Duration,
}

impl ScanSummary {
    fn count(&self, state: &str) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.state() == state)
            .count()
    }

    pub fn deleted_count(&self) -> usize {
        self.count("deleted")
    }

    pub fn dry_run_count(&self) -> usize {
        self.count("dry-run-skipped")
    }

    pub fn retained_count(&self) -> usize {
        self.count("retained")
    }

    pub fn failed_count(&self) -> usize {
        self.count("delete-failed")
    }

    pub fn report(&self, name: &str) -> Option<&RunfolderReport> {
        self.reports.iter().find(|r| r.name == name)
    }
}

/// Finds candidate runfolders under a root directory, verifies them and
/// deletes the ones that are safely archived.
///
/// Verification may run on several threads; deletion is always sequential,
/// oldest runfolder first.
pub struct LifecycleManager {
    root: PathBuf,
    layout: Arc<RunfolderLayout>,
    name_pattern: Regex,
    engine: VerificationEngine,
    min_age_days: u64,
    dry_run: bool,
    concurrency: usize,
    audit: Option<AuditLog>,
    deleted: Vec<String>,
}

impl LifecycleManager {
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the runfolder directory does not
    /// exist, or the audit log cannot be opened.
    pub fn new(config: &AppConfig, client: Arc<dyn ArchiveClient>) -> Result<Self, Error> {
        config.validate()?;

        let root = config.runfolders_dir.clone();
        if !root.is_dir() {
            error!("Directory does not exist: {}", root.display());
            return Err(Error::RootNotFound(root));
        }

        let resolver = RemoteProjectResolver::new(
            client,
            LogfileLayout::from_config(&config.archive),
            &config.markers.fastq_glob,
        );
        let upload_logs = UploadLogInspector::new(&config.upload_log_dir, &config.markers);
        let engine = VerificationEngine::new(
            resolver,
            upload_logs,
            config.logfile_count,
            config.logfile_policy,
        );

        let audit = match &config.audit_csv {
            Some(path) => Some(AuditLog::open(path)?),
            None => None,
        };

        Ok(Self {
            root,
            layout: Arc::new(RunfolderLayout::from_markers(&config.markers)?),
            name_pattern: Regex::new(RUNFOLDER_NAME_PATTERN)?,
            engine,
            min_age_days: config.min_age_days,
            dry_run: config.dry_run,
            concurrency: config.concurrency,
            audit,
            deleted: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Names of runfolders removed by this instance. Dry-run deletions are
    /// not recorded here.
    pub fn deleted(&self) -> &[String] {
        &self.deleted
    }

    pub fn discover(&self) -> Result<Discovery, Error> {
        let mut candidates = Vec::new();
        let mut filtered_out = Vec::new();

        for child in scanner::list_child_directories(&self.root)? {
            let rf = LocalRunfolder::new(child.path, Arc::clone(&self.layout));
            let reason = if !self.name_pattern.is_match(rf.name()) {
                Some(FilterReason::NotRunfolderName)
            } else if !rf.sequencing_complete() {
                Some(FilterReason::SequencingIncomplete)
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    debug!("{} is not a candidate: {}", rf.name(), reason);
                    filtered_out.push(FilteredOut {
                        name: rf.name().to_string(),
                        reason,
                    });
                }
                None => candidates.push(rf),
            }
        }

        Ok(Discovery {
            candidates,
            filtered_out,
        })
    }

    /// Decide what should happen to one candidate. Never touches the filesystem.
    pub fn assess(&self, runfolder: &LocalRunfolder) -> Assessment {
        let age_days = match runfolder.age_days() {
            Ok(age) => age,
            Err(err) => {
                return Assessment::retain(
                    None,
                    None,
                    RetainReason::Unverified(format!("could not read age: {}", err)),
                )
            }
        };

        if age_days < self.min_age_days {
            return Assessment::retain(
                Some(age_days),
                None,
                RetainReason::TooYoung {
                    age_days,
                    min_age_days: self.min_age_days,
                },
            );
        }

        match self.engine.verify(runfolder) {
            Ok(Evaluation {
                verdict: Verdict::Eligible,
                run_type,
            }) => Assessment {
                age_days: Some(age_days),
                run_type: Some(run_type),
                decision: Decision::Delete,
            },
            Ok(Evaluation {
                verdict: Verdict::Ineligible(reasons),
                run_type,
            }) => Assessment::retain(
                Some(age_days),
                Some(run_type),
                RetainReason::Ineligible(reasons),
            ),
            Err(err) => {
                Assessment::retain(Some(age_days), None, RetainReason::Unverified(err.to_string()))
            }
        }
    }

    /// Assess a single runfolder under the root by name.
    pub fn check(&self, name: &str) -> Result<Assessment, Error> {
        let mut components = Path::new(name).components();
        if !matches!((components.next(), components.next()), (Some(Component::Normal(_)), None)) {
            return Err(Error::Other(format!("{} is not a runfolder name", name)));
        }

        let path = self.root.join(name);
        if !path.is_dir() {
            return Err(Error::Other(format!("{} is not a directory", path.display())));
        }

        let rf = LocalRunfolder::new(path, Arc::clone(&self.layout));
        if !self.name_pattern.is_match(rf.name()) {
            return Err(Error::Other(format!(
                "{} is not a candidate: {}",
                name,
                FilterReason::NotRunfolderName
            )));
        }
        if !rf.sequencing_complete() {
            return Err(Error::Other(format!(
                "{} is not a candidate: {}",
                name,
                FilterReason::SequencingIncomplete
            )));
        }
        Ok(self.assess(&rf))
    }

    /// Delete the runfolder, or log the intent in dry-run mode.
    ///
    /// A failed removal is reported as `DeleteFailed` and never aborts the batch.
    pub fn delete(&mut self, runfolder: &LocalRunfolder) -> Outcome {
        if self.dry_run {
            info!("DRY RUN DELETE {}", runfolder.name());
            return Outcome::DryRunSkipped;
        }

        match fs::remove_dir_all(runfolder.path()) {
            Ok(()) => {
                self.deleted.push(runfolder.name().to_string());
                info!("{} DELETED.", runfolder.name());
                Outcome::Deleted
            }
            Err(err) => {
                error!("Failed to remove '{}': {}", runfolder.path().display(), err);
                Outcome::DeleteFailed(err.to_string())
            }
        }
    }

    /// Run one full scan pass.
    ///
    /// # Errors
    ///
    /// Only fails if the root directory cannot be listed or the worker pool
    /// cannot be built. Per-runfolder problems end up in the summary.
    pub fn run(&mut self, reporter: &dyn ProgressReporter) -> Result<ScanSummary, Error> {
        let start = Instant::now();
        info!("Runfolder directory {}", self.root.display());
        info!("Identifying local runfolders to consider deleting");

        reporter.on_discovery_start();
        let discovery = self.discover()?;
        let filtered_out = discovery.filtered_out.len();
        reporter.on_discovery_complete(discovery.candidates.len(), filtered_out);
        debug!(
            "Found local runfolders to consider deleting: {:?}",
            discovery.candidates.iter().map(|rf| rf.name()).collect::<Vec<_>>()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build verification pool: {}", e)))?;

        let total = discovery.candidates.len();
        let done = AtomicUsize::new(0);
        let verify_start = Instant::now();
        reporter.on_verify_start(total);

        let this = &*self;
        let assessed: Vec<(LocalRunfolder, Assessment)> = pool.install(|| {
            discovery
                .candidates
                .into_par_iter()
                .map(|rf| {
                    info!("Processing {}", rf.name());
                    let assessment = this.assess(&rf);
                    let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
                    reporter.on_runfolder_verified(rf.name(), finished, total);
                    (rf, assessment)
                })
                .collect()
        });
        reporter.on_verify_complete(verify_start.elapsed().as_secs_f64());

        let mut reports = Vec::with_capacity(assessed.len());
        for (rf, assessment) in assessed {
            let outcome = match assessment.decision {
                Decision::Delete => self.delete(&rf),
                Decision::Retain(reason) => {
                    log_retained(rf.name(), &reason);
                    Outcome::Retained(reason)
                }
            };
            if outcome == Outcome::Deleted {
                reporter.on_runfolder_deleted(rf.name());
            }

            let report = RunfolderReport {
                name: rf.name().to_string(),
                path: rf.path().to_path_buf(),
                age_days: assessment.age_days,
                run_type: assessment.run_type,
                outcome,
            };
            if let Some(audit) = self.audit.as_mut() {
                if let Err(err) = audit.record(&report, self.dry_run) {
                    error!(
                        "Failed to write audit record for {} to {}: {}",
                        report.name,
                        audit.path().display(),
                        err
                    );
                }
            }
            reports.push(report);
        }

        info!("Runfolders deleted in this instance: {:?}", self.deleted);
        Ok(ScanSummary {
            reports,
            deleted: self.deleted.clone(),
            filtered_out,
            duration: start.elapsed(),
        })
    }
}

fn log_retained(name: &str, reason: &RetainReason) {
    match reason {
        RetainReason::TooYoung { .. } => info!("{} retained - {}", name, reason),
        RetainReason::Ineligible(reasons) => {
            for reason in reasons {
                warn!("{} - {}", name, reason);
            }
        }
        RetainReason::Unverified(_) => warn!("{} - {}", name, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::InMemoryArchive;
    use crate::SilentReporter;
    use tempfile::tempdir;

    fn manager(root: &Path) -> LifecycleManager {
        let config = AppConfig {
            runfolders_dir: root.to_path_buf(),
            upload_log_dir: root.join("logs"),
            ..AppConfig::default()
        };
        LifecycleManager::new(&config, Arc::new(InMemoryArchive::new())).unwrap()
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let tmp = tempdir().unwrap();
        let config = AppConfig {
            runfolders_dir: tmp.path().join("absent"),
            ..AppConfig::default()
        };
        let result = LifecycleManager::new(&config, Arc::new(InMemoryArchive::new()));
        assert!(matches!(result, Err(Error::RootNotFound(_))));
    }

    #[test]
    fn test_discover_filters_names_and_incomplete_runs() {
        let tmp = tempdir().unwrap();
        for name in ["250101_X_0001", "250102_X_0002", "automate_demultiplexing_logfiles"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
        }
        fs::write(tmp.path().join("250101_X_0001/RTAComplete.txt"), "").unwrap();
        fs::write(tmp.path().join("automate_demultiplexing_logfiles/RTAComplete.txt"), "").unwrap();

        let discovery = manager(tmp.path()).discover().unwrap();
        let names: Vec<&str> = discovery.candidates.iter().map(|rf| rf.name()).collect();
        assert_eq!(names, vec!["250101_X_0001"]);
        assert!(discovery.filtered_out.contains(&FilteredOut {
            name: "250102_X_0002".to_string(),
            reason: FilterReason::SequencingIncomplete,
        }));
        assert!(discovery.filtered_out.contains(&FilteredOut {
            name: "automate_demultiplexing_logfiles".to_string(),
            reason: FilterReason::NotRunfolderName,
        }));
    }

    #[test]
    fn test_check_rejects_paths() {
        let tmp = tempdir().unwrap();
        let mgr = manager(tmp.path());
        assert!(mgr.check("../etc").is_err());
        assert!(mgr.check("250101_X_0001").is_err());
    }

    #[test]
    fn test_outcome_detail_lists_codes() {
        let outcome = Outcome::Retained(RetainReason::Ineligible(vec![
            IneligibleReason::NoLocalFastqs,
            IneligibleReason::LogfileMismatch {
                expected: 5,
                found: 4,
                policy: crate::LogfilePolicy::Exact,
            },
        ]));
        assert_eq!(outcome.state(), "retained");
        assert_eq!(outcome.detail(), "no-local-fastqs;logfile-mismatch");
    }

    #[test]
    fn test_run_on_empty_root() {
        let tmp = tempdir().unwrap();
        let mut mgr = manager(tmp.path());
        let summary = mgr.run(&SilentReporter).unwrap();
        assert!(summary.reports.is_empty());
        assert!(summary.deleted.is_empty());
    }
}
