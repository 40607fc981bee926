use std::fmt;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::archive::resolver::{ProjectResolution, RemoteProjectResolver};
use crate::config::LogfilePolicy;
use crate::error::Error;
use crate::runfolder::{LocalRunfolder, RunType};
use crate::upload_log::{UploadLogInspector, UploadLogStatus};

/// Why a runfolder cannot be deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IneligibleReason {
    /// Zero or several remote projects matched the runfolder name.
    ProjectMismatch { matches: usize },
    /// A standard run with no local fastqs to compare.
    NoLocalFastqs,
    /// Local fastqs absent from the closed remote set.
    FastqMismatch { missing: Vec<String> },
    LogfileMismatch {
        expected: usize,
        found: usize,
        policy: LogfilePolicy,
    },
    UploadLogMissing { path: PathBuf },
    UploadLogErrors { lines: Vec<String> },
}

impl IneligibleReason {
    /// Stable short code used in logs and the audit trail.
    pub fn code(&self) -> &'static str {
        match self {
            IneligibleReason::ProjectMismatch { .. } => "project-mismatch",
            IneligibleReason::NoLocalFastqs => "no-local-fastqs",
            IneligibleReason::FastqMismatch { .. } => "fastq-mismatch",
            IneligibleReason::LogfileMismatch { .. } => "logfile-mismatch",
            IneligibleReason::UploadLogMissing { .. } => "upload-log-missing",
            IneligibleReason::UploadLogErrors { .. } => "upload-log-errors",
        }
    }
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IneligibleReason::ProjectMismatch { matches } => {
                write!(f, "PROJECT MISMATCH - {} remote projects matched", matches)
            }
            IneligibleReason::NoLocalFastqs => write!(f, "NO LOCAL FASTQS"),
            IneligibleReason::FastqMismatch { missing } => {
                write!(f, "FASTQ MISMATCH - {} missing remotely: {:?}", missing.len(), missing)
            }
            IneligibleReason::LogfileMismatch {
                expected,
                found,
                policy,
            } => write!(
                f,
                "LOGFILE MISMATCH - found {}, expected {} ({})",
                found, expected, policy
            ),
            IneligibleReason::UploadLogMissing { path } => {
                write!(f, "UPLOAD LOG MISSING - {}", path.display())
            }
            IneligibleReason::UploadLogErrors { lines } => {
                write!(f, "UPLOAD LOG ERRORS - {} error lines", lines.len())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Eligible,
    Ineligible(Vec<IneligibleReason>),
}

impl Verdict {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Verdict::Eligible)
    }

    pub fn reasons(&self) -> &[IneligibleReason] {
        match self {
            Verdict::Eligible => &[],
            Verdict::Ineligible(reasons) => reasons,
        }
    }
}

/// A verdict plus the run classification it was reached under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub verdict: Verdict,
    pub run_type: RunType,
}

/// Applies the deletion checks to one runfolder at a time.
///
/// Every applicable check runs even after one fails, so the operator sees all
/// reasons together. Only a missing project stops evaluation early since every
/// other check needs it.
pub struct VerificationEngine {
    resolver: RemoteProjectResolver,
    upload_logs: UploadLogInspector,
    expected_logfiles: usize,
    logfile_policy: LogfilePolicy,
}

impl VerificationEngine {
    pub fn new(
        resolver: RemoteProjectResolver,
        upload_logs: UploadLogInspector,
        expected_logfiles: usize,
        logfile_policy: LogfilePolicy,
    ) -> Self {
        Self {
            resolver,
            upload_logs,
            expected_logfiles,
            logfile_policy,
        }
    }

    pub fn resolver(&self) -> &RemoteProjectResolver {
        &self.resolver
    }

    /// Resolve the runfolder's remote project and evaluate it.
    ///
    /// # Errors
    ///
    /// Archive or filesystem failures. These mean "not verified this cycle",
    /// never "ineligible".
    pub fn verify(&self, local: &LocalRunfolder) -> Result<Evaluation, Error> {
        let resolution = self.resolver.resolve(local.name())?;
        self.evaluate(local, &resolution)
    }

    pub fn evaluate(
        &self,
        local: &LocalRunfolder,
        resolution: &ProjectResolution,
    ) -> Result<Evaluation, Error> {
        let Some(project) = resolution.project() else {
            let reason = IneligibleReason::ProjectMismatch {
                matches: resolution.match_count(),
            };
            return Ok(Evaluation {
                verdict: Verdict::Ineligible(vec![reason]),
                run_type: local.run_type(None),
            });
        };

        let run_type = local.run_type(Some(project));
        let mut reasons = Vec::new();

        if run_type.is_special() {
            debug!("{} is a special run type, skipping fastq check", local.name());
        } else {
            if let RunType::Undetermined(why) = &run_type {
                debug!("{} run type undetermined: {}", local.name(), why);
            }
            let local_fastqs = local.find_fastqs()?;
            if local_fastqs.is_empty() {
                reasons.push(IneligibleReason::NoLocalFastqs);
            } else {
                let remote_fastqs = self.resolver.find_fastqs(project)?;
                let missing: Vec<String> = local_fastqs
                    .iter()
                    .filter(|fastq| !remote_fastqs.contains(*fastq))
                    .cloned()
                    .collect();
                for fastq in &missing {
                    debug!("Fastq missing from remote project: {}", fastq);
                }
                debug!("{} FASTQ BOOL: {}", local.name(), missing.is_empty());
                if !missing.is_empty() {
                    reasons.push(IneligibleReason::FastqMismatch { missing });
                }
            }
        }

        let found = self.resolver.count_logfiles(project)?;
        let logfiles_ok = self.logfile_policy.accepts(self.expected_logfiles, found);
        debug!("{} LOGFILE BOOL: {}", local.name(), logfiles_ok);
        if !logfiles_ok {
            reasons.push(IneligibleReason::LogfileMismatch {
                expected: self.expected_logfiles,
                found,
                policy: self.logfile_policy,
            });
        }

        match self.upload_logs.inspect(local.name())? {
            UploadLogStatus::Clean => {}
            UploadLogStatus::Missing => reasons.push(IneligibleReason::UploadLogMissing {
                path: self.upload_logs.log_path(local.name()),
            }),
            UploadLogStatus::Errors(lines) => {
                for line in &lines {
                    warn!("{} upload log error: {}", local.name(), line);
                }
                reasons.push(IneligibleReason::UploadLogErrors { lines });
            }
        }

        let verdict = if reasons.is_empty() {
            Verdict::Eligible
        } else {
            Verdict::Ineligible(reasons)
        };
        Ok(Evaluation { verdict, run_type })
    }
}
