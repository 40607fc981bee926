pub mod archive;
pub mod audit;
pub mod config;
pub mod error;
pub mod manager;
pub mod progress;
pub mod runfolder;
pub mod scanner;
pub mod upload_log;
pub mod verify;

pub use archive::resolver::{ProjectResolution, RemoteProject, RemoteProjectResolver};
pub use archive::ArchiveClient;
pub use config::{AppConfig, LogfilePolicy};
pub use error::{ArchiveError, Error};
pub use manager::{LifecycleManager, Outcome, RetainReason, RunfolderReport, ScanSummary};
pub use progress::{ProgressReporter, SilentReporter};
pub use runfolder::{LocalRunfolder, RunType};
pub use verify::{IneligibleReason, Verdict, VerificationEngine};
