use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Audit log error: {0}")]
    Audit(#[from] csv::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(String),

    #[error("Runfolder directory does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("{0}")]
    Other(String),
}

impl From<glob::PatternError> for Error {
    fn from(err: glob::PatternError) -> Self {
        Error::Pattern(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Pattern(err.to_string())
    }
}

/// Failures talking to the remote archive. All of these are transient from
/// the engine's point of view: the runfolder is retained and re-checked on
/// the next scheduled run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}
