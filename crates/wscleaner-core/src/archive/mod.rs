//! Read-only view of the remote project archive.
//!
//! The engine only needs two queries: project search by name pattern and file
//! search inside a project. `ArchiveClient` is the seam; `DnanexusClient` talks
//! to the real service and `InMemoryArchive` backs tests.

pub mod dnanexus;
pub mod memory;
pub mod resolver;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ArchiveError;

pub use dnanexus::DnanexusClient;
pub use memory::InMemoryArchive;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub name: String,
}

/// Upload state of a remote file. Only `Closed` files are fully committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    Open,
    Closing,
    Closed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub folder: String,
    pub state: FileState,
}

/// File search within one project. `folder` is searched recursively and
/// defaults to the project root; `name_pattern` is a regular expression
/// matched anywhere in the file name.
#[derive(Debug, Clone, Copy)]
pub struct FileQuery<'a> {
    pub project: &'a ProjectId,
    pub folder: Option<&'a str>,
    pub name_pattern: Option<&'a str>,
}

pub trait ArchiveClient: Send + Sync {
    /// Projects whose name matches `name_pattern` (regular expression, unanchored).
    fn find_projects(&self, name_pattern: &str) -> Result<Vec<ProjectSummary>, ArchiveError>;

    fn find_files(&self, query: &FileQuery<'_>) -> Result<Vec<RemoteFile>, ArchiveError>;
}
