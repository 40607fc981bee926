use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Markers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadLogStatus {
    Missing,
    Clean,
    /// Lines containing the error marker, in file order.
    Errors(Vec<String>),
}

/// Reads the per-runfolder log written by the upload tool.
#[derive(Debug, Clone)]
pub struct UploadLogInspector {
    dir: PathBuf,
    suffix: String,
    error_marker: String,
}

impl UploadLogInspector {
    pub fn new(dir: impl Into<PathBuf>, markers: &Markers) -> Self {
        Self {
            dir: dir.into(),
            suffix: markers.upload_log_suffix.clone(),
            error_marker: markers.upload_log_error.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self, runfolder_name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", runfolder_name, self.suffix))
    }

    pub fn inspect(&self, runfolder_name: &str) -> io::Result<UploadLogStatus> {
        let path = self.log_path(runfolder_name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("{} upload log file does not exist: {}", runfolder_name, path.display());
                return Ok(UploadLogStatus::Missing);
            }
            Err(err) => return Err(err),
        };

        let contents = String::from_utf8_lossy(&bytes);
        let errors: Vec<String> = contents
            .lines()
            .filter(|line| line.contains(&self.error_marker))
            .map(str::to_string)
            .collect();

        if errors.is_empty() {
            debug!("{} UPLOAD LOG CLEAN", runfolder_name);
            Ok(UploadLogStatus::Clean)
        } else {
            debug!("{} upload log contains {} errors", runfolder_name, errors.len());
            Ok(UploadLogStatus::Errors(errors))
        }
    }
}
