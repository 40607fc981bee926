use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// How the remote logfile count is compared with the expected count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogfilePolicy {
    /// The project must hold exactly the expected number of logfiles.
    #[default]
    Exact,
    /// The project must hold at least the expected number of logfiles.
    AtLeast,
}

impl LogfilePolicy {
    pub fn accepts(self, expected: usize, found: usize) -> bool {
        match self {
            LogfilePolicy::Exact => found == expected,
            LogfilePolicy::AtLeast => found >= expected,
        }
    }
}

impl fmt::Display for LogfilePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogfilePolicy::Exact => write!(f, "exact"),
            LogfilePolicy::AtLeast => write!(f, "at-least"),
        }
    }
}

/// File names and literal markers the engine looks for on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Markers {
    pub completion_file: String,
    pub demux_log: String,
    pub special_run_trailer: String,
    pub special_project_tag: String,
    pub fastq_glob: String,
    pub upload_log_suffix: String,
    pub upload_log_error: String,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            completion_file: "RTAComplete.txt".to_string(),
            demux_log: "bcl2fastq2_output.log".to_string(),
            special_run_trailer: "TSO500 run.".to_string(),
            special_project_tag: "_TSO".to_string(),
            fastq_glob: "*.fastq.gz".to_string(),
            upload_log_suffix: "_upload_runfolder.log".to_string(),
            upload_log_error: "- ERROR -".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub auth_token_file: Option<PathBuf>,
    /// Characters stripped from the front of a project name to get the
    /// uploaded runfolder directory name.
    pub project_prefix_len: usize,
    pub logfile_folder: String,
}

impl ArchiveConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.dnanexus.com".to_string(),
            request_timeout_secs: 30,
            auth_token_file: None,
            project_prefix_len: 4,
            logfile_folder: "automated_scripts_logfiles".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub runfolders_dir: PathBuf,
    pub min_age_days: u64,
    pub logfile_count: usize,
    pub logfile_policy: LogfilePolicy,
    pub upload_log_dir: PathBuf,
    pub dry_run: bool,
    /// Number of runfolders verified in parallel. Deletion is always serial.
    pub concurrency: usize,
    pub audit_csv: Option<PathBuf>,
    pub markers: Markers,
    pub archive: ArchiveConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let runfolders_dir = PathBuf::from("/media/data3/share");
        let upload_log_dir = runfolders_dir
            .join("automate_demultiplexing_logfiles")
            .join("upload_runfolder_script_logfiles");
        Self {
            runfolders_dir,
            min_age_days: 14,
            logfile_count: 5,
            logfile_policy: LogfilePolicy::Exact,
            upload_log_dir,
            dry_run: false,
            concurrency: 1,
            audit_csv: None,
            markers: Markers::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.concurrency == 0 {
            return Err(Error::Other("concurrency must be at least 1".to_string()));
        }
        if self.archive.request_timeout_secs == 0 {
            return Err(Error::Other(
                "archive.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        // An empty marker matches everything: an empty trailer and tag would
        // classify every run as special and skip the fastq check.
        let markers = [
            ("markers.completion_file", &self.markers.completion_file),
            ("markers.demux_log", &self.markers.demux_log),
            ("markers.special_run_trailer", &self.markers.special_run_trailer),
            ("markers.special_project_tag", &self.markers.special_project_tag),
            ("markers.fastq_glob", &self.markers.fastq_glob),
            ("markers.upload_log_suffix", &self.markers.upload_log_suffix),
            ("markers.upload_log_error", &self.markers.upload_log_error),
        ];
        for (key, value) in markers {
            if value.trim().is_empty() {
                return Err(Error::Other(format!("{} must not be empty", key)));
            }
        }
        glob::Pattern::new(&self.markers.fastq_glob)?;
        Ok(())
    }
}

/// Load configuration from `path` (or an optional `Config.toml` in the working
/// directory) layered under `WSCLEANER_*` environment variables.
///
/// Nested keys use a double underscore, e.g. `WSCLEANER_ARCHIVE__API_URL`.
pub fn load_configuration(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let file_source = match path {
        Some(path) => ConfigFile::from(path).required(true),
        None => ConfigFile::with_name("Config").required(false),
    };

    let builder = Config::builder()
        .add_source(file_source)
        .add_source(
            Environment::with_prefix("WSCLEANER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_logfile_policy_exact() {
        assert!(LogfilePolicy::Exact.accepts(6, 6));
        assert!(!LogfilePolicy::Exact.accepts(6, 7));
        assert!(!LogfilePolicy::Exact.accepts(6, 5));
    }

    #[test]
    fn test_logfile_policy_at_least() {
        assert!(LogfilePolicy::AtLeast.accepts(6, 6));
        assert!(LogfilePolicy::AtLeast.accepts(6, 9));
        assert!(!LogfilePolicy::AtLeast.accepts(6, 5));
    }

    #[test]
    fn test_load_configuration_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wscleaner.toml");
        fs::write(
            &path,
            r#"
runfolders_dir = "/data/runs"
min_age_days = 7
logfile_policy = "at-least"

[archive]
logfile_folder = "Logfiles"
"#,
        )
        .unwrap();

        let config = load_configuration(Some(&path)).unwrap();
        assert_eq!(config.runfolders_dir, PathBuf::from("/data/runs"));
        assert_eq!(config.min_age_days, 7);
        assert_eq!(config.logfile_policy, LogfilePolicy::AtLeast);
        assert_eq!(config.archive.logfile_folder, "Logfiles");
        // Untouched keys keep their defaults
        assert_eq!(config.logfile_count, 5);
        assert_eq!(config.markers.completion_file, "RTAComplete.txt");
        assert_eq!(config.archive.project_prefix_len, 4);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = AppConfig {
            concurrency: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_markers() {
        let blank: [fn(&mut Markers); 5] = [
            |m| m.special_run_trailer.clear(),
            |m| m.special_project_tag = "  ".to_string(),
            |m| m.completion_file.clear(),
            |m| m.demux_log.clear(),
            |m| m.upload_log_error.clear(),
        ];
        for clear in blank {
            let mut config = AppConfig::default();
            clear(&mut config.markers);
            assert!(config.validate().is_err(), "accepted {:?}", config.markers);
        }
    }
}
