use glob::Pattern;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;
use tracing::{debug, info};

use crate::archive::resolver::RemoteProject;
use crate::config::Markers;
use crate::error::Error;
use crate::scanner;

const SECONDS_PER_DAY: u64 = 24 * 3600;

/// Compiled form of the on-disk markers, shared by every runfolder in a pass.
#[derive(Debug, Clone)]
pub struct RunfolderLayout {
    pub completion_file: String,
    pub demux_log: String,
    pub special_run_trailer: String,
    pub special_project_tag: String,
    pub fastq_pattern: Pattern,
}

impl RunfolderLayout {
    pub fn from_markers(markers: &Markers) -> Result<Self, Error> {
        Ok(Self {
            completion_file: markers.completion_file.clone(),
            demux_log: markers.demux_log.clone(),
            special_run_trailer: markers.special_run_trailer.clone(),
            special_project_tag: markers.special_project_tag.clone(),
            fastq_pattern: Pattern::new(&markers.fastq_glob)?,
        })
    }
}

/// Whether a runfolder belongs to the run type that produces no fastqs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunType {
    Special,
    Standard,
    /// One of the sources needed to decide was unavailable.
    Undetermined(String),
}

impl RunType {
    pub fn is_special(&self) -> bool {
        matches!(self, RunType::Special)
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunType::Special => write!(f, "special"),
            RunType::Standard => write!(f, "standard"),
            RunType::Undetermined(reason) => write!(f, "undetermined ({reason})"),
        }
    }
}

/// A local directory produced by a sequencing instrument.
///
/// All queries are read-only. The fastq inventory is computed on first use and
/// kept for the lifetime of the instance; age is recomputed on every call.
#[derive(Debug)]
pub struct LocalRunfolder {
    path: PathBuf,
    name: String,
    layout: Arc<RunfolderLayout>,
    fastqs: OnceLock<Vec<String>>,
}

impl LocalRunfolder {
    pub fn new(path: impl Into<PathBuf>, layout: Arc<RunfolderLayout>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("Initiating LocalRunfolder instance for {}", name);
        Self {
            path,
            name,
            layout,
            fastqs: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modified(&self) -> io::Result<SystemTime> {
        fs::metadata(&self.path)?.modified()
    }

    /// Whole days since the directory was last modified.
    pub fn age_days(&self) -> io::Result<u64> {
        let modified = self.modified()?;
        let elapsed = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        let age = elapsed.as_secs() / SECONDS_PER_DAY;
        debug!("{} age is {}", self.name, age);
        Ok(age)
    }

    pub fn sequencing_complete(&self) -> bool {
        self.path.join(&self.layout.completion_file).is_file()
    }

    /// Sorted names of the fastq files anywhere under the runfolder.
    pub fn find_fastqs(&self) -> io::Result<&[String]> {
        if let Some(fastqs) = self.fastqs.get() {
            return Ok(fastqs);
        }
        let found = scanner::find_matching_file_names(&self.path, &self.layout.fastq_pattern)?;
        debug!("{} contains {} fastq files: {:?}", self.name, found.len(), found);
        Ok(self.fastqs.get_or_init(|| found))
    }

    pub fn fastq_count(&self) -> io::Result<usize> {
        Ok(self.find_fastqs()?.len())
    }

    /// Classify the run. `Special` requires both the demultiplexing log trailer
    /// and the remote project name tag.
    pub fn run_type(&self, project: Option<&RemoteProject>) -> RunType {
        let log_path = self.path.join(&self.layout.demux_log);
        let contents = match fs::read(&log_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("{} - {} not found", self.name, self.layout.demux_log);
                return RunType::Undetermined(format!("{} not found", self.layout.demux_log));
            }
            Err(err) => {
                debug!("{} - could not read {}: {}", self.name, self.layout.demux_log, err);
                return RunType::Undetermined(format!(
                    "{} unreadable: {}",
                    self.layout.demux_log, err
                ));
            }
        };

        let trailer_matches = contents
            .lines()
            .last()
            .is_some_and(|line| line.starts_with(&self.layout.special_run_trailer));
        if !trailer_matches {
            debug!(
                "{} - {} DOES NOT end with the special run trailer",
                self.name, self.layout.demux_log
            );
            return RunType::Standard;
        }
        info!(
            "{} - {} contains the string expected for special runs",
            self.name, self.layout.demux_log
        );

        let Some(project) = project else {
            return RunType::Undetermined("no remote project".to_string());
        };
        if project.name.contains(&self.layout.special_project_tag) {
            debug!(
                "Remote project name {} contains the string \"{}\"",
                project.name, self.layout.special_project_tag
            );
            RunType::Special
        } else {
            debug!(
                "Remote project name {} does NOT contain the string \"{}\"",
                project.name, self.layout.special_project_tag
            );
            RunType::Standard
        }
    }

    pub fn is_special_run_type(&self, project: Option<&RemoteProject>) -> bool {
        self.run_type(project).is_special()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ProjectId;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::tempdir;

    fn layout() -> Arc<RunfolderLayout> {
        Arc::new(RunfolderLayout::from_markers(&Markers::default()).unwrap())
    }

    fn project(name: &str) -> RemoteProject {
        RemoteProject {
            id: ProjectId::new("project-1"),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_sequencing_complete_requires_marker() {
        let tmp = tempdir().unwrap();
        let rf = LocalRunfolder::new(tmp.path().join("250101_X_0001"), layout());
        fs::create_dir(rf.path()).unwrap();
        assert!(!rf.sequencing_complete());

        fs::write(rf.path().join("RTAComplete.txt"), "").unwrap();
        assert!(rf.sequencing_complete());
        assert_eq!(rf.name(), "250101_X_0001");
    }

    #[test]
    fn test_age_days_from_mtime() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("250101_X_0001");
        fs::create_dir(&path).unwrap();
        let twenty_days_ago =
            SystemTime::now() - std::time::Duration::from_secs(20 * SECONDS_PER_DAY + 60);
        set_file_mtime(&path, FileTime::from_system_time(twenty_days_ago)).unwrap();

        let rf = LocalRunfolder::new(&path, layout());
        assert_eq!(rf.age_days().unwrap(), 20);
    }

    #[test]
    fn test_find_fastqs_sorted() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("250101_X_0001");
        let calls = path.join("Data/Intensities/BaseCalls");
        fs::create_dir_all(&calls).unwrap();
        fs::write(calls.join("b.fastq.gz"), "").unwrap();
        fs::write(calls.join("a.fastq.gz"), "").unwrap();

        let rf = LocalRunfolder::new(&path, layout());
        assert_eq!(rf.find_fastqs().unwrap(), ["a.fastq.gz", "b.fastq.gz"]);
        assert_eq!(rf.fastq_count().unwrap(), 2);
    }

    #[test]
    fn test_run_type_requires_both_sources() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("250101_X_0001");
        fs::create_dir(&path).unwrap();
        let rf = LocalRunfolder::new(&path, layout());
        let tso = project("002_250101_X_0001_TSO26001");

        // No demultiplexing log
        assert!(matches!(rf.run_type(Some(&tso)), RunType::Undetermined(_)));
        assert!(!rf.is_special_run_type(Some(&tso)));

        fs::write(
            path.join("bcl2fastq2_output.log"),
            "Demultiplexing started\nTSO500 run. Skipping demultiplexing\n",
        )
        .unwrap();
        assert_eq!(rf.run_type(Some(&tso)), RunType::Special);
        assert_eq!(rf.run_type(Some(&project("002_250101_X_0001_NGS1"))), RunType::Standard);
        assert!(matches!(rf.run_type(None), RunType::Undetermined(_)));
    }

    #[test]
    fn test_run_type_trailer_must_be_last_line() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("250101_X_0001");
        fs::create_dir(&path).unwrap();
        fs::write(
            path.join("bcl2fastq2_output.log"),
            "TSO500 run.\nProcessing complete\n",
        )
        .unwrap();
        let rf = LocalRunfolder::new(&path, layout());
        assert_eq!(rf.run_type(Some(&project("002_run_TSO"))), RunType::Standard);
    }
}
