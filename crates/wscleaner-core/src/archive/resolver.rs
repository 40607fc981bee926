use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ArchiveClient, FileQuery, FileState, ProjectId, ProjectSummary};
use crate::config::ArchiveConfig;
use crate::error::ArchiveError;

/// Characters with special meaning in both POSIX extended and Perl-style
/// regular expressions. Nothing else is escaped.
const REGEX_METACHARACTERS: &str = r"\.^$|?*+()[]{}";

fn push_literal(pattern: &mut String, c: char) {
    if REGEX_METACHARACTERS.contains(c) {
        pattern.push('\\');
    }
    pattern.push(c);
}

/// Escape `text` so a server-side regex matches it literally.
pub fn escape_literal(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len());
    for c in text.chars() {
        push_literal(&mut pattern, c);
    }
    pattern
}

/// Anchored name regex equivalent to a filename glob. `*` and `?` become
/// wildcards, bracket classes pass through and everything else is literal.
pub fn glob_to_name_pattern(glob: &str) -> String {
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            '[' => {
                pattern.push('[');
                if chars.next_if_eq(&'!').is_some() {
                    pattern.push('^');
                }
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    if c == '\\' {
                        pattern.push('\\');
                    }
                    pattern.push(c);
                }
                pattern.push(']');
            }
            c => push_literal(&mut pattern, c),
        }
    }
    pattern.push('$');
    pattern
}

/// A remote project uniquely matched to a local runfolder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProject {
    pub id: ProjectId,
    pub name: String,
}

/// Outcome of looking a runfolder name up in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectResolution {
    NotFound,
    Found(RemoteProject),
    Ambiguous(Vec<ProjectSummary>),
}

impl ProjectResolution {
    pub fn project(&self) -> Option<&RemoteProject> {
        match self {
            ProjectResolution::Found(project) => Some(project),
            _ => None,
        }
    }

    /// Number of remote projects that matched the name.
    pub fn match_count(&self) -> usize {
        match self {
            ProjectResolution::NotFound => 0,
            ProjectResolution::Found(_) => 1,
            ProjectResolution::Ambiguous(candidates) => candidates.len(),
        }
    }
}

/// Where uploaded logfiles live inside a project.
///
/// Projects are named `<prefix><runfolder>` (e.g. `002_<runfolder>`); the
/// upload places the runfolder at `/<runfolder>` so the prefix is stripped
/// before joining the logfile folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogfileLayout {
    pub project_prefix_len: usize,
    pub folder: String,
}

impl LogfileLayout {
    pub fn from_config(config: &ArchiveConfig) -> Self {
        Self {
            project_prefix_len: config.project_prefix_len,
            folder: config.logfile_folder.clone(),
        }
    }

    pub fn logfile_dir(&self, project_name: &str) -> String {
        let uploaded_runfolder: String =
            project_name.chars().skip(self.project_prefix_len).collect();
        format!("/{}/{}", uploaded_runfolder, self.folder.trim_matches('/'))
    }
}

impl Default for LogfileLayout {
    fn default() -> Self {
        Self::from_config(&ArchiveConfig::default())
    }
}

pub struct RemoteProjectResolver {
    client: Arc<dyn ArchiveClient>,
    layout: LogfileLayout,
    fastq_name_pattern: String,
}

impl RemoteProjectResolver {
    /// `fastq_glob` is the same glob used for the local inventory, so both
    /// sides select the same file names.
    pub fn new(client: Arc<dyn ArchiveClient>, layout: LogfileLayout, fastq_glob: &str) -> Self {
        Self {
            client,
            layout,
            fastq_name_pattern: glob_to_name_pattern(fastq_glob),
        }
    }

    pub fn layout(&self) -> &LogfileLayout {
        &self.layout
    }

    /// Find the single project whose name contains `runfolder_name`.
    ///
    /// Zero or several matches are not errors; they come back as
    /// `NotFound`/`Ambiguous` and are logged with the match count.
    pub fn resolve(&self, runfolder_name: &str) -> Result<ProjectResolution, ArchiveError> {
        let pattern = escape_literal(runfolder_name);
        let mut candidates = self.client.find_projects(&pattern)?;

        let resolution = match candidates.len() {
            0 => ProjectResolution::NotFound,
            1 => {
                let project = candidates.remove(0);
                ProjectResolution::Found(RemoteProject {
                    id: project.id,
                    name: project.name,
                })
            }
            _ => {
                candidates.sort_by(|a, b| a.name.cmp(&b.name));
                ProjectResolution::Ambiguous(candidates)
            }
        };

        match &resolution {
            ProjectResolution::Found(project) => {
                debug!("{} remote project: {} ({})", runfolder_name, project.name, project.id)
            }
            ProjectResolution::NotFound => {
                warn!("PROJECT MISMATCH - 0 remote projects found for {}", runfolder_name)
            }
            ProjectResolution::Ambiguous(candidates) => {
                let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
                warn!(
                    "PROJECT MISMATCH - {} remote projects found for {}: {:?}",
                    candidates.len(),
                    runfolder_name,
                    names
                )
            }
        }

        Ok(resolution)
    }

    /// Fastq file names in `project` whose upload has completed.
    /// Files still open or closing are left out.
    pub fn find_fastqs(&self, project: &RemoteProject) -> Result<BTreeSet<String>, ArchiveError> {
        let files = self.client.find_files(&FileQuery {
            project: &project.id,
            folder: None,
            name_pattern: Some(&self.fastq_name_pattern),
        })?;

        let total = files.len();
        let closed: BTreeSet<String> = files
            .into_iter()
            .filter(|file| file.state == FileState::Closed)
            .map(|file| file.name)
            .collect();

        debug!(
            "{} contains {} \"closed\" fastq files ({} found in any state): {:?}",
            project.id,
            closed.len(),
            total,
            closed
        );
        Ok(closed)
    }

    pub fn count_logfiles(&self, project: &RemoteProject) -> Result<usize, ArchiveError> {
        let folder = self.layout.logfile_dir(&project.name);
        let files = self.client.find_files(&FileQuery {
            project: &project.id,
            folder: Some(&folder),
            name_pattern: None,
        })?;
        debug!("{} contains {} logfiles in {}", project.id, files.len(), folder);
        Ok(files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::InMemoryArchive;

    const RUNFOLDER: &str = "250101_M02353_0001_000000000-ABCDE";

    fn resolver(archive: InMemoryArchive) -> RemoteProjectResolver {
        RemoteProjectResolver::new(Arc::new(archive), LogfileLayout::default(), "*.fastq.gz")
    }

    #[test]
    fn test_escape_literal_only_touches_metacharacters() {
        assert_eq!(escape_literal(RUNFOLDER), RUNFOLDER);
        assert_eq!(escape_literal("250101_X.1+(a)"), r"250101_X\.1\+\(a\)");
        assert_eq!(escape_literal("a-b#c&d~e"), "a-b#c&d~e");
    }

    #[test]
    fn test_glob_to_name_pattern() {
        assert_eq!(glob_to_name_pattern("*.fastq.gz"), r"^.*\.fastq\.gz$");
        assert_eq!(glob_to_name_pattern("S?_[!x]*.fq.gz"), r"^S._[^x].*\.fq\.gz$");
        assert_eq!(glob_to_name_pattern("[a-c]_R1.fq"), r"^[a-c]_R1\.fq$");
    }

    #[test]
    fn test_find_fastqs_follows_configured_glob() {
        let archive = InMemoryArchive::new()
            .with_project("project-1", format!("002_{RUNFOLDER}"))
            .with_file("project-1", "/", "a.fq.gz", FileState::Closed)
            .with_file("project-1", "/", "b.fastq.gz", FileState::Closed)
            .with_file("project-1", "/", "a.fq.gz.md5", FileState::Closed);
        let resolver =
            RemoteProjectResolver::new(Arc::new(archive), LogfileLayout::default(), "*.fq.gz");
        let resolution = resolver.resolve(RUNFOLDER).unwrap();
        let fastqs = resolver.find_fastqs(resolution.project().unwrap()).unwrap();
        assert_eq!(fastqs.into_iter().collect::<Vec<_>>(), vec!["a.fq.gz"]);
    }

    #[test]
    fn test_logfile_dir_strips_prefix() {
        let layout = LogfileLayout {
            project_prefix_len: 4,
            folder: "automated_scripts_logfiles".to_string(),
        };
        assert_eq!(
            layout.logfile_dir("002_250101_M02353_0001"),
            "/250101_M02353_0001/automated_scripts_logfiles"
        );
    }

    #[test]
    fn test_resolve_unique_project() {
        let archive =
            InMemoryArchive::new().with_project("project-1", format!("002_{RUNFOLDER}_NGS001"));
        let resolution = resolver(archive).resolve(RUNFOLDER).unwrap();
        let project = resolution.project().unwrap();
        assert_eq!(project.id, ProjectId::new("project-1"));
        assert_eq!(resolution.match_count(), 1);
    }

    #[test]
    fn test_resolve_none_and_many() {
        let resolution = resolver(InMemoryArchive::new()).resolve(RUNFOLDER).unwrap();
        assert_eq!(resolution, ProjectResolution::NotFound);

        let archive = InMemoryArchive::new()
            .with_project("project-1", format!("002_{RUNFOLDER}_A"))
            .with_project("project-2", format!("003_{RUNFOLDER}_B"));
        let resolution = resolver(archive).resolve(RUNFOLDER).unwrap();
        assert!(resolution.project().is_none());
        assert_eq!(resolution.match_count(), 2);
    }

    #[test]
    fn test_find_fastqs_only_closed() {
        let archive = InMemoryArchive::new()
            .with_project("project-1", format!("002_{RUNFOLDER}"))
            .with_file("project-1", "/", "a.fastq.gz", FileState::Closed)
            .with_file("project-1", "/Data", "b.fastq.gz", FileState::Open)
            .with_file("project-1", "/Data", "c.fastq.gz", FileState::Closing)
            .with_file("project-1", "/", "SampleSheet.csv", FileState::Closed);
        let resolver = resolver(archive);
        let resolution = resolver.resolve(RUNFOLDER).unwrap();
        let fastqs = resolver.find_fastqs(resolution.project().unwrap()).unwrap();
        assert_eq!(fastqs.into_iter().collect::<Vec<_>>(), vec!["a.fastq.gz"]);
    }

    #[test]
    fn test_count_logfiles_in_layout_folder() {
        let logdir = format!("/{RUNFOLDER}/automated_scripts_logfiles");
        let archive = InMemoryArchive::new()
            .with_project("project-1", format!("002_{RUNFOLDER}"))
            .with_file("project-1", &logdir, "upload.log", FileState::Closed)
            .with_file("project-1", &logdir, "demultiplex.log", FileState::Closed)
            .with_file("project-1", "/other", "stray.log", FileState::Closed);
        let resolver = resolver(archive);
        let resolution = resolver.resolve(RUNFOLDER).unwrap();
        assert_eq!(resolver.count_logfiles(resolution.project().unwrap()).unwrap(), 2);
    }

    #[test]
    fn test_resolve_propagates_archive_failure() {
        let archive = InMemoryArchive::new();
        archive.set_offline(true);
        assert!(resolver(archive).resolve(RUNFOLDER).is_err());
    }
}
