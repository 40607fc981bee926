use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::{ArchiveClient, FileQuery, FileState, ProjectId, ProjectSummary, RemoteFile};
use crate::error::ArchiveError;

#[derive(Debug, Clone)]
struct StoredFile {
    project: ProjectId,
    file: RemoteFile,
}

/// Archive held entirely in memory, with the same search semantics as the
/// remote service: unanchored regex name matching and recursive folder scope.
#[derive(Debug, Default)]
pub struct InMemoryArchive {
    projects: RwLock<Vec<ProjectSummary>>,
    files: RwLock<Vec<StoredFile>>,
    offline: AtomicBool,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(self, id: &str, name: impl Into<String>) -> Self {
        self.add_project(id, name);
        self
    }

    pub fn with_file(self, project: &str, folder: &str, name: &str, state: FileState) -> Self {
        self.add_file(project, folder, name, state);
        self
    }

    pub fn add_project(&self, id: &str, name: impl Into<String>) {
        let mut projects = self.projects.write().unwrap_or_else(|e| e.into_inner());
        projects.push(ProjectSummary {
            id: ProjectId::new(id),
            name: name.into(),
        });
    }

    pub fn add_file(&self, project: &str, folder: &str, name: &str, state: FileState) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        let id = format!("file-{:08}", files.len() + 1);
        files.push(StoredFile {
            project: ProjectId::new(project),
            file: RemoteFile {
                id,
                name: name.to_string(),
                folder: folder.to_string(),
                state,
            },
        });
    }

    /// Change the upload state of every file called `name` in `project`.
    pub fn set_file_state(&self, project: &str, name: &str, state: FileState) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        for stored in files
            .iter_mut()
            .filter(|f| f.project.as_str() == project && f.file.name == name)
        {
            stored.file.state = state;
        }
    }

    /// While offline every query fails with an HTTP error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), ArchiveError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ArchiveError::Http("archive unavailable".to_string()));
        }
        Ok(())
    }
}

fn compile(pattern: &str) -> Result<Regex, ArchiveError> {
    Regex::new(pattern).map_err(|e| ArchiveError::InvalidQuery(e.to_string()))
}

fn in_folder(file_folder: &str, scope: &str) -> bool {
    let scope = scope.trim_end_matches('/');
    if scope.is_empty() {
        return true;
    }
    file_folder == scope
        || file_folder
            .strip_prefix(scope)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl ArchiveClient for InMemoryArchive {
    fn find_projects(&self, name_pattern: &str) -> Result<Vec<ProjectSummary>, ArchiveError> {
        self.check_online()?;
        let regex = compile(name_pattern)?;
        let projects = self.projects.read().unwrap_or_else(|e| e.into_inner());
        Ok(projects
            .iter()
            .filter(|p| regex.is_match(&p.name))
            .cloned()
            .collect())
    }

    fn find_files(&self, query: &FileQuery<'_>) -> Result<Vec<RemoteFile>, ArchiveError> {
        self.check_online()?;
        let regex = query.name_pattern.map(compile).transpose()?;
        let scope = query.folder.unwrap_or("/");
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        Ok(files
            .iter()
            .filter(|f| &f.project == query.project)
            .filter(|f| in_folder(&f.file.folder, scope))
            .filter(|f| regex.as_ref().map_or(true, |r| r.is_match(&f.file.name)))
            .map(|f| f.file.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_folder_is_recursive() {
        assert!(in_folder("/run/logs", "/run"));
        assert!(in_folder("/run", "/run/"));
        assert!(in_folder("/anything", "/"));
        assert!(!in_folder("/runner", "/run"));
    }

    #[test]
    fn test_find_files_scoped_to_project() {
        let project = ProjectId::new("project-1");
        let archive = InMemoryArchive::new()
            .with_project("project-1", "001_run")
            .with_project("project-2", "002_run")
            .with_file("project-1", "/", "a.fastq.gz", FileState::Closed)
            .with_file("project-2", "/", "b.fastq.gz", FileState::Closed);

        let files = archive
            .find_files(&FileQuery {
                project: &project,
                folder: None,
                name_pattern: Some(r"fastq\.gz"),
            })
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "a.fastq.gz");
    }

    #[test]
    fn test_invalid_pattern_is_query_error() {
        let archive = InMemoryArchive::new();
        assert!(matches!(
            archive.find_projects("("),
            Err(ArchiveError::InvalidQuery(_))
        ));
    }
}
