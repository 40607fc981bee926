use glob::Pattern;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{error, trace};
use walkdir::WalkDir;

/// An immediate subdirectory of a scan root along with its modification time.
#[derive(Debug, Clone)]
pub struct ChildDirectory {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Recursively collect the file names (not paths) under `root` that match
/// `pattern`, sorted. Symlinks are not followed.
///
/// Any unreadable entry aborts the walk, so the inventory is never partial.
pub fn find_matching_file_names(root: &Path, pattern: &Pattern) -> io::Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|err| {
            let message = format!("Error walking {}: {}", root.display(), err);
            io::Error::new(
                err.io_error().map(|e| e.kind()).unwrap_or(io::ErrorKind::Other),
                message,
            )
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy();
        if pattern.matches(&file_name) {
            trace!("Matched {}", entry.path().display());
            names.push(file_name.into_owned());
        }
    }

    names.sort();
    Ok(names)
}

/// List the directories directly under `root`, oldest modification first.
/// Symlinked directories are skipped.
pub fn list_child_directories(root: &Path) -> io::Result<Vec<ChildDirectory>> {
    let entries = fs::read_dir(root).map_err(|err| {
        io::Error::new(
            err.kind(),
            format!("Error reading directory {}: {}", root.display(), err),
        )
    })?;

    let mut children = Vec::new();
    for entry_result in entries {
        let entry = entry_result.map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("Error reading entry in directory {}: {}", root.display(), err),
            )
        })?;

        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(err) => {
                error!("Error reading file type for {}: {}", entry.path().display(), err);
                continue;
            }
        };
        if !file_type.is_dir() {
            continue;
        }

        // Directories removed mid-scan are skipped rather than failing the pass
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(err) => {
                error!("Error getting metadata for {}: {}", entry.path().display(), err);
                continue;
            }
        };

        children.push(ChildDirectory {
            path: entry.path(),
            modified,
        });
    }

    children.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::tempdir;

    #[test]
    fn test_find_matching_file_names_is_recursive_and_sorted() {
        let tmp = tempdir().unwrap();
        let calls = tmp.path().join("Data/Intensities/BaseCalls");
        fs::create_dir_all(&calls).unwrap();
        fs::write(calls.join("b_S2_R1_001.fastq.gz"), "").unwrap();
        fs::write(tmp.path().join("a_S1_R1_001.fastq.gz"), "").unwrap();
        fs::write(calls.join("SampleSheet.csv"), "").unwrap();
        fs::write(calls.join("c.fastq"), "").unwrap();

        let pattern = Pattern::new("*.fastq.gz").unwrap();
        let names = find_matching_file_names(tmp.path(), &pattern).unwrap();
        assert_eq!(names, vec!["a_S1_R1_001.fastq.gz", "b_S2_R1_001.fastq.gz"]);
    }

    #[test]
    fn test_list_child_directories_oldest_first() {
        let tmp = tempdir().unwrap();
        for (name, mtime) in [("newer", 2_000), ("oldest", 1_000), ("newest", 3_000)] {
            let dir = tmp.path().join(name);
            fs::create_dir(&dir).unwrap();
            set_file_mtime(&dir, FileTime::from_unix_time(mtime, 0)).unwrap();
        }
        fs::write(tmp.path().join("not_a_dir.txt"), "").unwrap();

        let children = list_child_directories(tmp.path()).unwrap();
        let names: Vec<_> = children
            .iter()
            .map(|c| c.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["oldest", "newer", "newest"]);
    }

    #[test]
    fn test_list_child_directories_missing_root() {
        let tmp = tempdir().unwrap();
        assert!(list_child_directories(&tmp.path().join("absent")).is_err());
    }
}
