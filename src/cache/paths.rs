// Cache path utilities.
// Locates the per-user cache directory and the files that hold local entries and snapshots.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

pub const STUDENTS_FILE: &str = "students.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Get the base cache directory (~/.cache/grade-manager on Linux).
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "grade-manager").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Directory holding the keyed local entries under a cache root.
pub fn entries_dir(root: &Path) -> PathBuf {
    root.join("entries")
}

/// Path to the file for one local entry.
pub fn entry_path(root: &Path, key: &str) -> PathBuf {
    entries_dir(root).join(format!("{}.json", sanitize_name(key)))
}

/// Path to the student list inside a snapshot directory.
pub fn snapshot_students_path(dir: &Path) -> PathBuf {
    dir.join(STUDENTS_FILE)
}

/// Path to the snapshot metadata inside a snapshot directory.
pub fn snapshot_metadata_path(dir: &Path) -> PathBuf {
    dir.join(METADATA_FILE)
}

/// Sanitize a name for use in filesystem paths.
/// Replaces problematic characters with underscores.
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '.' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("all_students"), "all_students");
        assert_eq!(sanitize_name("student/alice"), "student_alice");
        assert_eq!(sanitize_name("../escape"), "___escape");
    }

    #[test]
    fn test_entry_paths() {
        let root = Path::new("/tmp/gm");
        assert!(entry_path(root, "all_students").ends_with("entries/all_students.json"));
        assert!(snapshot_students_path(root).ends_with("students.json"));
        assert!(snapshot_metadata_path(root).ends_with("metadata.json"));
    }
}
