//! Completion markers for raw result tables
//!
//! A sweep writes an empty `<table>.complete` file next to its results table
//! once the last row is flushed. Resume logic trusts the marker, not the size
//! of the table.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Constructs the completion marker path for a results table.
///
/// For example: `results/s1/x265/lossy/park.x265.out` -> `results/s1/x265/lossy/park.x265.out.complete`
pub fn completion_marker_path(table_path: &Path) -> PathBuf {
    let mut marker_path = table_path.as_os_str().to_owned();
    marker_path.push(".complete");
    PathBuf::from(marker_path)
}

pub fn has_completion_marker(table_path: &Path) -> bool {
    completion_marker_path(table_path).exists()
}

pub fn write_completion_marker(table_path: &Path) -> io::Result<()> {
    File::create(completion_marker_path(table_path))?;
    Ok(())
}

/// Removes a stale marker before a table is regenerated. A missing marker is fine.
pub fn clear_completion_marker(table_path: &Path) -> io::Result<()> {
    match fs::remove_file(completion_marker_path(table_path)) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Whether the sweep that produces `table_path` already finished
///
/// With `legacy_min_bytes` set, an unmarked table at least that large also
/// counts as finished.
pub fn is_sweep_complete(table_path: &Path, legacy_min_bytes: Option<u64>) -> bool {
    if has_completion_marker(table_path) {
        return true;
    }
    match (legacy_min_bytes, fs::metadata(table_path)) {
        (Some(min), Ok(meta)) => meta.is_file() && meta.len() >= min,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_marker_path() {
        assert_eq!(
            completion_marker_path(Path::new("r/s/f/lossy/v.f.out")),
            PathBuf::from("r/s/f/lossy/v.f.out.complete")
        );
    }

    #[test]
    fn test_unmarked_table_is_not_complete() {
        let temp_dir = TempDir::new().unwrap();
        let table = temp_dir.path().join("v.x264.out");
        fs::write(&table, "x".repeat(4096)).unwrap();

        assert!(!is_sweep_complete(&table, None));
    }

    #[test]
    fn test_marker_makes_table_complete() {
        let temp_dir = TempDir::new().unwrap();
        let table = temp_dir.path().join("v.x264.out");
        fs::write(&table, "header\n").unwrap();
        write_completion_marker(&table).unwrap();

        assert!(is_sweep_complete(&table, None));

        clear_completion_marker(&table).unwrap();
        assert!(!is_sweep_complete(&table, None));
        // clearing twice is not an error
        clear_completion_marker(&table).unwrap();
    }

    #[test]
    fn test_legacy_threshold() {
        let temp_dir = TempDir::new().unwrap();
        let table = temp_dir.path().join("v.x264.out");
        fs::write(&table, vec![b'a'; 300]).unwrap();

        assert!(is_sweep_complete(&table, Some(300)));
        assert!(!is_sweep_complete(&table, Some(301)));
        assert!(!is_sweep_complete(&temp_dir.path().join("missing.out"), Some(0)));
    }
}
