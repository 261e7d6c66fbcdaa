//! Discovery of input videos, result formats and raw tables.
//!
//! Inputs are the `.y4m` files directly inside a subset directory. On the
//! results side every subdirectory of a subset's results directory is a
//! format, and its raw tables live under `<format>/lossy/`.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::paths::{lossy_dir, RESULTS_EXTENSION};

/// Source video extension, matched exactly.
pub const INPUT_EXTENSION: &str = "y4m";

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(wanted)
}

fn files_in(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && has_extension(e.path(), extension))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

/// `.y4m` files directly in `subset_dir`, sorted by path.
pub fn find_input_videos(subset_dir: &Path) -> Vec<PathBuf> {
    files_in(subset_dir, INPUT_EXTENSION)
}

/// Names of the format directories in a subset results directory, sorted.
pub fn find_formats(subset_dir: &Path) -> Vec<String> {
    let mut formats: Vec<String> = WalkDir::new(subset_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter_map(|e| e.file_name().to_str().map(String::from))
        .collect();
    formats.sort();
    formats
}

/// Raw tables of `format`, sorted by path.
pub fn find_raw_tables(subset_dir: &Path, format: &str) -> Vec<PathBuf> {
    files_in(&lossy_dir(subset_dir, format), RESULTS_EXTENSION)
}

/// Whether any results table exists anywhere below `subset_dir`.
pub fn has_any_results(subset_dir: &Path) -> bool {
    WalkDir::new(subset_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| e.file_type().is_file() && has_extension(e.path(), RESULTS_EXTENSION))
}
