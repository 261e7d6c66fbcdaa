//! File layout of raw tables, aggregate tables, encoded outputs and temporaries

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::quality::QualityValue;

/// Extension shared by raw and aggregate result tables
pub const RESULTS_EXTENSION: &str = "out";

/// File stem of a video, used as its name in result tables
pub fn video_name(video: &Path) -> String {
    video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `<results_dir>/<subset>/<format>/lossy/`
pub fn lossy_dir(subset_dir: &Path, format: &str) -> PathBuf {
    subset_dir.join(format).join("lossy")
}

/// `<results_dir>/<subset>/<format>/lossy/<video>.<format>.out`
pub fn raw_table_path(results_dir: &Path, subset_name: &str, format: &str, video: &Path) -> PathBuf {
    lossy_dir(&results_dir.join(subset_name), format).join(format!(
        "{}.{}.{}",
        video_name(video),
        format,
        RESULTS_EXTENSION
    ))
}

/// `<subset_dir>/<subset>.<format>.<resolution>.lossy.out`, subset named after the directory
pub fn aggregate_table_path(subset_dir: &Path, format: &str, resolution: &str) -> PathBuf {
    let subset = subset_dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    subset_dir.join(format!(
        "{}.{}.{}.lossy.{}",
        subset, format, resolution, RESULTS_EXTENSION
    ))
}

/// `<encoded_dir>/<FORMAT>_out/<subset>/<video>/<video>-q<quality>.<ext>`
pub fn encoded_target_path(
    encoded_dir: &Path,
    format: &str,
    subset_name: &str,
    video: &Path,
    quality: QualityValue,
    extension: &str,
) -> PathBuf {
    let name = video_name(video);
    encoded_dir
        .join(format!("{}_out", format.to_uppercase()))
        .join(subset_name)
        .join(&name)
        .join(format!("{}-q{}.{}", name, quality, extension))
}

/// Append `suffix` to the file name of `path`
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Temporary-file namespace of one process
///
/// Names are `<dir>/<pid><basename>`, so concurrent processes never collide
/// and sibling workers collide only if they process the same source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempNamespace {
    dir: PathBuf,
    prefix: String,
}

impl TempNamespace {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Namespace keyed by the current process id
    pub fn for_current_process(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, std::process::id().to_string())
    }

    pub fn path_for(&self, source: &Path) -> PathBuf {
        let base = source
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.dir.join(format!("{}{}", self.prefix, base))
    }
}
