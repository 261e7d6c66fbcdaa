//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading a config or recipe file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// JSON parsing error (recipe book)
    Json(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Json(e) => write!(f, "Failed to parse recipes: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}

/// External conversion/probing tools and scratch space
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,
    /// Directory for per-step temporary files
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    /// Pixel format of the high-bit-depth reference
    #[serde(default = "default_reference_pix_fmt")]
    pub reference_pix_fmt: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_reference_pix_fmt() -> String {
    "yuv420p10le".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            tmp_dir: default_tmp_dir(),
            reference_pix_fmt: default_reference_pix_fmt(),
        }
    }
}

/// One objective-quality scorer: how to invoke it and where its score is printed
///
/// `command` is a template; `$reference`, `$distorted`, `$width` and `$height`
/// are substituted per step. `label` is the text immediately preceding the
/// score on the last non-empty line of the tool's stdout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScorerConfig {
    pub command: String,
    pub label: String,
}

impl ScorerConfig {
    fn new(command: &str, label: &str) -> Self {
        Self {
            command: command.to_string(),
            label: label.to_string(),
        }
    }
}

fn default_y_ssim() -> ScorerConfig {
    ScorerConfig::new("dump_ssim -y $reference $distorted", "Total: ")
}

fn default_rgb_ssim() -> ScorerConfig {
    ScorerConfig::new("dump_ssim $reference $distorted", "Total: ")
}

fn default_msssim() -> ScorerConfig {
    ScorerConfig::new("dump_msssim -y $reference $distorted", "Total: ")
}

fn default_psnrhvsm() -> ScorerConfig {
    ScorerConfig::new("dump_psnrhvs -y $reference $distorted", "Total: ")
}

fn default_vmaf() -> ScorerConfig {
    ScorerConfig::new(
        "vmafossexec yuv420p10le $width $height $reference $distorted vmaf_v0.6.1.pkl",
        "VMAF score = ",
    )
}

/// Command templates for the five quality scorers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScorersConfig {
    #[serde(default = "default_y_ssim")]
    pub y_ssim: ScorerConfig,
    #[serde(default = "default_rgb_ssim")]
    pub rgb_ssim: ScorerConfig,
    #[serde(default = "default_msssim")]
    pub msssim: ScorerConfig,
    #[serde(default = "default_psnrhvsm")]
    pub psnrhvsm: ScorerConfig,
    #[serde(default = "default_vmaf")]
    pub vmaf: ScorerConfig,
}

impl Default for ScorersConfig {
    fn default() -> Self {
        Self {
            y_ssim: default_y_ssim(),
            rgb_ssim: default_rgb_ssim(),
            msssim: default_msssim(),
            psnrhvsm: default_psnrhvsm(),
            vmaf: default_vmaf(),
        }
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolConfig {
    /// Concurrent sweeps during collection (default 1, encoders are heavy)
    #[serde(default = "default_collect_workers")]
    pub collect_workers: u32,
    /// Concurrent formats during aggregation (0 = one per format)
    #[serde(default)]
    pub aggregate_workers: u32,
}

fn default_collect_workers() -> u32 {
    1
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            collect_workers: default_collect_workers(),
            aggregate_workers: 0,
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Root of the raw and aggregate result tables
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Root under which `<FORMAT>_out/` encoded files are kept
    #[serde(default = "default_encoded_dir")]
    pub encoded_dir: PathBuf,
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_encoded_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            results_dir: default_results_dir(),
            encoded_dir: default_encoded_dir(),
        }
    }
}

/// Resume behaviour for interrupted collection runs
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ResumeConfig {
    /// Treat an unmarked results file of at least this many bytes as complete.
    /// Only for result trees produced before completion markers existed.
    #[serde(default)]
    pub legacy_min_bytes: Option<u64>,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BenchConfig {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub scorers: ScorersConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub resume: ResumeConfig,
}

impl BenchConfig {
    /// Load configuration from a TOML file
    ///
    /// Missing sections and fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: BenchConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - RD_BENCH_FFMPEG -> tools.ffmpeg
    /// - RD_BENCH_FFPROBE -> tools.ffprobe
    /// - RD_BENCH_TMP_DIR -> tools.tmp_dir
    /// - RD_BENCH_COLLECT_WORKERS -> pool.collect_workers
    /// - RD_BENCH_AGGREGATE_WORKERS -> pool.aggregate_workers
    /// - RD_BENCH_RESULTS_DIR -> paths.results_dir
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("RD_BENCH_FFMPEG") {
            if !val.is_empty() {
                self.tools.ffmpeg = val;
            }
        }

        if let Ok(val) = env::var("RD_BENCH_FFPROBE") {
            if !val.is_empty() {
                self.tools.ffprobe = val;
            }
        }

        if let Ok(val) = env::var("RD_BENCH_TMP_DIR") {
            if !val.is_empty() {
                self.tools.tmp_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("RD_BENCH_COLLECT_WORKERS") {
            if let Ok(workers) = val.parse::<u32>() {
                if workers > 0 {
                    self.pool.collect_workers = workers;
                }
            }
        }

        if let Ok(val) = env::var("RD_BENCH_AGGREGATE_WORKERS") {
            if let Ok(workers) = val.parse::<u32>() {
                self.pool.aggregate_workers = workers;
            }
        }

        if let Ok(val) = env::var("RD_BENCH_RESULTS_DIR") {
            if !val.is_empty() {
                self.paths.results_dir = PathBuf::from(val);
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Env var tests must not interleave
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env_vars() {
        env::remove_var("RD_BENCH_FFMPEG");
        env::remove_var("RD_BENCH_FFPROBE");
        env::remove_var("RD_BENCH_TMP_DIR");
        env::remove_var("RD_BENCH_COLLECT_WORKERS");
        env::remove_var("RD_BENCH_AGGREGATE_WORKERS");
        env::remove_var("RD_BENCH_RESULTS_DIR");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            collect in 1u32..64,
            aggregate in 0u32..16,
            legacy in proptest::option::of(0u64..10_000),
            tmp in "[a-z]{1,12}",
        ) {
            let toml_str = format!(
                r#"
[tools]
tmp_dir = "/{}"

[pool]
collect_workers = {}
aggregate_workers = {}

[resume]
{}
"#,
                tmp,
                collect,
                aggregate,
                legacy.map(|b| format!("legacy_min_bytes = {}", b)).unwrap_or_default(),
            );

            let config = BenchConfig::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.tools.tmp_dir, PathBuf::from(format!("/{}", tmp)));
            prop_assert_eq!(config.pool.collect_workers, collect);
            prop_assert_eq!(config.pool.aggregate_workers, aggregate);
            prop_assert_eq!(config.resume.legacy_min_bytes, legacy);
            prop_assert_eq!(config.tools.ffmpeg, "ffmpeg");
        }

        #[test]
        fn prop_env_overrides_collect_workers(
            initial in 1u32..32,
            override_workers in 1u32..64,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!("[pool]\ncollect_workers = {}\n", initial);
            let mut config = BenchConfig::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("RD_BENCH_COLLECT_WORKERS", override_workers.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.pool.collect_workers, override_workers);
        }
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = BenchConfig::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config, BenchConfig::default());
        assert_eq!(config.pool.collect_workers, 1);
        assert_eq!(config.pool.aggregate_workers, 0);
        assert_eq!(config.tools.tmp_dir, PathBuf::from("/tmp"));
        assert_eq!(config.scorers.vmaf.label, "VMAF score = ");
        assert!(config.resume.legacy_min_bytes.is_none());
    }

    #[test]
    fn test_partial_scorer_override_keeps_other_defaults() {
        let toml_str = r#"
[scorers.vmaf]
command = "vmaf --ref $reference --dist $distorted"
label = "VMAF = "
"#;
        let config = BenchConfig::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.scorers.vmaf.label, "VMAF = ");
        assert_eq!(config.scorers.y_ssim, default_y_ssim());
        assert_eq!(config.scorers.psnrhvsm.command, "dump_psnrhvs -y $reference $distorted");
    }

    #[test]
    fn test_env_zero_collect_workers_is_ignored() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = BenchConfig::default();
        env::set_var("RD_BENCH_COLLECT_WORKERS", "0");
        env::set_var("RD_BENCH_TMP_DIR", "/scratch");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.pool.collect_workers, 1);
        assert_eq!(config.tools.tmp_dir, PathBuf::from("/scratch"));
    }

    #[test]
    fn test_load_reads_file_then_env() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pool]\ncollect_workers = 4\n\n[paths]\nresults_dir = \"out\"\n").unwrap();

        env::set_var("RD_BENCH_RESULTS_DIR", "/elsewhere");
        let config = BenchConfig::load(&path).unwrap();
        clear_env_vars();

        assert_eq!(config.pool.collect_workers, 4);
        assert_eq!(config.paths.results_dir, PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = BenchConfig::load_from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
