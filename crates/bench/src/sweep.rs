//! Sweep driver
//!
//! Produces the raw table of one (video, format) pair. For every quality value
//! of the recipe's sweep it converts the source to the high-bit-depth
//! reference, encodes (optionally in two passes), decodes, converts the
//! decoded output to `.y4m` and `.yuv`, runs the five scorers and appends one
//! row. Rows are flushed as they are written; the completion marker is only
//! written after the last one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{BenchConfig, Recipe, RecipeError, ValidRecipe};
use crate::marker::{clear_completion_marker, is_sweep_complete, write_completion_marker};
use crate::metrics::{DerivedMetrics, StepSizes};
use crate::paths::{encoded_target_path, raw_table_path, video_name, with_suffix, TempNamespace};
use crate::probe::{convert_video, probe_video, VideoInfo};
use crate::quality::{quality_values, QualityValue};
use crate::scorer::{QualityScores, ScoreError, ScoreInputs, ScorerSet};
use crate::table::{RawRow, RawTableWriter};
use crate::template::{TemplateError, TemplateVars};
use crate::tool::{CommandRunner, ToolCommand, ToolError};

/// Error type for a single video's sweep
#[derive(Debug, Error)]
pub enum SweepError {
    /// Recipe is missing fields or has inconsistent bounds
    #[error("There was an error parsing the format recipe: {0}")]
    Recipe(#[from] RecipeError),

    /// A recipe or scorer command template could not be expanded
    #[error("invalid command template: {0}")]
    Template(#[from] TemplateError),

    /// An external tool failed; the whole run is untrustworthy
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Reading the source or writing results failed
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SweepError {
    /// Tool failures abort the whole run, everything else only this video
    pub fn is_fatal(&self) -> bool {
        matches!(self, SweepError::Tool(_))
    }
}

impl From<ScoreError> for SweepError {
    fn from(e: ScoreError) -> Self {
        match e {
            ScoreError::Template(e) => SweepError::Template(e),
            ScoreError::Tool(e) => SweepError::Tool(e),
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> SweepError + '_ {
    move |source| SweepError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What to sweep
#[derive(Debug, Clone, Copy)]
pub struct SweepJob<'a> {
    pub video: &'a Path,
    pub format: &'a str,
    pub subset_name: &'a str,
    pub recipe: &'a Recipe,
}

/// Result of a sweep that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum SweepOutcome {
    /// Every quality step was measured and the table marked complete
    Completed { results: PathBuf, rows: usize },
    /// A complete table already existed; no tool was invoked
    Skipped { results: PathBuf },
}

/// Temporary files of one step, removed when dropped
#[derive(Default)]
struct Scratch {
    paths: Vec<PathBuf>,
}

impl Scratch {
    fn track(&mut self, path: PathBuf) -> PathBuf {
        self.paths.push(path.clone());
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        for path in &self.paths {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove temporary file {}: {}", path.display(), e),
            }
        }
    }
}

/// Paths used by one quality step
struct StepPaths {
    origy4m_10bits: PathBuf,
    origyuv: PathBuf,
    target: PathBuf,
    target_dec: PathBuf,
}

/// Measurements of one quality step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMeasurement {
    pub compressed_bytes: u64,
    pub encode_time: Duration,
    pub decode_time: Duration,
    pub scores: QualityScores,
}

/// Drives quality sweeps with a fixed configuration and command runner
pub struct SweepDriver<'a, R: CommandRunner + ?Sized> {
    config: &'a BenchConfig,
    runner: &'a R,
    scorers: ScorerSet,
    temp: TempNamespace,
}

impl<'a, R: CommandRunner + ?Sized> SweepDriver<'a, R> {
    /// Driver whose temporary files are namespaced by the current process id
    pub fn new(config: &'a BenchConfig, runner: &'a R) -> Self {
        Self::with_temp_namespace(
            config,
            runner,
            TempNamespace::for_current_process(&config.tools.tmp_dir),
        )
    }

    pub fn with_temp_namespace(config: &'a BenchConfig, runner: &'a R, temp: TempNamespace) -> Self {
        Self {
            config,
            runner,
            scorers: ScorerSet::from_config(&config.scorers),
            temp,
        }
    }

    /// Results table location for `job`
    pub fn results_path(&self, job: &SweepJob<'_>) -> PathBuf {
        raw_table_path(
            &self.config.paths.results_dir,
            job.subset_name,
            job.format,
            job.video,
        )
    }

    /// Run the whole sweep for one video, or skip it if already complete
    pub fn run(&self, job: &SweepJob<'_>) -> Result<SweepOutcome, SweepError> {
        let results = self.results_path(job);
        if is_sweep_complete(&results, self.config.resume.legacy_min_bytes) {
            info!(
                "Skipping video {} for format {}: {} is complete",
                video_name(job.video),
                job.format,
                results.display()
            );
            return Ok(SweepOutcome::Skipped { results });
        }

        let recipe = job.recipe.validate()?;
        let qualities = quality_values(&recipe.quality);
        if let Some(first) = qualities.first() {
            self.check_templates(job, &recipe, *first)?;
        }

        let original_bytes = fs::metadata(job.video)
            .map_err(io_error(job.video))?
            .len();
        let info = probe_video(self.runner, &self.config.tools, job.video)?;

        clear_completion_marker(&results).map_err(io_error(&results))?;
        let mut writer = RawTableWriter::create(&results).map_err(io_error(&results))?;

        for quality in &qualities {
            info!(
                "Processing video {}, quality {}",
                video_name(job.video),
                quality
            );
            let step = self.run_step(job, &recipe, &info, *quality)?;
            let row = build_row(job.video, *quality, original_bytes, &info, &step);
            writer.append(&row).map_err(io_error(&results))?;
        }
        drop(writer);

        write_completion_marker(&results).map_err(io_error(&results))?;
        info!(
            "Results for video {} ({} quality steps) saved to {}",
            video_name(job.video),
            qualities.len(),
            results.display()
        );

        Ok(SweepOutcome::Completed {
            results,
            rows: qualities.len(),
        })
    }

    fn step_paths(&self, job: &SweepJob<'_>, recipe: &ValidRecipe, quality: QualityValue) -> StepPaths {
        let source_tmp = self.temp.path_for(job.video);
        let target = encoded_target_path(
            &self.config.paths.encoded_dir,
            job.format,
            job.subset_name,
            job.video,
            quality,
            &recipe.encode_extension,
        );
        let target_dec = with_suffix(
            &self.temp.path_for(&target),
            &format!(".{}", recipe.decode_extension),
        );
        StepPaths {
            origy4m_10bits: with_suffix(&source_tmp, ".10bits.y4m"),
            origyuv: with_suffix(&source_tmp, ".yuv"),
            target,
            target_dec,
        }
    }

    fn step_vars(
        &self,
        job: &SweepJob<'_>,
        paths: &StepPaths,
        width: u64,
        height: u64,
        quality: QualityValue,
    ) -> TemplateVars {
        TemplateVars::new()
            .with("origy4m", job.video.to_string_lossy())
            .with("origy4m_10bits", paths.origy4m_10bits.to_string_lossy())
            .with("origyuv", paths.origyuv.to_string_lossy())
            .with("target", paths.target.to_string_lossy())
            .with("target_dec", paths.target_dec.to_string_lossy())
            .with("quality", quality.to_string())
            .with("width", width.to_string())
            .with("height", height.to_string())
            .with("format", job.format)
            .with("subset_name", job.subset_name)
    }

    /// Expand every recipe and scorer template once so template errors surface
    /// before any tool runs
    fn check_templates(
        &self,
        job: &SweepJob<'_>,
        recipe: &ValidRecipe,
        quality: QualityValue,
    ) -> Result<(), TemplateError> {
        let paths = self.step_paths(job, recipe, quality);
        let vars = self.step_vars(job, &paths, 0, 0, quality);
        ToolCommand::from_template(&recipe.encode_cmd, &vars)?;
        if let Some(second_pass) = &recipe.second_pass {
            ToolCommand::from_template(second_pass, &vars)?;
        }
        ToolCommand::from_template(&recipe.decode_cmd, &vars)?;

        let inputs = ScoreInputs {
            reference_y4m: &paths.origy4m_10bits,
            distorted_y4m: &paths.target_dec,
            reference_yuv: &paths.origyuv,
            distorted_yuv: &paths.target_dec,
            width: 0,
            height: 0,
        };
        for scorer in self.scorers.iter() {
            scorer.command_for(&inputs)?;
        }
        Ok(())
    }

    fn timed(&self, template: &str, vars: &TemplateVars) -> Result<Duration, SweepError> {
        let cmd = ToolCommand::from_template(template, vars)?;
        let start = Instant::now();
        self.runner.run(&cmd)?;
        Ok(start.elapsed())
    }

    /// Measure a single quality value
    pub fn run_step(
        &self,
        job: &SweepJob<'_>,
        recipe: &ValidRecipe,
        info: &VideoInfo,
        quality: QualityValue,
    ) -> Result<StepMeasurement, SweepError> {
        let tools = &self.config.tools;
        let paths = self.step_paths(job, recipe, quality);
        let mut scratch = Scratch::default();

        let reference_y4m = scratch.track(paths.origy4m_10bits.clone());
        convert_video(self.runner, tools, job.video, &reference_y4m)?;
        let reference_yuv = scratch.track(paths.origyuv.clone());
        convert_video(self.runner, tools, &reference_y4m, &reference_yuv)?;

        if let Some(parent) = paths.target.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let target_dec = scratch.track(paths.target_dec.clone());
        let vars = self.step_vars(job, &paths, info.width, info.height, quality);

        let mut encode_time = self.timed(&recipe.encode_cmd, &vars)?;
        if let Some(second_pass) = &recipe.second_pass {
            encode_time += self.timed(second_pass, &vars)?;
        }
        let decode_time = self.timed(&recipe.decode_cmd, &vars)?;

        let distorted_y4m = if recipe.decode_extension == "y4m" {
            target_dec.clone()
        } else {
            let path = scratch.track(with_suffix(&self.temp.path_for(&target_dec), ".y4m"));
            convert_video(self.runner, tools, &target_dec, &path)?;
            path
        };
        let distorted_yuv = if recipe.decode_extension == "yuv" {
            target_dec.clone()
        } else {
            let path = scratch.track(with_suffix(&self.temp.path_for(&target_dec), ".yuv"));
            convert_video(self.runner, tools, &target_dec, &path)?;
            path
        };

        let scores = self.scorers.score_all(
            self.runner,
            &ScoreInputs {
                reference_y4m: &reference_y4m,
                distorted_y4m: &distorted_y4m,
                reference_yuv: &reference_yuv,
                distorted_yuv: &distorted_yuv,
                width: info.width,
                height: info.height,
            },
        )?;

        let compressed_bytes = fs::metadata(&paths.target)
            .map_err(io_error(&paths.target))?
            .len();

        Ok(StepMeasurement {
            compressed_bytes,
            encode_time,
            decode_time,
            scores,
        })
    }
}

fn build_row(
    video: &Path,
    quality: QualityValue,
    original_bytes: u64,
    info: &VideoInfo,
    step: &StepMeasurement,
) -> RawRow {
    let derived = DerivedMetrics::from_sizes(&StepSizes {
        original_bytes,
        compressed_bytes: step.compressed_bytes,
        pixels: info.pixels(),
        frames: info.frames,
        encode_time: step.encode_time,
        decode_time: step.decode_time,
    });
    RawRow {
        file_name: video_name(video),
        quality: quality.as_f64(),
        orig_file_size: original_bytes,
        compressed_file_size: step.compressed_bytes,
        height: info.height,
        frames: info.frames,
        pixels: info.pixels(),
        bpp: derived.bpp,
        compression_ratio: derived.compression_ratio,
        encode_time: step.encode_time.as_secs_f64(),
        encode_fpm: derived.encode_fpm,
        decode_time: step.decode_time.as_secs_f64(),
        decode_fpm: derived.decode_fpm,
        scores: step.scores,
    }
}
