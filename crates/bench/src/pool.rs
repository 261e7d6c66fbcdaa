//! Pool dispatcher
//!
//! Collection runs one sweep per input video on a bounded rayon pool; workers
//! share nothing but the read-only configuration, and each writes only its own
//! results file. Aggregation runs one task per format.
//!
//! A tool failure inside any sweep is fatal. With [`FatalPolicy::ExitProcess`]
//! the process exits on the spot with the tool's status, taking sibling
//! workers down with it; with [`FatalPolicy::Propagate`] no new sweeps start
//! and the failure is returned once running ones finish.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{error, info};

use crate::aggregate::{aggregate_format, AggregateOutcome};
use crate::concurrency::WorkerPlan;
use crate::config::{BenchConfig, Recipe};
use crate::sweep::{SweepDriver, SweepError, SweepJob, SweepOutcome};
use crate::tool::{CommandRunner, ToolError};

/// What to do when an external tool fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalPolicy {
    /// Terminate the process immediately
    ExitProcess,
    /// Stop scheduling and return the error
    Propagate,
}

/// Error type for pool dispatch
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("external tool failure aborted the run: {0}")]
    Fatal(#[source] ToolError),
}

/// Per-video results of a collection run
#[derive(Debug, Default)]
pub struct CollectionSummary {
    pub completed: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    /// Videos whose sweep failed for a non-fatal reason, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

/// One format invocation of the collection phase
#[derive(Debug, Clone, Copy)]
pub struct CollectionRequest<'a> {
    pub format: &'a str,
    pub subset_name: &'a str,
    pub recipe: &'a Recipe,
    pub videos: &'a [PathBuf],
}

/// Run the sweep of every video in `request`
pub fn run_collection<R: CommandRunner + ?Sized>(
    config: &BenchConfig,
    runner: &R,
    request: &CollectionRequest<'_>,
    policy: FatalPolicy,
) -> Result<CollectionSummary, PoolError> {
    let plan = WorkerPlan::derive(config, 0);
    let pool = ThreadPoolBuilder::new()
        .num_threads(plan.collect_workers)
        .thread_name(|i| format!("sweep-{}", i))
        .build()?;

    info!(
        "Collecting format {} for {} videos with {} workers",
        request.format,
        request.videos.len(),
        plan.collect_workers
    );

    let driver = SweepDriver::new(config, runner);
    let aborted = AtomicBool::new(false);

    let results: Vec<(PathBuf, Result<SweepOutcome, SweepError>)> = pool.install(|| {
        request
            .videos
            .par_iter()
            .filter_map(|video| {
                if aborted.load(Ordering::SeqCst) {
                    return None;
                }
                let job = SweepJob {
                    video,
                    format: request.format,
                    subset_name: request.subset_name,
                    recipe: request.recipe,
                };
                let result = driver.run(&job);
                if let Err(SweepError::Tool(err)) = &result {
                    error!("Failure from subprocess: {}", err);
                    error!("\t{}", err.command());
                    error!("Aborting!");
                    if policy == FatalPolicy::ExitProcess {
                        std::process::exit(err.exit_code());
                    }
                    aborted.store(true, Ordering::SeqCst);
                }
                Some((video.clone(), result))
            })
            .collect()
    });

    let mut summary = CollectionSummary::default();
    let mut fatal = None;
    for (video, result) in results {
        match result {
            Ok(SweepOutcome::Completed { results, .. }) => summary.completed.push(results),
            Ok(SweepOutcome::Skipped { results }) => summary.skipped.push(results),
            Err(SweepError::Tool(err)) => {
                fatal.get_or_insert(err);
            }
            Err(err) => {
                error!("Skipping video {}: {}", video.display(), err);
                summary.failed.push((video, err.to_string()));
            }
        }
    }

    match fatal {
        Some(err) => Err(PoolError::Fatal(err)),
        None => Ok(summary),
    }
}

/// Per-format results of an aggregation run
#[derive(Debug, Default)]
pub struct AggregationSummary {
    /// Aggregate files written, per format
    pub written: Vec<(String, Vec<PathBuf>)>,
    /// Formats without any raw table
    pub no_results: Vec<String>,
    /// Formats rejected or unreadable, with the reason
    pub failed: Vec<(String, String)>,
}

/// Aggregate every format of a subset results directory, one worker per format
pub fn run_aggregation(
    config: &BenchConfig,
    subset_dir: &Path,
    formats: &[String],
) -> Result<AggregationSummary, PoolError> {
    let plan = WorkerPlan::derive(config, formats.len());
    let pool = ThreadPoolBuilder::new()
        .num_threads(plan.aggregate_workers)
        .thread_name(|i| format!("aggregate-{}", i))
        .build()?;

    let results: Vec<_> = pool.install(|| {
        formats
            .par_iter()
            .map(|format| {
                let result = aggregate_format(subset_dir, format, config.resume.legacy_min_bytes);
                (format.clone(), result)
            })
            .collect()
    });

    let mut summary = AggregationSummary::default();
    for (format, result) in results {
        match result {
            Ok(AggregateOutcome::Written(paths)) => summary.written.push((format, paths)),
            Ok(AggregateOutcome::NoResults) => summary.no_results.push(format),
            Err(err) => {
                error!("Could not aggregate format {}: {}", format, err);
                summary.failed.push((format, err.to_string()));
            }
        }
    }
    Ok(summary)
}
