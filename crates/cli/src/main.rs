//! CLI entry point for the rate/distortion benchmark
//!
//! `collect` sweeps one format over every video of a subset; `average`
//! aggregates a subset's results directory into per-resolution curves.

use clap::{Parser, Subcommand};
use rd_bench::{
    check_tool_available, find_formats, find_input_videos, has_any_results, run_aggregation,
    run_collection, BenchConfig, CollectionRequest, FatalPolicy, RecipeBook, SystemRunner,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Rate/distortion benchmark for video codecs
#[derive(Parser, Debug)]
#[command(name = "rd-bench")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (config.toml)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sweep one format over every .y4m video of a subset
    Collect {
        /// Format name, as listed in the recipes file
        format: String,
        /// Subset name used in result and encoded paths
        subset_name: String,
        /// Directory holding the subset's .y4m videos
        subset_path: PathBuf,
        /// Path to the recipes file
        #[arg(short, long, default_value = "recipes.json")]
        recipes: PathBuf,
        /// Number of videos swept at once
        #[arg(short, long)]
        workers: Option<u32>,
    },
    /// Aggregate the raw tables of a subset results directory
    Average {
        /// Results directory of one subset (`<results_dir>/<subset_name>`)
        results_subset_dir: PathBuf,
        /// Number of formats aggregated at once
        #[arg(short, long)]
        workers: Option<u32>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args.config);

    match args.command {
        Command::Collect {
            format,
            subset_name,
            subset_path,
            recipes,
            workers,
        } => collect(config, &format, &subset_name, &subset_path, &recipes, workers),
        Command::Average {
            results_subset_dir,
            workers,
        } => average(config, &results_subset_dir, workers),
    }
}

fn load_config(path: &Path) -> BenchConfig {
    if !path.exists() {
        info!("No config file at {}, using defaults", path.display());
        let mut config = BenchConfig::default();
        config.apply_env_overrides();
        return config;
    }
    match BenchConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("Could not load {}: {}. Using defaults", path.display(), e);
            let mut config = BenchConfig::default();
            config.apply_env_overrides();
            config
        }
    }
}

fn collect(
    mut config: BenchConfig,
    format: &str,
    subset_name: &str,
    subset_path: &Path,
    recipes: &Path,
    workers: Option<u32>,
) -> ExitCode {
    if let Some(workers) = workers {
        config.pool.collect_workers = workers;
    }

    let book = match RecipeBook::load(recipes) {
        Ok(book) => book,
        Err(e) => {
            error!("Failed to load recipes from {}: {}", recipes.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let Some(recipe) = book.get(format) else {
        eprintln!("Unknown format {}", format);
        eprintln!("Supported formats: {}", book.formats().join(", "));
        return ExitCode::FAILURE;
    };

    let runner = SystemRunner;
    for program in [&config.tools.ffmpeg, &config.tools.ffprobe] {
        if let Err(e) = check_tool_available(&runner, program) {
            error!("Required tool unavailable: {}", e);
            return ExitCode::FAILURE;
        }
    }

    if !subset_path.is_dir() {
        error!("Subset directory {} does not exist", subset_path.display());
        return ExitCode::FAILURE;
    }
    let videos = find_input_videos(subset_path);
    if videos.is_empty() {
        warn!("No .y4m videos found in {}", subset_path.display());
    }

    let request = CollectionRequest {
        format,
        subset_name,
        recipe,
        videos: &videos,
    };
    match run_collection(&config, &runner, &request, FatalPolicy::ExitProcess) {
        Ok(summary) => {
            info!(
                "Format {}: {} swept, {} already complete, {} failed",
                format,
                summary.completed.len(),
                summary.skipped.len(),
                summary.failed.len()
            );
            if summary.failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("Collection failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn average(mut config: BenchConfig, subset_dir: &Path, workers: Option<u32>) -> ExitCode {
    if let Some(workers) = workers {
        config.pool.aggregate_workers = workers;
    }

    if !subset_dir.is_dir() {
        error!("Results directory {} does not exist", subset_dir.display());
        return ExitCode::FAILURE;
    }
    if !has_any_results(subset_dir) {
        error!("No results found in {}", subset_dir.display());
        return ExitCode::FAILURE;
    }

    let formats = find_formats(subset_dir);
    match run_aggregation(&config, subset_dir, &formats) {
        Ok(summary) => {
            for (format, paths) in &summary.written {
                info!("Format {}: wrote {} aggregate tables", format, paths.len());
            }
            for format in &summary.no_results {
                warn!("Format {}: no raw tables", format);
            }
            if summary.failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            error!("Aggregation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
