//! Rate/distortion benchmark
//!
//! Sweeps video codecs over a quality range, scores every decoded output with
//! external quality tools, and aggregates the per-video tables into per-format
//! curves grouped by resolution.

pub mod aggregate;
pub mod concurrency;
pub mod discover;
pub mod marker;
pub mod metrics;
pub mod paths;
pub mod pool;
pub mod probe;
pub mod quality;
pub mod scorer;
pub mod sweep;
pub mod table;
pub mod template;
pub mod tool;

pub use rd_bench_config as config;
pub use rd_bench_config::{BenchConfig, Recipe, RecipeBook};
pub use aggregate::{aggregate_format, AggregateError, AggregateOutcome, Resolution};
pub use concurrency::WorkerPlan;
pub use discover::{find_formats, find_input_videos, find_raw_tables, has_any_results};
pub use pool::{
    run_aggregation, run_collection, AggregationSummary, CollectionRequest, CollectionSummary,
    FatalPolicy, PoolError,
};
pub use probe::{convert_video, probe_video, VideoInfo};
pub use scorer::{QualityScores, ScorerId, ScorerSet};
pub use sweep::{SweepDriver, SweepError, SweepJob, SweepOutcome};
pub use table::{AggregateRow, RawRow, RawTable};
pub use tool::{check_tool_available, CommandRunner, SystemRunner, ToolCommand, ToolError};
