//! Worker pool sizing
//!
//! Derives how many sweeps and how many format aggregations may run at once.

use crate::config::BenchConfig;

/// Worker counts for both phases
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerPlan {
    /// Concurrent sweeps during collection
    pub collect_workers: usize,
    /// Concurrent formats during aggregation
    pub aggregate_workers: usize,
}

impl WorkerPlan {
    /// Derive a worker plan from configuration
    ///
    /// Uses the following rules:
    /// - collection uses `pool.collect_workers`, at least 1
    /// - aggregation uses `pool.aggregate_workers` if non-zero, otherwise one
    ///   worker per format
    /// - aggregation never uses more workers than there are formats
    pub fn derive(cfg: &BenchConfig, format_count: usize) -> Self {
        let collect_workers = (cfg.pool.collect_workers as usize).max(1);

        let aggregate_workers = if cfg.pool.aggregate_workers > 0 {
            cfg.pool.aggregate_workers as usize
        } else {
            format_count
        };

        Self {
            collect_workers,
            aggregate_workers: aggregate_workers.min(format_count).max(1),
        }
    }
}
