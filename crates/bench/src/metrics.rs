//! Derived comparison metrics
//!
//! Pure functions from measured sizes, pixel counts and timings to the values
//! stored in result tables. Everything is computed in `f64`.

use std::time::Duration;

/// Compressed size in bits divided by total pixel count
pub fn bits_per_pixel(compressed_bytes: u64, pixels: u64) -> f64 {
    compressed_bytes as f64 * 8.0 / pixels as f64
}

/// Original size over compressed size
pub fn compression_ratio(original_bytes: u64, compressed_bytes: u64) -> f64 {
    original_bytes as f64 / compressed_bytes as f64
}

/// Fraction of the original size saved, from a compression ratio
pub fn space_saving(compression_ratio: f64) -> f64 {
    1.0 - 1.0 / compression_ratio
}

/// Throughput of a single timed invocation
pub fn frames_per_minute(frames: u64, elapsed: Duration) -> f64 {
    frames as f64 / elapsed.as_secs_f64() * 60.0
}

/// Weighted arithmetic mean of `(value, weight)` pairs
///
/// Returns NaN when the weights sum to zero.
pub fn weighted_mean<I>(pairs: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let (sum, weights) = pairs
        .into_iter()
        .fold((0.0, 0.0), |(sum, weights), (value, weight)| {
            (sum + value * weight, weights + weight)
        });
    sum / weights
}

/// Plain arithmetic mean, NaN for an empty input
pub fn mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    sum / count as f64
}

/// Measured quantities of one sweep step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSizes {
    pub original_bytes: u64,
    pub compressed_bytes: u64,
    pub pixels: u64,
    pub frames: u64,
    pub encode_time: Duration,
    pub decode_time: Duration,
}

/// Metrics derived from [`StepSizes`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedMetrics {
    pub bpp: f64,
    pub compression_ratio: f64,
    pub encode_fpm: f64,
    pub decode_fpm: f64,
}

impl DerivedMetrics {
    pub fn from_sizes(sizes: &StepSizes) -> Self {
        Self {
            bpp: bits_per_pixel(sizes.compressed_bytes, sizes.pixels),
            compression_ratio: compression_ratio(sizes.original_bytes, sizes.compressed_bytes),
            encode_fpm: frames_per_minute(sizes.frames, sizes.encode_time),
            decode_fpm: frames_per_minute(sizes.frames, sizes.decode_time),
        }
    }
}
