//! Cross-video aggregation
//!
//! Merges every raw table of one format into one aggregate table per
//! resolution group. Rows are joined by sweep index, so all tables of a format
//! must have the same number of steps and the same quality value at each
//! index; a format that violates this is rejected before anything is written.
//!
//! Per index and group:
//! - quality is the plain mean of the members' quality values
//! - bpp and compression ratio are ratios of sums, so larger videos weigh more
//! - speeds and scores are means weighted by each video's total pixel count

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::discover::find_raw_tables;
use crate::marker::is_sweep_complete;
use crate::metrics::{mean, space_saving, weighted_mean};
use crate::paths::aggregate_table_path;
use crate::scorer::{QualityScores, ScorerId};
use crate::table::{read_raw_table, write_aggregate_table, AggregateRow, RawRow, RawTable, TableError};

/// Per-index quality values may differ by this much and still count as aligned
pub const QUALITY_TOLERANCE: f64 = 1e-6;

/// Error type for aggregating one format
#[derive(Debug, Error)]
pub enum AggregateError {
    /// A table's sweep length differs from the others
    #[error("format {format}: {video} has {found} quality steps, expected {expected}")]
    LengthMismatch {
        format: String,
        video: String,
        expected: usize,
        found: usize,
    },

    /// A table's quality value at some index differs from the others
    #[error("format {format}: {video} has quality {found} at index {index}, expected {expected}")]
    QualityMismatch {
        format: String,
        video: String,
        index: usize,
        expected: f64,
        found: f64,
    },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AggregateError {
    pub fn is_misaligned(&self) -> bool {
        matches!(
            self,
            AggregateError::LengthMismatch { .. } | AggregateError::QualityMismatch { .. }
        )
    }
}

/// Partition key of aggregate tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resolution {
    /// Videos of exactly this height
    Height(u64),
    /// Every video
    Any,
}

impl Resolution {
    pub fn includes(&self, table: &RawTable) -> bool {
        match self {
            Resolution::Any => true,
            Resolution::Height(h) => table.height() == Some(*h),
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Height(h) => write!(f, "{}", h),
            Resolution::Any => f.write_str("any"),
        }
    }
}

/// Distinct heights in ascending order, followed by `Any`
pub fn resolution_groups(tables: &[RawTable]) -> Vec<Resolution> {
    let heights: BTreeSet<u64> = tables.iter().filter_map(RawTable::height).collect();
    heights
        .into_iter()
        .map(Resolution::Height)
        .chain(std::iter::once(Resolution::Any))
        .collect()
}

/// Verify every table has the same sweep; returns the common length
pub fn check_alignment(format: &str, tables: &[RawTable]) -> Result<usize, AggregateError> {
    let Some(reference) = tables.first() else {
        return Ok(0);
    };
    let expected = reference.rows.len();

    for table in &tables[1..] {
        if table.rows.len() != expected {
            return Err(AggregateError::LengthMismatch {
                format: format.to_string(),
                video: table.video(),
                expected,
                found: table.rows.len(),
            });
        }
        for (index, (want, got)) in reference.rows.iter().zip(&table.rows).enumerate() {
            if (want.quality - got.quality).abs() > QUALITY_TOLERANCE {
                return Err(AggregateError::QualityMismatch {
                    format: format.to_string(),
                    video: table.video(),
                    index,
                    expected: want.quality,
                    found: got.quality,
                });
            }
        }
    }

    Ok(expected)
}

/// Aggregate the rows sharing one sweep index
pub fn aggregate_rows(rows: &[&RawRow]) -> AggregateRow {
    let total_orig: f64 = rows.iter().map(|r| r.orig_file_size as f64).sum();
    let total_compressed: f64 = rows.iter().map(|r| r.compressed_file_size as f64).sum();
    let total_pixels: f64 = rows.iter().map(|r| r.pixels as f64).sum();
    let avg_compression_ratio = total_orig / total_compressed;

    let by_pixels = |value: fn(&RawRow) -> f64| {
        weighted_mean(rows.iter().map(|r| (value(r), r.pixels as f64)))
    };

    let mut wavg_scores = QualityScores::default();
    for id in ScorerId::ALL {
        wavg_scores.set(
            id,
            weighted_mean(rows.iter().map(|r| (r.scores.get(id), r.pixels as f64))),
        );
    }

    AggregateRow {
        quality: mean(rows.iter().map(|r| r.quality)),
        avg_bpp: total_compressed * 8.0 / total_pixels,
        avg_compression_ratio,
        avg_space_saving: space_saving(avg_compression_ratio),
        wavg_encode_fpm: by_pixels(|r| r.encode_fpm),
        wavg_decode_fpm: by_pixels(|r| r.decode_fpm),
        wavg_scores,
    }
}

/// Aggregate all tables of a format, one row list per resolution group
///
/// Members of a group are visited in video-name order so output does not
/// depend on discovery order.
pub fn aggregate_tables(
    format: &str,
    tables: &[RawTable],
) -> Result<Vec<(Resolution, Vec<AggregateRow>)>, AggregateError> {
    let length = check_alignment(format, tables)?;

    let mut ordered: Vec<&RawTable> = tables.iter().collect();
    ordered.sort_by_key(|t| t.video());

    let groups = resolution_groups(tables)
        .into_iter()
        .map(|resolution| {
            let members: Vec<&RawTable> = ordered
                .iter()
                .copied()
                .filter(|t| resolution.includes(t))
                .collect();
            let rows = (0..length)
                .map(|index| {
                    let at_index: Vec<&RawRow> = members.iter().map(|t| &t.rows[index]).collect();
                    aggregate_rows(&at_index)
                })
                .collect();
            (resolution, rows)
        })
        .collect();

    Ok(groups)
}

/// Result of aggregating one format
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutcome {
    /// Aggregate tables written, one per resolution group
    Written(Vec<PathBuf>),
    /// No raw tables exist for the format; nothing was written
    NoResults,
}

/// Read every finished raw table of `format` under `subset_dir` and write its aggregate tables
///
/// Tables left behind by an unfinished sweep (no completion marker, and not
/// accepted by `legacy_min_bytes`) are left out rather than rejecting the
/// whole format.
pub fn aggregate_format(
    subset_dir: &Path,
    format: &str,
    legacy_min_bytes: Option<u64>,
) -> Result<AggregateOutcome, AggregateError> {
    let (paths, unfinished): (Vec<_>, Vec<_>) = find_raw_tables(subset_dir, format)
        .into_iter()
        .partition(|p| is_sweep_complete(p, legacy_min_bytes));

    for path in &unfinished {
        warn!(
            "Ignoring {}: no completion marker, the sweep did not finish",
            path.display()
        );
    }

    if paths.is_empty() {
        info!(
            "Lossy results files could not be found for format {}.",
            format
        );
        return Ok(AggregateOutcome::NoResults);
    }

    let tables = paths
        .iter()
        .map(|p| read_raw_table(p))
        .collect::<Result<Vec<_>, _>>()?;

    let mut written = Vec::new();
    for (resolution, rows) in aggregate_tables(format, &tables)? {
        let path = aggregate_table_path(subset_dir, format, &resolution.to_string());
        write_aggregate_table(&path, &rows).map_err(|source| AggregateError::Io {
            path: path.clone(),
            source,
        })?;
        info!(
            "Lossy results file for format {} successfully saved to {}.",
            format,
            path.display()
        );
        written.push(path);
    }

    Ok(AggregateOutcome::Written(written))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::marker::write_completion_marker;
    use crate::table::RawTableWriter;
    use std::fs;
    use tempfile::TempDir;

    /// Raw row with the given identity and sizes; every score equals `score`
    pub(crate) fn row(
        name: &str,
        quality: f64,
        height: u64,
        pixels: u64,
        sizes: (u64, u64),
        score: f64,
    ) -> RawRow {
        RawRow {
            file_name: name.to_string(),
            quality,
            orig_file_size: sizes.0,
            compressed_file_size: sizes.1,
            height,
            frames: 1,
            pixels,
            bpp: sizes.1 as f64 * 8.0 / pixels as f64,
            compression_ratio: sizes.0 as f64 / sizes.1 as f64,
            encode_time: 1.0,
            encode_fpm: score,
            decode_time: 1.0,
            decode_fpm: score,
            scores: QualityScores {
                y_ssim: score,
                rgb_ssim: score,
                msssim: score,
                psnrhvsm: score,
                vmaf: score,
            },
        }
    }

    fn table(name: &str, rows: Vec<RawRow>) -> RawTable {
        RawTable {
            path: PathBuf::from(format!("{}.x264.out", name)),
            rows,
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_pixel_weighted_scores() {
        let tables = vec![
            table("a", vec![row("a", 20.0, 720, 100, (1000, 100), 10.0)]),
            table("b", vec![row("b", 20.0, 720, 300, (1000, 100), 20.0)]),
        ];
        let groups = aggregate_tables("x264", &tables).unwrap();
        let (_, rows) = groups.iter().find(|(r, _)| *r == Resolution::Any).unwrap();
        let agg = &rows[0];

        assert!(close(agg.wavg_scores.vmaf, 17.5));
        assert!(close(agg.wavg_scores.y_ssim, 17.5));
        assert!(close(agg.wavg_encode_fpm, 17.5));
        assert!(!close(agg.wavg_scores.vmaf, 15.0));
        assert!(close(agg.quality, 20.0));
    }

    #[test]
    fn test_resolution_groups() {
        let tables = vec![
            table("a", vec![row("a", 20.0, 1080, 100, (10, 1), 1.0)]),
            table("b", vec![row("b", 20.0, 1080, 100, (10, 1), 1.0)]),
            table("c", vec![row("c", 20.0, 720, 100, (10, 1), 1.0)]),
        ];
        let groups = resolution_groups(&tables);
        let names: Vec<String> = groups.iter().map(Resolution::to_string).collect();
        assert_eq!(names, vec!["720", "1080", "any"]);

        let aggregated = aggregate_tables("x264", &tables).unwrap();
        let any = &aggregated.iter().find(|(r, _)| *r == Resolution::Any).unwrap().1[0];
        let hd = &aggregated
            .iter()
            .find(|(r, _)| *r == Resolution::Height(1080))
            .unwrap()
            .1[0];
        // totals reveal group membership: 3 videos in any, 2 in 1080
        assert!(close(any.avg_bpp, 3.0 * 8.0 / 300.0));
        assert!(close(hd.avg_bpp, 2.0 * 8.0 / 200.0));
    }

    #[test]
    fn test_compression_ratio_is_ratio_of_sums() {
        let tables = vec![
            table("a", vec![row("a", 20.0, 720, 100, (1000, 100), 1.0)]),
            table("b", vec![row("b", 20.0, 720, 100, (9000, 3000), 1.0)]),
        ];
        let aggregated = aggregate_tables("x264", &tables).unwrap();
        let agg = &aggregated[0].1[0];

        let ratio_of_sums = 10_000.0 / 3_100.0;
        let mean_of_ratios = (10.0 + 3.0) / 2.0;
        assert!(close(agg.avg_compression_ratio, ratio_of_sums));
        assert!(!close(agg.avg_compression_ratio, mean_of_ratios));
        assert!(close(agg.avg_space_saving, 1.0 - 3_100.0 / 10_000.0));
        assert!(close(agg.avg_bpp, 3_100.0 * 8.0 / 200.0));
    }

    #[test]
    fn test_rows_follow_index_order_not_quality_order() {
        let rows = |name: &str| {
            vec![
                row(name, 50.0, 720, 100, (10, 1), 1.0),
                row(name, 40.0, 720, 100, (10, 2), 1.0),
                row(name, 30.0, 720, 100, (10, 3), 1.0),
            ]
        };
        let tables = vec![table("a", rows("a")), table("b", rows("b"))];
        let aggregated = aggregate_tables("x264", &tables).unwrap();
        let qualities: Vec<f64> = aggregated[0].1.iter().map(|r| r.quality).collect();
        assert_eq!(qualities, vec![50.0, 40.0, 30.0]);
    }

    #[test]
    fn test_different_sweep_lengths_are_rejected() {
        let tables = vec![
            table(
                "a",
                vec![
                    row("a", 20.0, 720, 100, (10, 1), 1.0),
                    row("a", 22.0, 720, 100, (10, 1), 1.0),
                ],
            ),
            table("b", vec![row("b", 20.0, 720, 100, (10, 1), 1.0)]),
        ];
        let err = aggregate_tables("x264", &tables).unwrap_err();
        assert!(err.is_misaligned());
        assert!(matches!(
            err,
            AggregateError::LengthMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_different_quality_at_same_index_is_rejected() {
        let tables = vec![
            table("a", vec![row("a", 20.0, 720, 100, (10, 1), 1.0)]),
            table("b", vec![row("b", 21.0, 720, 100, (10, 1), 1.0)]),
        ];
        let err = aggregate_tables("x264", &tables).unwrap_err();
        assert!(matches!(err, AggregateError::QualityMismatch { index: 0, .. }));
    }

    fn write_table(dir: &Path, format: &str, rows: &[RawRow]) {
        let path = dir
            .join(format)
            .join("lossy")
            .join(format!("{}.{}.out", rows[0].file_name, format));
        let mut writer = RawTableWriter::create(&path).unwrap();
        for r in rows {
            writer.append(r).unwrap();
        }
        write_completion_marker(&path).unwrap();
    }

    #[test]
    fn test_aggregate_format_writes_one_file_per_group() {
        let temp_dir = TempDir::new().unwrap();
        let subset = temp_dir.path().join("subset1");
        write_table(&subset, "x264", &[row("a", 20.0, 1080, 100, (10, 1), 1.0)]);
        write_table(&subset, "x264", &[row("b", 20.0, 720, 100, (10, 1), 1.0)]);

        let outcome = aggregate_format(&subset, "x264", None).unwrap();
        assert_eq!(
            outcome,
            AggregateOutcome::Written(vec![
                subset.join("subset1.x264.720.lossy.out"),
                subset.join("subset1.x264.1080.lossy.out"),
                subset.join("subset1.x264.any.lossy.out"),
            ])
        );

        let any = fs::read_to_string(subset.join("subset1.x264.any.lossy.out")).unwrap();
        assert_eq!(any.lines().count(), 2);
    }

    #[test]
    fn test_aggregate_format_without_tables_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let subset = temp_dir.path().join("subset1");
        fs::create_dir_all(subset.join("x264/lossy")).unwrap();

        assert_eq!(
            aggregate_format(&subset, "x264", None).unwrap(),
            AggregateOutcome::NoResults
        );
        assert_eq!(fs::read_dir(&subset).unwrap().count(), 1);
    }

    #[test]
    fn test_misaligned_format_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let subset = temp_dir.path().join("subset1");
        write_table(
            &subset,
            "x264",
            &[
                row("a", 20.0, 720, 100, (10, 1), 1.0),
                row("a", 22.0, 720, 100, (10, 1), 1.0),
            ],
        );
        write_table(&subset, "x264", &[row("b", 20.0, 720, 100, (10, 1), 1.0)]);

        let err = aggregate_format(&subset, "x264", None).unwrap_err();
        assert!(err.is_misaligned());
        assert!(!subset.join("subset1.x264.any.lossy.out").exists());
        assert!(!subset.join("subset1.x264.720.lossy.out").exists());
    }

    #[test]
    fn test_unfinished_table_is_left_out() {
        let temp_dir = TempDir::new().unwrap();
        let subset = temp_dir.path().join("subset1");
        write_table(
            &subset,
            "x264",
            &[
                row("a", 20.0, 720, 100, (10, 1), 1.0),
                row("a", 22.0, 720, 100, (10, 1), 1.0),
            ],
        );
        // header only, no marker: a sweep that stopped after creating its table
        let unfinished = subset.join("x264/lossy/b.x264.out");
        drop(RawTableWriter::create(&unfinished).unwrap());

        let outcome = aggregate_format(&subset, "x264", None).unwrap();
        assert!(matches!(outcome, AggregateOutcome::Written(ref paths) if paths.len() == 2));

        let any = fs::read_to_string(subset.join("subset1.x264.any.lossy.out")).unwrap();
        assert_eq!(any.lines().count(), 3);
    }

    #[test]
    fn test_legacy_threshold_admits_unmarked_table() {
        let temp_dir = TempDir::new().unwrap();
        let subset = temp_dir.path().join("subset1");
        let path = subset.join("x264/lossy/a.x264.out");
        let mut writer = RawTableWriter::create(&path).unwrap();
        writer.append(&row("a", 20.0, 720, 100, (10, 1), 1.0)).unwrap();
        drop(writer);

        assert_eq!(
            aggregate_format(&subset, "x264", None).unwrap(),
            AggregateOutcome::NoResults
        );
        let outcome = aggregate_format(&subset, "x264", Some(1)).unwrap();
        assert!(matches!(outcome, AggregateOutcome::Written(_)));
    }
}
