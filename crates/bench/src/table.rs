//! Raw and aggregate result tables
//!
//! Both are `:`-separated text with a header line. Raw tables hold one row per
//! sweep step of one (video, format); aggregate tables hold one row per
//! quality index of one (format, resolution).

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::scorer::QualityScores;

pub const SEPARATOR: char = ':';

pub const RAW_COLUMNS: [&str; 18] = [
    "file_name",
    "quality",
    "orig_file_size",
    "compressed_file_size",
    "height",
    "frames",
    "pixels",
    "bpp",
    "compression_ratio",
    "encode_time",
    "encode_fpm",
    "decode_time",
    "decode_fpm",
    "y_ssim_score",
    "rgb_ssim_score",
    "msssim_score",
    "psnrhvsm_score",
    "vmaf_score",
];

pub const AGGREGATE_COLUMNS: [&str; 11] = [
    "quality",
    "avg_bpp",
    "avg_compression_ratio",
    "avg_space_saving",
    "wavg_encode_fpm",
    "wavg_decode_fpm",
    "wavg_y_ssim_score",
    "wavg_rgb_ssim_score",
    "wavg_msssim_score",
    "wavg_psnrhvsm_score",
    "wavg_vmaf_score",
];

/// Error type for reading result tables
#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}: missing column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("{path}:{line}: expected {expected} fields, found {found}")]
    FieldCount {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("{path}:{line}: invalid value {value:?} in column '{column}'")]
    InvalidValue {
        path: PathBuf,
        line: usize,
        column: &'static str,
        value: String,
    },
}

/// One sweep step of one video
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub file_name: String,
    pub quality: f64,
    pub orig_file_size: u64,
    pub compressed_file_size: u64,
    pub height: u64,
    pub frames: u64,
    pub pixels: u64,
    pub bpp: f64,
    pub compression_ratio: f64,
    pub encode_time: f64,
    pub encode_fpm: f64,
    pub decode_time: f64,
    pub decode_fpm: f64,
    pub scores: QualityScores,
}

impl RawRow {
    /// Render as a table line, floats with six decimals
    pub fn to_line(&self) -> String {
        format!(
            "{}:{:.6}:{}:{}:{}:{}:{}:{:.6}:{:.6}:{:.6}:{:.6}:{:.6}:{:.6}:{:.6}:{:.6}:{:.6}:{:.6}:{:.6}",
            self.file_name,
            self.quality,
            self.orig_file_size,
            self.compressed_file_size,
            self.height,
            self.frames,
            self.pixels,
            self.bpp,
            self.compression_ratio,
            self.encode_time,
            self.encode_fpm,
            self.decode_time,
            self.decode_fpm,
            self.scores.y_ssim,
            self.scores.rgb_ssim,
            self.scores.msssim,
            self.scores.psnrhvsm,
            self.scores.vmaf,
        )
    }
}

/// All rows of one raw table, in sweep order
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub path: PathBuf,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    /// Video name, taken from the first row or else from the file name
    pub fn video(&self) -> String {
        match self.rows.first() {
            Some(row) => row.file_name.clone(),
            None => self
                .path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    pub fn height(&self) -> Option<u64> {
        self.rows.first().map(|row| row.height)
    }
}

fn header_line(columns: &[&str]) -> String {
    columns.join(&SEPARATOR.to_string())
}

/// Incremental raw table writer, flushed after every row
pub struct RawTableWriter {
    file: File,
}

impl RawTableWriter {
    /// Create (or truncate) the table and write its header
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        writeln!(file, "{}", header_line(&RAW_COLUMNS))?;
        file.flush()?;
        Ok(Self { file })
    }

    pub fn append(&mut self, row: &RawRow) -> io::Result<()> {
        writeln!(self.file, "{}", row.to_line())?;
        self.file.flush()
    }
}

struct Columns<'a> {
    path: &'a Path,
    index: HashMap<&'a str, usize>,
    width: usize,
}

impl<'a> Columns<'a> {
    fn new(path: &'a Path, header: &'a str) -> Result<Self, TableError> {
        let names: Vec<&str> = header.split(SEPARATOR).map(str::trim).collect();
        let index: HashMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        for column in RAW_COLUMNS {
            if !index.contains_key(column) {
                return Err(TableError::MissingColumn {
                    path: path.to_path_buf(),
                    column,
                });
            }
        }
        Ok(Self {
            path,
            index,
            width: names.len(),
        })
    }

    fn field<'f>(&self, fields: &[&'f str], column: &'static str) -> &'f str {
        // presence checked in new(), width checked per line
        fields[self.index[column]].trim()
    }

    fn float(&self, fields: &[&str], line: usize, column: &'static str) -> Result<f64, TableError> {
        let value = self.field(fields, column);
        value.parse::<f64>().map_err(|_| TableError::InvalidValue {
            path: self.path.to_path_buf(),
            line,
            column,
            value: value.to_string(),
        })
    }

    fn count(&self, fields: &[&str], line: usize, column: &'static str) -> Result<u64, TableError> {
        let value = self.field(fields, column);
        if let Ok(v) = value.parse::<u64>() {
            return Ok(v);
        }
        match value.parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Ok(v as u64),
            _ => Err(TableError::InvalidValue {
                path: self.path.to_path_buf(),
                line,
                column,
                value: value.to_string(),
            }),
        }
    }

    fn row(&self, text: &str, line: usize) -> Result<RawRow, TableError> {
        let fields: Vec<&str> = text.split(SEPARATOR).collect();
        if fields.len() != self.width {
            return Err(TableError::FieldCount {
                path: self.path.to_path_buf(),
                line,
                expected: self.width,
                found: fields.len(),
            });
        }
        Ok(RawRow {
            file_name: self.field(&fields, "file_name").to_string(),
            quality: self.float(&fields, line, "quality")?,
            orig_file_size: self.count(&fields, line, "orig_file_size")?,
            compressed_file_size: self.count(&fields, line, "compressed_file_size")?,
            height: self.count(&fields, line, "height")?,
            frames: self.count(&fields, line, "frames")?,
            pixels: self.count(&fields, line, "pixels")?,
            bpp: self.float(&fields, line, "bpp")?,
            compression_ratio: self.float(&fields, line, "compression_ratio")?,
            encode_time: self.float(&fields, line, "encode_time")?,
            encode_fpm: self.float(&fields, line, "encode_fpm")?,
            decode_time: self.float(&fields, line, "decode_time")?,
            decode_fpm: self.float(&fields, line, "decode_fpm")?,
            scores: QualityScores {
                y_ssim: self.float(&fields, line, "y_ssim_score")?,
                rgb_ssim: self.float(&fields, line, "rgb_ssim_score")?,
                msssim: self.float(&fields, line, "msssim_score")?,
                psnrhvsm: self.float(&fields, line, "psnrhvsm_score")?,
                vmaf: self.float(&fields, line, "vmaf_score")?,
            },
        })
    }
}

/// Parse raw table text; columns are located by header name
pub fn parse_raw_table(path: &Path, content: &str) -> Result<RawTable, TableError> {
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Err(TableError::MissingColumn {
            path: path.to_path_buf(),
            column: RAW_COLUMNS[0],
        });
    };
    let columns = Columns::new(path, header)?;

    let rows = lines
        .map(|(i, text)| columns.row(text, i + 1))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawTable {
        path: path.to_path_buf(),
        rows,
    })
}

pub fn read_raw_table(path: &Path) -> Result<RawTable, TableError> {
    let content = fs::read_to_string(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_raw_table(path, &content)
}

/// One quality index of one (format, resolution)
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub quality: f64,
    pub avg_bpp: f64,
    pub avg_compression_ratio: f64,
    pub avg_space_saving: f64,
    pub wavg_encode_fpm: f64,
    pub wavg_decode_fpm: f64,
    pub wavg_scores: QualityScores,
}

impl AggregateRow {
    /// Render as a table line, floats in shortest round-trip form
    pub fn to_line(&self) -> String {
        format!(
            "{:?}:{:?}:{:?}:{:?}:{:?}:{:?}:{:?}:{:?}:{:?}:{:?}:{:?}",
            self.quality,
            self.avg_bpp,
            self.avg_compression_ratio,
            self.avg_space_saving,
            self.wavg_encode_fpm,
            self.wavg_decode_fpm,
            self.wavg_scores.y_ssim,
            self.wavg_scores.rgb_ssim,
            self.wavg_scores.msssim,
            self.wavg_scores.psnrhvsm,
            self.wavg_scores.vmaf,
        )
    }
}

/// Write a complete aggregate table, replacing any previous one
pub fn write_aggregate_table(path: &Path, rows: &[AggregateRow]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", header_line(&AGGREGATE_COLUMNS))?;
    for row in rows {
        writeln!(out, "{}", row.to_line())?;
    }
    out.flush()
}
