//! Quality sweep generation

use std::fmt;

use crate::config::QualityRange;

/// One encoder quality setting
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum QualityValue {
    Int(i64),
    Float(f64),
}

impl QualityValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            QualityValue::Int(v) => *v as f64,
            QualityValue::Float(v) => *v,
        }
    }
}

impl fmt::Display for QualityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityValue::Int(v) => write!(f, "{}", v),
            QualityValue::Float(v) => write!(f, "{:?}", v),
        }
    }
}

/// Every quality value in `[start, end)` spaced by `step`
///
/// Float sweeps compute `start + i * step` for
/// `i in 0..ceil((end - start) / step)` instead of accumulating, so rounding
/// error does not grow along the sweep.
pub fn quality_values(range: &QualityRange) -> Vec<QualityValue> {
    match *range {
        QualityRange::Int { start, end, step } => {
            if step <= 0 || start >= end {
                return Vec::new();
            }
            (start..end)
                .step_by(step as usize)
                .map(QualityValue::Int)
                .collect()
        }
        QualityRange::Float { start, end, step } => {
            if step <= 0.0 || start >= end {
                return Vec::new();
            }
            let count = ((end - start) / step).ceil() as usize;
            (0..count)
                .map(|i| QualityValue::Float(start + i as f64 * step))
                .collect()
        }
    }
}
