//! Per-format encoder recipes
//!
//! A recipe book maps a format name to the command templates and quality
//! bounds used to sweep that format's encoder. Recipes are deserialized
//! leniently and validated per video, so a broken recipe only costs the
//! videos that use it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::config::ConfigError;

/// Error type for recipe validation
#[derive(Debug, Clone, PartialEq)]
pub enum RecipeError {
    /// A required field is absent
    MissingField(&'static str),
    /// A quality bound is not a number
    InvalidBound { field: &'static str, value: String },
    /// `quality_step` is zero or negative
    NonPositiveStep(String),
    /// `quality_start` is not below `quality_end`
    EmptyRange { start: String, end: String },
}

impl fmt::Display for RecipeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecipeError::MissingField(field) => write!(f, "missing recipe field '{}'", field),
            RecipeError::InvalidBound { field, value } => {
                write!(f, "recipe field '{}' is not numeric: {:?}", field, value)
            }
            RecipeError::NonPositiveStep(step) => {
                write!(f, "quality_step must be positive, got {}", step)
            }
            RecipeError::EmptyRange { start, end } => write!(
                f,
                "quality_start ({}) must be lower than quality_end ({})",
                start, end
            ),
        }
    }
}

impl std::error::Error for RecipeError {}

/// A quality bound as written in the recipe file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum QualityBound {
    Int(i64),
    Float(f64),
    Text(String),
}

impl QualityBound {
    fn resolve(&self, field: &'static str) -> Result<QualityBound, RecipeError> {
        match self {
            QualityBound::Text(text) => {
                let trimmed = text.trim();
                if let Ok(v) = trimmed.parse::<i64>() {
                    Ok(QualityBound::Int(v))
                } else if let Ok(v) = trimmed.parse::<f64>() {
                    Ok(QualityBound::Float(v))
                } else {
                    Err(RecipeError::InvalidBound {
                        field,
                        value: text.clone(),
                    })
                }
            }
            QualityBound::Float(v) if !v.is_finite() => Err(RecipeError::InvalidBound {
                field,
                value: v.to_string(),
            }),
            other => Ok(other.clone()),
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            QualityBound::Int(v) => *v as f64,
            QualityBound::Float(v) => *v,
            QualityBound::Text(_) => f64::NAN,
        }
    }
}

/// Quality sweep bounds, half-open: `start` is included, `end` is not
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityRange {
    Int { start: i64, end: i64, step: i64 },
    Float { start: f64, end: f64, step: f64 },
}

/// A recipe exactly as found in `recipes.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Recipe {
    pub encode_cmd: Option<String>,
    pub decode_cmd: Option<String>,
    pub second_pass: Option<String>,
    pub encode_extension: Option<String>,
    pub decode_extension: Option<String>,
    pub quality_start: Option<QualityBound>,
    pub quality_end: Option<QualityBound>,
    pub quality_step: Option<QualityBound>,
}

/// A recipe whose required fields are present and whose bounds are consistent
#[derive(Debug, Clone, PartialEq)]
pub struct ValidRecipe {
    pub encode_cmd: String,
    pub decode_cmd: String,
    pub second_pass: Option<String>,
    pub encode_extension: String,
    pub decode_extension: String,
    pub quality: QualityRange,
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, RecipeError> {
    value.clone().ok_or(RecipeError::MissingField(field))
}

fn bound(value: &Option<QualityBound>, field: &'static str) -> Result<QualityBound, RecipeError> {
    value
        .as_ref()
        .ok_or(RecipeError::MissingField(field))?
        .resolve(field)
}

impl Recipe {
    /// Check required fields and quality bounds
    ///
    /// If any of the three bounds is a float, the whole sweep runs in float mode.
    pub fn validate(&self) -> Result<ValidRecipe, RecipeError> {
        let start = bound(&self.quality_start, "quality_start")?;
        let end = bound(&self.quality_end, "quality_end")?;
        let step = bound(&self.quality_step, "quality_step")?;

        let quality = match (&start, &end, &step) {
            (QualityBound::Int(start), QualityBound::Int(end), QualityBound::Int(step)) => {
                if *step <= 0 {
                    return Err(RecipeError::NonPositiveStep(step.to_string()));
                }
                if start >= end {
                    return Err(RecipeError::EmptyRange {
                        start: start.to_string(),
                        end: end.to_string(),
                    });
                }
                QualityRange::Int {
                    start: *start,
                    end: *end,
                    step: *step,
                }
            }
            _ => {
                let (start, end, step) = (start.as_f64(), end.as_f64(), step.as_f64());
                if step <= 0.0 {
                    return Err(RecipeError::NonPositiveStep(step.to_string()));
                }
                if start >= end {
                    return Err(RecipeError::EmptyRange {
                        start: start.to_string(),
                        end: end.to_string(),
                    });
                }
                QualityRange::Float { start, end, step }
            }
        };

        Ok(ValidRecipe {
            encode_cmd: required(&self.encode_cmd, "encode_cmd")?,
            decode_cmd: required(&self.decode_cmd, "decode_cmd")?,
            second_pass: self.second_pass.clone(),
            encode_extension: required(&self.encode_extension, "encode_extension")?,
            decode_extension: required(&self.decode_extension, "decode_extension")?,
            quality,
        })
    }
}

/// All recipes, keyed by format name
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RecipeBook {
    #[serde(default)]
    pub recipes: BTreeMap<String, Recipe>,
}

impl RecipeBook {
    /// Load a recipe book from a JSON file of the form `{"recipes": {...}}`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_json(&content)
    }

    pub fn parse_json(content: &str) -> Result<Self, ConfigError> {
        let book: RecipeBook = serde_json::from_str(content)?;
        Ok(book)
    }

    pub fn get(&self, format: &str) -> Option<&Recipe> {
        self.recipes.get(format)
    }

    /// Supported format names in sorted order
    pub fn formats(&self) -> Vec<&str> {
        self.recipes.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const BOOK: &str = r#"
{
  "recipes": {
    "x264": {
      "encode_extension": "mkv",
      "decode_extension": "y4m",
      "encode_cmd": "x264 --crf $quality -o $target $origy4m",
      "decode_cmd": "ffmpeg -y -i $target $target_dec",
      "quality_start": 20,
      "quality_end": 40,
      "quality_step": 2
    },
    "aom": {
      "encode_extension": "webm",
      "decode_extension": "yuv",
      "encode_cmd": "aomenc --pass=1 $origy4m -o $target",
      "second_pass": "aomenc --pass=2 $origy4m -o $target",
      "decode_cmd": "aomdec $target -o $target_dec",
      "quality_start": 10,
      "quality_end": 60.0,
      "quality_step": "5"
    },
    "broken": {
      "encode_extension": "ivf",
      "encode_cmd": "enc $origy4m $target",
      "decode_cmd": "dec $target $target_dec",
      "quality_start": 1,
      "quality_end": 2,
      "quality_step": 1
    }
  }
}
"#;

    #[test]
    fn test_parse_book_lists_formats_sorted() {
        let book = RecipeBook::parse_json(BOOK).expect("valid JSON");
        assert_eq!(book.formats(), vec!["aom", "broken", "x264"]);
    }

    #[test]
    fn test_integer_recipe_validates_to_int_range() {
        let book = RecipeBook::parse_json(BOOK).unwrap();
        let recipe = book.get("x264").unwrap().validate().unwrap();
        assert_eq!(
            recipe.quality,
            QualityRange::Int {
                start: 20,
                end: 40,
                step: 2
            }
        );
        assert!(recipe.second_pass.is_none());
    }

    #[test]
    fn test_mixed_bounds_force_float_mode() {
        let book = RecipeBook::parse_json(BOOK).unwrap();
        let recipe = book.get("aom").unwrap().validate().unwrap();
        assert_eq!(
            recipe.quality,
            QualityRange::Float {
                start: 10.0,
                end: 60.0,
                step: 5.0
            }
        );
        assert!(recipe.second_pass.is_some());
    }

    #[test]
    fn test_missing_field_is_reported() {
        let book = RecipeBook::parse_json(BOOK).unwrap();
        let err = book.get("broken").unwrap().validate().unwrap_err();
        assert_eq!(err, RecipeError::MissingField("decode_extension"));
    }

    #[test]
    fn test_non_numeric_bound_is_rejected() {
        let recipe = Recipe {
            quality_start: Some(QualityBound::Text("high".to_string())),
            quality_end: Some(QualityBound::Int(10)),
            quality_step: Some(QualityBound::Int(1)),
            ..Recipe::default()
        };
        assert!(matches!(
            recipe.validate(),
            Err(RecipeError::InvalidBound {
                field: "quality_start",
                ..
            })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_inverted_or_empty_range_is_rejected(
            start in -100i64..100,
            delta in 0i64..100,
            step in 1i64..10,
        ) {
            let recipe = Recipe {
                encode_cmd: Some("e".into()),
                decode_cmd: Some("d".into()),
                encode_extension: Some("a".into()),
                decode_extension: Some("b".into()),
                quality_start: Some(QualityBound::Int(start + delta)),
                quality_end: Some(QualityBound::Int(start)),
                quality_step: Some(QualityBound::Int(step)),
                ..Recipe::default()
            };
            let is_empty_range = matches!(recipe.validate(), Err(RecipeError::EmptyRange { .. }));
            prop_assert!(is_empty_range);
        }

        #[test]
        fn prop_non_positive_step_is_rejected(step in -10.0f64..=0.0) {
            let recipe = Recipe {
                encode_cmd: Some("e".into()),
                decode_cmd: Some("d".into()),
                encode_extension: Some("a".into()),
                decode_extension: Some("b".into()),
                quality_start: Some(QualityBound::Int(0)),
                quality_end: Some(QualityBound::Int(10)),
                quality_step: Some(QualityBound::Float(step)),
                ..Recipe::default()
            };
            let is_bad_step = matches!(recipe.validate(), Err(RecipeError::NonPositiveStep(_)));
            prop_assert!(is_bad_step);
        }
    }
}
