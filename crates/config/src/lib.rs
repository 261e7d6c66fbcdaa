//! Configuration module for the rate/distortion benchmark
//!
//! Handles loading benchmark settings from TOML files with environment variable
//! overrides, and the per-format encoder recipes from `recipes.json`.

pub mod config;
pub mod recipe;

pub use config::*;
pub use recipe::*;
