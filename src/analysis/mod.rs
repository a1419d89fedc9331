// src/analysis/mod.rs
pub mod engine;
pub mod indicators;

pub use engine::{names, IndicatorEngine, IndicatorParams};
