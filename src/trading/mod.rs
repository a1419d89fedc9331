// src/trading/mod.rs
pub mod evaluator;

pub use evaluator::{EmaRsiVolumeRule, PriceBreakoutRule, RuleConfig, SignalEvaluator};
