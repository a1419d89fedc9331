// src/domain/mod.rs
pub mod errors;
pub mod format;
pub mod models;

// Re-export common types for convenience
pub use errors::{
    AnalysisError, AnalysisResult, AppError, AppResult, DeliveryError, DeliveryResult,
    MarketDataError, MarketDataResult,
};
pub use models::{
    AlertEvent, IndicatorSnapshot, PriceSample, PriceSeries, Signal, SignalState, Symbol,
    TradeLevels,
};
