// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Market data error: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Server error: {0}")]
    Server(#[from] hyper::Error),
}

#[derive(Error, Debug, Clone)]
pub enum MarketDataError {
    #[error("No data available for: {0}")]
    Unavailable(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("Fetch timed out after {secs}s for {symbol}")]
    Timeout { symbol: String, secs: u64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient history for {indicator}: need {required} samples, got {available}")]
    InsufficientHistory {
        indicator: &'static str,
        required: usize,
        available: usize,
    },

    #[error("Undefined indicator input: {0}")]
    Undefined(String),

    #[error("Invalid indicator parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Error, Debug, Clone)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {description}")]
    Api {
        status: u16,
        description: String,
        /// Seconds the API asked us to wait before retrying (rate limits)
        retry_after: Option<u64>,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Alert queue closed")]
    QueueClosed,
}

impl DeliveryError {
    /// Server-requested wait before the next attempt, if any
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            DeliveryError::Api {
                retry_after: Some(secs),
                ..
            } => Some(std::time::Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl AnalysisError {
    pub(crate) fn insufficient(indicator: &'static str, required: usize, available: usize) -> Self {
        AnalysisError::InsufficientHistory {
            indicator,
            required,
            available,
        }
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type MarketDataResult<T> = Result<T, MarketDataError>;
pub type AnalysisResult<T> = Result<T, AnalysisError>;
pub type DeliveryResult<T> = Result<T, DeliveryError>;
