// src/market_data/provider.rs
use crate::domain::errors::MarketDataResult;
use crate::domain::models::{PriceSeries, Symbol};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source of recent price history
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Fetch up to `lookback` most recent samples, oldest first.
    ///
    /// An empty series is a valid answer for a transient gap; hard failures
    /// are `MarketDataError::Unavailable`.
    async fn fetch(&self, symbol: &Symbol, lookback: usize) -> MarketDataResult<PriceSeries>;
}

/// Which provider implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Synthetic,
    Binance,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "synthetic" | "demo" => Ok(ProviderKind::Synthetic),
            "binance" => Ok(ProviderKind::Binance),
            other => Err(format!("Unsupported data provider: {}", other)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProviderKind::Synthetic => write!(f, "synthetic"),
            ProviderKind::Binance => write!(f, "binance"),
        }
    }
}
