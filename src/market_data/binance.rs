// src/market_data/binance.rs
// Live klines from the Binance public REST API

use crate::domain::errors::{MarketDataError, MarketDataResult};
use crate::domain::models::{PriceSample, PriceSeries, Symbol};
use crate::market_data::provider::DataProvider;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hyper::client::HttpConnector;
use hyper::{Body, Client, StatusCode, Uri};
use hyper_tls::HttpsConnector;
use rust_decimal::prelude::*;
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
// Binance limit is 1000
const MAX_LIMIT: usize = 1000;

pub struct BinanceProvider {
    http_client: Client<HttpsConnector<HttpConnector>, Body>,
    base_url: String,
    interval: String,
}

impl BinanceProvider {
    /// Create a provider fetching klines of the given interval ("1m", "15m", ...)
    pub fn new(interval: &str) -> MarketDataResult<Self> {
        let interval = match interval {
            "1m" | "3m" | "5m" | "15m" | "30m" | "1h" | "2h" | "4h" | "6h" | "8h" | "12h"
            | "1d" | "3d" | "1w" | "1M" => interval.to_string(),
            _ => {
                return Err(MarketDataError::InvalidFormat(format!(
                    "Invalid interval: {}",
                    interval
                )))
            }
        };

        Ok(Self {
            http_client: Client::builder().build::<_, Body>(HttpsConnector::new()),
            base_url: DEFAULT_BASE_URL.to_string(),
            interval,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Map chat-facing symbols ("BTC-USD", "btc/usdt") to venue symbols ("BTCUSDT")
    pub fn venue_symbol(symbol: &Symbol) -> String {
        let compact: String = symbol
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        if compact.ends_with("USD") {
            format!("{}T", compact)
        } else {
            compact
        }
    }

    /// Parse a klines response body into a series
    pub fn parse_klines(symbol: &Symbol, body: &[u8]) -> MarketDataResult<PriceSeries> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| MarketDataError::InvalidFormat(format!("Failed to parse klines: {}", e)))?;

        let rows = value.as_array().ok_or_else(|| {
            MarketDataError::InvalidFormat("Invalid klines format, expected array".to_string())
        })?;

        let samples = rows
            .iter()
            .map(|row| Self::convert_kline(symbol, row))
            .collect::<MarketDataResult<Vec<_>>>()?;

        Ok(PriceSeries::from_samples(symbol.clone(), samples))
    }

    fn convert_kline(symbol: &Symbol, kline: &Value) -> MarketDataResult<PriceSample> {
        let arr = match kline {
            Value::Array(arr) if arr.len() >= 7 => arr,
            _ => return Err(MarketDataError::InvalidFormat("Invalid kline format".to_string())),
        };

        let parse_price = |index: usize, field: &str| -> MarketDataResult<f64> {
            arr[index]
                .as_str()
                .and_then(|s| Decimal::from_str(s).ok())
                .and_then(|d| d.to_f64())
                .ok_or_else(|| MarketDataError::InvalidFormat(format!("Invalid {} in kline", field)))
        };

        let close_time = arr[6]
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| MarketDataError::InvalidFormat("Invalid close time in kline".to_string()))?;

        Ok(PriceSample::new(symbol.clone(), close_time, parse_price(4, "close price")?)
            .with_range(parse_price(2, "high price")?, parse_price(3, "low price")?)
            .with_volume(parse_price(5, "volume")?))
    }
}

#[async_trait]
impl DataProvider for BinanceProvider {
    fn name(&self) -> &str {
        "binance"
    }

    async fn fetch(&self, symbol: &Symbol, lookback: usize) -> MarketDataResult<PriceSeries> {
        let limit = lookback.clamp(1, MAX_LIMIT);
        let uri: Uri = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            Self::venue_symbol(symbol),
            self.interval,
            limit
        )
        .parse()
        .map_err(|e| MarketDataError::Request(format!("Invalid klines url: {}", e)))?;

        let response = self
            .http_client
            .get(uri)
            .await
            .map_err(|e| MarketDataError::Unavailable(format!("{}: {}", symbol, e)))?;

        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| MarketDataError::Unavailable(format!("{}: {}", symbol, e)))?;

        match status {
            StatusCode::OK => Self::parse_klines(symbol, &body),
            // unknown venue symbol, e.g. an index the exchange does not list
            StatusCode::BAD_REQUEST => Err(MarketDataError::Unavailable(format!(
                "{} not listed: {}",
                symbol,
                String::from_utf8_lossy(&body)
            ))),
            other => Err(MarketDataError::Request(format!(
                "Klines request for {} failed with {}",
                symbol, other
            ))),
        }
    }
}
