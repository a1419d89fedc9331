// src/analysis/engine.rs
use crate::analysis::indicators::{self, round_to};
use crate::domain::errors::{AnalysisError, AnalysisResult};
use crate::domain::models::{IndicatorSnapshot, PriceSeries};
use serde::{Deserialize, Serialize};

/// Keys under which [`IndicatorEngine::snapshot`] records its values
pub mod names {
    pub const CLOSE: &str = "close";
    pub const SMA: &str = "sma";
    pub const EMA: &str = "ema";
    pub const RSI: &str = "rsi";
    pub const VOLUME_MA: &str = "volume_ma";
    pub const MACD: &str = "macd";
    pub const MACD_SIGNAL: &str = "macd_signal";
    pub const MACD_HISTOGRAM: &str = "macd_histogram";
    pub const BB_UPPER: &str = "bb_upper";
    pub const BB_MIDDLE: &str = "bb_middle";
    pub const BB_LOWER: &str = "bb_lower";
    pub const STOCH_K: &str = "stoch_k";
    pub const STOCH_D: &str = "stoch_d";
    pub const VWAP: &str = "vwap";
}

const PRICE_DECIMALS: i32 = 2;
const RATIO_DECIMALS: i32 = 4;

/// Indicator windows used when building a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub sma_period: usize,
    pub ema_period: usize,
    pub rsi_period: usize,
    pub volume_ma_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    pub bollinger_k: f64,
    pub stochastic_period: usize,
    pub stochastic_smooth: usize,
    pub vwap_period: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            sma_period: 20,
            ema_period: 20,
            rsi_period: 14,
            volume_ma_period: 20,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger_period: 20,
            bollinger_k: 2.0,
            stochastic_period: 14,
            stochastic_smooth: 3,
            vwap_period: 20,
        }
    }
}

/// Computes every configured indicator for a price series
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl IndicatorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: IndicatorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    /// Samples needed before every indicator in a snapshot is defined
    pub fn required_history(&self) -> usize {
        let p = &self.params;
        [
            p.sma_period,
            p.ema_period,
            p.rsi_period + 1,
            p.volume_ma_period,
            p.macd_slow + p.macd_signal - 1,
            p.bollinger_period,
            p.stochastic_period + p.stochastic_smooth - 1,
            p.vwap_period,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Build a snapshot at the latest sample. Indicators lacking history are
    /// recorded as undefined; only an empty series is an error.
    pub fn snapshot(&self, series: &PriceSeries) -> AnalysisResult<IndicatorSnapshot> {
        let latest = series
            .latest()
            .ok_or_else(|| AnalysisError::insufficient("snapshot", 1, 0))?;
        let p = &self.params;

        let closes = series.prices();
        let highs = series.high_prices();
        let lows = series.low_prices();
        let volumes = series.volume();

        let ema = indicators::calculate_ema(&closes, p.ema_period)
            .ok()
            .and_then(|line| line.last().copied());
        let rsi = indicators::calculate_rsi(&closes, p.rsi_period).ok();
        let macd = indicators::calculate_macd(&closes, p.macd_fast, p.macd_slow, p.macd_signal).ok();
        let bands = indicators::calculate_bollinger_bands(&closes, p.bollinger_period, p.bollinger_k).ok();
        let stochastic = indicators::calculate_stochastic(
            &highs,
            &lows,
            &closes,
            p.stochastic_period,
            p.stochastic_smooth,
        )
        .ok()
        .flatten();

        // volume-based values need a traded volume on every sample of the window
        let volume_ma = if has_volume(series, p.volume_ma_period) {
            indicators::moving_average(&volumes, p.volume_ma_period)
        } else {
            None
        };
        let vwap = if has_volume(series, p.vwap_period) {
            indicators::calculate_vwap(&highs, &lows, &closes, &volumes, p.vwap_period)
                .ok()
                .flatten()
        } else {
            None
        };

        let values = [
            (names::CLOSE, Some(latest.price), PRICE_DECIMALS),
            (names::SMA, indicators::moving_average(&closes, p.sma_period), PRICE_DECIMALS),
            (names::EMA, ema, PRICE_DECIMALS),
            (names::RSI, rsi, RATIO_DECIMALS),
            (names::VOLUME_MA, volume_ma, PRICE_DECIMALS),
            (names::MACD, macd.map(|m| m.macd), RATIO_DECIMALS),
            (names::MACD_SIGNAL, macd.and_then(|m| m.signal), RATIO_DECIMALS),
            (names::MACD_HISTOGRAM, macd.and_then(|m| m.histogram), RATIO_DECIMALS),
            (names::BB_UPPER, bands.map(|b| b.upper), PRICE_DECIMALS),
            (names::BB_MIDDLE, bands.map(|b| b.middle), PRICE_DECIMALS),
            (names::BB_LOWER, bands.map(|b| b.lower), PRICE_DECIMALS),
            (names::STOCH_K, stochastic.map(|s| s.k), RATIO_DECIMALS),
            (names::STOCH_D, stochastic.and_then(|s| s.d), RATIO_DECIMALS),
            (names::VWAP, vwap, PRICE_DECIMALS),
        ];

        // rounding is for display only; rules read the precise values
        Ok(values.into_iter().fold(
            IndicatorSnapshot::new(series.symbol.clone(), latest.timestamp),
            |snapshot, (name, value, places)| {
                snapshot.with_rounded(name, value, value.map(|v| round_to(v, places)))
            },
        ))
    }
}

fn has_volume(series: &PriceSeries, window: usize) -> bool {
    let samples = series.samples();
    samples.len() >= window
        && samples[samples.len() - window..]
            .iter()
            .all(|s| s.volume.is_some())
}
