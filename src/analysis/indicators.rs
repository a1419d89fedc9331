// src/analysis/indicators.rs
// Technical indicators over price series. Every function is pure; results
// carry full precision and are rounded by the snapshot builder.

use crate::domain::errors::{AnalysisError, AnalysisResult};

/// MACD line, signal line and histogram at the latest sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    /// Undefined until the MACD line has `signal_period` values
    pub signal: Option<f64>,
    pub histogram: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stochastic {
    pub k: f64,
    pub d: Option<f64>,
}

fn require(indicator: &'static str, available: usize, required: usize) -> AnalysisResult<()> {
    if available < required {
        return Err(AnalysisError::insufficient(indicator, required, available));
    }
    Ok(())
}

fn require_window(indicator: &'static str, window: usize) -> AnalysisResult<()> {
    if window == 0 {
        return Err(AnalysisError::InvalidParameter(format!(
            "{} window must be positive",
            indicator
        )));
    }
    Ok(())
}

/// Simple Moving Average (SMA), one value per full window
pub fn calculate_sma(prices: &[f64], period: usize) -> AnalysisResult<Vec<f64>> {
    require_window("SMA", period)?;
    require("SMA", prices.len(), period)?;

    let mut result = Vec::with_capacity(prices.len() - period + 1);
    let mut sum = prices.iter().take(period).sum::<f64>();

    // First SMA value
    result.push(sum / period as f64);

    // Calculate remaining values with sliding window
    for i in period..prices.len() {
        sum = sum - prices[i - period] + prices[i];
        result.push(sum / period as f64);
    }

    Ok(result)
}

/// Exponential Moving Average (EMA), seeded with the SMA of the first window
pub fn calculate_ema(prices: &[f64], period: usize) -> AnalysisResult<Vec<f64>> {
    require_window("EMA", period)?;
    require("EMA", prices.len(), period)?;

    let multiplier = 2.0 / (period + 1) as f64;
    let mut result = Vec::with_capacity(prices.len() - period + 1);

    // First EMA value is SMA
    let first_sma = prices.iter().take(period).sum::<f64>() / period as f64;
    result.push(first_sma);

    for price in &prices[period..] {
        let previous_ema = result[result.len() - 1];
        result.push((price - previous_ema) * multiplier + previous_ema);
    }

    Ok(result)
}

/// Latest simple moving average, `None` while the series is shorter than the window.
pub fn moving_average(prices: &[f64], window: usize) -> Option<f64> {
    calculate_sma(prices, window)
        .ok()
        .and_then(|values| values.last().copied())
}

/// Relative Strength Index (RSI) with Wilder's smoothing
pub fn calculate_rsi(prices: &[f64], period: usize) -> AnalysisResult<f64> {
    require_window("RSI", period)?;
    require("RSI", prices.len(), period + 1)?;

    let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    // First `period` deltas seed the averages
    let mut avg_gain = deltas[..period].iter().map(|d| d.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = deltas[..period].iter().map(|d| (-d).max(0.0)).sum::<f64>() / period as f64;

    let weight = (period - 1) as f64;
    for delta in &deltas[period..] {
        avg_gain = (avg_gain * weight + delta.max(0.0)) / period as f64;
        avg_loss = (avg_loss * weight + (-delta).max(0.0)) / period as f64;
    }

    if avg_loss == 0.0 {
        return Ok(100.0);
    }

    let rs = avg_gain / avg_loss;
    Ok(100.0 - (100.0 / (1.0 + rs)))
}

/// MACD (Moving Average Convergence Divergence)
pub fn calculate_macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> AnalysisResult<Macd> {
    require_window("MACD", signal_period)?;
    if fast_period == 0 || fast_period >= slow_period {
        return Err(AnalysisError::InvalidParameter(format!(
            "MACD fast period ({}) must be positive and below slow period ({})",
            fast_period, slow_period
        )));
    }
    require("MACD", prices.len(), slow_period)?;

    let fast_ema = calculate_ema(prices, fast_period)?;
    let slow_ema = calculate_ema(prices, slow_period)?;

    // Both series end at the latest price; align on the shorter slow EMA
    let offset = slow_period - fast_period;
    let macd_line: Vec<f64> = fast_ema[offset..]
        .iter()
        .zip(slow_ema.iter())
        .map(|(fast, slow)| fast - slow)
        .collect();

    let macd = macd_line[macd_line.len() - 1];
    let signal = calculate_ema(&macd_line, signal_period)
        .ok()
        .and_then(|line| line.last().copied());

    Ok(Macd {
        macd,
        signal,
        histogram: signal.map(|s| macd - s),
    })
}

/// Bollinger Bands over the latest window, population standard deviation
pub fn calculate_bollinger_bands(
    prices: &[f64],
    period: usize,
    std_dev_multiplier: f64,
) -> AnalysisResult<BollingerBands> {
    require_window("Bollinger Bands", period)?;
    require("Bollinger Bands", prices.len(), period)?;

    let window = &prices[prices.len() - period..];
    let middle = window.iter().sum::<f64>() / period as f64;
    let variance = window.iter().map(|&x| (x - middle).powi(2)).sum::<f64>() / period as f64;
    let std_dev = variance.sqrt();

    Ok(BollingerBands {
        upper: middle + std_dev_multiplier * std_dev,
        middle,
        lower: middle - std_dev_multiplier * std_dev,
    })
}

/// Stochastic oscillator. `Ok(None)` when the latest window is flat.
pub fn calculate_stochastic(
    high_prices: &[f64],
    low_prices: &[f64],
    close_prices: &[f64],
    period: usize,
    smooth: usize,
) -> AnalysisResult<Option<Stochastic>> {
    require_window("Stochastic", period)?;
    require_window("Stochastic", smooth)?;
    let len = high_prices.len().min(low_prices.len()).min(close_prices.len());
    require("Stochastic", len, period)?;

    let percent_k = |end: usize| -> Option<f64> {
        let start = end + 1 - period;
        let highest = high_prices[start..=end]
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        let lowest = low_prices[start..=end]
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        let range = highest - lowest;
        if range == 0.0 {
            return None;
        }
        Some(100.0 * (close_prices[end] - lowest) / range)
    };

    let last = len - 1;
    let k = match percent_k(last) {
        Some(k) => k,
        None => return Ok(None),
    };

    // %D needs `smooth` defined %K values ending at the latest sample
    let available = len - period + 1;
    let d = if available >= smooth {
        (last + 1 - smooth..=last)
            .map(percent_k)
            .collect::<Option<Vec<f64>>>()
            .map(|ks| ks.iter().sum::<f64>() / smooth as f64)
    } else {
        None
    };

    Ok(Some(Stochastic { k, d }))
}

/// Rolling volume-weighted average price of the typical price (h+l+c)/3.
/// `Ok(None)` when the window traded no volume.
pub fn calculate_vwap(
    high_prices: &[f64],
    low_prices: &[f64],
    close_prices: &[f64],
    volumes: &[f64],
    period: usize,
) -> AnalysisResult<Option<f64>> {
    require_window("VWAP", period)?;
    let len = high_prices
        .len()
        .min(low_prices.len())
        .min(close_prices.len())
        .min(volumes.len());
    require("VWAP", len, period)?;

    let mut weighted = 0.0;
    let mut total_volume = 0.0;
    for i in len - period..len {
        let typical = (high_prices[i] + low_prices[i] + close_prices[i]) / 3.0;
        weighted += typical * volumes[i];
        total_volume += volumes[i];
    }

    if total_volume == 0.0 {
        return Ok(None);
    }
    Ok(Some(weighted / total_volume))
}

/// Round to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64).collect()
    }

    fn zigzag(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect()
    }

    #[test]
    fn sma_slides_over_window() {
        let sma = calculate_sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap();
        assert_eq!(sma, vec![2.0, 3.0, 4.0]);
        assert_eq!(moving_average(&[1.0, 2.0], 3), None);
        assert_eq!(moving_average(&[1.0, 2.0, 3.0, 4.0], 2), Some(3.5));
    }

    #[test]
    fn ema_seeds_with_sma() {
        let ema = calculate_ema(&[2.0, 4.0, 6.0, 8.0], 3).unwrap();
        assert_eq!(ema[0], 4.0);
        // multiplier 0.5: (8 - 4) * 0.5 + 4
        assert_eq!(ema[1], 6.0);
    }

    #[test]
    fn rsi_of_monotonic_rise_is_100() {
        let rsi = calculate_rsi(&rising(30), 14).unwrap();
        assert_eq!(rsi, 100.0);
        assert_eq!(calculate_rsi(&rising(15), 14).unwrap(), 100.0);
    }

    #[test]
    fn rsi_of_monotonic_fall_is_0() {
        let falling: Vec<f64> = rising(20).into_iter().rev().collect();
        assert_eq!(calculate_rsi(&falling, 14).unwrap(), 0.0);
    }

    #[test]
    fn rsi_requires_window_plus_one_samples() {
        let err = calculate_rsi(&rising(10), 14).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::InsufficientHistory {
                indicator: "RSI",
                required: 15,
                available: 10
            }
        );
        assert!(calculate_rsi(&rising(14), 14).is_err());
    }

    #[test]
    fn rsi_uses_wilder_smoothing() {
        // window 2: deltas +2, -1, +1
        // seed gain 1.0, loss 0.5; then gain (1*1+1)/2 = 1.0, loss (0.5*1+0)/2 = 0.25
        let rsi = calculate_rsi(&[10.0, 12.0, 11.0, 12.0], 2).unwrap();
        assert!((rsi - 80.0).abs() < 1e-9);
    }

    #[test]
    fn macd_needs_slow_period() {
        assert!(matches!(
            calculate_macd(&rising(25), 12, 26, 9),
            Err(AnalysisError::InsufficientHistory { required: 26, .. })
        ));

        let short = calculate_macd(&rising(26), 12, 26, 9).unwrap();
        assert!(short.signal.is_none());
        assert!(short.histogram.is_none());

        let full = calculate_macd(&zigzag(60), 12, 26, 9).unwrap();
        let signal = full.signal.unwrap();
        assert!((full.histogram.unwrap() - (full.macd - signal)).abs() < 1e-12);
    }

    #[test]
    fn macd_of_linear_trend_is_positive() {
        let macd = calculate_macd(&rising(50), 12, 26, 9).unwrap();
        assert!(macd.macd > 0.0);
    }

    #[test]
    fn bollinger_of_flat_series_collapses() {
        let bands = calculate_bollinger_bands(&[5.0; 20], 20, 2.0).unwrap();
        assert_eq!(bands.upper, 5.0);
        assert_eq!(bands.middle, 5.0);
        assert_eq!(bands.lower, 5.0);

        let bands = calculate_bollinger_bands(&[1.0, 3.0], 2, 2.0).unwrap();
        assert_eq!(bands.middle, 2.0);
        assert_eq!(bands.upper, 4.0);
        assert_eq!(bands.lower, 0.0);
    }

    #[test]
    fn stochastic_flat_window_is_undefined() {
        let flat = [10.0; 20];
        assert_eq!(calculate_stochastic(&flat, &flat, &flat, 14, 3).unwrap(), None);
    }

    #[test]
    fn stochastic_close_at_high_is_100() {
        let close = rising(20);
        let high: Vec<f64> = close.iter().map(|c| c + 0.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        let stoch = calculate_stochastic(&high, &low, &close, 14, 3)
            .unwrap()
            .unwrap();
        assert_eq!(stoch.k, 100.0);
        assert_eq!(stoch.d, Some(100.0));
    }

    #[test]
    fn stochastic_d_undefined_without_enough_k() {
        let close = rising(14);
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        let stoch = calculate_stochastic(&close, &low, &close, 14, 3)
            .unwrap()
            .unwrap();
        assert!(stoch.d.is_none());
    }

    #[test]
    fn vwap_weights_typical_price() {
        let high = [11.0, 21.0];
        let low = [9.0, 19.0];
        let close = [10.0, 20.0];
        let volume = [1.0, 3.0];
        let vwap = calculate_vwap(&high, &low, &close, &volume, 2).unwrap();
        assert_eq!(vwap, Some(17.5));
        assert_eq!(
            calculate_vwap(&high, &low, &close, &[0.0, 0.0], 2).unwrap(),
            None
        );
    }

    #[test]
    fn indicators_are_idempotent() {
        let prices = zigzag(80);
        let high: Vec<f64> = prices.iter().map(|p| p + 1.5).collect();
        let low: Vec<f64> = prices.iter().map(|p| p - 1.5).collect();
        let volume: Vec<f64> = (0..80).map(|i| 100.0 + (i % 7) as f64).collect();

        assert_eq!(
            calculate_rsi(&prices, 14).unwrap().to_bits(),
            calculate_rsi(&prices, 14).unwrap().to_bits()
        );
        assert_eq!(calculate_macd(&prices, 12, 26, 9), calculate_macd(&prices, 12, 26, 9));
        assert_eq!(
            calculate_bollinger_bands(&prices, 20, 2.0),
            calculate_bollinger_bands(&prices, 20, 2.0)
        );
        assert_eq!(
            calculate_stochastic(&high, &low, &prices, 14, 3),
            calculate_stochastic(&high, &low, &prices, 14, 3)
        );
        assert_eq!(
            calculate_vwap(&high, &low, &prices, &volume, 20),
            calculate_vwap(&high, &low, &prices, &volume, 20)
        );
        assert_eq!(calculate_ema(&prices, 20), calculate_ema(&prices, 20));
    }

    #[test]
    fn zero_window_is_rejected() {
        assert!(matches!(
            calculate_sma(&[1.0], 0),
            Err(AnalysisError::InvalidParameter(_))
        ));
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(1.23456, 4), 1.2346);
    }
}
