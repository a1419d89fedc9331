// src/domain/models.rs
use crate::domain::format::{format_amount, format_decimal};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Instrument identifier, trimmed and upper-cased on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Symbol {
    fn from(raw: &str) -> Self {
        Symbol::new(raw)
    }
}

impl From<String> for Symbol {
    fn from(raw: String) -> Self {
        Symbol::new(&raw)
    }
}

impl From<Symbol> for String {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Market Data Structures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    /// Closing price of the sampled period
    pub price: f64,
    pub high: f64,
    pub low: f64,
    pub volume: Option<f64>,
}

impl PriceSample {
    pub fn new(symbol: Symbol, timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            symbol,
            timestamp,
            price,
            high: price,
            low: price,
            volume: None,
        }
    }

    pub fn with_range(mut self, high: f64, low: f64) -> Self {
        self.high = high;
        self.low = low;
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }
}

/// Price history for one symbol, kept non-decreasing in timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub symbol: Symbol,
    samples: Vec<PriceSample>,
}

impl PriceSeries {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            samples: Vec::new(),
        }
    }

    pub fn from_samples(symbol: Symbol, mut samples: Vec<PriceSample>) -> Self {
        // stable: equal timestamps keep arrival order
        samples.sort_by_key(|s| s.timestamp);
        Self { symbol, samples }
    }

    pub fn push(&mut self, sample: PriceSample) {
        let at = self
            .samples
            .partition_point(|s| s.timestamp <= sample.timestamp);
        self.samples.insert(at, sample);
    }

    pub fn samples(&self) -> &[PriceSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&PriceSample> {
        self.samples.last()
    }

    /// Last `n` samples as a new series.
    pub fn tail(&self, n: usize) -> Self {
        let start = self.samples.len().saturating_sub(n);
        Self {
            symbol: self.symbol.clone(),
            samples: self.samples[start..].to_vec(),
        }
    }

    pub fn prices(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.price).collect()
    }

    pub fn high_prices(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.high).collect()
    }

    pub fn low_prices(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.low).collect()
    }

    pub fn volume(&self) -> Vec<f64> {
        self.samples
            .iter()
            .map(|s| s.volume.unwrap_or_default())
            .collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.samples.iter().map(|s| s.timestamp).collect()
    }
}

/// Derived indicator values for one series. `None` marks an undefined value.
///
/// `get` returns the rounded display value; rules compare against `precise`,
/// the unrounded value it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    values: BTreeMap<String, Option<f64>>,
    #[serde(skip)]
    precise: BTreeMap<String, f64>,
}

impl IndicatorSnapshot {
    pub fn new(symbol: Symbol, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol,
            timestamp,
            values: BTreeMap::new(),
            precise: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, name: &str, value: Option<f64>) -> Self {
        self.values.insert(name.to_string(), value);
        self.precise.remove(name);
        self
    }

    /// Record a value together with its rounded display form
    pub fn with_rounded(mut self, name: &str, value: Option<f64>, rounded: Option<f64>) -> Self {
        self.values.insert(name.to_string(), rounded);
        match value {
            Some(v) => self.precise.insert(name.to_string(), v),
            None => self.precise.remove(name),
        };
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().flatten()
    }

    /// Full-precision value, falling back to `get` when none was recorded
    pub fn precise(&self, name: &str) -> Option<f64> {
        if self.get(name).is_none() {
            return None;
        }
        self.precise.get(name).copied().or_else(|| self.get(name))
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, Option<f64>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    #[default]
    None,
    Buy,
    Sell,
    Breakout,
}

impl Signal {
    pub fn is_active(&self) -> bool {
        !matches!(self, Signal::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::None => "NONE",
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Breakout => "BREAKOUT",
        }
    }

    fn marker(&self) -> &'static str {
        match self {
            Signal::None => "ℹ️",
            Signal::Buy => "🔔",
            Signal::Sell => "🔻",
            Signal::Breakout => "🚨",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-symbol debounce record for the alert loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalState {
    pub last_evaluated: Option<DateTime<Utc>>,
    pub active_signal: Signal,
    pub signal_since: Option<DateTime<Utc>>,
}

impl SignalState {
    /// Record one evaluation. Returns the signal to alert on when `signal`
    /// opens a new qualifying run (from NONE, or flipped from another signal).
    pub fn observe(&mut self, signal: Signal, at: DateTime<Utc>) -> Option<Signal> {
        // clamp so a backwards clock never moves signal_since backwards
        let at = self.last_evaluated.map_or(at, |prev| prev.max(at));
        self.last_evaluated = Some(at);

        if !signal.is_active() {
            self.active_signal = Signal::None;
            self.signal_since = None;
            return None;
        }

        if signal == self.active_signal {
            return None;
        }

        self.active_signal = signal;
        self.signal_since = Some(at);
        Some(signal)
    }
}

/// Suggested entry / stop-loss / target for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeLevels {
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub target: Decimal,
}

impl TradeLevels {
    /// Levels around `price` using percentage distances. `None` for inactive
    /// signals or prices that do not fit a decimal.
    pub fn for_signal(
        signal: Signal,
        price: f64,
        stop_loss_percent: Decimal,
        take_profit_percent: Decimal,
    ) -> Option<Self> {
        let entry = Decimal::from_f64(price)?.round_dp(2);
        let hundred = Decimal::ONE_HUNDRED;
        let stop_distance = entry * stop_loss_percent / hundred;
        let target_distance = entry * take_profit_percent / hundred;

        let (stop_loss, target) = match signal {
            Signal::None => return None,
            Signal::Buy | Signal::Breakout => (entry - stop_distance, entry + target_distance),
            Signal::Sell => (entry + stop_distance, entry - target_distance),
        };

        Some(Self {
            entry,
            stop_loss: stop_loss.round_dp(2),
            target: target.round_dp(2),
        })
    }
}

/// Notification produced by the alert loop, consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub symbol: Symbol,
    pub signal: Signal,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub text: String,
    pub levels: Option<TradeLevels>,
}

impl AlertEvent {
    pub fn new(
        symbol: Symbol,
        signal: Signal,
        timestamp: DateTime<Utc>,
        price: f64,
        rule: &str,
        levels: Option<TradeLevels>,
    ) -> Self {
        let mut text = format!(
            "{} {} {} Alert!\nRule: {}\nPrice: {}\nTime: {}",
            signal.marker(),
            symbol,
            signal,
            rule,
            format_amount(price),
            timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        );

        if let Some(levels) = &levels {
            text.push_str(&format!(
                "\nEntry: {}\nSL: {}\nTarget: {}",
                format_decimal(levels.entry),
                format_decimal(levels.stop_loss),
                format_decimal(levels.target),
            ));
        }

        Self {
            symbol,
            signal,
            timestamp,
            price,
            text,
            levels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn run(signals: &[Signal]) -> Vec<(usize, Signal)> {
        let mut state = SignalState::default();
        signals
            .iter()
            .enumerate()
            .filter_map(|(i, s)| state.observe(*s, at(i as i64)).map(|fired| (i + 1, fired)))
            .collect()
    }

    #[test]
    fn alerts_only_on_rising_edge() {
        use Signal::*;
        let fired = run(&[None, Buy, Buy, Buy, None, Buy]);
        assert_eq!(fired, vec![(2, Buy), (6, Buy)]);
    }

    #[test]
    fn holding_signal_alerts_once() {
        let signals = vec![Signal::Buy; 50];
        assert_eq!(run(&signals).len(), 1);
    }

    #[test]
    fn direct_flip_is_a_new_edge() {
        let fired = run(&[Signal::Buy, Signal::Sell]);
        assert_eq!(fired, vec![(1, Signal::Buy), (2, Signal::Sell)]);
    }

    #[test]
    fn signal_since_tracks_current_run() {
        let mut state = SignalState::default();
        state.observe(Signal::Buy, at(0));
        state.observe(Signal::Buy, at(1));
        assert_eq!(state.signal_since, Some(at(0)));

        state.observe(Signal::Sell, at(2));
        assert_eq!(state.active_signal, Signal::Sell);
        assert_eq!(state.signal_since, Some(at(2)));

        state.observe(Signal::None, at(3));
        assert_eq!(state.active_signal, Signal::None);
        assert_eq!(state.signal_since, None);
        assert_eq!(state.last_evaluated, Some(at(3)));
    }

    #[test]
    fn signal_since_never_moves_backwards() {
        let mut state = SignalState::default();
        state.observe(Signal::None, at(10));
        state.observe(Signal::Breakout, at(5));
        assert_eq!(state.signal_since, Some(at(10)));
    }

    #[test]
    fn series_keeps_timestamp_order() {
        let sym = Symbol::new("btc-usd");
        let mut series = PriceSeries::from_samples(
            sym.clone(),
            vec![
                PriceSample::new(sym.clone(), at(2), 3.0),
                PriceSample::new(sym.clone(), at(0), 1.0),
            ],
        );
        series.push(PriceSample::new(sym.clone(), at(1), 2.0));
        assert_eq!(series.prices(), vec![1.0, 2.0, 3.0]);
        assert_eq!(series.tail(2).prices(), vec![2.0, 3.0]);
        assert_eq!(series.symbol.as_str(), "BTC-USD");
    }

    #[test]
    fn levels_mirror_for_sell() {
        let buy = TradeLevels::for_signal(Signal::Buy, 100.0, dec!(2), dec!(5)).unwrap();
        assert_eq!(buy.stop_loss, dec!(98.00));
        assert_eq!(buy.target, dec!(105.00));

        let sell = TradeLevels::for_signal(Signal::Sell, 100.0, dec!(2), dec!(5)).unwrap();
        assert_eq!(sell.stop_loss, dec!(102.00));
        assert_eq!(sell.target, dec!(95.00));

        assert!(TradeLevels::for_signal(Signal::None, 100.0, dec!(2), dec!(5)).is_none());
    }

    #[test]
    fn alert_text_carries_levels() {
        let levels = TradeLevels::for_signal(Signal::Breakout, 64250.0, dec!(2), dec!(5));
        let event = AlertEvent::new(
            Symbol::new("BTC-USD"),
            Signal::Breakout,
            at(0),
            64250.0,
            "Price breakout above 64,000.00",
            levels,
        );
        assert!(event.text.contains("BTC-USD BREAKOUT Alert!"));
        assert!(event.text.contains("Price: 64,250.00"));
        assert!(event.text.contains("SL: 62,965.00"));
        assert!(event.text.contains("Target: 67,462.50"));
    }
}
