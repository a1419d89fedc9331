// src/market_data/synthetic.rs
// Random-walk price generator standing in for a live feed

use crate::domain::errors::{MarketDataError, MarketDataResult};
use crate::domain::models::{PriceSample, PriceSeries, Symbol};
use crate::market_data::provider::DataProvider;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

const MAX_SAMPLES: usize = 1000;
const INITIAL_HISTORY: usize = 200;
const STEP_VOLATILITY: f64 = 0.004;
const RANGE_VOLATILITY: f64 = 0.002;
const BASE_VOLUME: f64 = 1000.0;

struct RandomWalk {
    samples: VecDeque<PriceSample>,
}

/// Per-symbol random walk on a fixed time grid of `step`.
pub struct SyntheticProvider {
    step: Duration,
    walks: Mutex<HashMap<Symbol, RandomWalk>>,
    rng: Mutex<StdRng>,
}

impl SyntheticProvider {
    /// Create a provider whose samples are `step` apart
    pub fn new(step: Duration) -> Self {
        Self::with_rng(step, StdRng::from_entropy())
    }

    /// Deterministic price paths for a given seed
    pub fn with_seed(step: Duration, seed: u64) -> Self {
        Self::with_rng(step, StdRng::seed_from_u64(seed))
    }

    fn with_rng(step: Duration, rng: StdRng) -> Self {
        Self {
            step,
            walks: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
        }
    }

    /// Spacing of samples for a kline interval like "15m", "1h" or "1M"
    pub fn step_for_interval(interval: &str) -> Duration {
        let digits: String = interval.chars().take_while(|c| c.is_ascii_digit()).collect();
        let unit = &interval[digits.len()..];
        let count = digits.parse::<i64>().unwrap_or(1).max(1);
        match unit {
            "s" => Duration::seconds(count),
            "h" => Duration::hours(count),
            "d" => Duration::days(count),
            "w" => Duration::weeks(count),
            // calendar month approximated as 30 days
            "M" => Duration::days(30 * count),
            _ => Duration::minutes(count),
        }
    }

    /// Starting level for well-known instruments
    pub fn base_price(symbol: &Symbol) -> f64 {
        let s = symbol.as_str();
        if s.starts_with("BTC") {
            62_000.0
        } else if s.starts_with("ETH") {
            3_000.0
        } else if s.starts_with("BANKNIFTY") {
            46_000.0
        } else if s.starts_with("FINNIFTY") {
            20_000.0
        } else if s.starts_with("NIFTY") {
            21_000.0
        } else {
            100.0
        }
    }

    fn next_sample(rng: &mut StdRng, symbol: &Symbol, previous: f64, at: DateTime<Utc>) -> PriceSample {
        // sum of two uniforms: cheap bell-shaped step
        let shock = (rng.gen_range(-1.0..1.0) + rng.gen_range(-1.0..1.0)) / 2.0;
        let price = (previous * (1.0 + shock * STEP_VOLATILITY)).max(0.01);
        let high = price * (1.0 + rng.gen_range(0.0..RANGE_VOLATILITY));
        let low = price * (1.0 - rng.gen_range(0.0..RANGE_VOLATILITY));

        let mut volume = BASE_VOLUME * rng.gen_range(0.5..1.5);
        if rng.gen_bool(0.1) {
            volume *= 2.5;
        }

        PriceSample::new(symbol.clone(), at, price)
            .with_range(high, low)
            .with_volume(volume)
    }
}

#[async_trait]
impl DataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn fetch(&self, symbol: &Symbol, lookback: usize) -> MarketDataResult<PriceSeries> {
        self.series_at(symbol, lookback, Utc::now())
    }
}

impl SyntheticProvider {
    /// Walk state as of `now`. Samples sit on a fixed `step` grid, so any
    /// number of fetches within one step see the same series.
    fn series_at(
        &self,
        symbol: &Symbol,
        lookback: usize,
        now: DateTime<Utc>,
    ) -> MarketDataResult<PriceSeries> {
        let poisoned = || MarketDataError::Unavailable(format!("synthetic state poisoned for {}", symbol));
        let mut walks = self.walks.lock().map_err(|_| poisoned())?;
        let mut rng = self.rng.lock().map_err(|_| poisoned())?;

        let walk = walks.entry(symbol.clone()).or_insert_with(|| RandomWalk {
            samples: VecDeque::with_capacity(MAX_SAMPLES),
        });

        match walk.samples.back().map(|s| (s.price, s.timestamp)) {
            None => {
                // backfill a history ending now
                let history = lookback.max(INITIAL_HISTORY).min(MAX_SAMPLES);
                let mut price = Self::base_price(symbol);
                for i in (0..history).rev() {
                    let at = now - self.step * i as i32;
                    let sample = Self::next_sample(&mut rng, symbol, price, at);
                    price = sample.price;
                    walk.samples.push_back(sample);
                }
            }
            Some((mut price, last_at)) => {
                let step_ms = self.step.num_milliseconds().max(1);
                let due = ((now - last_at).num_milliseconds() / step_ms).max(0) as usize;
                // after a long pause only the newest window matters
                let skipped = due.saturating_sub(MAX_SAMPLES);
                for k in (skipped + 1)..=due {
                    let at = last_at + self.step * k as i32;
                    let sample = Self::next_sample(&mut rng, symbol, price, at);
                    price = sample.price;
                    walk.samples.push_back(sample);
                }
                while walk.samples.len() > MAX_SAMPLES {
                    walk.samples.pop_front();
                }
            }
        }

        let start = walk.samples.len().saturating_sub(lookback);
        let samples = walk.samples.iter().skip(start).cloned().collect();
        Ok(PriceSeries::from_samples(symbol.clone(), samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn backfills_requested_history() {
        let provider = SyntheticProvider::with_seed(Duration::minutes(15), 7);
        let symbol = Symbol::new("BTC-USD");
        let series = provider.fetch(&symbol, 100).await.unwrap();

        assert_eq!(series.len(), 100);
        assert!(series.samples().iter().all(|s| s.volume.is_some()));
        assert!(series
            .timestamps()
            .windows(2)
            .all(|pair| pair[0] <= pair[1]));
        assert!(series.samples().iter().all(|s| s.low <= s.price && s.price <= s.high));
    }

    #[tokio::test]
    async fn fetches_within_one_step_see_the_same_series() {
        let provider = SyntheticProvider::with_seed(Duration::minutes(15), 11);
        let symbol = Symbol::new("BTC-USD");
        let first = provider.fetch(&symbol, 50).await.unwrap();
        let second = provider.fetch(&symbol, 50).await.unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn walk_advances_on_the_step_grid() {
        let step = Duration::minutes(15);
        let provider = SyntheticProvider::with_seed(step, 5);
        let symbol = Symbol::new("NIFTY");
        let t0 = Utc::now();

        let first = provider.series_at(&symbol, 50, t0).unwrap();
        let last_at = first.latest().unwrap().timestamp;

        // not yet a full step later: unchanged
        let early = provider.series_at(&symbol, 50, t0 + Duration::minutes(14)).unwrap();
        assert_eq!(early, first);

        // two and a half steps later: exactly two new samples
        let later = provider.series_at(&symbol, 50, t0 + Duration::minutes(38)).unwrap();
        assert_eq!(later.len(), 50);
        assert_eq!(first.prices()[2..], later.prices()[..48]);
        let stamps = later.timestamps();
        assert_eq!(stamps[48], last_at + step);
        assert_eq!(stamps[49], last_at + step * 2);
        assert!(stamps.windows(2).all(|pair| pair[1] - pair[0] == step));
    }

    #[tokio::test]
    async fn seeded_paths_repeat() {
        let symbol = Symbol::new("BANKNIFTY");
        let a = SyntheticProvider::with_seed(Duration::minutes(1), 42)
            .fetch(&symbol, 30)
            .await
            .unwrap();
        let b = SyntheticProvider::with_seed(Duration::minutes(1), 42)
            .fetch(&symbol, 30)
            .await
            .unwrap();
        assert_eq!(a.prices(), b.prices());
    }

    #[test]
    fn steps_follow_kline_intervals() {
        assert_eq!(SyntheticProvider::step_for_interval("15m"), Duration::minutes(15));
        assert_eq!(SyntheticProvider::step_for_interval("4h"), Duration::hours(4));
        assert_eq!(SyntheticProvider::step_for_interval("1w"), Duration::weeks(1));
        assert_eq!(SyntheticProvider::step_for_interval("1M"), Duration::days(30));
        assert_eq!(SyntheticProvider::step_for_interval("m"), Duration::minutes(1));
    }

    #[test]
    fn base_prices_by_family() {
        assert_eq!(SyntheticProvider::base_price(&Symbol::new("btc-usd")), 62_000.0);
        assert_eq!(SyntheticProvider::base_price(&Symbol::new("BANKNIFTY")), 46_000.0);
        assert_eq!(SyntheticProvider::base_price(&Symbol::new("NIFTY")), 21_000.0);
        assert_eq!(SyntheticProvider::base_price(&Symbol::new("XYZ")), 100.0);
    }
}
