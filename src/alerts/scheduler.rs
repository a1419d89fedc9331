// src/alerts/scheduler.rs
use crate::alerts::dispatcher::DispatcherHandle;
use crate::analysis::IndicatorEngine;
use crate::domain::errors::MarketDataError;
use crate::domain::models::{AlertEvent, Signal, SignalState, Symbol, TradeLevels};
use crate::market_data::DataProvider;
use crate::trading::SignalEvaluator;
use chrono::Utc;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

/// Settings shared by every scheduling unit
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Samples requested from the provider per tick
    pub lookback: usize,
    /// Upper bound on one fetch; a slower fetch skips the tick
    pub fetch_timeout: Duration,
    /// How long `unwatch` waits for the current tick before aborting the unit
    pub shutdown_grace: Duration,
    pub stop_loss_percent: Decimal,
    pub take_profit_percent: Decimal,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            lookback: 100,
            fetch_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            stop_loss_percent: Decimal::new(2, 0),
            take_profit_percent: Decimal::new(5, 0),
        }
    }
}

/// One watched symbol: what to evaluate and how often
#[derive(Clone)]
pub struct WatchSpec {
    pub symbol: Symbol,
    pub interval: Duration,
    pub evaluator: Arc<dyn SignalEvaluator>,
}

impl WatchSpec {
    pub fn new(symbol: Symbol, interval: Duration, evaluator: Arc<dyn SignalEvaluator>) -> Self {
        Self {
            symbol,
            interval,
            evaluator,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    DataUnavailable,
    EmptySeries,
    IndicatorsUndefined,
}

/// Result of a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing evaluated, state untouched
    Skipped(SkipReason),
    /// Evaluated without a new edge
    Evaluated(Signal),
    /// New edge, one alert queued
    Alerted(Signal),
}

/// Scheduling unit for one symbol. Owns that symbol's `SignalState`.
pub struct SymbolWatcher {
    spec: WatchSpec,
    provider: Arc<dyn DataProvider>,
    engine: Arc<IndicatorEngine>,
    dispatcher: DispatcherHandle,
    settings: SchedulerSettings,
    state: Option<SignalState>,
}

impl SymbolWatcher {
    pub fn new(
        spec: WatchSpec,
        provider: Arc<dyn DataProvider>,
        engine: Arc<IndicatorEngine>,
        dispatcher: DispatcherHandle,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            spec,
            provider,
            engine,
            dispatcher,
            settings,
            state: None,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.spec.symbol
    }

    /// `None` until the first successful evaluation
    pub fn state(&self) -> Option<&SignalState> {
        self.state.as_ref()
    }

    /// Fetch, evaluate and, on a new edge, queue one alert
    pub async fn tick(&mut self) -> TickOutcome {
        let symbol = &self.spec.symbol;

        let fetch = self.provider.fetch(symbol, self.settings.lookback);
        let series = match tokio::time::timeout(self.settings.fetch_timeout, fetch).await {
            Ok(Ok(series)) => series,
            Ok(Err(e)) => {
                log::warn!("Skipping tick for {}: {}", symbol, e);
                return TickOutcome::Skipped(SkipReason::DataUnavailable);
            }
            Err(_) => {
                let e = MarketDataError::Timeout {
                    symbol: symbol.to_string(),
                    secs: self.settings.fetch_timeout.as_secs(),
                };
                log::warn!("Skipping tick for {}: {}", symbol, e);
                return TickOutcome::Skipped(SkipReason::DataUnavailable);
            }
        };

        let latest = match series.latest() {
            Some(latest) => latest,
            None => {
                log::warn!("No samples from {} for {}, skipping tick", self.provider.name(), symbol);
                return TickOutcome::Skipped(SkipReason::EmptySeries);
            }
        };

        let evaluated = self
            .engine
            .snapshot(&series)
            .and_then(|snapshot| self.spec.evaluator.evaluate(latest, &snapshot));
        let signal = match evaluated {
            Ok(signal) => signal,
            Err(e) => {
                log::warn!("Skipping tick for {}: {}", symbol, e);
                return TickOutcome::Skipped(SkipReason::IndicatorsUndefined);
            }
        };

        let now = Utc::now();
        let state = self.state.get_or_insert_with(SignalState::default);
        let fired = match state.observe(signal, now) {
            Some(fired) => fired,
            None => {
                log::debug!("{}: {} (active {})", symbol, signal, state.active_signal);
                return TickOutcome::Evaluated(signal);
            }
        };

        let levels = TradeLevels::for_signal(
            fired,
            latest.price,
            self.settings.stop_loss_percent,
            self.settings.take_profit_percent,
        );
        let event = AlertEvent::new(
            symbol.clone(),
            fired,
            now,
            latest.price,
            &self.spec.evaluator.description(),
            levels,
        );

        log::info!("{} {} signal at {}, queueing alert", symbol, fired, latest.price);
        if let Err(e) = self.dispatcher.submit(event) {
            log::error!("Failed to queue alert for {}: {}", symbol, e);
        }
        TickOutcome::Alerted(fired)
    }

    /// Tick on the configured interval until `shutdown` flips to true.
    /// A tick in progress always completes before the loop checks again.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        log::info!(
            "Watching {} every {}s ({})",
            self.spec.symbol,
            self.spec.interval.as_secs(),
            self.spec.evaluator.name()
        );

        let mut timer = tokio::time::interval(self.spec.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = timer.tick() => {}
            }

            self.tick().await;
        }

        log::info!("Stopped watching {}", self.spec.symbol);
    }
}

struct WatchHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Runs one independent scheduling unit per watched symbol
pub struct AlertScheduler {
    provider: Arc<dyn DataProvider>,
    engine: Arc<IndicatorEngine>,
    dispatcher: DispatcherHandle,
    settings: SchedulerSettings,
    units: HashMap<Symbol, WatchHandle>,
}

impl AlertScheduler {
    pub fn new(
        provider: Arc<dyn DataProvider>,
        engine: Arc<IndicatorEngine>,
        dispatcher: DispatcherHandle,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            provider,
            engine,
            dispatcher,
            settings,
            units: HashMap::new(),
        }
    }

    /// Start a unit for `spec.symbol`. Returns false if it is already watched.
    pub fn watch(&mut self, spec: WatchSpec) -> bool {
        if self.units.contains_key(&spec.symbol) {
            log::warn!("{} is already watched", spec.symbol);
            return false;
        }

        let symbol = spec.symbol.clone();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let watcher = SymbolWatcher::new(
            spec,
            self.provider.clone(),
            self.engine.clone(),
            self.dispatcher.clone(),
            self.settings.clone(),
        );
        let task = tokio::spawn(watcher.run(shutdown_rx));

        self.units.insert(symbol, WatchHandle { shutdown, task });
        true
    }

    /// Stop the unit for `symbol`, dropping its signal state
    pub async fn unwatch(&mut self, symbol: &Symbol) -> bool {
        match self.units.remove(symbol) {
            Some(handle) => {
                stop_unit(symbol.clone(), handle, self.settings.shutdown_grace).await;
                true
            }
            None => false,
        }
    }

    pub fn is_watching(&self, symbol: &Symbol) -> bool {
        self.units.contains_key(symbol)
    }

    pub fn watched(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.units.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Stop every unit concurrently
    pub async fn shutdown(mut self) {
        let grace = self.settings.shutdown_grace;
        let stops = self
            .units
            .drain()
            .map(|(symbol, handle)| stop_unit(symbol, handle, grace));
        join_all(stops).await;
        log::info!("Alert scheduler stopped");
    }
}

async fn stop_unit(symbol: Symbol, handle: WatchHandle, grace: Duration) {
    let WatchHandle { shutdown, mut task } = handle;
    // receiver already gone means the task has ended
    let _ = shutdown.send(true);

    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("Watcher for {} ended abnormally: {}", symbol, e),
        Err(_) => {
            log::warn!(
                "Watcher for {} still busy after {:?}, aborting",
                symbol,
                grace
            );
            task.abort();
        }
    }
}
