// Shared doubles for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use saathi_bot::alerts::MessageSender;
use saathi_bot::analysis::IndicatorEngine;
use saathi_bot::bot::{ChatTransport, CommandRouter, MenuConfig, Reply};
use saathi_bot::domain::errors::{AnalysisResult, DeliveryError, DeliveryResult, MarketDataError, MarketDataResult};
use saathi_bot::domain::models::{IndicatorSnapshot, PriceSample, PriceSeries, Signal, Symbol};
use saathi_bot::market_data::DataProvider;
use saathi_bot::trading::SignalEvaluator;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

/// Rising prices with volume; selected symbols stall or fail
pub struct ScriptedProvider {
    samples: usize,
    stalled: HashSet<Symbol>,
    failing: Mutex<HashSet<Symbol>>,
    fetches: Mutex<HashMap<Symbol, usize>>,
}

impl ScriptedProvider {
    pub fn new(samples: usize) -> Self {
        Self {
            samples,
            stalled: HashSet::new(),
            failing: Mutex::new(HashSet::new()),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    pub fn stalling(mut self, symbol: &str) -> Self {
        self.stalled.insert(Symbol::new(symbol));
        self
    }

    pub fn set_failing(&self, symbol: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(Symbol::new(symbol));
        } else {
            set.remove(&Symbol::new(symbol));
        }
    }

    pub fn fetches(&self, symbol: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .get(&Symbol::new(symbol))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl DataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch(&self, symbol: &Symbol, _lookback: usize) -> MarketDataResult<PriceSeries> {
        *self.fetches.lock().unwrap().entry(symbol.clone()).or_insert(0) += 1;

        if self.stalled.contains(symbol) {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
            return Err(MarketDataError::Unavailable(symbol.to_string()));
        }
        if self.failing.lock().unwrap().contains(symbol) {
            return Err(MarketDataError::Unavailable(symbol.to_string()));
        }

        let start = Utc::now() - ChronoDuration::minutes(self.samples as i64);
        let samples = (0..self.samples)
            .map(|i| {
                let price = 100.0 + i as f64;
                PriceSample::new(symbol.clone(), start + ChronoDuration::minutes(i as i64), price)
                    .with_range(price + 0.5, price - 0.5)
                    .with_volume(1_000.0 + i as f64)
            })
            .collect();
        Ok(PriceSeries::from_samples(symbol.clone(), samples))
    }
}

/// Returns queued signals in order, NONE once the script runs out
#[derive(Default)]
pub struct ScriptedEvaluator {
    script: Mutex<VecDeque<Signal>>,
}

impl ScriptedEvaluator {
    pub fn new(signals: &[Signal]) -> Self {
        Self {
            script: Mutex::new(signals.iter().copied().collect()),
        }
    }
}

impl SignalEvaluator for ScriptedEvaluator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn description(&self) -> String {
        "Scripted rule".to_string()
    }

    fn evaluate(&self, _latest: &PriceSample, _snapshot: &IndicatorSnapshot) -> AnalysisResult<Signal> {
        Ok(self.script.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Records outbound messages; can be switched to fail
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send_text(&self, destination: &str, text: &str) -> DeliveryResult<()> {
        if self.fail {
            return Err(DeliveryError::Network("connection refused".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), text.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Reply(i64, Reply),
    Edit(i64, i64, Reply),
    Ack(String),
}

#[derive(Default)]
pub struct RecordingTransport {
    pub outbound: Mutex<Vec<Outbound>>,
}

impl RecordingTransport {
    pub fn recorded(&self) -> Vec<Outbound> {
        self.outbound.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn reply(&self, chat_id: i64, reply: &Reply) -> DeliveryResult<()> {
        self.outbound
            .lock()
            .unwrap()
            .push(Outbound::Reply(chat_id, reply.clone()));
        Ok(())
    }

    async fn edit(&self, chat_id: i64, message_id: i64, reply: &Reply) -> DeliveryResult<()> {
        self.outbound
            .lock()
            .unwrap()
            .push(Outbound::Edit(chat_id, message_id, reply.clone()));
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str) -> DeliveryResult<()> {
        self.outbound
            .lock()
            .unwrap()
            .push(Outbound::Ack(callback_id.to_string()));
        Ok(())
    }

    async fn updates(&self, _offset: i64, _timeout_secs: u64) -> DeliveryResult<Vec<Value>> {
        Ok(Vec::new())
    }
}

pub fn router(provider: Arc<ScriptedProvider>) -> CommandRouter {
    CommandRouter::new(provider, Arc::new(IndicatorEngine::new()), MenuConfig::default(), 60)
}
