mod common;

use common::{router, ScriptedEvaluator, ScriptedProvider};
use saathi_bot::alerts::{
    AlertScheduler, DispatcherHandle, SchedulerSettings, SkipReason, SymbolWatcher, TickOutcome,
    WatchSpec,
};
use saathi_bot::analysis::IndicatorEngine;
use saathi_bot::domain::models::{AlertEvent, Signal, Symbol};
use saathi_bot::trading::EmaRsiVolumeRule;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

fn watcher(
    provider: Arc<ScriptedProvider>,
    signals: &[Signal],
    settings: SchedulerSettings,
) -> (SymbolWatcher, mpsc::UnboundedReceiver<AlertEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let spec = WatchSpec::new(
        Symbol::new("BTC-USD"),
        Duration::from_secs(60),
        Arc::new(ScriptedEvaluator::new(signals)),
    );
    let watcher = SymbolWatcher::new(
        spec,
        provider,
        Arc::new(IndicatorEngine::new()),
        DispatcherHandle::from_sender(tx),
        settings,
    );
    (watcher, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<AlertEvent>) -> Vec<AlertEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn alerts_only_on_rising_edges() {
    use Signal::*;
    let script = [None, Buy, Buy, Buy, None, Buy];
    let (mut watcher, mut rx) = watcher(
        Arc::new(ScriptedProvider::new(60)),
        &script,
        SchedulerSettings::default(),
    );

    let mut outcomes = Vec::new();
    for _ in 0..script.len() {
        outcomes.push(watcher.tick().await);
    }

    assert_eq!(
        outcomes,
        vec![
            TickOutcome::Evaluated(None),
            TickOutcome::Alerted(Buy),
            TickOutcome::Evaluated(Buy),
            TickOutcome::Evaluated(Buy),
            TickOutcome::Evaluated(None),
            TickOutcome::Alerted(Buy),
        ]
    );

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.signal == Buy));
    assert!(events[0].text.contains("BTC-USD BUY Alert!"));
    assert!(events[0].text.contains("Scripted rule"));
    assert_eq!(events[0].price, 159.0);
    assert!(events[0].levels.is_some());
}

#[tokio::test]
async fn repeated_signal_does_not_spam() {
    let script = [Signal::Sell; 10];
    let (mut watcher, mut rx) = watcher(
        Arc::new(ScriptedProvider::new(60)),
        &script,
        SchedulerSettings::default(),
    );

    for _ in 0..script.len() {
        watcher.tick().await;
    }

    assert_eq!(drain(&mut rx).len(), 1);
    assert_eq!(watcher.state().unwrap().active_signal, Signal::Sell);
}

#[tokio::test]
async fn flip_alerts_twice() {
    let (mut watcher, mut rx) = watcher(
        Arc::new(ScriptedProvider::new(60)),
        &[Signal::Buy, Signal::Sell],
        SchedulerSettings::default(),
    );

    assert_eq!(watcher.tick().await, TickOutcome::Alerted(Signal::Buy));
    let first_since = watcher.state().unwrap().signal_since;
    assert_eq!(watcher.tick().await, TickOutcome::Alerted(Signal::Sell));

    let events = drain(&mut rx);
    assert_eq!(
        events.iter().map(|e| e.signal).collect::<Vec<_>>(),
        vec![Signal::Buy, Signal::Sell]
    );
    assert!(watcher.state().unwrap().signal_since >= first_since);
}

#[tokio::test]
async fn provider_failure_leaves_state_untouched() {
    let provider = Arc::new(ScriptedProvider::new(60));
    let (mut watcher, mut rx) = watcher(
        provider.clone(),
        &[Signal::Buy, Signal::Buy],
        SchedulerSettings::default(),
    );

    assert_eq!(watcher.tick().await, TickOutcome::Alerted(Signal::Buy));
    let before = watcher.state().cloned();

    provider.set_failing("BTC-USD", true);
    assert_eq!(
        watcher.tick().await,
        TickOutcome::Skipped(SkipReason::DataUnavailable)
    );
    assert_eq!(watcher.state().cloned(), before);

    // recovery continues the same run without a second alert
    provider.set_failing("BTC-USD", false);
    assert_eq!(watcher.tick().await, TickOutcome::Evaluated(Signal::Buy));
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn short_history_skips_without_alerting() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let spec = WatchSpec::new(
        Symbol::new("NIFTY"),
        Duration::from_secs(120),
        Arc::new(EmaRsiVolumeRule::default()),
    );
    let mut watcher = SymbolWatcher::new(
        spec,
        Arc::new(ScriptedProvider::new(5)),
        Arc::new(IndicatorEngine::new()),
        DispatcherHandle::from_sender(tx),
        SchedulerSettings::default(),
    );

    assert_eq!(
        watcher.tick().await,
        TickOutcome::Skipped(SkipReason::IndicatorsUndefined)
    );
    assert!(watcher.state().is_none());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn slow_fetch_is_cut_off_by_timeout() {
    let settings = SchedulerSettings {
        fetch_timeout: Duration::from_secs(10),
        ..SchedulerSettings::default()
    };
    let (tx, _rx) = mpsc::unbounded_channel();
    let spec = WatchSpec::new(
        Symbol::new("STALL"),
        Duration::from_secs(60),
        Arc::new(ScriptedEvaluator::new(&[Signal::Buy])),
    );
    let mut watcher = SymbolWatcher::new(
        spec,
        Arc::new(ScriptedProvider::new(60).stalling("STALL")),
        Arc::new(IndicatorEngine::new()),
        DispatcherHandle::from_sender(tx),
        settings,
    );

    assert_eq!(
        watcher.tick().await,
        TickOutcome::Skipped(SkipReason::DataUnavailable)
    );
    assert!(watcher.state().is_none());
}

#[tokio::test(start_paused = true)]
async fn stalled_symbol_does_not_delay_others() {
    let provider = Arc::new(ScriptedProvider::new(60).stalling("STALL"));
    let (tx, _rx) = mpsc::unbounded_channel();
    let settings = SchedulerSettings {
        fetch_timeout: Duration::from_secs(3600),
        ..SchedulerSettings::default()
    };
    let mut scheduler = AlertScheduler::new(
        provider.clone(),
        Arc::new(IndicatorEngine::new()),
        DispatcherHandle::from_sender(tx),
        settings,
    );

    assert!(scheduler.watch(WatchSpec::new(
        Symbol::new("STALL"),
        Duration::from_secs(60),
        Arc::new(ScriptedEvaluator::default()),
    )));
    assert!(scheduler.watch(WatchSpec::new(
        Symbol::new("BTC-USD"),
        Duration::from_secs(120),
        Arc::new(ScriptedEvaluator::default()),
    )));

    tokio::time::sleep(Duration::from_secs(605)).await;

    assert_eq!(provider.fetches("STALL"), 1);
    assert!(provider.fetches("BTC-USD") >= 5);

    // the command path is served while STALL is still stuck
    let quote = router(provider.clone())
        .on_user_query(&Symbol::new("BTC-USD"))
        .await
        .unwrap();
    assert_eq!(quote.symbol, Symbol::new("BTC-USD"));

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unwatch_stops_fetching() {
    let provider = Arc::new(ScriptedProvider::new(60));
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut scheduler = AlertScheduler::new(
        provider.clone(),
        Arc::new(IndicatorEngine::new()),
        DispatcherHandle::from_sender(tx),
        SchedulerSettings::default(),
    );

    let btc = Symbol::new("BTC-USD");
    assert!(scheduler.watch(WatchSpec::new(
        btc.clone(),
        Duration::from_secs(60),
        Arc::new(ScriptedEvaluator::default()),
    )));
    assert!(!scheduler.watch(WatchSpec::new(
        btc.clone(),
        Duration::from_secs(30),
        Arc::new(ScriptedEvaluator::default()),
    )));
    assert_eq!(scheduler.watched(), vec![btc.clone()]);

    tokio::time::sleep(Duration::from_secs(130)).await;
    assert!(scheduler.unwatch(&btc).await);
    let fetched = provider.fetches("BTC-USD");
    assert!(fetched >= 2);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(provider.fetches("BTC-USD"), fetched);
    assert!(!scheduler.is_watching(&btc));
    assert!(!scheduler.unwatch(&btc).await);
}
