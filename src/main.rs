// src/main.rs
use saathi_bot::alerts::{AlertScheduler, Dispatcher, MessageSender, WatchSpec};
use saathi_bot::analysis::IndicatorEngine;
use saathi_bot::bot::{BotHandler, ChatTransport, CommandRouter};
use saathi_bot::config::Config;
use saathi_bot::domain::errors::AppResult;
use saathi_bot::market_data::{BinanceProvider, DataProvider, ProviderKind, SyntheticProvider};
use saathi_bot::notify::TelegramClient;
use saathi_bot::server::{self, ServerState};

use std::sync::Arc;
use tokio::signal::ctrl_c;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};

const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::from_env()?;
    config.validate()?;

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting saathi_bot v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using {} market data", config.data.provider);

    let telegram = Arc::new(TelegramClient::new(&config.telegram.bot_token));
    let provider = create_provider(&config)?;
    let engine = Arc::new(IndicatorEngine::new());

    // Alert delivery queue
    let sender: Arc<dyn MessageSender> = telegram.clone();
    let (dispatcher, dispatcher_handle) =
        Dispatcher::new(sender.clone(), &config.telegram.chat_id, config.retry_policy());
    let dispatcher_task = tokio::spawn(dispatcher.run());

    // One scheduling unit per watched symbol
    let mut scheduler = AlertScheduler::new(
        provider.clone(),
        engine.clone(),
        dispatcher_handle.clone(),
        config.scheduler_settings(),
    );
    for watch in &config.watches {
        scheduler.watch(WatchSpec::new(
            watch.symbol.clone(),
            Duration::from_secs(watch.interval_secs),
            watch.rule.build(),
        ));
    }

    // Command path
    let watchlist = config
        .watches
        .iter()
        .map(|w| (w.symbol.clone(), Duration::from_secs(w.interval_secs)))
        .collect();
    let router = Arc::new(
        CommandRouter::new(
            provider.clone(),
            engine.clone(),
            config.menus.clone(),
            config.data.lookback,
        )
        .with_watchlist(watchlist),
    );
    let transport: Arc<dyn ChatTransport> = telegram.clone();
    let bot = Arc::new(BotHandler::new(router, transport));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    match &config.telegram.webhook_url {
        Some(url) => {
            log::info!("Registering webhook");
            if let Err(e) = telegram.set_webhook(url).await {
                log::error!("Failed to register webhook: {}", e);
            }
        }
        None => {
            if let Err(e) = telegram.delete_webhook().await {
                log::warn!("Failed to clear webhook before polling: {}", e);
            }
            tokio::spawn(bot.clone().run_polling(shutdown_rx.clone()));
        }
    }

    let state = Arc::new(ServerState::new(sender, &config.telegram.chat_id, bot));
    let server_task = tokio::spawn(server::serve(config.listen_addr()?, state, shutdown_rx));

    // Wait for shutdown signal
    log::info!("Bot is running. Press Ctrl+C to stop.");
    ctrl_c().await?;

    // Shutdown
    log::info!("Shutting down...");
    // receivers may already be gone
    let _ = shutdown_tx.send(true);
    scheduler.shutdown().await;

    // the dispatcher exits once every handle is dropped
    drop(dispatcher_handle);
    if timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher_task).await.is_err() {
        log::warn!("Alert queue not drained within {:?}", DISPATCHER_DRAIN_TIMEOUT);
    }

    match server_task.await {
        Ok(Err(e)) => log::error!("HTTP server failed: {}", e),
        Err(e) => log::error!("HTTP server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    log::info!("Shutdown complete. Goodbye!");
    Ok(())
}

/// Create market data provider based on configuration
fn create_provider(config: &Config) -> AppResult<Arc<dyn DataProvider>> {
    match config.data.provider {
        ProviderKind::Binance => Ok(Arc::new(BinanceProvider::new(&config.data.interval)?)),
        ProviderKind::Synthetic => {
            let step = SyntheticProvider::step_for_interval(&config.data.interval);
            Ok(match config.data.synthetic_seed {
                Some(seed) => Arc::new(SyntheticProvider::with_seed(step, seed)),
                None => Arc::new(SyntheticProvider::new(step)),
            })
        }
    }
}
