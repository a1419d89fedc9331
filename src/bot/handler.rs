// src/bot/handler.rs
use crate::bot::router::{CommandRouter, Reply};
use crate::bot::update::{parse_update, InboundUpdate, UpdateKind};
use crate::domain::errors::DeliveryResult;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;

const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Chat-side primitives needed to answer users
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `reply` as a new message
    async fn reply(&self, chat_id: i64, reply: &Reply) -> DeliveryResult<()>;

    /// Replace the text and keyboard of an earlier bot message
    async fn edit(&self, chat_id: i64, message_id: i64, reply: &Reply) -> DeliveryResult<()>;

    /// Stop the client-side spinner of a button press
    async fn acknowledge(&self, callback_id: &str) -> DeliveryResult<()>;

    /// Long-poll raw updates starting at `offset`
    async fn updates(&self, offset: i64, timeout_secs: u64) -> DeliveryResult<Vec<Value>>;
}

/// Answers inbound updates, one task per update
pub struct BotHandler {
    router: Arc<CommandRouter>,
    transport: Arc<dyn ChatTransport>,
}

impl BotHandler {
    pub fn new(router: Arc<CommandRouter>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { router, transport }
    }

    pub async fn handle(&self, update: InboundUpdate) {
        if let UpdateKind::ButtonPress { callback_id, .. } = &update.kind {
            if let Err(e) = self.transport.acknowledge(callback_id).await {
                log::debug!("Failed to acknowledge button {}: {}", callback_id, e);
            }
        }

        let reply = self.router.route(&update.kind).await;

        let sent = match &update.kind {
            UpdateKind::ButtonPress { message_id, .. } => {
                self.transport.edit(update.chat_id, *message_id, &reply).await
            }
            _ => self.transport.reply(update.chat_id, &reply).await,
        };

        if let Err(e) = sent {
            log::warn!("Failed to answer update {}: {}", update.update_id, e);
        }
    }

    pub fn spawn(self: &Arc<Self>, update: InboundUpdate) -> JoinHandle<()> {
        let handler = Arc::clone(self);
        tokio::spawn(async move { handler.handle(update).await })
    }

    /// Pull updates until `shutdown` flips to true
    pub async fn run_polling(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        log::info!("Polling for chat updates");
        let mut offset = 0i64;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let batch = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                batch = self.transport.updates(offset, POLL_TIMEOUT_SECS) => batch,
            };

            let raw_updates = match batch {
                Ok(raw_updates) => raw_updates,
                Err(e) => {
                    log::warn!("Fetching updates failed: {}; retrying in {:?}", e, POLL_RETRY_DELAY);
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };

            for raw in raw_updates {
                if let Some(id) = raw.get("update_id").and_then(Value::as_i64) {
                    offset = offset.max(id + 1);
                }
                match parse_update(raw) {
                    Ok(Some(update)) => {
                        self.spawn(update);
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("Skipping malformed update: {}", e),
                }
            }
        }

        log::info!("Update polling stopped");
    }
}
