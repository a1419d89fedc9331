// src/alerts/dispatcher.rs
use crate::domain::errors::{DeliveryError, DeliveryResult};
use crate::domain::models::AlertEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Upper bound on a server-requested retry wait
const MAX_RETRY_HINT: Duration = Duration::from_secs(300);

/// Outbound text primitive of the messaging channel
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_text(&self, destination: &str, text: &str) -> DeliveryResult<()>;
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Wait before the attempt following attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Delivery bookkeeping for one event
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    pub event: AlertEvent,
    pub attempt_count: u32,
    pub last_error: Option<DeliveryError>,
}

impl DeliveryAttempt {
    fn new(event: AlertEvent) -> Self {
        Self {
            event,
            attempt_count: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Delivered(DeliveryAttempt),
    Dropped(DeliveryAttempt),
}

impl DeliveryOutcome {
    pub fn attempt(&self) -> &DeliveryAttempt {
        match self {
            DeliveryOutcome::Delivered(attempt) | DeliveryOutcome::Dropped(attempt) => attempt,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered(_))
    }
}

/// Producer side of the alert queue. Cheap to clone, one per scheduling unit.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<AlertEvent>,
}

impl DispatcherHandle {
    pub fn from_sender(tx: mpsc::UnboundedSender<AlertEvent>) -> Self {
        Self { tx }
    }

    /// Enqueue an event without waiting for delivery
    pub fn submit(&self, event: AlertEvent) -> DeliveryResult<()> {
        self.tx.send(event).map_err(|_| DeliveryError::QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drains the alert queue into the messaging channel
pub struct Dispatcher {
    rx: mpsc::UnboundedReceiver<AlertEvent>,
    sender: Arc<dyn MessageSender>,
    destination: String,
    policy: RetryPolicy,
    reports: Option<mpsc::UnboundedSender<DeliveryOutcome>>,
}

impl Dispatcher {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        destination: &str,
        policy: RetryPolicy,
    ) -> (Self, DispatcherHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            rx,
            sender,
            destination: destination.to_string(),
            policy,
            reports: None,
        };
        (dispatcher, DispatcherHandle::from_sender(tx))
    }

    /// Publish every delivery outcome on `reports`
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<DeliveryOutcome>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Deliver queued events in FIFO order until every handle is dropped
    pub async fn run(mut self) {
        log::info!("Alert dispatcher started (destination {})", self.destination);

        while let Some(event) = self.rx.recv().await {
            let outcome = self.deliver(event).await;
            if let Some(reports) = &self.reports {
                // no listener is fine
                let _ = reports.send(outcome);
            }
        }

        log::info!("Alert dispatcher stopped, queue drained");
    }

    /// Send one event, retrying with backoff up to the policy bound
    pub async fn deliver(&self, event: AlertEvent) -> DeliveryOutcome {
        let mut attempt = DeliveryAttempt::new(event);
        let max_attempts = self.policy.max_attempts.max(1);

        loop {
            attempt.attempt_count += 1;

            match self
                .sender
                .send_text(&self.destination, &attempt.event.text)
                .await
            {
                Ok(()) => {
                    log::info!(
                        "Delivered {} alert for {} (attempt {})",
                        attempt.event.signal,
                        attempt.event.symbol,
                        attempt.attempt_count
                    );
                    return DeliveryOutcome::Delivered(attempt);
                }
                Err(e) => {
                    if attempt.attempt_count >= max_attempts {
                        log::error!(
                            "Dropping {} alert for {} after {} attempts: {}",
                            attempt.event.signal,
                            attempt.event.symbol,
                            attempt.attempt_count,
                            e
                        );
                        attempt.last_error = Some(e);
                        return DeliveryOutcome::Dropped(attempt);
                    }

                    // a rate-limit hint overrides a shorter backoff
                    let delay = self
                        .policy
                        .delay_after(attempt.attempt_count)
                        .max(e.retry_after().unwrap_or_default().min(MAX_RETRY_HINT));
                    log::warn!(
                        "Alert for {} failed (attempt {}/{}): {}; retrying in {:?}",
                        attempt.event.symbol,
                        attempt.attempt_count,
                        max_attempts,
                        e,
                        delay
                    );
                    attempt.last_error = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
