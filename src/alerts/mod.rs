// src/alerts/mod.rs
pub mod dispatcher;
pub mod scheduler;

pub use dispatcher::{
    DeliveryAttempt, DeliveryOutcome, Dispatcher, DispatcherHandle, MessageSender, RetryPolicy,
};
pub use scheduler::{
    AlertScheduler, SchedulerSettings, SkipReason, SymbolWatcher, TickOutcome, WatchSpec,
};
