// src/bot/mod.rs
pub mod handler;
pub mod router;
pub mod update;

pub use handler::{BotHandler, ChatTransport};
pub use router::{Button, ButtonAction, CommandRouter, Menu, MenuConfig, Quote, Reply};
pub use update::{parse_update, parse_update_bytes, InboundUpdate, UpdateKind};
