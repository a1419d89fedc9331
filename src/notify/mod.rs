// src/notify/mod.rs
pub mod telegram;

pub use telegram::TelegramClient;
