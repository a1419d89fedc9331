// src/lib.rs
// Market alert and quote bot

pub mod alerts;
pub mod analysis;
pub mod bot;
pub mod config;
pub mod domain;
pub mod market_data;
pub mod notify;
pub mod server;
pub mod trading;
