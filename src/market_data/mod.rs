// src/market_data/mod.rs
pub mod binance;
pub mod provider;
pub mod synthetic;

pub use binance::BinanceProvider;
pub use provider::{DataProvider, ProviderKind};
pub use synthetic::SyntheticProvider;
