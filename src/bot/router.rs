// src/bot/router.rs
use crate::analysis::{names, IndicatorEngine};
use crate::bot::update::UpdateKind;
use crate::domain::errors::{AppResult, MarketDataError};
use crate::domain::format::{format_amount, percentage_change};
use crate::domain::models::{IndicatorSnapshot, Symbol};
use crate::market_data::DataProvider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const GENERIC_FAILURE: &str = "⚠️ Sorry, could not process that request right now. Please try again.";
const USAGE_HINT: &str = "Please use the buttons or a command. Send /start to open the menu.";
const HELP_TEXT: &str = "Commands:\n/start - open the market menu\n/price SYMBOL - latest quote and indicators\n/watchlist - symbols watched for alerts\n/help - this message";

/// Symbols offered in the chat menus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuConfig {
    pub crypto: Vec<Symbol>,
    pub indices: Vec<Symbol>,
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            crypto: vec![Symbol::new("BTC-USD"), Symbol::new("ETH-USD")],
            indices: vec![
                Symbol::new("NIFTY"),
                Symbol::new("BANKNIFTY"),
                Symbol::new("FINNIFTY"),
            ],
        }
    }
}

impl MenuConfig {
    fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.crypto.iter().chain(self.indices.iter())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Menu {
    Main,
    Crypto,
    Indices,
}

/// Decoded inline-button payload
#[derive(Debug, Clone, PartialEq)]
pub enum ButtonAction {
    Open(Menu),
    Quote(Symbol),
    Back,
}

impl ButtonAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data.trim() {
            "back" | "menu:main" => Some(ButtonAction::Back),
            "crypto" | "menu:crypto" => Some(ButtonAction::Open(Menu::Crypto)),
            "indices" | "menu:indices" => Some(ButtonAction::Open(Menu::Indices)),
            other => other
                .strip_prefix("quote:")
                .map(Symbol::new)
                .filter(|s| !s.is_empty())
                .map(ButtonAction::Quote),
        }
    }

    pub fn callback_data(&self) -> String {
        match self {
            ButtonAction::Back | ButtonAction::Open(Menu::Main) => "menu:main".to_string(),
            ButtonAction::Open(Menu::Crypto) => "menu:crypto".to_string(),
            ButtonAction::Open(Menu::Indices) => "menu:indices".to_string(),
            ButtonAction::Quote(symbol) => format!("quote:{}", symbol),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: &str, action: ButtonAction) -> Self {
        Self {
            label: label.to_string(),
            data: action.callback_data(),
        }
    }
}

/// Text plus optional inline keyboard, rows of buttons
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Vec<Vec<Button>>,
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            keyboard: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: Vec<Button>) -> Self {
        self.keyboard.push(row);
        self
    }
}

/// On-demand market view for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: Symbol,
    pub price: f64,
    /// Change against the previous sample
    pub change_percent: Option<f64>,
    pub as_of: DateTime<Utc>,
    pub snapshot: IndicatorSnapshot,
}

impl Quote {
    pub fn render(&self) -> String {
        let value = |name: &str| match self.snapshot.get(name) {
            Some(v) => format_amount(v),
            None => "n/a".to_string(),
        };
        let change = self
            .change_percent
            .map(|c| format!(" ({:+.2}%)", c))
            .unwrap_or_default();

        format!(
            "📊 {}\nPrice: {}{}\nEMA: {} | SMA: {}\nRSI: {}\nMACD: {} / signal {}\nBollinger: {} – {}\nStochastic %K: {}\nVWAP: {}\nAs of: {}",
            self.symbol,
            format_amount(self.price),
            change,
            value(names::EMA),
            value(names::SMA),
            value(names::RSI),
            value(names::MACD),
            value(names::MACD_SIGNAL),
            value(names::BB_LOWER),
            value(names::BB_UPPER),
            value(names::STOCH_K),
            value(names::VWAP),
            self.as_of.format("%Y-%m-%d %H:%M UTC"),
        )
    }
}

/// Maps user input to replies. Queries hit the provider directly,
/// independent of the alert loop.
pub struct CommandRouter {
    provider: Arc<dyn DataProvider>,
    engine: Arc<IndicatorEngine>,
    menus: MenuConfig,
    lookback: usize,
    watchlist: Vec<(Symbol, Duration)>,
}

impl CommandRouter {
    pub fn new(
        provider: Arc<dyn DataProvider>,
        engine: Arc<IndicatorEngine>,
        menus: MenuConfig,
        lookback: usize,
    ) -> Self {
        Self {
            provider,
            engine,
            menus,
            lookback,
            watchlist: Vec::new(),
        }
    }

    pub fn with_watchlist(mut self, watchlist: Vec<(Symbol, Duration)>) -> Self {
        self.watchlist = watchlist;
        self
    }

    /// Fetch and analyse `symbol` right now
    pub async fn on_user_query(&self, symbol: &Symbol) -> AppResult<Quote> {
        let series = self.provider.fetch(symbol, self.lookback).await?;
        let latest = series
            .latest()
            .ok_or_else(|| MarketDataError::Unavailable(symbol.to_string()))?;
        let snapshot = self.engine.snapshot(&series)?;

        let change_percent = series
            .samples()
            .iter()
            .rev()
            .nth(1)
            .map(|previous| percentage_change(previous.price, latest.price));

        Ok(Quote {
            symbol: symbol.clone(),
            price: latest.price,
            change_percent,
            as_of: latest.timestamp,
            snapshot,
        })
    }

    pub async fn route(&self, kind: &UpdateKind) -> Reply {
        match kind {
            UpdateKind::Command { name, args } => match name.as_str() {
                "start" => self.menu(Menu::Main),
                "help" => Reply::text(HELP_TEXT),
                "price" | "quote" => match args.first() {
                    Some(raw) => {
                        let symbol = self.resolve_symbol(raw).unwrap_or_else(|| Symbol::new(raw));
                        self.quote_reply(&symbol).await
                    }
                    None => Reply::text("Usage: /price SYMBOL, e.g. /price BTC-USD"),
                },
                "watchlist" => self.watchlist_reply(),
                _ => Reply::text(USAGE_HINT),
            },
            UpdateKind::ButtonPress { data, .. } => match ButtonAction::parse(data) {
                Some(ButtonAction::Open(menu)) => self.menu(menu),
                Some(ButtonAction::Back) => self.menu(Menu::Main),
                Some(ButtonAction::Quote(symbol)) => self.quote_reply(&symbol).await,
                None => {
                    log::warn!("Unknown button payload: {}", data);
                    Reply::text(GENERIC_FAILURE)
                }
            },
            UpdateKind::PlainText(text) => match self.resolve_symbol(text) {
                Some(symbol) => self.quote_reply(&symbol).await,
                None => Reply::text(USAGE_HINT),
            },
        }
    }

    pub fn menu(&self, menu: Menu) -> Reply {
        match menu {
            Menu::Main => Reply::text("📊 Market Terminal\n\nChoose a market:").with_row(vec![
                Button::new("Crypto", ButtonAction::Open(Menu::Crypto)),
                Button::new("Indices", ButtonAction::Open(Menu::Indices)),
            ]),
            Menu::Crypto => self.symbol_menu("💰 Crypto market\n\nChoose a coin:", &self.menus.crypto),
            Menu::Indices => self.symbol_menu("📈 Index market\n\nChoose an index:", &self.menus.indices),
        }
    }

    fn symbol_menu(&self, title: &str, symbols: &[Symbol]) -> Reply {
        symbols
            .iter()
            .fold(Reply::text(title), |reply, symbol| {
                reply.with_row(vec![Button::new(
                    symbol.as_str(),
                    ButtonAction::Quote(symbol.clone()),
                )])
            })
            .with_row(vec![Button::new("Back", ButtonAction::Back)])
    }

    async fn quote_reply(&self, symbol: &Symbol) -> Reply {
        let reply = match self.on_user_query(symbol).await {
            Ok(quote) => Reply::text(&quote.render()),
            Err(e) => {
                log::warn!("Quote for {} failed: {}", symbol, e);
                Reply::text(GENERIC_FAILURE)
            }
        };
        reply.with_row(vec![
            Button::new("Refresh", ButtonAction::Quote(symbol.clone())),
            Button::new("Back", ButtonAction::Back),
        ])
    }

    fn watchlist_reply(&self) -> Reply {
        if self.watchlist.is_empty() {
            return Reply::text("No symbols are watched for alerts.");
        }
        let lines: Vec<String> = self
            .watchlist
            .iter()
            .map(|(symbol, interval)| format!("• {} every {}s", symbol, interval.as_secs()))
            .collect();
        Reply::text(&format!("🔔 Alert watchlist\n{}", lines.join("\n")))
    }

    /// Match free text against menu symbols: exact, or by base asset
    /// ("btc" → "BTC-USD").
    pub fn resolve_symbol(&self, text: &str) -> Option<Symbol> {
        let wanted = Symbol::new(text);
        if wanted.is_empty() {
            return None;
        }
        if let Some(exact) = self.menus.symbols().find(|s| **s == wanted) {
            return Some(exact.clone());
        }
        self.menus
            .symbols()
            .find(|s| {
                s.as_str()
                    .split(|c| c == '-' || c == '/')
                    .next()
                    .map_or(false, |base| base == wanted.as_str())
            })
            .cloned()
    }
}
