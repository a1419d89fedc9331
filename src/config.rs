// src/config.rs
use crate::alerts::dispatcher::RetryPolicy;
use crate::alerts::scheduler::SchedulerSettings;
use crate::bot::router::MenuConfig;
use crate::domain::errors::{AppError, AppResult};
use crate::domain::models::Symbol;
use crate::market_data::ProviderKind;
use crate::trading::RuleConfig;
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs::File;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_WATCHLIST: &str = "BTC-USD:60,NIFTY:120,BANKNIFTY:150";

/// Bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Messaging credentials
    pub telegram: TelegramConfig,

    /// HTTP surface
    pub server: ServerConfig,

    /// Market data source
    pub data: DataConfig,

    /// Symbols evaluated by the alert loop
    pub watches: Vec<WatchConfig>,

    /// Symbols offered in the chat menus
    pub menus: MenuConfig,

    /// Alert delivery retries
    pub delivery: DeliveryConfig,

    /// Entry/stop/target distances attached to alerts
    pub levels: LevelsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,

    /// Default destination for alerts and `/test`
    pub chat_id: String,

    /// Public URL registered as webhook; long-polling when absent
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub provider: ProviderKind,

    /// Kline interval for venue providers (e.g. "1m", "15m", "1h")
    pub interval: String,

    /// Samples per fetch
    pub lookback: usize,

    pub fetch_timeout_secs: u64,

    /// Fixed seed for reproducible synthetic data
    pub synthetic_seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    pub symbol: Symbol,
    pub interval_secs: u64,
    #[serde(default)]
    pub rule: RuleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelsConfig {
    /// Stop loss percentage
    pub stop_loss_percent: Decimal,

    /// Take profit percentage
    pub take_profit_percent: Decimal,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let telegram = TelegramConfig {
            bot_token: env::var("BOT_TOKEN").map_err(|_| {
                AppError::Config("Missing BOT_TOKEN environment variable".to_string())
            })?,
            chat_id: env::var("CHAT_ID").map_err(|_| {
                AppError::Config("Missing CHAT_ID environment variable".to_string())
            })?,
            webhook_url: env::var("WEBHOOK_URL")
                .ok()
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
        };

        let server = ServerConfig {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("PORT", 10000)?,
        };

        let data = DataConfig {
            provider: parse_var("DATA_PROVIDER", ProviderKind::Synthetic)?,
            interval: env::var("KLINE_INTERVAL").unwrap_or_else(|_| "15m".to_string()),
            lookback: parse_var("LOOKBACK", 100)?,
            fetch_timeout_secs: parse_var("FETCH_TIMEOUT_SECS", 30)?,
            synthetic_seed: match env::var("SYNTHETIC_SEED") {
                Ok(raw) => Some(raw.trim().parse().map_err(|_| {
                    AppError::Config(format!("Invalid SYNTHETIC_SEED: {}", raw))
                })?),
                Err(_) => None,
            },
        };

        let watches = parse_watchlist(
            &env::var("WATCHLIST").unwrap_or_else(|_| DEFAULT_WATCHLIST.to_string()),
        )?;

        let defaults = MenuConfig::default();
        let menus = MenuConfig {
            crypto: env::var("CRYPTO_SYMBOLS")
                .map(|raw| parse_symbols(&raw))
                .unwrap_or(defaults.crypto),
            indices: env::var("INDEX_SYMBOLS")
                .map(|raw| parse_symbols(&raw))
                .unwrap_or(defaults.indices),
        };

        let delivery = DeliveryConfig {
            max_attempts: parse_var("DELIVERY_MAX_ATTEMPTS", 3)?,
            base_delay_secs: parse_var("DELIVERY_BASE_DELAY_SECS", 2)?,
        };

        let levels = LevelsConfig {
            stop_loss_percent: parse_var("STOP_LOSS_PERCENT", Decimal::new(2, 0))?,
            take_profit_percent: parse_var("TAKE_PROFIT_PERCENT", Decimal::new(5, 0))?,
        };

        // Create Logging config
        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            to_file: env::var("LOG_TO_FILE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        Ok(Config {
            telegram,
            server,
            data,
            watches,
            menus,
            delivery,
            levels,
            logging,
        })
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!("Failed to open config file: {}", e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file: {}", e))
        })?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            AppError::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, contents).map_err(|e| {
            AppError::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Reject configurations the bot cannot start with
    pub fn validate(&self) -> AppResult<()> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(AppError::Config("BOT_TOKEN is empty".to_string()));
        }
        if self.telegram.chat_id.trim().is_empty() {
            return Err(AppError::Config("CHAT_ID is empty".to_string()));
        }
        if self.data.lookback == 0 {
            return Err(AppError::Config("LOOKBACK must be positive".to_string()));
        }
        if self.data.fetch_timeout_secs == 0 {
            return Err(AppError::Config("FETCH_TIMEOUT_SECS must be positive".to_string()));
        }
        if self.delivery.max_attempts == 0 {
            return Err(AppError::Config(
                "DELIVERY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for watch in &self.watches {
            if watch.symbol.is_empty() {
                return Err(AppError::Config("Watched symbol is empty".to_string()));
            }
            if watch.interval_secs == 0 {
                return Err(AppError::Config(format!(
                    "Interval for {} must be positive",
                    watch.symbol
                )));
            }
            if !seen.insert(&watch.symbol) {
                return Err(AppError::Config(format!(
                    "{} is watched more than once",
                    watch.symbol
                )));
            }
        }

        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> AppResult<SocketAddr> {
        format!("{}:{}", self.server.bind_addr, self.server.port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid listen address: {}", e)))
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            lookback: self.data.lookback,
            fetch_timeout: Duration::from_secs(self.data.fetch_timeout_secs),
            stop_loss_percent: self.levels.stop_loss_percent,
            take_profit_percent: self.levels.take_profit_percent,
            ..SchedulerSettings::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.delivery.max_attempts,
            Duration::from_secs(self.delivery.base_delay_secs),
        )
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);
        // hyper internals are noisy at debug
        builder.filter_module("hyper", log::LevelFilter::Warn);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        // Initialize the logger
        builder.init();

        Ok(())
    }
}

/// Parse `SYMBOL:SECS[:RULE]` entries separated by commas
pub fn parse_watchlist(raw: &str) -> AppResult<Vec<WatchConfig>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let symbol = Symbol::new(parts.next().unwrap_or_default());
            let interval_secs = parts
                .next()
                .ok_or_else(|| {
                    AppError::Config(format!("Watch entry '{}' needs SYMBOL:SECS", entry))
                })?
                .trim()
                .parse::<u64>()
                .map_err(|_| AppError::Config(format!("Invalid interval in '{}'", entry)))?;
            let rule = match parts.next() {
                Some(rule) => RuleConfig::from_str(rule).map_err(AppError::Config)?,
                None => RuleConfig::default(),
            };

            Ok(WatchConfig {
                symbol,
                interval_secs,
                rule,
            })
        })
        .collect()
}

fn parse_symbols(raw: &str) -> Vec<Symbol> {
    raw.split(',')
        .map(Symbol::new)
        .filter(|symbol| !symbol.is_empty())
        .collect()
}

fn parse_var<T: FromStr>(name: &str, default: T) -> AppResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("Invalid value for {}: {}", name, raw))),
        Err(_) => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig {
                bot_token: "".to_string(),
                chat_id: "".to_string(),
                webhook_url: None,
            },
            server: ServerConfig {
                bind_addr: "0.0.0.0".to_string(),
                port: 10000,
            },
            data: DataConfig {
                provider: ProviderKind::Synthetic,
                interval: "15m".to_string(),
                lookback: 100,
                fetch_timeout_secs: 30,
                synthetic_seed: None,
            },
            watches: parse_watchlist(DEFAULT_WATCHLIST).unwrap_or_default(),
            menus: MenuConfig::default(),
            delivery: DeliveryConfig {
                max_attempts: 3,
                base_delay_secs: 2,
            },
            levels: LevelsConfig {
                stop_loss_percent: Decimal::new(2, 0),
                take_profit_percent: Decimal::new(5, 0),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}
