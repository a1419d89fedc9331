// src/trading/evaluator.rs
use crate::analysis::names;
use crate::domain::errors::{AnalysisError, AnalysisResult};
use crate::domain::format::format_amount;
use crate::domain::models::{IndicatorSnapshot, PriceSample, Signal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Stateless rule turning the latest sample and its indicators into a signal.
/// Debouncing is the caller's job.
pub trait SignalEvaluator: Send + Sync {
    /// Get the name of the rule
    fn name(&self) -> &str;

    /// Short human-readable condition, used in alert texts
    fn description(&self) -> String;

    /// Evaluate the rule. Undefined inputs are an error, never a signal.
    fn evaluate(&self, latest: &PriceSample, snapshot: &IndicatorSnapshot) -> AnalysisResult<Signal>;
}

fn required(snapshot: &IndicatorSnapshot, name: &str) -> AnalysisResult<f64> {
    snapshot
        .precise(name)
        .ok_or_else(|| AnalysisError::Undefined(format!("{} for {}", name, snapshot.symbol)))
}

/// Trend confirmation rule: close against EMA, RSI not stretched, volume above
/// its average.
#[derive(Debug, Clone)]
pub struct EmaRsiVolumeRule {
    overbought_threshold: f64,
    oversold_threshold: f64,
}

impl EmaRsiVolumeRule {
    pub fn new(overbought_threshold: f64, oversold_threshold: f64) -> Self {
        Self {
            overbought_threshold,
            oversold_threshold,
        }
    }
}

impl Default for EmaRsiVolumeRule {
    fn default() -> Self {
        Self::new(70.0, 30.0)
    }
}

impl SignalEvaluator for EmaRsiVolumeRule {
    fn name(&self) -> &str {
        "ema_rsi_volume"
    }

    fn description(&self) -> String {
        "EMA+RSI+Volume confirmation".to_string()
    }

    fn evaluate(&self, latest: &PriceSample, snapshot: &IndicatorSnapshot) -> AnalysisResult<Signal> {
        let ema = required(snapshot, names::EMA)?;
        let rsi = required(snapshot, names::RSI)?;
        let volume_ma = required(snapshot, names::VOLUME_MA)?;
        let volume = latest
            .volume
            .ok_or_else(|| AnalysisError::Undefined(format!("volume for {}", latest.symbol)))?;

        let close = latest.price;
        let volume_confirmed = volume > volume_ma;

        if close > ema && rsi < self.overbought_threshold && volume_confirmed {
            Ok(Signal::Buy)
        } else if close < ema && rsi > self.oversold_threshold && volume_confirmed {
            Ok(Signal::Sell)
        } else {
            Ok(Signal::None)
        }
    }
}

/// Fires while the close trades above a fixed level.
#[derive(Debug, Clone)]
pub struct PriceBreakoutRule {
    level: f64,
}

impl PriceBreakoutRule {
    pub fn new(level: f64) -> Self {
        Self { level }
    }
}

impl SignalEvaluator for PriceBreakoutRule {
    fn name(&self) -> &str {
        "breakout"
    }

    fn description(&self) -> String {
        format!("Price breakout above {}", format_amount(self.level))
    }

    fn evaluate(&self, latest: &PriceSample, _snapshot: &IndicatorSnapshot) -> AnalysisResult<Signal> {
        if !latest.price.is_finite() {
            return Err(AnalysisError::Undefined(format!("price for {}", latest.symbol)));
        }
        if latest.price > self.level {
            Ok(Signal::Breakout)
        } else {
            Ok(Signal::None)
        }
    }
}

/// Rule selection for a watched symbol.
///
/// Text form: `ema_rsi_volume`, `ema_rsi_volume@OVERBOUGHT/OVERSOLD` or
/// `breakout@LEVEL`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleConfig {
    EmaRsiVolume { overbought: f64, oversold: f64 },
    Breakout { level: f64 },
}

impl Default for RuleConfig {
    fn default() -> Self {
        RuleConfig::EmaRsiVolume {
            overbought: 70.0,
            oversold: 30.0,
        }
    }
}

impl RuleConfig {
    pub fn build(&self) -> Arc<dyn SignalEvaluator> {
        match self {
            RuleConfig::EmaRsiVolume { overbought, oversold } => {
                Arc::new(EmaRsiVolumeRule::new(*overbought, *oversold))
            }
            RuleConfig::Breakout { level } => Arc::new(PriceBreakoutRule::new(*level)),
        }
    }
}

impl FromStr for RuleConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (kind, arg) = match s.split_once('@') {
            Some((kind, arg)) => (kind.trim(), Some(arg.trim())),
            None => (s, None),
        };

        let parse_number = |raw: &str| -> Result<f64, String> {
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| format!("Invalid number '{}' in rule '{}'", raw, s))
        };

        match (kind.to_lowercase().as_str(), arg) {
            ("ema_rsi_volume", None) => Ok(RuleConfig::default()),
            ("ema_rsi_volume", Some(arg)) => {
                let (ob, os) = arg
                    .split_once('/')
                    .ok_or_else(|| format!("Expected OVERBOUGHT/OVERSOLD in rule '{}'", s))?;
                let (overbought, oversold) = (parse_number(ob)?, parse_number(os)?);
                if oversold >= overbought {
                    return Err(format!("Oversold must be below overbought in rule '{}'", s));
                }
                Ok(RuleConfig::EmaRsiVolume { overbought, oversold })
            }
            ("breakout", Some(level)) => Ok(RuleConfig::Breakout {
                level: parse_number(level)?,
            }),
            ("breakout", None) => Err(format!("Rule '{}' needs a level: breakout@LEVEL", s)),
            _ => Err(format!("Unknown rule '{}'", s)),
        }
    }
}

impl fmt::Display for RuleConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RuleConfig::EmaRsiVolume { overbought, oversold } => {
                write!(f, "ema_rsi_volume@{}/{}", overbought, oversold)
            }
            RuleConfig::Breakout { level } => write!(f, "breakout@{}", level),
        }
    }
}
