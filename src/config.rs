// =============================================================================
// Engine configuration — strategy parameters, per-symbol filters, atomic save
// =============================================================================
//
// Follows `runtime_config.rs`'s shape: every field carries a serde default so
// an older config file on disk still loads after new fields are added, and
// persistence uses the same write-tmp-then-rename pattern to avoid leaving a
// half-written file behind on crash.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;

fn default_ema_period() -> usize {
    50
}

fn default_fib_period() -> usize {
    9
}

fn default_atr_period() -> usize {
    9
}

fn default_tp_atr_mult() -> f64 {
    2.0
}

fn default_sl_atr_mult() -> f64 {
    8.84
}

fn default_touch_tolerance() -> f64 {
    0.001
}

/// Tunable parameters shared by the built-in strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,

    #[serde(default = "default_fib_period")]
    pub fib_period: usize,

    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    /// Take-profit distance as a multiple of ATR at signal time.
    #[serde(default = "default_tp_atr_mult")]
    pub tp_atr_mult: f64,

    /// Stop-loss distance as a multiple of ATR at signal time.
    #[serde(default = "default_sl_atr_mult")]
    pub sl_atr_mult: f64,

    /// Fractional tolerance used when testing whether price has "touched" a
    /// level (e.g. a Fibonacci retracement or support/resistance zone).
    #[serde(default = "default_touch_tolerance")]
    pub touch_tolerance: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ema_period: default_ema_period(),
            fib_period: default_fib_period(),
            atr_period: default_atr_period(),
            tp_atr_mult: default_tp_atr_mult(),
            sl_atr_mult: default_sl_atr_mult(),
            touch_tolerance: default_touch_tolerance(),
        }
    }
}

fn default_streak_lo() -> i64 {
    -3
}

fn default_streak_hi() -> i64 {
    3
}

fn default_atr_pct_threshold() -> f64 {
    0.0
}

fn default_position_qty() -> f64 {
    1.0
}

fn default_max_consecutive_loss_months() -> u32 {
    2
}

fn default_enabled() -> bool {
    true
}

/// Per-(symbol, timeframe) gating applied before a strategy's signal is
/// allowed to fire: a streak band, an ATR-percentile ceiling, and a
/// consecutive-losing-month circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolFilter {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Signals are suppressed once the streak tracker falls to or below this
    /// (a losing streak too deep to chase).
    #[serde(default = "default_streak_lo")]
    pub streak_lo: i64,

    /// Signals are suppressed once the streak tracker rises to or above this
    /// (a winning streak too hot to extend).
    #[serde(default = "default_streak_hi")]
    pub streak_hi: i64,

    /// Signals are suppressed while current ATR sits below this percentile
    /// (in `[0, 1]`) of its historical distribution (volatility too thin).
    /// `0.0` disables the filter, since every percentile is `>= 0.0`.
    #[serde(default = "default_atr_pct_threshold")]
    pub atr_pct_threshold: f64,

    #[serde(default = "default_position_qty")]
    pub position_qty: f64,

    /// Consecutive losing months before this symbol/timeframe is disabled.
    #[serde(default = "default_max_consecutive_loss_months")]
    pub max_consecutive_loss_months: u32,
}

impl Default for SymbolFilter {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            streak_lo: default_streak_lo(),
            streak_hi: default_streak_hi(),
            atr_pct_threshold: default_atr_pct_threshold(),
            position_qty: default_position_qty(),
            max_consecutive_loss_months: default_max_consecutive_loss_months(),
        }
    }
}

fn default_target_timeframes() -> Vec<String> {
    vec!["3m".to_string(), "5m".to_string(), "15m".to_string()]
}

/// Top-level engine configuration, loaded once at startup and reloadable at
/// runtime via [`EngineConfig::load`]/[`EngineConfig::save`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Higher timeframes the aggregator folds 1m klines into.
    #[serde(default = "default_target_timeframes")]
    pub target_timeframes: Vec<String>,

    /// Filter settings keyed by `"{symbol}:{timeframe}"`.
    #[serde(default)]
    pub filters: HashMap<String, SymbolFilter>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyConfig::default(),
            target_timeframes: default_target_timeframes(),
            filters: HashMap::new(),
        }
    }
}

fn filter_key(symbol: &str, timeframe: &str) -> String {
    format!("{}:{}", symbol, timeframe)
}

impl EngineConfig {
    /// Look up the filter for a (symbol, timeframe), falling back to the
    /// default filter if none is configured for that pair.
    pub fn filter_for(&self, symbol: &str, timeframe: &str) -> SymbolFilter {
        self.filters
            .get(&filter_key(symbol, timeframe))
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_filter(&mut self, symbol: &str, timeframe: &str, filter: SymbolFilter) {
        self.filters.insert(filter_key(symbol, timeframe), filter);
    }

    /// Reject a config whose `filters` map names a `(symbol, timeframe)`
    /// pair the engine does not actually trade: `symbol` must be in
    /// `known_symbols` and `timeframe` must be `"1m"` or one of
    /// `target_timeframes`. Filter configuration referring to an unknown
    /// (symbol, timeframe) is a startup-time error; the process refuses
    /// to start.
    pub fn validate(&self, known_symbols: &[String]) -> Result<(), EngineError> {
        for key in self.filters.keys() {
            let Some((symbol, timeframe)) = key.split_once(':') else {
                return Err(EngineError::UnknownFilterTarget {
                    symbol: key.clone(),
                    timeframe: String::new(),
                });
            };
            let symbol_known = known_symbols.iter().any(|s| s == symbol);
            let timeframe_known = timeframe == "1m" || self.target_timeframes.iter().any(|t| t == timeframe);
            if !symbol_known || !timeframe_known {
                return Err(EngineError::UnknownFilterTarget {
                    symbol: symbol.to_string(),
                    timeframe: timeframe.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;
        info!(path = %path.display(), symbols = config.filters.len(), "engine config loaded");
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_strategy_config_matches_spec_constants() {
        let cfg = StrategyConfig::default();
        assert_eq!(cfg.ema_period, 50);
        assert_eq!(cfg.fib_period, 9);
        assert_eq!(cfg.atr_period, 9);
        assert!((cfg.tp_atr_mult - 2.0).abs() < f64::EPSILON);
        assert!((cfg.sl_atr_mult - 8.84).abs() < f64::EPSILON);
        assert!((cfg.touch_tolerance - 0.001).abs() < f64::EPSILON);
    }

    #[test]
    fn deserialize_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.strategy.ema_period, 50);
        assert_eq!(cfg.target_timeframes, vec!["3m", "5m", "15m"]);
    }

    #[test]
    fn filter_for_unknown_pair_uses_default() {
        let cfg = EngineConfig::default();
        let f = cfg.filter_for("BTCUSDT", "5m");
        assert!(f.enabled);
        assert_eq!(f.streak_lo, -3);
        assert_eq!(f.streak_hi, 3);
    }

    #[test]
    fn set_filter_then_filter_for_round_trips() {
        let mut cfg = EngineConfig::default();
        let custom = SymbolFilter {
            enabled: false,
            streak_lo: -5,
            streak_hi: 5,
            atr_pct_threshold: 90.0,
            position_qty: 2.5,
            max_consecutive_loss_months: 3,
        };
        cfg.set_filter("BTCUSDT", "5m", custom.clone());
        let got = cfg.filter_for("BTCUSDT", "5m");
        assert_eq!(got.enabled, custom.enabled);
        assert_eq!(got.streak_lo, custom.streak_lo);
        assert!((got.atr_pct_threshold - custom.atr_pct_threshold).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{ "strategy": { "ema_period": 21 } }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.strategy.ema_period, 21);
        assert_eq!(cfg.strategy.fib_period, 9);
    }

    #[test]
    fn validate_accepts_known_pair() {
        let mut cfg = EngineConfig::default();
        cfg.set_filter("BTCUSDT", "5m", SymbolFilter::default());
        assert!(cfg.validate(&["BTCUSDT".to_string()]).is_ok());
    }

    #[test]
    fn validate_accepts_1m_even_though_not_in_target_timeframes() {
        let mut cfg = EngineConfig::default();
        cfg.set_filter("BTCUSDT", "1m", SymbolFilter::default());
        assert!(cfg.validate(&["BTCUSDT".to_string()]).is_ok());
    }

    #[test]
    fn validate_rejects_unknown_symbol() {
        let mut cfg = EngineConfig::default();
        cfg.set_filter("DOGEUSDT", "5m", SymbolFilter::default());
        let err = cfg.validate(&["BTCUSDT".to_string()]).unwrap_err();
        assert!(matches!(err, EngineError::UnknownFilterTarget { .. }));
    }

    #[test]
    fn validate_rejects_unknown_timeframe() {
        let mut cfg = EngineConfig::default();
        cfg.set_filter("BTCUSDT", "45m", SymbolFilter::default());
        let err = cfg.validate(&["BTCUSDT".to_string()]).unwrap_err();
        assert!(matches!(err, EngineError::UnknownFilterTarget { .. }));
    }
}
