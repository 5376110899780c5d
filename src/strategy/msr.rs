// =============================================================================
// MSR-Retest-Capture strategy
// =============================================================================
//
// Support/resistance retest strategy: four candidate levels (three
// Fibonacci retracements plus session VWAP) are partitioned around the
// current close, and an entry fires when price retests the nearest level
// from the trend side indicated by EMA50. Level partitioning mirrors
// `core/strategy/msr/level_manager.py`'s `LevelManager.get_levels` /
// `get_nearest_levels`; this strategy uses exact price comparison (no touch
// tolerance), matching the published Pine Script the level manager's own
// docstring calls out.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::atr_tracker::AtrPercentileTracker;
use crate::collaborators::{SignalRepository, StreakCache};
use crate::config::{StrategyConfig, SymbolFilter};
use crate::error::EngineError;
use crate::indicators::{ema, fibonacci_levels, vwap, wilder_atr};
use crate::kline::{Kline, KlineBuffer};
use crate::signal::{Direction, Outcome, SignalRecord, StreakTracker};

use super::{PositionLock, ProcessResult, SignalCallback, Strategy};

pub const MSR_STRATEGY_NAME: &str = "msr_retest_capture";

pub struct MsrStrategy {
    config: StrategyConfig,
    filters: HashMap<(String, String), SymbolFilter>,
    streaks: RwLock<HashMap<(String, String), StreakTracker>>,
    lock: RwLock<PositionLock>,
    atr_tracker: Arc<RwLock<AtrPercentileTracker>>,
    streak_cache: Option<Arc<dyn StreakCache>>,
    signal_repo: Option<Arc<dyn SignalRepository>>,
    observers: RwLock<Vec<SignalCallback>>,
}

impl MsrStrategy {
    /// Minimal constructor for standalone use and registry wiring: no
    /// persistence collaborators, a fresh in-process ATR tracker, and an
    /// empty filter set (every (symbol, timeframe) must be registered with
    /// [`Self::set_filter`] before klines for it are processed).
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            filters: HashMap::new(),
            streaks: RwLock::new(HashMap::new()),
            lock: RwLock::new(PositionLock::new()),
            atr_tracker: Arc::new(RwLock::new(AtrPercentileTracker::new())),
            streak_cache: None,
            signal_repo: None,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn with_collaborators(
        config: StrategyConfig,
        filters: HashMap<(String, String), SymbolFilter>,
        atr_tracker: Arc<RwLock<AtrPercentileTracker>>,
        streak_cache: Arc<dyn StreakCache>,
        signal_repo: Arc<dyn SignalRepository>,
    ) -> Self {
        Self {
            config,
            filters,
            streaks: RwLock::new(HashMap::new()),
            lock: RwLock::new(PositionLock::new()),
            atr_tracker,
            streak_cache: Some(streak_cache),
            signal_repo: Some(signal_repo),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn set_filter(&mut self, symbol: &str, timeframe: &str, filter: SymbolFilter) {
        self.filters
            .insert((symbol.to_string(), timeframe.to_string()), filter);
    }

    fn filter_for(&self, symbol: &str, timeframe: &str) -> Result<&SymbolFilter, EngineError> {
        self.filters
            .get(&(symbol.to_string(), timeframe.to_string()))
            .ok_or_else(|| EngineError::UnknownFilterTarget {
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
            })
    }

    fn current_streak(&self, symbol: &str, timeframe: &str) -> i64 {
        self.streaks
            .read()
            .get(&(symbol.to_string(), timeframe.to_string()))
            .map(|t| t.current_streak)
            .unwrap_or(0)
    }
}

fn nearest_support(support: &[f64], close: f64) -> Option<f64> {
    support
        .iter()
        .copied()
        .filter(|&lvl| lvl < close)
        .fold(None, |acc, lvl| match acc {
            None => Some(lvl),
            Some(best) if lvl > best => Some(lvl),
            some => some,
        })
}

fn nearest_resistance(resistance: &[f64], close: f64) -> Option<f64> {
    resistance
        .iter()
        .copied()
        .filter(|&lvl| lvl > close)
        .fold(None, |acc, lvl| match acc {
            None => Some(lvl),
            Some(best) if lvl < best => Some(lvl),
            some => some,
        })
}

fn dec(x: f64) -> Decimal {
    Decimal::from_f64(x).unwrap_or(Decimal::ZERO)
}

#[async_trait]
impl Strategy for MsrStrategy {
    fn name(&self) -> &str {
        MSR_STRATEGY_NAME
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn required_indicators(&self) -> Vec<&'static str> {
        vec!["ema50", "atr", "fib_382", "fib_500", "fib_618", "vwap"]
    }

    async fn init(&self) -> anyhow::Result<()> {
        if let Some(cache) = &self.streak_cache {
            let loaded = cache.load_all().await?;
            *self.streaks.write() = loaded;
        }
        if let Some(repo) = &self.signal_repo {
            let active = repo.get_active(None, None).await?;
            let mut lock = self.lock.write();
            for s in active {
                lock.acquire(&s.symbol, &s.timeframe);
            }
        }
        Ok(())
    }

    async fn process_kline(&self, kline: &Kline, buffer: &KlineBuffer) -> ProcessResult {
        let required = self
            .config
            .ema_period
            .max(self.config.fib_period)
            .max(self.config.atr_period);
        if buffer.len() <= required {
            return ProcessResult::default();
        }

        let closes = buffer.closes();
        let highs = buffer.highs();
        let lows = buffer.lows();
        let volumes = buffer.volumes();

        let ema50 = *ema(&closes, self.config.ema_period).last().unwrap();
        let atr = *wilder_atr(&highs, &lows, &closes, self.config.atr_period)
            .last()
            .unwrap();
        let vwap_series = vwap(&highs, &lows, &closes, &volumes);
        let vwap_value = *vwap_series.last().unwrap();
        let fib = *fibonacci_levels(&highs, &lows, self.config.fib_period)
            .last()
            .unwrap();

        if ema50.is_nan() || atr.is_nan() || vwap_value.is_nan() || fib.is_nan() {
            return ProcessResult::default();
        }

        self.atr_tracker
            .write()
            .update(&kline.symbol, &kline.timeframe, atr);

        let close = closes[closes.len() - 1];
        let candidates = [fib.fib_382, fib.fib_500, fib.fib_618, vwap_value];
        let mut support = Vec::new();
        let mut resistance = Vec::new();
        for &level in &candidates {
            if close < level {
                resistance.push(level);
            } else {
                support.push(level);
            }
        }

        let nearest_support = nearest_support(&support, close);
        let nearest_resistance = nearest_resistance(&resistance, close);

        let trend_up = close > ema50;
        let trend_down = close < ema50;

        let low = kline.low.to_f64().unwrap_or(f64::NAN);
        let high = kline.high.to_f64().unwrap_or(f64::NAN);

        let direction = if trend_up
            && nearest_support
                .map(|lvl| low <= lvl && close > lvl)
                .unwrap_or(false)
        {
            Some(Direction::Long)
        } else if trend_down
            && nearest_resistance
                .map(|lvl| high >= lvl && close < lvl)
                .unwrap_or(false)
        {
            Some(Direction::Short)
        } else {
            None
        };

        let Some(direction) = direction else {
            return ProcessResult {
                signal: None,
                atr: Some(atr),
            };
        };

        // --- filters -------------------------------------------------------
        let filter = match self.filter_for(&kline.symbol, &kline.timeframe) {
            Ok(f) => f.clone(),
            Err(_) => {
                return ProcessResult {
                    signal: None,
                    atr: Some(atr),
                }
            }
        };
        if !filter.enabled {
            return ProcessResult {
                signal: None,
                atr: Some(atr),
            };
        }
        if self.lock.read().is_held(&kline.symbol, &kline.timeframe) {
            return ProcessResult {
                signal: None,
                atr: Some(atr),
            };
        }
        let streak = self.current_streak(&kline.symbol, &kline.timeframe);
        if streak < filter.streak_lo || streak > filter.streak_hi {
            return ProcessResult {
                signal: None,
                atr: Some(atr),
            };
        }
        if let Some(pct) = self
            .atr_tracker
            .read()
            .get_percentile(&kline.symbol, &kline.timeframe, atr)
        {
            if pct < filter.atr_pct_threshold {
                return ProcessResult {
                    signal: None,
                    atr: Some(atr),
                };
            }
        }

        // --- sizing ----------------------------------------------------------
        let risk = dec(self.config.sl_atr_mult * atr);
        let reward = dec(self.config.tp_atr_mult * atr);
        let entry_price = kline.close;
        let (tp_price, sl_price) = match direction {
            Direction::Long => (entry_price + reward, entry_price - risk),
            Direction::Short => (entry_price - reward, entry_price + risk),
        };

        let mut signal = SignalRecord::new(
            self.name(),
            &kline.symbol,
            &kline.timeframe,
            kline.timestamp,
            direction,
            entry_price,
            tp_price,
            sl_price,
            dec(atr),
            streak,
        );
        signal.extra.insert("ema50".to_string(), dec(ema50));
        signal.extra.insert("vwap".to_string(), dec(vwap_value));

        self.lock
            .write()
            .acquire(&kline.symbol, &kline.timeframe);

        for cb in self.observers.read().iter() {
            cb(&signal);
        }

        ProcessResult {
            signal: Some(signal),
            atr: Some(atr),
        }
    }

    async fn record_outcome(
        &self,
        outcome: Outcome,
        symbol: &str,
        timeframe: &str,
    ) -> anyhow::Result<()> {
        let tracker = {
            let mut streaks = self.streaks.write();
            let entry = streaks
                .entry((symbol.to_string(), timeframe.to_string()))
                .or_default();
            entry.record_outcome(outcome);
            *entry
        };
        if let Some(cache) = &self.streak_cache {
            cache.save(symbol, timeframe, tracker).await?;
        }
        self.lock.write().release(symbol, timeframe);
        Ok(())
    }

    fn release_position(&self, symbol: &str, timeframe: &str) {
        self.lock.write().release(symbol, timeframe);
    }

    fn on_signal(&self, callback: SignalCallback) {
        self.observers.write().push(callback);
    }

    fn off_signal(&self, callback: SignalCallback) {
        self.observers
            .write()
            .retain(|cb| !Arc::ptr_eq(cb, &callback));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn k(mins: i64, open: f64, high: f64, low: f64, close: f64, vol: f64) -> Kline {
        Kline {
            symbol: "BTCUSDT".into(),
            timeframe: "5m".into(),
            timestamp: Utc.timestamp_opt(mins * 300, 0).unwrap(),
            open: dec(open),
            high: dec(high),
            low: dec(low),
            close: dec(close),
            volume: dec(vol),
            is_closed: true,
        }
    }

    fn strategy_with_default_filter() -> MsrStrategy {
        let mut s = MsrStrategy::new(StrategyConfig {
            ema_period: 3,
            fib_period: 3,
            atr_period: 3,
            tp_atr_mult: 2.0,
            sl_atr_mult: 8.84,
            touch_tolerance: 0.001,
        });
        s.set_filter("BTCUSDT", "5m", SymbolFilter::default());
        s
    }

    #[tokio::test]
    async fn insufficient_history_is_noop() {
        let strategy = strategy_with_default_filter();
        let mut buf = KlineBuffer::new("BTCUSDT", "5m");
        let bar = k(0, 100.0, 101.0, 99.0, 100.0, 10.0);
        buf.add(bar.clone());
        let result = strategy.process_kline(&bar, &buf).await;
        assert!(result.signal.is_none());
    }

    #[tokio::test]
    async fn unknown_filter_target_is_noop_not_panic() {
        let strategy = MsrStrategy::new(StrategyConfig {
            ema_period: 2,
            fib_period: 2,
            atr_period: 2,
            ..StrategyConfig::default()
        });
        let mut buf = KlineBuffer::new("BTCUSDT", "5m");
        for i in 0..6 {
            let bar = k(i, 100.0, 101.0, 99.0, 100.0 + i as f64, 10.0);
            buf.add(bar.clone());
        }
        let last = buf.last().unwrap().clone();
        let result = strategy.process_kline(&last, &buf).await;
        assert!(result.signal.is_none());
    }

    #[tokio::test]
    async fn position_lock_suppresses_second_signal() {
        let strategy = strategy_with_default_filter();
        let mut lock = strategy.lock.write();
        lock.acquire("BTCUSDT", "5m");
        drop(lock);

        let mut buf = KlineBuffer::new("BTCUSDT", "5m");
        for i in 0..10 {
            let bar = k(i, 100.0, 105.0, 95.0, 100.0 + i as f64, 10.0);
            buf.add(bar);
        }
        let last = buf.last().unwrap().clone();
        let result = strategy.process_kline(&last, &buf).await;
        assert!(result.signal.is_none());
    }

    #[test]
    fn nearest_support_picks_max_below_close() {
        assert_eq!(nearest_support(&[90.0, 95.0, 80.0], 100.0), Some(95.0));
        assert_eq!(nearest_support(&[110.0], 100.0), None);
    }

    #[test]
    fn nearest_resistance_picks_min_above_close() {
        assert_eq!(nearest_resistance(&[110.0, 105.0, 120.0], 100.0), Some(105.0));
        assert_eq!(nearest_resistance(&[90.0], 100.0), None);
    }
}
