// =============================================================================
// EMA-Crossover strategy
// =============================================================================
//
// Signals on the bar where the fast EMA crosses the slow EMA: LONG when the
// previous bar had `ema_fast <= ema_slow` and the current bar has
// `ema_fast > ema_slow`; SHORT on the mirrored cross. Grounded on
// `core/strategy/ema_crossover/models.py` for the config/signal field
// shapes (`fast_period`, `slow_period`, `atr_period`, `tp_atr_mult`,
// `sl_atr_mult`, and the `ema_fast`/`ema_slow` signal extras); the
// crossing rule itself is built directly from that field shape, since
// that strategy's `generator.py` was not part of the retrieved source.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::collaborators::{SignalRepository, StreakCache};
use crate::config::SymbolFilter;
use crate::error::EngineError;
use crate::indicators::{ema, wilder_atr};
use crate::kline::{Kline, KlineBuffer};
use crate::signal::{Direction, Outcome, SignalRecord, StreakTracker};

use super::{PositionLock, ProcessResult, SignalCallback, Strategy};

pub const EMA_CROSSOVER_STRATEGY_NAME: &str = "ema_crossover";

/// Tunable parameters specific to EMA-Crossover (distinct from
/// [`crate::config::StrategyConfig`], which covers MSR).
#[derive(Debug, Clone)]
pub struct EmaCrossoverConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    pub atr_period: usize,
    pub tp_atr_mult: f64,
    pub sl_atr_mult: f64,
}

impl Default for EmaCrossoverConfig {
    fn default() -> Self {
        Self {
            fast_period: 20,
            slow_period: 50,
            atr_period: 9,
            tp_atr_mult: 2.0,
            sl_atr_mult: 4.0,
        }
    }
}

pub struct EmaCrossoverStrategy {
    config: EmaCrossoverConfig,
    filters: HashMap<(String, String), SymbolFilter>,
    streaks: RwLock<HashMap<(String, String), StreakTracker>>,
    lock: RwLock<PositionLock>,
    atr_tracker: Arc<RwLock<crate::atr_tracker::AtrPercentileTracker>>,
    streak_cache: Option<Arc<dyn StreakCache>>,
    signal_repo: Option<Arc<dyn SignalRepository>>,
    observers: RwLock<Vec<SignalCallback>>,
}

impl EmaCrossoverStrategy {
    pub fn new(config: EmaCrossoverConfig) -> Self {
        Self {
            config,
            filters: HashMap::new(),
            streaks: RwLock::new(HashMap::new()),
            lock: RwLock::new(PositionLock::new()),
            atr_tracker: Arc::new(RwLock::new(crate::atr_tracker::AtrPercentileTracker::new())),
            streak_cache: None,
            signal_repo: None,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn with_collaborators(
        config: EmaCrossoverConfig,
        filters: HashMap<(String, String), SymbolFilter>,
        atr_tracker: Arc<RwLock<crate::atr_tracker::AtrPercentileTracker>>,
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

    fn filter_for(&self, symbol: &str, timeframe: &str) -> Result<SymbolFilter, EngineError> {
        self.filters
            .get(&(symbol.to_string(), timeframe.to_string()))
            .cloned()
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

fn dec(x: f64) -> Decimal {
    Decimal::from_f64(x).unwrap_or(Decimal::ZERO)
}

#[async_trait]
impl Strategy for EmaCrossoverStrategy {
    fn name(&self) -> &str {
        EMA_CROSSOVER_STRATEGY_NAME
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn required_indicators(&self) -> Vec<&'static str> {
        vec!["ema_fast", "ema_slow", "atr"]
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
        let required = self.config.slow_period.max(self.config.atr_period);
        if buffer.len() <= required + 1 {
            // need a previous bar's EMA pair to detect a cross
            return ProcessResult::default();
        }

        let closes = buffer.closes();
        let highs = buffer.highs();
        let lows = buffer.lows();

        let fast_series = ema(&closes, self.config.fast_period);
        let slow_series = ema(&closes, self.config.slow_period);
        let atr_series = wilder_atr(&highs, &lows, &closes, self.config.atr_period);

        let n = closes.len();
        let fast_now = fast_series[n - 1];
        let slow_now = slow_series[n - 1];
        let fast_prev = fast_series[n - 2];
        let slow_prev = slow_series[n - 2];
        let atr = atr_series[n - 1];

        if [fast_now, slow_now, fast_prev, slow_prev, atr]
            .iter()
            .any(|v| v.is_nan())
        {
            return ProcessResult::default();
        }

        let direction = if fast_prev <= slow_prev && fast_now > slow_now {
            Some(Direction::Long)
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            Some(Direction::Short)
        } else {
            None
        };

        self.atr_tracker
            .write()
            .update(&kline.symbol, &kline.timeframe, atr);

        let Some(direction) = direction else {
            return ProcessResult {
                signal: None,
                atr: Some(atr),
            };
        };

        let filter = match self.filter_for(&kline.symbol, &kline.timeframe) {
            Ok(f) => f,
            Err(_) => {
                return ProcessResult {
                    signal: None,
                    atr: Some(atr),
                }
            }
        };
        if !filter.enabled || self.lock.read().is_held(&kline.symbol, &kline.timeframe) {
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
        if let Some(pct) =
            self.atr_tracker
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
        signal.extra.insert("ema_fast".to_string(), dec(fast_now));
        signal.extra.insert("ema_slow".to_string(), dec(slow_now));

        self.lock.write().acquire(&kline.symbol, &kline.timeframe);
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
