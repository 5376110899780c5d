// =============================================================================
// Strategy runtime — protocol, registry, position lock
// =============================================================================
//
// A process-wide registry maps a strategy name to a constructor, mirroring
// `core/strategy/registry.py`'s `register_strategy`/`create_strategy`
// decorator pattern as a statically typed constructor table. Concrete
// strategies live in sibling modules (`msr`,
// `ema_crossover`); both implement the [`Strategy`] trait below.
// =============================================================================

pub mod ema_crossover;
pub mod msr;
pub mod registry;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::kline::{Kline, KlineBuffer};
use crate::signal::{Outcome, SignalRecord};

pub use registry::StrategyRegistry;

/// Result of processing one closed bar: an optional newly emitted signal and
/// the current indicator ATR (used by the outcome tracker to keep
/// `max_atr` current on every active signal for this pair).
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    pub signal: Option<SignalRecord>,
    pub atr: Option<f64>,
}

/// Async callback invoked for every newly emitted signal.
pub type SignalCallback = std::sync::Arc<dyn Fn(&SignalRecord) + Send + Sync>;

/// Interface every concrete strategy implements.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn required_indicators(&self) -> Vec<&'static str>;

    /// Load streak state for every (symbol, timeframe) in this strategy's
    /// filter set from the cache, and active signals from the signal store
    /// to rebuild position locks. Called once at startup.
    async fn init(&self) -> anyhow::Result<()>;

    /// Process one closed bar and optionally emit a signal.
    async fn process_kline(&self, kline: &Kline, buffer: &KlineBuffer) -> ProcessResult;

    /// Update streak state for a resolved pair, persist it, and release the
    /// position lock.
    async fn record_outcome(
        &self,
        outcome: Outcome,
        symbol: &str,
        timeframe: &str,
    ) -> anyhow::Result<()>;

    /// Idempotent lock release (used on timeout).
    fn release_position(&self, symbol: &str, timeframe: &str);

    fn on_signal(&self, callback: SignalCallback);
    fn off_signal(&self, callback: SignalCallback);
}

/// Set of `(symbol, timeframe)` pairs with an outstanding active signal.
/// Emission under a held lock is silently skipped.
#[derive(Debug, Default)]
pub struct PositionLock {
    held: HashSet<(String, String)>,
}

impl PositionLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, symbol: &str, timeframe: &str) -> bool {
        self.held.contains(&(symbol.to_string(), timeframe.to_string()))
    }

    /// Acquire the lock; returns `false` (no-op) if already held.
    pub fn acquire(&mut self, symbol: &str, timeframe: &str) -> bool {
        self.held.insert((symbol.to_string(), timeframe.to_string()))
    }

    /// Idempotent release.
    pub fn release(&mut self, symbol: &str, timeframe: &str) {
        self.held.remove(&(symbol.to_string(), timeframe.to_string()));
    }
}
