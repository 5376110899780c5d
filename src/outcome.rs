// =============================================================================
// OutcomeTracker — resolves active signals against 1m bar sweeps
// =============================================================================
//
// Grounded directly on `backtest/outcome.py`'s `OutcomeTracker`: the same
// three-step order per active signal (timeout, then MAE/MFE, then
// TP/SL resolution with SL winning a same-bar tie), the same signal
// removal-on-resolve semantics, and the same `update_atr`/`finalize`
// shape. `process_trade` (the live first-touch path) has no source
// counterpart here — the kline-only `OutcomeTracker` is what was
// retrieved — so it is built to mirror the live ingestion path,
// delegating to [`SignalRecord::check_outcome`] for its first-touch rule.
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::signal::{Direction, Outcome, SignalRecord, Trade};

/// Signals unresolved for this long (relative to `signal_time`) are released
/// with `outcome == ACTIVE` rather than guessed at.
pub const DEFAULT_TIMEOUT_HOURS: i64 = 24;

/// Callback invoked whenever a signal resolves (TP/SL) or times out
/// (ACTIVE). Mirrors `OutcomeTracker.on_outcome` in the source; called
/// synchronously here since dispatch to async observers is the caller's
/// concern (the strategy runtime or a `SignalObserver` fan-out).
pub type OutcomeCallback<'a> = &'a mut dyn FnMut(&SignalRecord, Outcome);

pub struct OutcomeTracker {
    timeout_hours: i64,
    active_signals: Vec<SignalRecord>,
    resolved_count: u64,
}

impl Default for OutcomeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_HOURS)
    }
}

impl OutcomeTracker {
    pub fn new(timeout_hours: i64) -> Self {
        Self {
            timeout_hours,
            active_signals: Vec::new(),
            resolved_count: 0,
        }
    }

    pub fn add_signal(&mut self, signal: SignalRecord) {
        self.active_signals.push(signal);
    }

    pub fn active_count(&self) -> usize {
        self.active_signals.len()
    }

    pub fn resolved_count(&self) -> u64 {
        self.resolved_count
    }

    pub fn active_signals(&self) -> &[SignalRecord] {
        &self.active_signals
    }

    /// Check every active signal for `kline.symbol` against a closed 1m
    /// bar: timeout, then MAE/MFE update, then pessimistic TP/SL
    /// resolution. Resolved/timed-out signals are removed from the active
    /// set and reported through `on_outcome`.
    pub fn check_kline(
        &mut self,
        kline_symbol: &str,
        kline_timestamp: DateTime<Utc>,
        kline_high: Decimal,
        kline_low: Decimal,
        mut on_outcome: OutcomeCallback<'_>,
    ) {
        if self.active_signals.is_empty() {
            return;
        }

        let timeout_delta = Duration::hours(self.timeout_hours);
        let mut resolved_ids = Vec::new();

        for signal in self.active_signals.iter_mut() {
            if signal.symbol != kline_symbol {
                continue;
            }

            if kline_timestamp - signal.signal_time >= timeout_delta {
                resolved_ids.push(signal.id.clone());
                on_outcome(signal, Outcome::Active);
                continue;
            }

            match signal.direction {
                Direction::Long => {
                    signal.update_mae(kline_low);
                    signal.update_mae(kline_high);
                }
                Direction::Short => {
                    signal.update_mae(kline_high);
                    signal.update_mae(kline_low);
                }
            }

            if let Some(outcome) =
                resolve_outcome(signal, kline_high, kline_low, kline_timestamp)
            {
                resolved_ids.push(signal.id.clone());
                on_outcome(signal, outcome);
                self.resolved_count += 1;
            }
        }

        self.active_signals
            .retain(|s| !resolved_ids.contains(&s.id));
    }

    /// Live-tick path: first-touch resolution against a single traded
    /// price, for every active signal of `trade.symbol`.
    pub fn process_trade(&mut self, trade: &Trade, mut on_outcome: OutcomeCallback<'_>) {
        let mut resolved_ids = Vec::new();
        for signal in self.active_signals.iter_mut() {
            if signal.symbol != trade.symbol {
                continue;
            }
            signal.update_mae(trade.price);
            if signal.check_outcome(trade.price, trade.timestamp) {
                resolved_ids.push(signal.id.clone());
                on_outcome(signal, signal.outcome);
                self.resolved_count += 1;
            }
        }
        self.active_signals
            .retain(|s| !resolved_ids.contains(&s.id));
    }

    /// Raise `max_atr` for every active signal matching (symbol, timeframe).
    pub fn update_atr(&mut self, symbol: &str, timeframe: &str, current_atr: Decimal) {
        for signal in self.active_signals.iter_mut() {
            if signal.symbol == symbol
                && signal.timeframe == timeframe
                && signal.outcome == Outcome::Active
                && current_atr > signal.max_atr
            {
                signal.max_atr = current_atr;
            }
        }
    }

    /// Clear remaining active signals; they stay with `outcome == ACTIVE`.
    pub fn finalize(&mut self) {
        let remaining = self.active_signals.len();
        if remaining > 0 {
            info!(remaining, "finalizing unresolved signals (remain active)");
        }
        self.active_signals.clear();
    }
}

fn resolve_outcome(
    signal: &mut SignalRecord,
    kline_high: Decimal,
    kline_low: Decimal,
    kline_timestamp: DateTime<Utc>,
) -> Option<Outcome> {
    let (tp_hit, sl_hit) = match signal.direction {
        Direction::Long => (
            kline_high >= signal.tp_price,
            kline_low <= signal.sl_price,
        ),
        Direction::Short => (
            kline_low <= signal.tp_price,
            kline_high >= signal.sl_price,
        ),
    };

    let outcome = if tp_hit && sl_hit {
        Outcome::Sl
    } else if tp_hit {
        Outcome::Tp
    } else if sl_hit {
        Outcome::Sl
    } else {
        return None;
    };

    signal.outcome = outcome;
    signal.outcome_time = Some(kline_timestamp);
    signal.outcome_price = Some(match outcome {
        Outcome::Tp => signal.tp_price,
        _ => signal.sl_price,
    });
    Some(outcome)
}
