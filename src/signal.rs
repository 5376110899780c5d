// =============================================================================
// Signal data model — Direction, Outcome, SignalRecord, StreakTracker, Trade
// =============================================================================
//
// Deterministic id generation follows `core/strategy/base_signal.py`'s exact
// preimage: `sha256("{strategy}:{symbol}:{timeframe}:{ts}:{direction}")`
// truncated to 32 hex chars, where `ts` is the signal time formatted as
// `YYYYMMDDHHMMSSffffff` (the Python `strftime("%Y%m%d%H%M%S%f")` format) —
// not a raw Unix timestamp. Same inputs always hash to the same id, so a
// replay run reproduces the exact ids a live run would have assigned.
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Trade direction. The `i8` representation is the sign used in the id
/// preimage and in persisted `direction` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(self) -> i8 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Resolution state of a signal. `Timeout` is not a persisted state — a
/// timed-out signal stays `Active` forever; callers
/// infer "timed out" from `outcome == Active && now - signal_time >= 24h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Active,
    Tp,
    Sl,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Active => write!(f, "active"),
            Outcome::Tp => write!(f, "tp"),
            Outcome::Sl => write!(f, "sl"),
        }
    }
}

/// Format a timestamp the way the original Python `strftime("%Y%m%d%H%M%S%f")`
/// does: fixed-width `YYYYMMDDHHMMSS` followed by 6-digit microseconds.
fn microsecond_timestamp(t: DateTime<Utc>) -> String {
    format!(
        "{}{:06}",
        t.format("%Y%m%d%H%M%S"),
        t.timestamp_subsec_micros(),
    )
}

/// Compute the deterministic signal id for `(strategy, symbol, timeframe,
/// signal_time, direction)`. Identical inputs always produce identical ids.
pub fn signal_id(
    strategy: &str,
    symbol: &str,
    timeframe: &str,
    signal_time: DateTime<Utc>,
    direction: Direction,
) -> String {
    let ts = microsecond_timestamp(signal_time);
    let key = format!(
        "{strategy}:{symbol}:{timeframe}:{ts}:{}",
        direction.sign()
    );
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..32].to_string()
}

/// The emitted trading signal, common to every strategy.
/// Strategy-specific extras (e.g. EMA-Crossover's `ema_fast`/`ema_slow`) are
/// carried in `extra` rather than as dedicated fields, so this one record
/// type serves every registered strategy without an enum of signal shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: String,
    pub strategy: String,
    pub symbol: String,
    pub timeframe: String,
    pub signal_time: DateTime<Utc>,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub tp_price: Decimal,
    pub sl_price: Decimal,
    pub atr_at_signal: Decimal,
    pub max_atr: Decimal,
    pub streak_at_signal: i64,
    pub mae_ratio: Decimal,
    pub mfe_ratio: Decimal,
    pub outcome: Outcome,
    pub outcome_time: Option<DateTime<Utc>>,
    pub outcome_price: Option<Decimal>,
    /// Strategy-specific extras (e.g. `ema_fast`/`ema_slow`), keyed by name.
    #[serde(default)]
    pub extra: std::collections::BTreeMap<String, Decimal>,
}

#[allow(clippy::too_many_arguments)]
impl SignalRecord {
    pub fn new(
        strategy: impl Into<String>,
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        signal_time: DateTime<Utc>,
        direction: Direction,
        entry_price: Decimal,
        tp_price: Decimal,
        sl_price: Decimal,
        atr_at_signal: Decimal,
        streak_at_signal: i64,
    ) -> Self {
        let strategy = strategy.into();
        let symbol = symbol.into();
        let timeframe = timeframe.into();
        let id = signal_id(&strategy, &symbol, &timeframe, signal_time, direction);
        Self {
            id,
            strategy,
            symbol,
            timeframe,
            signal_time,
            direction,
            entry_price,
            tp_price,
            sl_price,
            atr_at_signal,
            max_atr: atr_at_signal,
            streak_at_signal,
            mae_ratio: Decimal::ZERO,
            mfe_ratio: Decimal::ZERO,
            outcome: Outcome::Active,
            outcome_time: None,
            outcome_price: None,
            extra: std::collections::BTreeMap::new(),
        }
    }

    /// Distance from entry to stop loss. Always strictly positive for a
    /// well-formed signal.
    pub fn risk_amount(&self) -> Decimal {
        match self.direction {
            Direction::Long => self.entry_price - self.sl_price,
            Direction::Short => self.sl_price - self.entry_price,
        }
    }

    /// Distance from entry to take profit.
    pub fn reward_amount(&self) -> Decimal {
        match self.direction {
            Direction::Long => self.tp_price - self.entry_price,
            Direction::Short => self.entry_price - self.tp_price,
        }
    }

    /// Check whether `entry < tp`/`sl < entry` (LONG) or the mirrored SHORT
    /// ordering holds, and that risk is strictly positive.
    pub fn is_well_formed(&self) -> bool {
        if self.risk_amount() <= Decimal::ZERO {
            return false;
        }
        match self.direction {
            Direction::Long => self.sl_price < self.entry_price && self.entry_price < self.tp_price,
            Direction::Short => self.tp_price < self.entry_price && self.entry_price < self.sl_price,
        }
    }

    /// Update MAE/MFE ratios given a current price; both are monotonically
    /// non-decreasing while the signal is ACTIVE. No-op once the signal has
    /// resolved or if risk is zero.
    pub fn update_mae(&mut self, current_price: Decimal) {
        if self.outcome != Outcome::Active {
            return;
        }
        let risk = self.risk_amount();
        if risk == Decimal::ZERO {
            return;
        }

        let (adverse, favorable) = match self.direction {
            Direction::Long => (
                self.entry_price - current_price,
                current_price - self.entry_price,
            ),
            Direction::Short => (
                current_price - self.entry_price,
                self.entry_price - current_price,
            ),
        };

        let adverse_ratio = adverse / risk;
        let favorable_ratio = favorable / risk;

        if adverse_ratio > self.mae_ratio {
            self.mae_ratio = adverse_ratio;
        }
        if favorable_ratio > self.mfe_ratio {
            self.mfe_ratio = favorable_ratio;
        }
    }

    /// First-touch outcome check against a single traded price (live tick
    /// path). Returns `true` if the outcome changed. Live trading resolves
    /// by first touch; the bar-sweep path
    /// ([`crate::outcome::OutcomeTracker::check_kline`]) resolves
    /// pessimistically instead — the two intentionally differ by mode.
    pub fn check_outcome(&mut self, price: Decimal, timestamp: DateTime<Utc>) -> bool {
        if self.outcome != Outcome::Active {
            return false;
        }
        let hit = match self.direction {
            Direction::Long => {
                if price >= self.tp_price {
                    Some(Outcome::Tp)
                } else if price <= self.sl_price {
                    Some(Outcome::Sl)
                } else {
                    None
                }
            }
            Direction::Short => {
                if price <= self.tp_price {
                    Some(Outcome::Tp)
                } else if price >= self.sl_price {
                    Some(Outcome::Sl)
                } else {
                    None
                }
            }
        };
        match hit {
            Some(outcome) => {
                self.outcome = outcome;
                self.outcome_time = Some(timestamp);
                self.outcome_price = Some(price);
                true
            }
            None => false,
        }
    }
}

/// An immutable aggregated trade from the exchange feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub agg_trade_id: i64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub timestamp: DateTime<Utc>,
    pub is_buyer_maker: bool,
}

/// Per-(symbol, timeframe) win/loss streak counter. Positive values are win
/// streaks, negative are loss streaks; `record_outcome` follows
/// `StreakTracker.record_outcome` in `core/models/signal.py`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StreakTracker {
    pub current_streak: i64,
    pub total_wins: i64,
    pub total_losses: i64,
}

impl StreakTracker {
    pub fn record_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Tp => {
                self.total_wins += 1;
                self.current_streak = if self.current_streak >= 0 {
                    self.current_streak + 1
                } else {
                    1
                };
            }
            Outcome::Sl => {
                self.total_losses += 1;
                self.current_streak = if self.current_streak <= 0 {
                    self.current_streak - 1
                } else {
                    -1
                };
            }
            Outcome::Active => {}
        }
    }

    pub fn win_rate(&self) -> f64 {
        let total = self.total_wins + self.total_losses;
        if total == 0 {
            0.0
        } else {
            self.total_wins as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn deterministic_id_matches_known_vector() {
        // msr_retest_capture / BTCUSDT / 5m / 2025-06-01T00:05:00Z / LONG
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 0, 5, 0).unwrap();
        let id = signal_id("msr_retest_capture", "BTCUSDT", "5m", t, Direction::Long);

        let expected_key = "msr_retest_capture:BTCUSDT:5m:20250601000500000000:1";
        let digest = Sha256::digest(expected_key.as_bytes());
        let expected = hex::encode(digest)[..32].to_string();

        assert_eq!(id, expected);
        assert_eq!(id.len(), 32);
    }

    #[test]
    fn same_inputs_same_id() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let a = signal_id("msr_retest_capture", "ETHUSDT", "15m", t, Direction::Short);
        let b = signal_id("msr_retest_capture", "ETHUSDT", "15m", t, Direction::Short);
        assert_eq!(a, b);
    }

    #[test]
    fn different_strategy_different_id() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let a = signal_id("msr_retest_capture", "ETHUSDT", "15m", t, Direction::Short);
        let b = signal_id("ema_crossover", "ETHUSDT", "15m", t, Direction::Short);
        assert_ne!(a, b);
    }

    fn long_signal() -> SignalRecord {
        SignalRecord::new(
            "msr_retest_capture",
            "BTCUSDT",
            "5m",
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Direction::Long,
            dec!(50000),
            dec!(50500),
            dec!(49500),
            dec!(100),
            0,
        )
    }

    #[test]
    fn well_formed_long_signal() {
        assert!(long_signal().is_well_formed());
        assert_eq!(long_signal().risk_amount(), dec!(500));
        assert_eq!(long_signal().reward_amount(), dec!(500));
    }

    #[test]
    fn mae_mfe_ratios_track_adverse_and_favorable_excursion() {
        // kline: open=50000, high=50600, low=49900, close=50400
        let mut s = long_signal();
        s.update_mae(dec!(49900));
        s.update_mae(dec!(50600));
        assert_eq!(s.mae_ratio, dec!(100) / dec!(500));
        assert_eq!(s.mfe_ratio, dec!(600) / dec!(500));
    }

    #[test]
    fn mae_mfe_non_decreasing() {
        let mut s = long_signal();
        s.update_mae(dec!(49950));
        let mae1 = s.mae_ratio;
        s.update_mae(dec!(49999)); // less adverse than before
        assert!(s.mae_ratio >= mae1);
    }

    #[test]
    fn streak_tracker_sequence() {
        // [TP, TP, SL] => {current_streak=-1, wins=2, losses=1}
        let mut t = StreakTracker::default();
        t.record_outcome(Outcome::Tp);
        t.record_outcome(Outcome::Tp);
        t.record_outcome(Outcome::Sl);
        assert_eq!(t.current_streak, -1);
        assert_eq!(t.total_wins, 2);
        assert_eq!(t.total_losses, 1);
    }

    #[test]
    fn check_outcome_short_tp() {
        let mut s = SignalRecord::new(
            "msr_retest_capture",
            "BTCUSDT",
            "5m",
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Direction::Short,
            dec!(50000),
            dec!(49500),
            dec!(50500),
            dec!(100),
            0,
        );
        let changed = s.check_outcome(dec!(49400), Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap());
        assert!(changed);
        assert_eq!(s.outcome, Outcome::Tp);
    }
}
