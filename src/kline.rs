// =============================================================================
// Kline (candlestick) data model and bounded per-(symbol, timeframe) buffer
// =============================================================================
//
// Prices and volume are `Decimal` — this is the persistence/entry boundary,
// decimal on the money side, float on the indicator hot path. Buffers
// hold klines in ascending timestamp order and support the in-place update of
// an unclosed bar, mirroring the ring-buffer discipline in
// `market_data/candle_buffer.rs`, adapted to ordered `Vec` + timestamp keying
// instead of a `VecDeque` keyed by symbol/interval map (this buffer is owned
// per (symbol, timeframe) by its strategy runner, not shared across keys).
// =============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Default bound on the number of klines retained per buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 200;

/// Minutes-per-bar lookup for every timeframe the engine understands.
pub fn timeframe_minutes(timeframe: &str) -> Option<i64> {
    match timeframe {
        "1m" => Some(1),
        "3m" => Some(3),
        "5m" => Some(5),
        "15m" => Some(15),
        "30m" => Some(30),
        _ => None,
    }
}

/// An immutable OHLCV bar for a (symbol, timeframe, timestamp).
///
/// Invariants (checked by [`Kline::validate`]):
/// `low <= min(open, close) <= max(open, close) <= high`; all prices
/// strictly positive; `timestamp` is the bar's *open* time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub symbol: String,
    pub timeframe: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    #[serde(default = "default_true")]
    pub is_closed: bool,
}

fn default_true() -> bool {
    true
}

impl Kline {
    /// Validate the OHLC invariants and positivity. A kline failing this is
    /// dropped by ingestion with a warning — never enters a buffer.
    pub fn is_valid(&self) -> bool {
        if self.open <= Decimal::ZERO
            || self.high <= Decimal::ZERO
            || self.low <= Decimal::ZERO
            || self.close <= Decimal::ZERO
            || self.volume < Decimal::ZERO
        {
            return false;
        }
        let body_max = self.open.max(self.close);
        let body_min = self.open.min(self.close);
        self.low <= body_min && body_max <= self.high
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Floor this kline's open time to the start of its `timeframe` bucket.
    /// Only meaningful for 1m klines being folded into a higher timeframe.
    pub fn bucket_start(&self, tf_minutes: i64) -> DateTime<Utc> {
        bucket_start_for(self.timestamp, tf_minutes)
    }
}

/// Floor `timestamp` to the start of the `tf_minutes`-wide bucket containing
/// it: `bucket_start = floor(timestamp / tf_minutes) * tf_minutes`.
pub fn bucket_start_for(timestamp: DateTime<Utc>, tf_minutes: i64) -> DateTime<Utc> {
    let epoch_minutes = timestamp.timestamp() / 60;
    let bucket_minutes = (epoch_minutes.div_euclid(tf_minutes)) * tf_minutes;
    DateTime::<Utc>::from_timestamp(bucket_minutes * 60, 0).expect("bucket timestamp in range")
}

/// Ordered, bounded window of recent klines for one (symbol, timeframe).
///
/// `add` replaces the last entry in place when the incoming kline shares its
/// timestamp (the bar is still open and was just updated), drops klines
/// older than the last entry, and otherwise appends and truncates from the
/// front to `max_size` — matching `KlineBuffer.add` in `core/models/kline.py`.
#[derive(Debug, Clone)]
pub struct KlineBuffer {
    pub symbol: String,
    pub timeframe: String,
    pub max_size: usize,
    klines: Vec<Kline>,
}

impl KlineBuffer {
    pub fn new(symbol: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self::with_capacity(symbol, timeframe, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        max_size: usize,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            max_size,
            klines: Vec::new(),
        }
    }

    /// Add a kline, maintaining ascending order and the max-size bound.
    pub fn add(&mut self, kline: Kline) {
        match self.klines.last() {
            None => self.klines.push(kline),
            Some(last) => {
                if kline.timestamp == last.timestamp {
                    *self.klines.last_mut().unwrap() = kline;
                    return;
                } else if kline.timestamp < last.timestamp {
                    // Strictly older than what we have — drop.
                    return;
                }
                self.klines.push(kline);
            }
        }
        if self.klines.len() > self.max_size {
            let excess = self.klines.len() - self.max_size;
            self.klines.drain(0..excess);
        }
    }

    /// Fold a chronologically-ascending run of historical klines into the
    /// buffer without any special emission side effects — used to prefill
    /// from the persistent store after a crash.
    pub fn prefill_from_history(&mut self, klines: impl IntoIterator<Item = Kline>) {
        for k in klines {
            self.add(k);
        }
    }

    pub fn len(&self) -> usize {
        self.klines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.klines.is_empty()
    }

    pub fn last(&self) -> Option<&Kline> {
        self.klines.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Kline> {
        self.klines.iter()
    }

    pub fn opens(&self) -> Vec<f64> {
        self.klines.iter().map(|k| to_f64(k.open)).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.klines.iter().map(|k| to_f64(k.high)).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.klines.iter().map(|k| to_f64(k.low)).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.klines.iter().map(|k| to_f64(k.close)).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.klines.iter().map(|k| to_f64(k.volume)).collect()
    }
}

fn to_f64(d: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    d.to_f64().unwrap_or(f64::NAN)
}

/// Raise (rather than silently drop) when a fatal precondition is violated.
/// Used by the aggregator, which treats non-1m/out-of-order input as a
/// programmer error.
pub fn require_one_minute(kline: &Kline) -> Result<(), EngineError> {
    if kline.timeframe != "1m" {
        return Err(EngineError::NonOneMinuteKline {
            symbol: kline.symbol.clone(),
            timeframe: kline.timeframe.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(mins: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(mins * 60, 0).unwrap()
    }

    fn sample(mins: i64, close: Decimal) -> Kline {
        Kline {
            symbol: "BTCUSDT".into(),
            timeframe: "1m".into(),
            timestamp: ts(mins),
            open: close,
            high: close + dec!(1),
            low: close - dec!(1),
            close,
            volume: dec!(10),
            is_closed: true,
        }
    }

    #[test]
    fn valid_kline_invariants() {
        let k = sample(0, dec!(100));
        assert!(k.is_valid());
    }

    #[test]
    fn invalid_kline_high_below_body() {
        let mut k = sample(0, dec!(100));
        k.high = dec!(99);
        assert!(!k.is_valid());
    }

    #[test]
    fn invalid_kline_negative_volume() {
        let mut k = sample(0, dec!(100));
        k.volume = dec!(-1);
        assert!(!k.is_valid());
    }

    #[test]
    fn buffer_appends_in_order() {
        let mut buf = KlineBuffer::new("BTCUSDT", "1m");
        buf.add(sample(0, dec!(100)));
        buf.add(sample(1, dec!(101)));
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.closes(), vec![100.0, 101.0]);
    }

    #[test]
    fn buffer_replaces_same_timestamp() {
        let mut buf = KlineBuffer::new("BTCUSDT", "1m");
        buf.add(sample(0, dec!(100)));
        buf.add(sample(0, dec!(105)));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.closes(), vec![105.0]);
    }

    #[test]
    fn buffer_drops_out_of_order() {
        let mut buf = KlineBuffer::new("BTCUSDT", "1m");
        buf.add(sample(5, dec!(100)));
        buf.add(sample(2, dec!(50)));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.closes(), vec![100.0]);
    }

    #[test]
    fn buffer_truncates_from_front() {
        let mut buf = KlineBuffer::with_capacity("BTCUSDT", "1m", 3);
        for i in 0..5 {
            buf.add(sample(i, Decimal::from(100 + i)));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.closes(), vec![102.0, 103.0, 104.0]);
    }

    #[test]
    fn bucket_start_floors_correctly() {
        let t = Utc.timestamp_opt(7 * 60 + 30, 0).unwrap(); // 00:07:30
        let bucket = bucket_start_for(t, 5);
        assert_eq!(bucket, Utc.timestamp_opt(5 * 60, 0).unwrap());
    }
}
