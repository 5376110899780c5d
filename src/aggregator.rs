// =============================================================================
// KlineAggregator — folds 1m closed klines into higher timeframes
// =============================================================================
//
// One `AggregationBuffer` per target timeframe holds the partially built bar.
// A 1m kline only ever closes the *previous* bucket once the *next* bucket is
// observed — the aggregator never emits on the last 1m of a bucket.
// Grounded on the teacher crate's ring-buffer style (`market_data/
// candle_buffer.rs`) for the per-key state-map shape, generalized from a
// single live-update ring to an emit-on-boundary fold.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::kline::{bucket_start_for, require_one_minute, timeframe_minutes, Kline};

/// The timeframes this aggregator can fold 1m klines into.
pub const SUPPORTED_TARGET_TIMEFRAMES: &[&str] = &["3m", "5m", "15m", "30m"];

#[derive(Debug, Clone)]
struct AggregationBuffer {
    bucket_start: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    count: u32,
}

impl AggregationBuffer {
    fn from_kline(bucket_start: DateTime<Utc>, k: &Kline) -> Self {
        Self {
            bucket_start,
            open: k.open,
            high: k.high,
            low: k.low,
            close: k.close,
            volume: k.volume,
            count: 1,
        }
    }

    fn extend(&mut self, k: &Kline) {
        self.high = self.high.max(k.high);
        self.low = self.low.min(k.low);
        self.close = k.close;
        self.volume += k.volume;
        self.count += 1;
    }

    fn into_kline(self, symbol: &str, timeframe: &str) -> Kline {
        Kline {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            timestamp: self.bucket_start,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            is_closed: true,
        }
    }
}

/// Folds a single symbol's 1m closed klines into each of `target_timeframes`,
/// emitting each completed higher-timeframe kline exactly once.
pub struct KlineAggregator {
    symbol: String,
    target_timeframes: Vec<String>,
    buffers: HashMap<String, Option<AggregationBuffer>>,
    last_bucket: HashMap<String, DateTime<Utc>>,
}

impl KlineAggregator {
    pub fn new(symbol: impl Into<String>, target_timeframes: Vec<String>) -> Self {
        let mut buffers = HashMap::new();
        let mut last_bucket = HashMap::new();
        for tf in &target_timeframes {
            buffers.insert(tf.clone(), None);
            last_bucket.insert(tf.clone(), DateTime::<Utc>::MIN_UTC);
        }
        Self {
            symbol: symbol.into(),
            target_timeframes,
            buffers,
            last_bucket,
        }
    }

    /// Feed one closed 1m kline; returns zero or more newly emitted
    /// higher-timeframe klines, in ascending timestamp order (stable because
    /// `target_timeframes` is processed in a fixed order and at most one
    /// emission can occur per timeframe per call).
    pub fn add_1m_kline(&mut self, kline: &Kline) -> Result<Vec<Kline>, EngineError> {
        require_one_minute(kline)?;

        let mut emitted = Vec::new();
        for tf in self.target_timeframes.clone() {
            let tf_minutes = timeframe_minutes(&tf).expect("target timeframe is recognized");
            let bucket_start = bucket_start_for(kline.timestamp, tf_minutes);

            let last = self.last_bucket[&tf];
            if last != DateTime::<Utc>::MIN_UTC && bucket_start < last {
                return Err(EngineError::OutOfOrderKline {
                    symbol: self.symbol.clone(),
                    timeframe: tf.clone(),
                    bucket_start: bucket_start.timestamp(),
                    last_bucket_start: last.timestamp(),
                });
            }

            let slot = self.buffers.get_mut(&tf).unwrap();
            match slot {
                None => {
                    *slot = Some(AggregationBuffer::from_kline(bucket_start, kline));
                }
                Some(buf) if bucket_start > buf.bucket_start => {
                    let finished = slot.take().unwrap();
                    emitted.push(finished.into_kline(&self.symbol, &tf));
                    *slot = Some(AggregationBuffer::from_kline(bucket_start, kline));
                }
                Some(buf) => {
                    buf.extend(kline);
                }
            }
            self.last_bucket.insert(tf, bucket_start);
        }
        Ok(emitted)
    }

    /// Fold an ascending run of historical 1m klines without emitting —
    /// warms up the aggregator state from the persistent store after a
    /// crash. The trailing partial bucket is left open, matching live
    /// behavior (it will emit once the next live 1m kline closes it).
    pub fn prefill_from_history(&mut self, klines: &[Kline]) -> Result<(), EngineError> {
        for k in klines {
            self.add_1m_kline(k)?;
        }
        Ok(())
    }

    /// Force-emit any trailing partial buckets as closed klines. Used by
    /// callers that must flush state at shutdown/finalize rather than wait
    /// for the next bucket boundary.
    pub fn flush(&mut self) -> Vec<Kline> {
        let mut emitted = Vec::new();
        for tf in self.target_timeframes.clone() {
            if let Some(buf) = self.buffers.get_mut(&tf).unwrap().take() {
                emitted.push(buf.into_kline(&self.symbol, &tf));
            }
        }
        emitted
    }
}
