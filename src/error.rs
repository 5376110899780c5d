// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Distinguishes the fatal, programmer-error class of failure (aggregator fed
// a non-1m or out-of-order kline, a signal id collision, an unknown
// symbol/timeframe in a filter) from the ordinary
// `anyhow::Result` used at adapter/I-O boundaries (store writes, feed
// reconnects) elsewhere in this crate. Only conditions the engine itself can
// detect and name live here; everything else stays `anyhow`.
// =============================================================================

use thiserror::Error;

/// Fatal, unrecoverable engine errors. These indicate a programmer error or a
/// configuration mistake caught at startup — never a transient condition.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("aggregator for {symbol} received a non-1m kline (timeframe={timeframe})")]
    NonOneMinuteKline { symbol: String, timeframe: String },

    #[error(
        "aggregator for {symbol}/{timeframe} received an out-of-order kline: \
         bucket_start={bucket_start} <= last_bucket_start={last_bucket_start}"
    )]
    OutOfOrderKline {
        symbol: String,
        timeframe: String,
        bucket_start: i64,
        last_bucket_start: i64,
    },

    #[error(
        "signal id collision: {id} already exists with different fields \
         (strategy={strategy}, symbol={symbol}, timeframe={timeframe})"
    )]
    SignalIdCollision {
        id: String,
        strategy: String,
        symbol: String,
        timeframe: String,
    },

    #[error("filter configured for unknown (symbol, timeframe) pair: {symbol}/{timeframe}")]
    UnknownFilterTarget { symbol: String, timeframe: String },

    #[error("unknown strategy '{0}'. available: {1}")]
    UnknownStrategy(String, String),

    #[error("strategy '{0}' is already registered")]
    DuplicateStrategy(String),
}
