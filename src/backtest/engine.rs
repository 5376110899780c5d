// =============================================================================
// BacktestEngine — single-symbol replay pipeline
// =============================================================================
//
// Grounded on `backtest/engine.py`'s `BacktestEngine`: one `KlineAggregator`
// targeting every non-"1m" timeframe, one `KlineBuffer` and one strategy
// instance per requested timeframe, one `OutcomeTracker`. `process_1m_kline`
// reproduces the exact 4-step order from the source — outcome check, then
// "1m" strategy (if requested), then aggregation, then each newly completed
// higher timeframe's strategy — because replay must reach bit-identical
// signal ids against the same history as a live run would.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::aggregator::KlineAggregator;
use crate::kline::{Kline, KlineBuffer};
use crate::outcome::OutcomeTracker;
use crate::signal::{Outcome, SignalRecord};
use crate::strategy::Strategy;

/// Per-symbol output of a completed replay run.
#[derive(Debug, Clone, Default)]
pub struct SymbolResult {
    pub symbol: String,
    pub signals: Vec<SignalRecord>,
    pub total_1m_klines: u64,
    pub timeframes_processed: Vec<String>,
}

pub struct BacktestEngine {
    symbol: String,
    timeframes: Vec<String>,
    signal_start_time: Option<DateTime<Utc>>,
    aggregator: KlineAggregator,
    buffers: HashMap<String, KlineBuffer>,
    strategies: HashMap<String, Arc<dyn Strategy>>,
    outcome_tracker: OutcomeTracker,
    signals: Vec<SignalRecord>,
    total_1m_klines: u64,
}

impl BacktestEngine {
    /// `strategy_for` is called once per target timeframe to build an
    /// independent strategy instance (position locks and streak state are
    /// not shared across timeframes, mirroring one generator per timeframe
    /// in the source).
    pub fn new(
        symbol: impl Into<String>,
        timeframes: Vec<String>,
        signal_start_time: Option<DateTime<Utc>>,
        mut strategy_for: impl FnMut(&str) -> Arc<dyn Strategy>,
    ) -> Self {
        let symbol = symbol.into();
        let aggregated_tfs: Vec<String> = timeframes
            .iter()
            .filter(|tf| tf.as_str() != "1m")
            .cloned()
            .collect();

        let mut buffers = HashMap::new();
        let mut strategies = HashMap::new();
        for tf in &timeframes {
            buffers.insert(tf.clone(), KlineBuffer::new(&symbol, tf));
            strategies.insert(tf.clone(), strategy_for(tf));
        }

        Self {
            aggregator: KlineAggregator::new(&symbol, aggregated_tfs),
            symbol,
            timeframes,
            signal_start_time,
            buffers,
            strategies,
            outcome_tracker: OutcomeTracker::default(),
            signals: Vec::new(),
            total_1m_klines: 0,
        }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        for strategy in self.strategies.values() {
            strategy.init().await?;
        }
        Ok(())
    }

    /// Feed one closed 1m kline through the full pipeline.
    pub async fn process_1m_kline(&mut self, kline: Kline) -> anyhow::Result<()> {
        self.total_1m_klines += 1;

        let resolved = {
            let mut resolved = Vec::new();
            self.outcome_tracker.check_kline(
                &kline.symbol,
                kline.timestamp,
                kline.high,
                kline.low,
                &mut |signal, outcome| resolved.push((signal.clone(), outcome)),
            );
            resolved
        };
        for (signal, outcome) in resolved {
            self.handle_outcome(&signal, outcome).await?;
        }

        if self.timeframes.iter().any(|tf| tf == "1m") {
            self.process_kline_for_timeframe(kline.clone(), "1m").await?;
        }

        let aggregated = self.aggregator.add_1m_kline(&kline)?;
        for agg_kline in aggregated {
            if self.timeframes.iter().any(|tf| tf == &agg_kline.timeframe) {
                let tf = agg_kline.timeframe.clone();
                self.process_kline_for_timeframe(agg_kline, &tf).await?;
            }
        }

        Ok(())
    }

    async fn process_kline_for_timeframe(
        &mut self,
        kline: Kline,
        timeframe: &str,
    ) -> anyhow::Result<()> {
        let buffer = self
            .buffers
            .get_mut(timeframe)
            .expect("buffer exists for every requested timeframe");
        buffer.add(kline.clone());

        let strategy = self
            .strategies
            .get(timeframe)
            .expect("strategy exists for every requested timeframe")
            .clone();
        let result = strategy.process_kline(&kline, buffer).await;

        if let Some(signal) = result.signal {
            let report = self
                .signal_start_time
                .map(|start| signal.signal_time >= start)
                .unwrap_or(true);
            if report {
                self.signals.push(signal.clone());
            }
            // Always tracked, warmup-emitted signals included, so the
            // position lock behaves identically to a live run.
            self.outcome_tracker.add_signal(signal);
        }

        if let Some(atr) = result.atr {
            self.outcome_tracker.update_atr(
                &self.symbol,
                timeframe,
                Decimal::from_f64(atr).unwrap_or(Decimal::ZERO),
            );
        }

        Ok(())
    }

    async fn handle_outcome(
        &mut self,
        signal: &SignalRecord,
        outcome: Outcome,
    ) -> anyhow::Result<()> {
        if let Some(strategy) = self.strategies.get(&signal.timeframe) {
            strategy
                .record_outcome(outcome, &signal.symbol, &signal.timeframe)
                .await?;
        }
        Ok(())
    }

    pub fn finalize(&mut self) {
        self.outcome_tracker.finalize();
    }

    pub fn get_result(self) -> SymbolResult {
        SymbolResult {
            symbol: self.symbol,
            signals: self.signals,
            total_1m_klines: self.total_1m_klines,
            timeframes_processed: self.timeframes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::strategy::msr::MsrStrategy;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    fn k(symbol: &str, minute: i64, open: f64, high: f64, low: f64, close: f64) -> Kline {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Kline {
            symbol: symbol.to_string(),
            timeframe: "1m".to_string(),
            timestamp: t0 + Duration::minutes(minute),
            open: Decimal::try_from(open).unwrap(),
            high: Decimal::try_from(high).unwrap(),
            low: Decimal::try_from(low).unwrap(),
            close: Decimal::try_from(close).unwrap(),
            volume: Decimal::ONE,
            is_closed: true,
        }
    }

    #[tokio::test]
    async fn engine_processes_stream_without_1m_target() {
        let mut engine = BacktestEngine::new(
            "BTCUSDT",
            vec!["5m".to_string()],
            None,
            |_tf| Arc::new(MsrStrategy::new(StrategyConfig::default())) as Arc<dyn Strategy>,
        );
        engine.init().await.unwrap();

        let mut price = 100.0;
        for i in 0..60 {
            let bar = k("BTCUSDT", i, price, price + 1.0, price - 1.0, price + 0.1);
            price += 0.1;
            engine.process_1m_kline(bar).await.unwrap();
        }
        engine.finalize();
        let result = engine.get_result();
        assert_eq!(result.total_1m_klines, 60);
        assert_eq!(result.timeframes_processed, vec!["5m".to_string()]);
    }

    #[tokio::test]
    async fn warmup_signals_are_not_reported_but_lock_is_held() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 2, 0, 0).unwrap();
        let mut engine = BacktestEngine::new(
            "BTCUSDT",
            vec!["1m".to_string()],
            Some(start),
            |_tf| Arc::new(MsrStrategy::new(StrategyConfig::default())) as Arc<dyn Strategy>,
        );
        engine.init().await.unwrap();

        for i in 0..30 {
            let bar = k("BTCUSDT", i, 100.0, 101.0, 99.0, 100.0);
            engine.process_1m_kline(bar).await.unwrap();
        }
        let result = engine.get_result();
        assert!(result
            .signals
            .iter()
            .all(|s| s.signal_time >= start));
    }
}
