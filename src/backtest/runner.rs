// =============================================================================
// BacktestRunner — multi-symbol orchestration, run bookkeeping
// =============================================================================
//
// Grounded on `backtest/runner.py`'s `BacktestRunner`: symbols are processed
// strictly sequentially — no shared state across symbol pipelines — a
// per-symbol failure is logged and skipped rather than aborting the whole
// run, and `run_id` is a truncated sha256 digest of the run's identifying
// fields plus wall-clock time. The wall clock is an explicit parameter here
// (`now`) rather than an ambient `Utc::now()` call inside `generate_run_id`,
// so the function stays a pure, testable mapping — the caller (`run`) is
// the only place that reads the actual clock.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::collaborators::KlineSource;
use crate::config::StrategyConfig;
use crate::strategy::Strategy;

use super::engine::{BacktestEngine, SymbolResult};
use super::stats::{BacktestResult, RunStatus, StatisticsCalculator};

/// 2 days of 1m warmup history = 2880 klines, enough for a 30m x 50-bar
/// indicator window.
pub const WARMUP_DAYS: i64 = 2;

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub symbols: Vec<String>,
    pub timeframes: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub strategy_name: String,
    pub strategy_config: StrategyConfig,
}

/// Bookkeeping for the persisted run record: create/complete/fail a run
/// and persist the signals it produced.
#[async_trait::async_trait]
pub trait BacktestRunRepository: Send + Sync {
    async fn create_run(&self, result: &BacktestResult) -> anyhow::Result<()>;
    async fn save_signals(
        &self,
        run_id: &str,
        signals: &[crate::signal::SignalRecord],
    ) -> anyhow::Result<()>;
    async fn complete_run(&self, result: &BacktestResult) -> anyhow::Result<()>;
    async fn fail_run(&self, run_id: &str) -> anyhow::Result<()>;
}

/// Deterministic-given-`now` run id: sha256 of
/// `start:end:sorted(symbols):timeframes:strategy_config_json:now`,
/// truncated to 16 hex chars (`original_source/backend/
/// backtest/runner.py::generate_run_id`).
pub fn generate_run_id(config: &BacktestConfig, now: DateTime<Utc>) -> String {
    let mut symbols = config.symbols.clone();
    symbols.sort();
    let strategy_json =
        serde_json::to_string(&config.strategy_config).unwrap_or_else(|_| "{}".to_string());
    let key = format!(
        "{}:{}:{}:{}:{}:{}",
        config.start_date.to_rfc3339(),
        config.end_date.to_rfc3339(),
        symbols.join(","),
        config.timeframes.join(","),
        strategy_json,
        now.to_rfc3339(),
    );
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..16].to_string()
}

pub struct BacktestRunner {
    config: BacktestConfig,
    kline_source: Arc<dyn KlineSource>,
    run_repo: Arc<dyn BacktestRunRepository>,
}

impl BacktestRunner {
    pub fn new(
        config: BacktestConfig,
        kline_source: Arc<dyn KlineSource>,
        run_repo: Arc<dyn BacktestRunRepository>,
    ) -> Self {
        Self {
            config,
            kline_source,
            run_repo,
        }
    }

    /// Run every configured symbol sequentially, persist the run record and
    /// its signals, and return the computed statistics. `now` supplies the
    /// wall-clock time for `run_id` generation (see module docs).
    pub async fn run(
        &self,
        now: DateTime<Utc>,
        mut strategy_for: impl FnMut(&str, &str) -> Arc<dyn Strategy>,
    ) -> anyhow::Result<BacktestResult> {
        let run_id = generate_run_id(&self.config, now);
        info!(run_id = %run_id, "starting backtest run");

        let placeholder = StatisticsCalculator::new().calculate(
            run_id.clone(),
            now,
            self.config.start_date,
            self.config.end_date,
            self.config.symbols.clone(),
            self.config.timeframes.clone(),
            serde_json::to_value(&self.config.strategy_config).unwrap_or_default(),
            &[],
            RunStatus::Running,
        );
        self.run_repo.create_run(&placeholder).await?;

        let mut all_signals = Vec::new();
        let run_result = async {
            for symbol in &self.config.symbols {
                match self.run_symbol(symbol, &mut strategy_for).await {
                    Ok(result) => all_signals.extend(result.signals),
                    Err(err) => {
                        error!(symbol = %symbol, error = %err, "symbol backtest failed, continuing");
                    }
                }
            }
            Ok::<_, anyhow::Error>(())
        }
        .await;

        if let Err(err) = run_result {
            self.run_repo.fail_run(&run_id).await?;
            return Err(err);
        }

        self.run_repo.save_signals(&run_id, &all_signals).await?;

        let result = StatisticsCalculator::new().calculate(
            run_id.clone(),
            now,
            self.config.start_date,
            self.config.end_date,
            self.config.symbols.clone(),
            self.config.timeframes.clone(),
            serde_json::to_value(&self.config.strategy_config).unwrap_or_default(),
            &all_signals,
            RunStatus::Completed,
        );
        self.run_repo.complete_run(&result).await?;
        Ok(result)
    }

    async fn run_symbol(
        &self,
        symbol: &str,
        strategy_for: &mut impl FnMut(&str, &str) -> Arc<dyn Strategy>,
    ) -> anyhow::Result<SymbolResult> {
        let warmup_start = self.config.start_date - chrono::Duration::days(WARMUP_DAYS);
        let klines = self
            .kline_source
            .get_range(symbol, "1m", warmup_start, self.config.end_date)
            .await?;

        if klines.is_empty() {
            warn!(symbol = %symbol, "no 1m history in range, skipping");
            return Ok(SymbolResult {
                symbol: symbol.to_string(),
                ..Default::default()
            });
        }

        let timeframes = self.config.timeframes.clone();
        let sym = symbol.to_string();
        let mut engine = BacktestEngine::new(
            symbol,
            timeframes,
            Some(self.config.start_date),
            |tf| strategy_for(&sym, tf),
        );
        engine.init().await?;

        let total = klines.len();
        for (i, kline) in klines.into_iter().enumerate() {
            engine.process_1m_kline(kline).await?;
            if i > 0 && i % 100_000 == 0 {
                info!(symbol = %symbol, processed = i, total, "backtest progress");
            }
        }
        engine.finalize();
        Ok(engine.get_result())
    }
}

/// Trivial strategy-instance cache keyed by (symbol, timeframe), useful when
/// a caller wants one strategy per pair rather than a fresh one every call.
pub struct StrategyCache {
    instances: HashMap<(String, String), Arc<dyn Strategy>>,
}

impl StrategyCache {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }

    pub fn get_or_insert_with(
        &mut self,
        symbol: &str,
        timeframe: &str,
        build: impl FnOnce() -> Arc<dyn Strategy>,
    ) -> Arc<dyn Strategy> {
        self.instances
            .entry((symbol.to_string(), timeframe.to_string()))
            .or_insert_with(build)
            .clone()
    }
}

impl Default for StrategyCache {
    fn default() -> Self {
        Self::new()
    }
}
