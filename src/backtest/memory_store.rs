// =============================================================================
// In-memory BacktestRunRepository test double
// =============================================================================
//
// Same shape as the in-memory collaborators in `collaborators.rs`: a
// RwLock-guarded HashMap, enough for exercising `BacktestRunner` without a
// real database.
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::signal::SignalRecord;

use super::runner::BacktestRunRepository;
use super::stats::{BacktestResult, RunStatus};

#[derive(Default)]
pub struct InMemoryBacktestRunRepository {
    runs: RwLock<HashMap<String, BacktestResult>>,
    signals: RwLock<HashMap<String, Vec<SignalRecord>>>,
}

impl InMemoryBacktestRunRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_run(&self, run_id: &str) -> Option<BacktestResult> {
        self.runs.read().get(run_id).cloned()
    }

    pub fn get_signals(&self, run_id: &str) -> Vec<SignalRecord> {
        self.signals.read().get(run_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl BacktestRunRepository for InMemoryBacktestRunRepository {
    async fn create_run(&self, result: &BacktestResult) -> anyhow::Result<()> {
        self.runs
            .write()
            .insert(result.id.clone(), result.clone());
        Ok(())
    }

    async fn save_signals(&self, run_id: &str, signals: &[SignalRecord]) -> anyhow::Result<()> {
        self.signals
            .write()
            .insert(run_id.to_string(), signals.to_vec());
        Ok(())
    }

    async fn complete_run(&self, result: &BacktestResult) -> anyhow::Result<()> {
        self.runs
            .write()
            .insert(result.id.clone(), result.clone());
        Ok(())
    }

    async fn fail_run(&self, run_id: &str) -> anyhow::Result<()> {
        if let Some(run) = self.runs.write().get_mut(run_id) {
            run.status = RunStatus::Failed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_result(id: &str, status: RunStatus) -> BacktestResult {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        BacktestResult {
            id: id.to_string(),
            created_at: t0,
            start_date: t0,
            end_date: t0,
            symbols: vec!["BTCUSDT".to_string()],
            timeframes: vec!["5m".to_string()],
            strategy_config: serde_json::json!({}),
            total_signals: 0,
            wins: 0,
            losses: 0,
            active: 0,
            win_rate: 0.0,
            expectancy_r: 0.0,
            total_r: 0.0,
            profit_factor: 0.0,
            status,
        }
    }

    #[tokio::test]
    async fn create_then_complete_round_trips() {
        let repo = InMemoryBacktestRunRepository::new();
        repo.create_run(&sample_result("run1", RunStatus::Running))
            .await
            .unwrap();
        assert_eq!(repo.get_run("run1").unwrap().status, RunStatus::Running);

        repo.complete_run(&sample_result("run1", RunStatus::Completed))
            .await
            .unwrap();
        assert_eq!(repo.get_run("run1").unwrap().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn fail_run_marks_status_failed() {
        let repo = InMemoryBacktestRunRepository::new();
        repo.create_run(&sample_result("run1", RunStatus::Running))
            .await
            .unwrap();
        repo.fail_run("run1").await.unwrap();
        assert_eq!(repo.get_run("run1").unwrap().status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn save_signals_round_trips() {
        let repo = InMemoryBacktestRunRepository::new();
        repo.save_signals("run1", &[]).await.unwrap();
        assert!(repo.get_signals("run1").is_empty());
    }
}
