// =============================================================================
// Collaborator interfaces — stores, caches, feeds, observers
// =============================================================================
//
// Every concern outside the signal-generation/outcome-tracking core (time
// series storage, relational tables, Redis-style caches, exchange feeds,
// websocket fan-out) is named here only by the interface the core consumes.
// `async-trait` is used the way `async-trait`-annotated traits appear in
// other collaborator-boundary crates in this family (N0tT1m-invest-iq's
// validation/portfolio-manager crates) — the teacher crate itself is
// synchronous at these seams, so this is an enrichment, not a rewrite.
// Each trait ships an in-memory implementation so the engine is fully
// testable without a real backend.
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::kline::Kline;
use crate::signal::{Outcome, SignalRecord, StreakTracker};

/// `(symbol, timeframe)` processing watermark, persisted across restarts so
/// live replay can resume without reprocessing confirmed bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingState {
    pub symbol: String,
    pub timeframe: String,
    pub system_start_time: DateTime<Utc>,
    pub last_processed_time: DateTime<Utc>,
    pub state_status: ProcessingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Confirmed,
}

/// Ordered historical kline access for the replay engine.
#[async_trait]
pub trait KlineSource: Send + Sync {
    async fn get_range(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Kline>>;
}

/// Persistence for signal records: upsert by id, outcome updates, and the
/// active-signal rebuild path used on startup.
#[async_trait]
pub trait SignalRepository: Send + Sync {
    async fn save_signal(&self, signal: &SignalRecord) -> anyhow::Result<()>;

    async fn update_outcome(
        &self,
        signal_id: &str,
        outcome: Outcome,
        outcome_time: Option<DateTime<Utc>>,
        outcome_price: Option<rust_decimal::Decimal>,
    ) -> anyhow::Result<()>;

    async fn get_active(
        &self,
        symbol: Option<&str>,
        timeframe: Option<&str>,
    ) -> anyhow::Result<Vec<SignalRecord>>;

    async fn get_by_id(&self, signal_id: &str) -> anyhow::Result<Option<SignalRecord>>;
}

/// Per-(symbol, timeframe) replay watermark store.
#[async_trait]
pub trait ProcessingStateRepository: Send + Sync {
    async fn get_state(&self, symbol: &str, timeframe: &str) -> anyhow::Result<Option<ProcessingState>>;
    async fn upsert_state(&self, state: &ProcessingState) -> anyhow::Result<()>;
    async fn mark_pending(&self, symbol: &str, timeframe: &str) -> anyhow::Result<()>;
    async fn mark_confirmed(&self, symbol: &str, timeframe: &str) -> anyhow::Result<()>;
    async fn update_last_processed(
        &self,
        symbol: &str,
        timeframe: &str,
        last_processed_time: DateTime<Utc>,
    ) -> anyhow::Result<()>;
    async fn get_all_states(&self) -> anyhow::Result<Vec<ProcessingState>>;
    async fn get_pending_states(&self) -> anyhow::Result<Vec<ProcessingState>>;
}

/// Shared, fast-access cache of per-(symbol, timeframe) streak state.
#[async_trait]
pub trait StreakCache: Send + Sync {
    async fn save(&self, symbol: &str, timeframe: &str, tracker: StreakTracker) -> anyhow::Result<bool>;
    async fn load(&self, symbol: &str, timeframe: &str) -> anyhow::Result<Option<StreakTracker>>;
    async fn clear(&self, symbol: &str, timeframe: &str) -> anyhow::Result<bool>;
    async fn load_all(&self) -> anyhow::Result<HashMap<(String, String), StreakTracker>>;
}

/// Fan-out to anything watching live signal/outcome/MAE-MFE events. No
/// inheritance — a strategy or the outcome tracker holds a list of these.
#[async_trait]
pub trait SignalObserver: Send + Sync {
    async fn on_signal(&self, signal: &SignalRecord);
    async fn on_outcome(&self, signal: &SignalRecord, outcome: Outcome);
}

// =============================================================================
// In-memory implementations — used by the backtest engine and by tests.
// =============================================================================

#[derive(Debug, Default)]
pub struct InMemoryKlineSource {
    klines: RwLock<HashMap<(String, String), Vec<Kline>>>,
}

impl InMemoryKlineSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, symbol: &str, timeframe: &str, klines: Vec<Kline>) {
        self.klines
            .write()
            .insert((symbol.to_string(), timeframe.to_string()), klines);
    }
}

#[async_trait]
impl KlineSource for InMemoryKlineSource {
    async fn get_range(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Kline>> {
        let guard = self.klines.read();
        let all = guard
            .get(&(symbol.to_string(), timeframe.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(all
            .into_iter()
            .filter(|k| k.timestamp >= start && k.timestamp <= end)
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemorySignalRepository {
    signals: RwLock<HashMap<String, SignalRecord>>,
}

impl InMemorySignalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<SignalRecord> {
        self.signals.read().values().cloned().collect()
    }
}

#[async_trait]
impl SignalRepository for InMemorySignalRepository {
    async fn save_signal(&self, signal: &SignalRecord) -> anyhow::Result<()> {
        self.signals
            .write()
            .insert(signal.id.clone(), signal.clone());
        Ok(())
    }

    async fn update_outcome(
        &self,
        signal_id: &str,
        outcome: Outcome,
        outcome_time: Option<DateTime<Utc>>,
        outcome_price: Option<rust_decimal::Decimal>,
    ) -> anyhow::Result<()> {
        if let Some(s) = self.signals.write().get_mut(signal_id) {
            s.outcome = outcome;
            s.outcome_time = outcome_time;
            s.outcome_price = outcome_price;
        }
        Ok(())
    }

    async fn get_active(
        &self,
        symbol: Option<&str>,
        timeframe: Option<&str>,
    ) -> anyhow::Result<Vec<SignalRecord>> {
        Ok(self
            .signals
            .read()
            .values()
            .filter(|s| s.outcome == Outcome::Active)
            .filter(|s| symbol.map(|sym| sym == s.symbol).unwrap_or(true))
            .filter(|s| timeframe.map(|tf| tf == s.timeframe).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn get_by_id(&self, signal_id: &str) -> anyhow::Result<Option<SignalRecord>> {
        Ok(self.signals.read().get(signal_id).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryProcessingStateRepository {
    states: RwLock<HashMap<(String, String), ProcessingState>>,
}

impl InMemoryProcessingStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessingStateRepository for InMemoryProcessingStateRepository {
    async fn get_state(&self, symbol: &str, timeframe: &str) -> anyhow::Result<Option<ProcessingState>> {
        Ok(self
            .states
            .read()
            .get(&(symbol.to_string(), timeframe.to_string()))
            .cloned())
    }

    async fn upsert_state(&self, state: &ProcessingState) -> anyhow::Result<()> {
        self.states.write().insert(
            (state.symbol.clone(), state.timeframe.clone()),
            state.clone(),
        );
        Ok(())
    }

    async fn mark_pending(&self, symbol: &str, timeframe: &str) -> anyhow::Result<()> {
        if let Some(s) = self
            .states
            .write()
            .get_mut(&(symbol.to_string(), timeframe.to_string()))
        {
            s.state_status = ProcessingStatus::Pending;
        }
        Ok(())
    }

    async fn mark_confirmed(&self, symbol: &str, timeframe: &str) -> anyhow::Result<()> {
        if let Some(s) = self
            .states
            .write()
            .get_mut(&(symbol.to_string(), timeframe.to_string()))
        {
            s.state_status = ProcessingStatus::Confirmed;
        }
        Ok(())
    }

    async fn update_last_processed(
        &self,
        symbol: &str,
        timeframe: &str,
        last_processed_time: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if let Some(s) = self
            .states
            .write()
            .get_mut(&(symbol.to_string(), timeframe.to_string()))
        {
            s.last_processed_time = last_processed_time;
            s.state_status = ProcessingStatus::Confirmed;
        }
        Ok(())
    }

    async fn get_all_states(&self) -> anyhow::Result<Vec<ProcessingState>> {
        Ok(self.states.read().values().cloned().collect())
    }

    async fn get_pending_states(&self) -> anyhow::Result<Vec<ProcessingState>> {
        Ok(self
            .states
            .read()
            .values()
            .filter(|s| s.state_status == ProcessingStatus::Pending)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStreakCache {
    streaks: RwLock<HashMap<(String, String), StreakTracker>>,
}

impl InMemoryStreakCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreakCache for InMemoryStreakCache {
    async fn save(&self, symbol: &str, timeframe: &str, tracker: StreakTracker) -> anyhow::Result<bool> {
        self.streaks
            .write()
            .insert((symbol.to_string(), timeframe.to_string()), tracker);
        Ok(true)
    }

    async fn load(&self, symbol: &str, timeframe: &str) -> anyhow::Result<Option<StreakTracker>> {
        Ok(self
            .streaks
            .read()
            .get(&(symbol.to_string(), timeframe.to_string()))
            .copied())
    }

    async fn clear(&self, symbol: &str, timeframe: &str) -> anyhow::Result<bool> {
        Ok(self
            .streaks
            .write()
            .remove(&(symbol.to_string(), timeframe.to_string()))
            .is_some())
    }

    async fn load_all(&self) -> anyhow::Result<HashMap<(String, String), StreakTracker>> {
        Ok(self.streaks.read().clone())
    }
}

/// An observer that records every event it sees, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub signals: RwLock<Vec<SignalRecord>>,
    pub outcomes: RwLock<Vec<(SignalRecord, Outcome)>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalObserver for RecordingObserver {
    async fn on_signal(&self, signal: &SignalRecord) {
        self.signals.write().push(signal.clone());
    }

    async fn on_outcome(&self, signal: &SignalRecord, outcome: Outcome) {
        self.outcomes.write().push((signal.clone(), outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn sample_signal() -> SignalRecord {
        SignalRecord::new(
            "msr_retest_capture",
            "BTCUSDT",
            "5m",
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            crate::signal::Direction::Long,
            dec!(100),
            dec!(110),
            dec!(90),
            dec!(5),
            0,
        )
    }

    #[tokio::test]
    async fn signal_repo_round_trips() {
        let repo = InMemorySignalRepository::new();
        let sig = sample_signal();
        repo.save_signal(&sig).await.unwrap();

        let fetched = repo.get_by_id(&sig.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, sig.id);

        let active = repo.get_active(Some("BTCUSDT"), Some("5m")).await.unwrap();
        assert_eq!(active.len(), 1);

        repo.update_outcome(&sig.id, Outcome::Tp, Some(sig.signal_time), Some(dec!(110)))
            .await
            .unwrap();
        let active_after = repo.get_active(Some("BTCUSDT"), Some("5m")).await.unwrap();
        assert!(active_after.is_empty());
    }

    #[tokio::test]
    async fn streak_cache_round_trips() {
        let cache = InMemoryStreakCache::new();
        assert!(cache.load("BTCUSDT", "5m").await.unwrap().is_none());

        let tracker = StreakTracker {
            current_streak: 2,
            total_wins: 2,
            total_losses: 0,
        };
        cache.save("BTCUSDT", "5m", tracker).await.unwrap();

        let loaded = cache.load("BTCUSDT", "5m").await.unwrap().unwrap();
        assert_eq!(loaded.current_streak, 2);

        let all = cache.load_all().await.unwrap();
        assert_eq!(all.len(), 1);

        assert!(cache.clear("BTCUSDT", "5m").await.unwrap());
        assert!(cache.load("BTCUSDT", "5m").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn processing_state_repo_tracks_status() {
        let repo = InMemoryProcessingStateRepository::new();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        repo.upsert_state(&ProcessingState {
            symbol: "BTCUSDT".into(),
            timeframe: "1m".into(),
            system_start_time: t0,
            last_processed_time: t0,
            state_status: ProcessingStatus::Pending,
        })
        .await
        .unwrap();

        assert_eq!(repo.get_pending_states().await.unwrap().len(), 1);
        repo.mark_confirmed("BTCUSDT", "1m").await.unwrap();
        assert_eq!(repo.get_pending_states().await.unwrap().len(), 0);

        repo.update_last_processed("BTCUSDT", "1m", t0).await.unwrap();
        let state = repo.get_state("BTCUSDT", "1m").await.unwrap().unwrap();
        assert_eq!(state.state_status, ProcessingStatus::Confirmed);
    }

    #[tokio::test]
    async fn recording_observer_captures_events() {
        let obs = RecordingObserver::new();
        let sig = sample_signal();
        obs.on_signal(&sig).await;
        obs.on_outcome(&sig, Outcome::Tp).await;
        assert_eq!(obs.signals.read().len(), 1);
        assert_eq!(obs.outcomes.read().len(), 1);
    }
}
