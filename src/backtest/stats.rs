// =============================================================================
// Backtest statistics — BacktestResult, StatisticsCalculator
// =============================================================================
//
// Summarizes a completed (or still-running) backtest into the persisted
// run-record columns. R-multiples are derived from each signal's
// `mae_ratio`/`mfe_ratio`/`outcome` rather than from a separate PnL model,
// since risk-normalized R is the only per-trade return unit the data model
// carries.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signal::{Outcome, SignalRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One row of the persisted backtest-run table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub symbols: Vec<String>,
    pub timeframes: Vec<String>,
    pub strategy_config: serde_json::Value,
    pub total_signals: u64,
    pub wins: u64,
    pub losses: u64,
    pub active: u64,
    pub win_rate: f64,
    pub expectancy_r: f64,
    pub total_r: f64,
    pub profit_factor: f64,
    pub status: RunStatus,
}

#[derive(Default)]
pub struct StatisticsCalculator;

impl StatisticsCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Summarize a completed (or still-running) set of signals into the
    /// persisted run-record columns. A resolved signal's R-multiple is
    /// `+mfe_ratio` on a TP and `-mae_ratio` on an SL — both already
    /// risk-normalized by [`SignalRecord::update_mae`]'s division by
    /// `risk_amount()`.
    pub fn calculate(
        &self,
        run_id: impl Into<String>,
        created_at: DateTime<Utc>,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        symbols: Vec<String>,
        timeframes: Vec<String>,
        strategy_config: serde_json::Value,
        signals: &[SignalRecord],
        status: RunStatus,
    ) -> BacktestResult {
        let total_signals = signals.len() as u64;
        let wins = signals
            .iter()
            .filter(|s| s.outcome == Outcome::Tp)
            .count() as u64;
        let losses = signals
            .iter()
            .filter(|s| s.outcome == Outcome::Sl)
            .count() as u64;
        let active = signals
            .iter()
            .filter(|s| s.outcome == Outcome::Active)
            .count() as u64;

        let resolved = wins + losses;
        let win_rate = if resolved == 0 {
            0.0
        } else {
            wins as f64 / resolved as f64
        };

        let mut gross_win_r = 0.0_f64;
        let mut gross_loss_r = 0.0_f64;
        let mut total_r = 0.0_f64;

        for signal in signals {
            let r = match signal.outcome {
                Outcome::Tp => signal.mfe_ratio.to_string().parse::<f64>().unwrap_or(0.0),
                Outcome::Sl => -signal.mae_ratio.to_string().parse::<f64>().unwrap_or(0.0),
                Outcome::Active => continue,
            };
            total_r += r;
            if r >= 0.0 {
                gross_win_r += r;
            } else {
                gross_loss_r += -r;
            }
        }

        let expectancy_r = if resolved == 0 {
            0.0
        } else {
            total_r / resolved as f64
        };

        let profit_factor = if gross_loss_r == 0.0 {
            if gross_win_r == 0.0 {
                0.0
            } else {
                f64::INFINITY
            }
        } else {
            gross_win_r / gross_loss_r
        };

        BacktestResult {
            id: run_id.into(),
            created_at,
            start_date,
            end_date,
            symbols,
            timeframes,
            strategy_config,
            total_signals,
            wins,
            losses,
            active,
            win_rate,
            expectancy_r,
            total_r,
            profit_factor,
            status,
        }
    }
}
