// =============================================================================
// Replay / Backtest engine
// =============================================================================
//
// `engine` owns the single-symbol replay pipeline, `runner` orchestrates it
// across symbols and owns run bookkeeping, `stats` computes the persisted
// summary columns, `memory_store` supplies an in-memory
// [`runner::BacktestRunRepository`] test double — a real SQL-backed store
// is out of scope here.
// =============================================================================

pub mod engine;
pub mod memory_store;
pub mod runner;
pub mod stats;

pub use engine::{BacktestEngine, SymbolResult};
pub use runner::{generate_run_id, BacktestConfig, BacktestRunRepository, BacktestRunner, WARMUP_DAYS};
pub use stats::{BacktestResult, RunStatus, StatisticsCalculator};
