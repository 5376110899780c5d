// =============================================================================
// signal-engine — demo entry point
// =============================================================================
//
// CLI argument parsing, YAML config, and exchange connectivity are out of
// scope here — this binary exists to wire the engine together the
// way a real deployment would, against an in-memory kline source seeded
// with synthetic history. A production deployment replaces
// `InMemoryKlineSource`/`InMemoryBacktestRunRepository` with real adapters
// behind the same `KlineSource`/`BacktestRunRepository` traits.
// =============================================================================

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use signal_engine::backtest::{BacktestConfig, BacktestRunner};
use signal_engine::backtest::memory_store::InMemoryBacktestRunRepository;
use signal_engine::collaborators::InMemoryKlineSource;
use signal_engine::config::EngineConfig;
use signal_engine::kline::Kline;
use signal_engine::strategy::ema_crossover::EmaCrossoverStrategy;
use signal_engine::strategy::msr::MsrStrategy;
use signal_engine::strategy::{Strategy, StrategyRegistry};

fn synthetic_1m_history(symbol: &str, start: chrono::DateTime<Utc>, minutes: i64) -> Vec<Kline> {
    let mut klines = Vec::with_capacity(minutes as usize);
    let mut price = 50_000.0_f64;
    for i in 0..minutes {
        let drift = ((i as f64) * 0.017).sin() * 25.0;
        let open = price;
        let close = price + drift * 0.1;
        let high = open.max(close) + 5.0;
        let low = open.min(close) - 5.0;
        klines.push(Kline {
            symbol: symbol.to_string(),
            timeframe: "1m".to_string(),
            timestamp: start + Duration::minutes(i),
            open: Decimal::try_from(open).unwrap_or_default(),
            high: Decimal::try_from(high).unwrap_or_default(),
            low: Decimal::try_from(low).unwrap_or_default(),
            close: Decimal::try_from(close).unwrap_or_default(),
            volume: Decimal::from(10),
            is_closed: true,
        });
        price = close;
    }
    klines
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("signal-engine starting up");

    let config = EngineConfig::load("engine_config.json").unwrap_or_else(|e| {
        warn!(error = %e, "failed to load engine_config.json, using defaults");
        EngineConfig::default()
    });
    let symbol = "BTCUSDT";
    config.validate(&[symbol.to_string()])?;

    let mut registry = StrategyRegistry::new();
    let strategy_config = config.strategy.clone();
    registry.register("msr_retest_capture", move || {
        Arc::new(MsrStrategy::new(strategy_config.clone())) as Arc<dyn Strategy>
    })?;
    registry.register("ema_crossover", || {
        Arc::new(EmaCrossoverStrategy::new(Default::default())) as Arc<dyn Strategy>
    })?;
    info!(strategies = ?registry.list_strategies(), "strategy registry ready");

    let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let end = start + Duration::hours(6);

    let kline_source = Arc::new(InMemoryKlineSource::new());
    kline_source.insert(
        symbol,
        "1m",
        synthetic_1m_history(symbol, start - Duration::days(2), 2 * 24 * 60 + 6 * 60),
    );

    let run_repo = Arc::new(InMemoryBacktestRunRepository::new());
    let backtest_config = BacktestConfig {
        symbols: vec![symbol.to_string()],
        timeframes: config.target_timeframes.clone(),
        start_date: start,
        end_date: end,
        strategy_name: "msr_retest_capture".to_string(),
        strategy_config: config.strategy.clone(),
    };

    let runner = BacktestRunner::new(backtest_config, kline_source, run_repo);
    let result = runner
        .run(Utc::now(), |_symbol, _timeframe| {
            registry
                .create("msr_retest_capture")
                .expect("msr_retest_capture is registered above")
        })
        .await?;

    info!(
        run_id = %result.id,
        total_signals = result.total_signals,
        wins = result.wins,
        losses = result.losses,
        active = result.active,
        win_rate = result.win_rate,
        "backtest run complete"
    );

    Ok(())
}
