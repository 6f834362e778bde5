//! CLI / service entrypoint for the GlowBack trading core.
//!
//! Loads an [`EngineConfig`] from the path given as the first CLI argument,
//! builds the pipeline via [`Orchestrator`], runs it to completion for
//! `BACKTEST` (or until stopped for `LIVE`), and prints the analytics
//! report as JSON. Non-zero exit on any fatal configuration or invariant
//! error, per spec.md §6's exit-code note.

use std::process::ExitCode;

use gb_engine::config::{EngineConfig, RunMode, StrategyConfigDoc};
use gb_engine::orchestrator::Orchestrator;
use gb_engine::strategy_container::{EveryTickStrategy, OrderBookImbalanceStrategy, Strategy};
use gb_data::{DataIngester, HistoricalReplayIngester, LiveDepthIngester, LiveIngesterConfig};
use gb_types::market::Symbol;
use rust_decimal::Decimal;
use tracing::error;

fn build_strategy(doc: &StrategyConfigDoc) -> Box<dyn Strategy> {
    let symbol = Symbol::crypto(&doc.symbol);
    match doc.name.as_str() {
        "order_book_imbalance" => {
            let lookback = doc.params.lookback_levels.unwrap_or(5);
            let threshold = doc.params.imbalance_threshold.unwrap_or(Decimal::new(2, 1));
            Box::new(OrderBookImbalanceStrategy::new(symbol, lookback, threshold))
        }
        // "every_tick" and any unrecognized name fall back to the simplest
        // reference strategy rather than failing startup over a cosmetic
        // naming mismatch in a non-goal-scoped config section.
        _ => Box::new(EveryTickStrategy::new(symbol)),
    }
}

fn build_ingester(config: &EngineConfig) -> gb_types::GbResult<Box<dyn DataIngester>> {
    match config.run_mode {
        RunMode::Backtest => {
            let symbol = Symbol::crypto(&config.data.symbol);
            let path = config.data.data_file.clone().ok_or_else(|| {
                gb_types::GbError::Config("data.data_file is required for BACKTEST".to_string())
            })?;
            Ok(Box::new(HistoricalReplayIngester::new(path, symbol)))
        }
        RunMode::Live => {
            let ws = config.websocket.clone().ok_or_else(|| {
                gb_types::GbError::Config("websocket config is required for LIVE".to_string())
            })?;
            Ok(Box::new(LiveDepthIngester::new(LiveIngesterConfig {
                host: ws.host,
                port: ws.port,
                target: ws.target,
                symbol: ws.symbol,
            })))
        }
        RunMode::Optimization | RunMode::WalkForward => unreachable!("rejected by validate_run_mode"),
    }
}

fn run() -> gb_types::GbResult<()> {
    let config_path = std::env::args().nth(1).ok_or_else(|| {
        gb_types::GbError::Config("usage: gb-engine-service <config.json>".to_string())
    })?;

    let config = EngineConfig::load(&config_path)?;
    config.validate_run_mode()?;

    let strategies: Vec<Box<dyn Strategy>> = config.strategies.iter().map(build_strategy).collect();
    let ingester = build_ingester(&config)?;

    let mut orchestrator = Orchestrator::build(&config, strategies, None, ingester);

    match config.run_mode {
        RunMode::Backtest => {
            let report = orchestrator.run_to_completion()?;
            println!("{}", serde_json::to_string_pretty(&gb_engine::report::to_json(&report))?);
        }
        RunMode::Live => {
            orchestrator.start()?;
            // Live mode runs until stopped. The control surface that would
            // call `POST /stop` is external (spec.md §6); this entrypoint
            // simply parks the main thread and relies on process
            // termination (SIGTERM/SIGINT) to end the run.
            loop {
                std::thread::sleep(std::time::Duration::from_secs(3600));
            }
        }
        RunMode::Optimization | RunMode::WalkForward => unreachable!("rejected by validate_run_mode"),
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal error, exiting");
            ExitCode::FAILURE
        }
    }
}
