//! Lifecycle Orchestrator (spec.md §4.8).
//!
//! Constructs, starts, and stops every component in topological order:
//! Event Bus -> Portfolio Engine -> Strategy Container -> Risk Gate ->
//! Confidence Oracle -> Execution Simulator -> Analytics sink -> Data
//! Ingester. Stop order is the reverse, with the bus last (it drains on
//! stop).
//!
//! **[REDESIGN FLAG applied]** §9's "Startup barrier": rather than a
//! 100 ms sleep before starting the ingester, every component's `wire()`
//! call is synchronous and returns only once its `subscribe` calls have
//! been registered with the bus. [`ReadinessBarrier`] makes this an explicit,
//! testable contract (each wired component reports ready) instead of an
//! implicit ordering assumption, satisfying scenario S9: a zero-delay
//! ingester that publishes inside `start()` still reaches every subscriber.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

use crossbeam_channel::Receiver as AlertReceiver;
use parking_lot::Mutex;
use tracing::info;

use gb_bus::{Event, EventBus, EventTag};
use gb_data::DataIngester;
use gb_risk::{ConfidenceOracle, NoModelOracle, RiskAlert, RiskMonitor, RiskMonitorConfig, SizingConfig, SizingGate};

use crate::config::EngineConfig;
use crate::execution::{ExecutionConfig, ExecutionSimulator};
use crate::portfolio::{AnalyticsReport, PortfolioEngine};
use crate::strategy_container::{Strategy, StrategyContainer};

/// Counts readiness signals from wired components. The orchestrator starts
/// the ingester only after every component it wired has reported ready.
#[derive(Clone, Default)]
pub struct ReadinessBarrier {
    ready: Arc<AtomicUsize>,
}

impl ReadinessBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by a component immediately after its `subscribe` calls return.
    pub fn signal_ready(&self) {
        self.ready.fetch_add(1, Ordering::SeqCst);
    }

    pub fn ready_count(&self) -> usize {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Orchestrates a full run (backtest or live) of the pipeline described in
/// spec.md §2.
pub struct Orchestrator {
    bus: EventBus,
    portfolio: Arc<Mutex<PortfolioEngine>>,
    barrier: ReadinessBarrier,
    completion_rx: Option<Receiver<()>>,
    ingester: Box<dyn DataIngester>,
    /// Ambient hardening (SPEC_FULL §1 [SUPPLEMENT]): alerts from the
    /// portfolio risk monitor, never gating order flow.
    alerts: AlertReceiver<RiskAlert>,
}

impl Orchestrator {
    /// Builds the full pipeline from `config`, wiring every component onto a
    /// fresh bus in dependency order. `strategies` and `ingester` are
    /// supplied by the caller since their concrete types (reference
    /// strategies, historical vs. live ingestion) depend on `config` in ways
    /// out of this module's scope (spec.md §1 Non-goals: config loading for
    /// specific strategies/ingesters beyond the event contract is external).
    pub fn build(
        config: &EngineConfig,
        strategies: Vec<Box<dyn Strategy>>,
        oracle: Option<Box<dyn ConfidenceOracle>>,
        ingester: Box<dyn DataIngester>,
    ) -> Self {
        let bus = EventBus::new();
        let barrier = ReadinessBarrier::new();

        // Event Bus is already constructed. Next: Portfolio Engine.
        let portfolio = PortfolioEngine::new("orchestrated-run", config.initial_capital).wire(&bus);
        barrier.signal_ready();

        // Strategy Container.
        StrategyContainer::new(strategies).wire(&bus);
        barrier.signal_ready();

        // Risk Gate (+ Confidence Oracle, the sole model-integration point).
        let oracle = oracle.unwrap_or_else(|| Box::new(NoModelOracle));
        let sizing_config = SizingConfig::new(config.risk.risk_per_trade_pct, config.risk.use_dynamic_sizing);
        SizingGate::new(config.initial_capital, sizing_config, oracle).wire(&bus);
        barrier.signal_ready();

        // Execution Simulator.
        let execution_config =
            ExecutionConfig::new(config.execution.commission_pct, config.execution.slippage_pct);
        ExecutionSimulator::new(execution_config).wire(&bus);
        barrier.signal_ready();

        // Analytics sink: a one-shot subscriber fulfilling the backtest
        // completion promise on the terminal `System` event, mirroring
        // `original_source`'s `std::promise<void>`/`std::future<void>` pair.
        let (completion_tx, completion_rx): (SyncSender<()>, Receiver<()>) = sync_channel(1);
        let completion_tx = Mutex::new(Some(completion_tx));
        bus.subscribe(EventTag::System, move |_event| {
            if let Some(tx) = completion_tx.lock().take() {
                let _ = tx.send(());
            }
        });
        barrier.signal_ready();

        // Portfolio risk monitor (SPEC_FULL §1 [SUPPLEMENT]): recomputes
        // VaR/leverage/concentration/gross-exposure on every
        // `PortfolioUpdate` and emits alerts over a channel. It never
        // publishes back onto the bus and never rejects an order — purely
        // observational, operational hardening `original_source` lacks.
        let (alert_tx, alert_rx) = crossbeam_channel::unbounded();
        let monitor = Mutex::new(RiskMonitor::new(RiskMonitorConfig::default(), alert_tx));
        let portfolio_for_monitor = portfolio.clone();
        bus.subscribe(EventTag::PortfolioUpdate, move |_event| {
            let snapshot = portfolio_for_monitor.lock().risk_snapshot();
            monitor.lock().update(&snapshot);
        });

        Self {
            bus,
            portfolio,
            barrier,
            completion_rx: Some(completion_rx),
            ingester,
            alerts: alert_rx,
        }
    }

    /// Drains any risk alerts emitted since the last call. Never blocks.
    pub fn drain_alerts(&self) -> Vec<RiskAlert> {
        self.alerts.try_iter().collect()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn readiness(&self) -> &ReadinessBarrier {
        &self.barrier
    }

    /// Starts the bus dispatcher, then the data ingester. The ingester is
    /// started only after every wired component's readiness signal has
    /// landed — the explicit barrier replacing the 100 ms sleep.
    pub fn start(&mut self) -> gb_types::GbResult<()> {
        self.bus.start();
        info!(ready = self.barrier.ready_count(), "starting data ingester after readiness barrier");
        self.ingester.start(self.bus.clone())
    }

    /// Reverse stop order: ingester first, then the bus (which drains on
    /// stop, delivering any terminal `System` event to the analytics sink).
    pub fn stop(&mut self) {
        self.ingester.stop();
        self.bus.stop();
    }

    /// Blocks until the terminal `System` event has been observed, for a
    /// backtest run. Returns the analytics report and tears the pipeline
    /// down, per spec.md §4.8.
    pub fn run_to_completion(&mut self) -> gb_types::GbResult<AnalyticsReport> {
        self.start()?;
        if let Some(rx) = self.completion_rx.take() {
            let _ = rx.recv();
        }
        self.stop();
        Ok(self.portfolio.lock().analytics_report())
    }

    pub fn analytics_report(&self) -> AnalyticsReport {
        self.portfolio.lock().analytics_report()
    }

    pub fn cash(&self) -> rust_decimal::Decimal {
        self.portfolio.lock().cash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy_container::EveryTickStrategy;
    use gb_types::market::Symbol;
    use gb_types::GbResult;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

    /// An ingester that publishes its first `Market` event synchronously
    /// inside `start()` — the worst case for the old sleep-based design
    /// (scenario S9).
    struct ZeroDelayIngester {
        symbol: Symbol,
    }

    impl DataIngester for ZeroDelayIngester {
        fn start(&mut self, bus: EventBus) -> GbResult<()> {
            bus.publish(Event::market(self.symbol.clone(), dec!(100)));
            bus.publish(Event::system());
            Ok(())
        }

        fn stop(&mut self) {}
    }

    fn symbol() -> Symbol {
        Symbol::crypto("BTC-USD")
    }

    fn test_config() -> EngineConfig {
        EngineConfig::parse(
            r#"{
                "run_mode": "BACKTEST",
                "initial_capital": 100000,
                "data": {"symbol": "BTC-USD"},
                "execution": {"commission_pct": 0.001, "slippage_pct": 0.0005},
                "risk": {"risk_per_trade_pct": 0.2, "use_dynamic_sizing": false}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_s9_readiness_barrier_eliminates_race() {
        let config = test_config();
        let strategies: Vec<Box<dyn Strategy>> = vec![Box::new(EveryTickStrategy::new(symbol()))];
        let ingester = Box::new(ZeroDelayIngester { symbol: symbol() });
        let mut orchestrator = Orchestrator::build(&config, strategies, None, ingester);

        // All five components (portfolio, strategies, risk, execution,
        // analytics sink) must have signaled ready before the ingester ever
        // starts publishing.
        assert_eq!(orchestrator.readiness().ready_count(), 5);

        let _report = orchestrator.run_to_completion().unwrap();
        assert!(orchestrator.cash() < config.initial_capital);
    }

    #[test]
    fn test_s1_end_of_stream_produces_fill_and_cash_drop() {
        struct ThreeTickIngester {
            symbol: Symbol,
            published: AtomicBool,
        }
        impl DataIngester for ThreeTickIngester {
            fn start(&mut self, bus: EventBus) -> GbResult<()> {
                if !self.published.swap(true, AtomicOrdering::SeqCst) {
                    for price in [dec!(100.0), dec!(101.0), dec!(102.0)] {
                        bus.publish(Event::market(self.symbol.clone(), price));
                    }
                    bus.publish(Event::system());
                }
                Ok(())
            }
            fn stop(&mut self) {}
        }

        let config = test_config();
        let strategies: Vec<Box<dyn Strategy>> = vec![Box::new(EveryTickStrategy::new(symbol()))];
        let ingester = Box::new(ThreeTickIngester {
            symbol: symbol(),
            published: AtomicBool::new(false),
        });
        let mut orchestrator = Orchestrator::build(&config, strategies, None, ingester);
        orchestrator.start().unwrap();
        if let Some(rx) = orchestrator.completion_rx.take() {
            let _ = rx.recv();
        }
        orchestrator.stop();
        let cash = orchestrator.cash();

        // S1: at least one Fill occurred (cash moved below initial capital)
        // and the terminal System event was observed (we reached this line
        // at all, since `completion_rx.recv()` would otherwise block). `cash`
        // is read only after `stop()`'s drain barrier, since the terminal
        // `System` event can be dispatched before the last ticks' Signal ->
        // Order -> Fill chain has fully drained off the queue tail.
        assert!(cash < config.initial_capital);
    }
}
