//! Strategy Container (spec.md §4.4).
//!
//! Holds an ordered collection of [`Strategy`] instances and dispatches
//! `Market`/`OrderBook`/`News`/`MarketRegimeChanged` events to them,
//! publishing any returned `Signal` onto the bus. Per REDESIGN FLAGS, the
//! strategy capability set is a plain trait with default no-op hooks, not a
//! polymorphic class hierarchy with downcasting.

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;

use gb_bus::{Event, EventBus, EventTag};
use gb_types::market::Symbol;
use gb_types::orders::Side;

/// Capability set a strategy implements. Unused hooks default to no-ops, the
/// idiomatic Rust translation of the source's virtual-with-default-body
/// pattern (spec.md §4.4, §9 "Fan-out via capability, not class hierarchy").
pub trait Strategy: Send {
    /// Called for every `Market` tick for this strategy's symbol.
    fn on_market(&mut self, event: &Event) -> Option<Event> {
        let _ = event;
        None
    }

    /// Called for every `OrderBook` update for this strategy's symbol.
    fn on_order_book(&mut self, event: &Event) -> Option<Event> {
        let _ = event;
        None
    }

    /// Called for every `News` event; never produces a signal directly.
    fn on_news(&mut self, event: &Event) {
        let _ = event;
    }

    /// Called for every `MarketRegimeChanged` event; never produces a
    /// signal directly.
    fn on_regime_change(&mut self, event: &Event) {
        let _ = event;
    }
}

/// Always signals BUY on every `Market` tick. Grounded in
/// `original_source`'s `BuyEveryTickStrategy`; used directly by scenario S1.
pub struct EveryTickStrategy {
    symbol: Symbol,
}

impl EveryTickStrategy {
    pub fn new(symbol: Symbol) -> Self {
        Self { symbol }
    }
}

impl Strategy for EveryTickStrategy {
    fn on_market(&mut self, event: &Event) -> Option<Event> {
        match event {
            Event::Market { symbol, .. } if *symbol == self.symbol => {
                Some(Event::signal(symbol.clone(), Side::Buy))
            }
            _ => None,
        }
    }
}

/// Signals BUY/SELL when the top-N bid/ask volume ratio crosses
/// `imbalance_threshold`; produces no signal when the book is balanced.
/// Grounded in `original_source`'s `OrderBookImbalanceStrategy`, exercising
/// the "equal volumes never signal" boundary from spec.md §8.
pub struct OrderBookImbalanceStrategy {
    symbol: Symbol,
    lookback_levels: usize,
    imbalance_threshold: Decimal,
}

impl OrderBookImbalanceStrategy {
    pub fn new(symbol: Symbol, lookback_levels: usize, imbalance_threshold: Decimal) -> Self {
        Self {
            symbol,
            lookback_levels,
            imbalance_threshold,
        }
    }

    fn imbalance_ratio(&self, bids: &[gb_types::BookLevel], asks: &[gb_types::BookLevel]) -> Option<Decimal> {
        let bid_volume: Decimal = bids.iter().take(self.lookback_levels).map(|l| l.quantity).sum();
        let ask_volume: Decimal = asks.iter().take(self.lookback_levels).map(|l| l.quantity).sum();
        if ask_volume == Decimal::ZERO {
            return None;
        }
        Some(bid_volume / ask_volume)
    }
}

impl Strategy for OrderBookImbalanceStrategy {
    fn on_order_book(&mut self, event: &Event) -> Option<Event> {
        let Event::OrderBook { symbol, bids, asks, .. } = event else {
            return None;
        };
        if *symbol != self.symbol {
            return None;
        }
        let ratio = self.imbalance_ratio(bids, asks)?;
        if ratio >= Decimal::ONE + self.imbalance_threshold {
            Some(Event::signal(symbol.clone(), Side::Buy))
        } else if ratio <= Decimal::ONE - self.imbalance_threshold {
            Some(Event::signal(symbol.clone(), Side::Sell))
        } else {
            None
        }
    }
}

/// Subscribes to `Market`, `OrderBook`, `News`, `MarketRegimeChanged`;
/// invokes every held strategy and publishes any returned `Signal`.
pub struct StrategyContainer {
    strategies: Vec<Box<dyn Strategy>>,
}

impl StrategyContainer {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    /// Wire this container onto `bus`.
    pub fn wire(self, bus: &EventBus) -> Arc<Mutex<StrategyContainer>> {
        let shared = Arc::new(Mutex::new(self));
        for tag in [
            EventTag::Market,
            EventTag::OrderBook,
            EventTag::News,
            EventTag::MarketRegimeChanged,
        ] {
            let shared = shared.clone();
            let bus_clone = bus.clone();
            bus.subscribe(tag, move |event| {
                shared.lock().handle(event, &bus_clone);
            });
        }
        shared
    }

    fn handle(&mut self, event: &Event, bus: &EventBus) {
        for strategy in &mut self.strategies {
            let signal = match event {
                Event::Market { .. } => strategy.on_market(event),
                Event::OrderBook { .. } => strategy.on_order_book(event),
                Event::News { .. } => {
                    strategy.on_news(event);
                    None
                }
                Event::MarketRegimeChanged { .. } => {
                    strategy.on_regime_change(event);
                    None
                }
                _ => None,
            };
            if let Some(signal) = signal {
                bus.publish(signal);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_types::BookLevel;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn symbol() -> Symbol {
        Symbol::crypto("BTC-USD")
    }

    #[test]
    fn test_every_tick_strategy_signals_on_every_market_event() {
        let bus = EventBus::new();
        let signals = Arc::new(AtomicUsize::new(0));
        let signals_clone = signals.clone();
        bus.subscribe(EventTag::Signal, move |_| {
            signals_clone.fetch_add(1, Ordering::SeqCst);
        });
        let _container =
            StrategyContainer::new(vec![Box::new(EveryTickStrategy::new(symbol()))]).wire(&bus);

        bus.start();
        bus.publish(Event::market(symbol(), dec!(100)));
        bus.publish(Event::market(symbol(), dec!(101)));
        bus.publish(Event::market(symbol(), dec!(102)));
        bus.stop();

        assert_eq!(signals.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_balanced_order_book_produces_no_signal() {
        let bus = EventBus::new();
        let signals = Arc::new(AtomicUsize::new(0));
        let signals_clone = signals.clone();
        bus.subscribe(EventTag::Signal, move |_| {
            signals_clone.fetch_add(1, Ordering::SeqCst);
        });
        let _container = StrategyContainer::new(vec![Box::new(OrderBookImbalanceStrategy::new(
            symbol(),
            5,
            dec!(0.2),
        ))])
        .wire(&bus);

        bus.start();
        bus.publish(Event::order_book(
            symbol(),
            vec![BookLevel::new(dec!(100), dec!(10))],
            vec![BookLevel::new(dec!(101), dec!(10))],
        ));
        bus.stop();

        assert_eq!(signals.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_bid_heavy_order_book_signals_buy() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        bus.subscribe(EventTag::Signal, move |event| {
            if let Event::Signal { direction, .. } = event {
                *seen_clone.lock() = Some(*direction);
            }
        });
        let _container = StrategyContainer::new(vec![Box::new(OrderBookImbalanceStrategy::new(
            symbol(),
            5,
            dec!(0.2),
        ))])
        .wire(&bus);

        bus.start();
        bus.publish(Event::order_book(
            symbol(),
            vec![BookLevel::new(dec!(100), dec!(100))],
            vec![BookLevel::new(dec!(101), dec!(10))],
        ));
        bus.stop();

        assert_eq!(seen.lock().take(), Some(Side::Buy));
    }

    #[test]
    fn test_news_and_regime_events_never_produce_signals() {
        let bus = EventBus::new();
        let signals = Arc::new(AtomicUsize::new(0));
        let signals_clone = signals.clone();
        bus.subscribe(EventTag::Signal, move |_| {
            signals_clone.fetch_add(1, Ordering::SeqCst);
        });
        let _container =
            StrategyContainer::new(vec![Box::new(EveryTickStrategy::new(symbol()))]).wire(&bus);

        bus.start();
        bus.publish(Event::news(symbol(), "headline", dec!(0.5)));
        bus.publish(Event::regime_changed(gb_types::RegimeState {
            volatility: gb_types::Volatility::High,
            trend: gb_types::Trend::Up,
        }));
        bus.stop();

        assert_eq!(signals.load(Ordering::SeqCst), 0);
    }
}
