//! Execution Simulator (spec.md §4.6).
//!
//! Converts every `Order` into exactly one `Fill`: applies symmetric
//! slippage around the order's market price and a proportional commission.
//! No partial fills, no latency, no rejections — unlike the risk gate, this
//! stage never says no.

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;

use gb_bus::{Event, EventBus, EventTag};
use gb_types::orders::Side;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionConfig {
    pub commission_pct: Decimal,
    pub slippage_pct: Decimal,
}

impl ExecutionConfig {
    pub fn new(commission_pct: Decimal, slippage_pct: Decimal) -> Self {
        Self {
            commission_pct,
            slippage_pct,
        }
    }
}

pub struct ExecutionSimulator {
    config: ExecutionConfig,
}

impl ExecutionSimulator {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    /// Wire this simulator onto `bus`: subscribes to `Order`, publishes `Fill`.
    pub fn wire(self, bus: &EventBus) -> Arc<Mutex<ExecutionSimulator>> {
        let shared = Arc::new(Mutex::new(self));
        let shared_clone = shared.clone();
        let bus_clone = bus.clone();
        bus.subscribe(EventTag::Order, move |event| {
            shared_clone.lock().handle(event, &bus_clone);
        });
        shared
    }

    fn handle(&mut self, event: &Event, bus: &EventBus) {
        if let Event::Order {
            symbol,
            direction,
            quantity,
            market_price,
            ..
        } = event
        {
            let fill = self.simulate(symbol.clone(), *direction, *quantity, *market_price);
            bus.publish(fill);
        }
    }

    fn simulate(
        &self,
        symbol: gb_types::market::Symbol,
        direction: Side,
        quantity: Decimal,
        market_price: Decimal,
    ) -> Event {
        let slippage = market_price * self.config.slippage_pct;
        let fill_price = match direction {
            Side::Buy => market_price + slippage,
            Side::Sell => market_price - slippage,
        };
        let commission = fill_price * quantity * self.config.commission_pct;
        Event::fill(symbol, direction, quantity, fill_price, commission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_types::market::Symbol;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::crypto("BTC-USD")
    }

    #[test]
    fn test_buy_fill_price_includes_positive_slippage() {
        let sim = ExecutionSimulator::new(ExecutionConfig::new(dec!(0.001), dec!(0.0005)));
        let fill = sim.simulate(symbol(), Side::Buy, dec!(10), dec!(100));
        if let Event::Fill {
            fill_price,
            commission,
            ..
        } = fill
        {
            assert_eq!(fill_price, dec!(100.05));
            assert_eq!(commission, dec!(100.05) * dec!(10) * dec!(0.001));
        } else {
            panic!("expected Fill event");
        }
    }

    #[test]
    fn test_sell_fill_price_subtracts_slippage() {
        let sim = ExecutionSimulator::new(ExecutionConfig::new(dec!(0.001), dec!(0.0005)));
        let fill = sim.simulate(symbol(), Side::Sell, dec!(10), dec!(100));
        if let Event::Fill { fill_price, .. } = fill {
            assert_eq!(fill_price, dec!(99.95));
        } else {
            panic!("expected Fill event");
        }
    }

    #[test]
    fn test_order_always_produces_exactly_one_fill() {
        let bus = EventBus::new();
        let fills = Arc::new(Mutex::new(0usize));
        let fills_clone = fills.clone();
        bus.subscribe(EventTag::Fill, move |_| {
            *fills_clone.lock() += 1;
        });
        let _sim = ExecutionSimulator::new(ExecutionConfig::new(dec!(0.001), dec!(0.0005))).wire(&bus);

        bus.start();
        bus.publish(Event::order(symbol(), Side::Buy, dec!(1), dec!(100)));
        bus.stop();

        assert_eq!(*fills.lock(), 1);
    }
}
