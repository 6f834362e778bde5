//! Stub ingesters giving `News` and `MarketRegimeChanged` a real producer.
//!
//! Per spec.md §1 the sentiment-scoring and regime-classification
//! *algorithms* are out of scope — these ingesters accept pre-scored values
//! from their caller (a test harness or an external process) and merely
//! publish the corresponding event; they never compute a score themselves.

use gb_bus::EventBus;
use gb_types::{Event, RegimeState, Symbol};
use rust_decimal::Decimal;

/// Publishes a pre-scored `News` event. Construct one per headline; there is
/// no background thread because this ingester has nothing to poll.
pub struct NewsIngester {
    bus: EventBus,
}

impl NewsIngester {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Publish a `News` event carrying `sentiment_score` as already computed
    /// by an external sentiment model.
    pub fn publish(&self, symbol: Symbol, headline: impl Into<String>, sentiment_score: Decimal) {
        self.bus.publish(Event::news(symbol, headline, sentiment_score));
    }
}

/// Publishes a pre-classified `MarketRegimeChanged` event.
pub struct RegimeIngester {
    bus: EventBus,
}

impl RegimeIngester {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub fn publish(&self, state: RegimeState) {
        self.bus.publish(Event::regime_changed(state));
    }
}
