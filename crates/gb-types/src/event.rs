use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::Symbol;
use crate::orders::Side;

/// A single resting order-book level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl BookLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Realized or forecast volatility regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Volatility {
    Low,
    Normal,
    High,
}

/// Directional market regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Sideways,
    Up,
    Down,
}

/// Snapshot of the market regime classifier's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegimeState {
    pub volatility: Volatility,
    pub trend: Trend,
}

/// Tag identifying an [`Event`] variant without its payload. Used as the
/// event bus's subscriber-table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTag {
    Market,
    OrderBook,
    News,
    MarketRegimeChanged,
    Signal,
    Order,
    Fill,
    PortfolioUpdate,
    System,
}

/// The closed set of events flowing through the bus. Every variant carries
/// its own timestamp, assigned at construction; variants are immutable once
/// built and handlers only ever see a shared reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Market {
        timestamp: DateTime<Utc>,
        symbol: Symbol,
        price: Decimal,
    },
    OrderBook {
        timestamp: DateTime<Utc>,
        symbol: Symbol,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
    },
    News {
        timestamp: DateTime<Utc>,
        symbol: Symbol,
        headline: String,
        sentiment_score: Decimal,
    },
    MarketRegimeChanged {
        timestamp: DateTime<Utc>,
        state: RegimeState,
    },
    Signal {
        timestamp: DateTime<Utc>,
        symbol: Symbol,
        direction: Side,
    },
    Order {
        timestamp: DateTime<Utc>,
        symbol: Symbol,
        direction: Side,
        quantity: Decimal,
        market_price: Decimal,
    },
    Fill {
        timestamp: DateTime<Utc>,
        symbol: Symbol,
        direction: Side,
        quantity: Decimal,
        fill_price: Decimal,
        commission: Decimal,
    },
    PortfolioUpdate {
        timestamp: DateTime<Utc>,
        total_equity: Decimal,
        cash: Decimal,
    },
    System {
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    pub fn tag(&self) -> EventTag {
        match self {
            Event::Market { .. } => EventTag::Market,
            Event::OrderBook { .. } => EventTag::OrderBook,
            Event::News { .. } => EventTag::News,
            Event::MarketRegimeChanged { .. } => EventTag::MarketRegimeChanged,
            Event::Signal { .. } => EventTag::Signal,
            Event::Order { .. } => EventTag::Order,
            Event::Fill { .. } => EventTag::Fill,
            Event::PortfolioUpdate { .. } => EventTag::PortfolioUpdate,
            Event::System { .. } => EventTag::System,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Market { timestamp, .. }
            | Event::OrderBook { timestamp, .. }
            | Event::News { timestamp, .. }
            | Event::MarketRegimeChanged { timestamp, .. }
            | Event::Signal { timestamp, .. }
            | Event::Order { timestamp, .. }
            | Event::Fill { timestamp, .. }
            | Event::PortfolioUpdate { timestamp, .. }
            | Event::System { timestamp } => *timestamp,
        }
    }

    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            Event::Market { symbol, .. }
            | Event::OrderBook { symbol, .. }
            | Event::News { symbol, .. }
            | Event::Signal { symbol, .. }
            | Event::Order { symbol, .. }
            | Event::Fill { symbol, .. } => Some(symbol),
            Event::MarketRegimeChanged { .. }
            | Event::PortfolioUpdate { .. }
            | Event::System { .. } => None,
        }
    }

    pub fn market(symbol: Symbol, price: Decimal) -> Self {
        Event::Market {
            timestamp: Utc::now(),
            symbol,
            price,
        }
    }

    pub fn order_book(symbol: Symbol, bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> Self {
        Event::OrderBook {
            timestamp: Utc::now(),
            symbol,
            bids,
            asks,
        }
    }

    pub fn signal(symbol: Symbol, direction: Side) -> Self {
        Event::Signal {
            timestamp: Utc::now(),
            symbol,
            direction,
        }
    }

    pub fn system() -> Self {
        Event::System {
            timestamp: Utc::now(),
        }
    }

    pub fn news(symbol: Symbol, headline: impl Into<String>, sentiment_score: Decimal) -> Self {
        Event::News {
            timestamp: Utc::now(),
            symbol,
            headline: headline.into(),
            sentiment_score,
        }
    }

    pub fn regime_changed(state: RegimeState) -> Self {
        Event::MarketRegimeChanged {
            timestamp: Utc::now(),
            state,
        }
    }

    pub fn order(symbol: Symbol, direction: Side, quantity: Decimal, market_price: Decimal) -> Self {
        Event::Order {
            timestamp: Utc::now(),
            symbol,
            direction,
            quantity,
            market_price,
        }
    }

    pub fn fill(
        symbol: Symbol,
        direction: Side,
        quantity: Decimal,
        fill_price: Decimal,
        commission: Decimal,
    ) -> Self {
        Event::Fill {
            timestamp: Utc::now(),
            symbol,
            direction,
            quantity,
            fill_price,
            commission,
        }
    }

    pub fn portfolio_update(total_equity: Decimal, cash: Decimal) -> Self {
        Event::PortfolioUpdate {
            timestamp: Utc::now(),
            total_equity,
            cash,
        }
    }

    /// Best bid (highest price) of an `OrderBook` event, if any levels exist.
    pub fn best_bid(&self) -> Option<BookLevel> {
        match self {
            Event::OrderBook { bids, .. } => bids.first().copied(),
            _ => None,
        }
    }
}
