use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::Symbol;

/// Unique order identifier
pub type OrderId = Uuid;

/// Direction of an order (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
    
    pub fn sign(&self) -> i32 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

/// Order execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: Uuid,
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub commission: Decimal,
    pub executed_at: DateTime<Utc>,
    pub strategy_id: String,
}

impl Fill {
    pub fn new(
        order_id: OrderId,
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        price: Decimal,
        commission: Decimal,
        strategy_id: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            symbol,
            side,
            quantity,
            price,
            commission,
            executed_at: Utc::now(),
            strategy_id,
        }
    }
    
    pub fn gross_amount(&self) -> Decimal {
        self.quantity * self.price
    }
    
    pub fn net_amount(&self) -> Decimal {
        match self.side {
            Side::Buy => -(self.gross_amount() + self.commission),
            Side::Sell => self.gross_amount() - self.commission,
        }
    }
} 