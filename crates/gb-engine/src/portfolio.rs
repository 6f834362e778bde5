//! Portfolio & P&L Engine.
//!
//! Owns cash, positions, and the realized-trade log; turns `Fill`s into
//! trades, computes the volume-weighted average entry price, and emits
//! `PortfolioUpdate` on start and after every fill.
//!
//! An oversized closing fill flips the position to the opposite side with
//! the residual quantity, and equity is mark-to-market using the latest
//! cached price rather than mark-to-entry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::error;
use uuid::Uuid;

use gb_bus::{Event, EventBus, EventTag};
use gb_types::market::Symbol;
use gb_types::orders::Side;

/// Positions closer than this to flat are treated as closed.
const POSITION_EPSILON: Decimal = dec!(0.000000001);

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: Symbol,
    pub direction: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
}

/// A realized trade, appended to the trade log on close.
/// `direction` is the direction of the position that was closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub symbol: Symbol,
    pub direction: Side,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl: Decimal,
}

/// Performance metrics computed over the event-sourced equity curve and
/// trade log.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsReport {
    pub initial_equity: Decimal,
    pub final_equity: Decimal,
    pub total_return_pct: Decimal,
    pub max_drawdown_pct: Decimal,
    pub sharpe_ratio: Decimal,
    pub sortino_ratio: Decimal,
    pub total_trades: usize,
    pub win_rate_pct: Decimal,
    pub profit_factor: Decimal,
}

pub struct PortfolioEngine {
    cash: Decimal,
    initial_equity: Decimal,
    positions: HashMap<Symbol, Position>,
    trade_log: Vec<Trade>,
    /// Latest cached price per symbol, fed by `Market`/`OrderBook` exactly
    /// like the risk gate's own cache — used to mark equity to market.
    prices: HashMap<Symbol, Decimal>,
    equity_curve: Vec<Decimal>,
    /// Parallel bookkeeping in the richer `gb_types::portfolio::Portfolio`
    /// shape, fed from the same fills, so the ambient risk monitor
    /// (`gb_risk::monitor`) can subscribe without this engine depending on
    /// `gb-risk`.
    shadow: gb_types::portfolio::Portfolio,
}

impl PortfolioEngine {
    pub fn new(account_id: impl Into<String>, initial_capital: Decimal) -> Self {
        Self {
            cash: initial_capital,
            initial_equity: initial_capital,
            positions: HashMap::new(),
            trade_log: Vec::new(),
            prices: HashMap::new(),
            equity_curve: vec![initial_capital],
            shadow: gb_types::portfolio::Portfolio::new(account_id.into(), initial_capital),
        }
    }

    pub fn positions(&self) -> &HashMap<Symbol, Position> {
        &self.positions
    }

    pub fn trade_log(&self) -> &[Trade] {
        &self.trade_log
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    /// A clone of the richer teacher-shaped `Portfolio`, kept in sync with
    /// every fill, for ambient risk-monitor consumption.
    pub fn risk_snapshot(&self) -> gb_types::portfolio::Portfolio {
        self.shadow.clone()
    }

    /// Wire this engine onto `bus`: subscribes to `Fill`/`Market`/`OrderBook`
    /// and immediately publishes the initial `PortfolioUpdate`.
    pub fn wire(self, bus: &EventBus) -> Arc<Mutex<PortfolioEngine>> {
        let shared = Arc::new(Mutex::new(self));
        bus.publish(Event::portfolio_update(
            shared.lock().equity(),
            shared.lock().cash,
        ));

        for tag in [EventTag::Fill, EventTag::Market, EventTag::OrderBook] {
            let shared = shared.clone();
            let bus_clone = bus.clone();
            bus.subscribe(tag, move |event| {
                shared.lock().handle(event, &bus_clone);
            });
        }
        shared
    }

    fn handle(&mut self, event: &Event, bus: &EventBus) {
        match event {
            Event::Fill {
                symbol,
                direction,
                quantity,
                fill_price,
                commission,
                ..
            } => {
                self.on_fill(symbol, *direction, *quantity, *fill_price, *commission);
                let equity = self.equity();
                self.equity_curve.push(equity);
                bus.publish(Event::portfolio_update(equity, self.cash));
                self.check_invariants(bus);
            }
            Event::Market { symbol, price, .. } => {
                self.prices.insert(symbol.clone(), *price);
                self.shadow.update_market_prices(&self.prices);
            }
            Event::OrderBook { symbol, bids, .. } => {
                if let Some(best_bid) = bids.first() {
                    self.prices.insert(symbol.clone(), best_bid.price);
                    self.shadow.update_market_prices(&self.prices);
                }
            }
            _ => {}
        }
    }

    fn on_fill(
        &mut self,
        symbol: &Symbol,
        direction: Side,
        quantity: Decimal,
        fill_price: Decimal,
        commission: Decimal,
    ) {
        let notional = fill_price * quantity;
        match direction {
            Side::Buy => self.cash -= notional + commission,
            Side::Sell => self.cash += notional - commission,
        }
        self.prices.insert(symbol.clone(), fill_price);

        match self.positions.remove(symbol) {
            None => {
                self.positions.insert(
                    symbol.clone(),
                    Position {
                        symbol: symbol.clone(),
                        direction,
                        quantity,
                        entry_price: fill_price,
                    },
                );
            }
            Some(mut position) if position.direction == direction => {
                let total_quantity = position.quantity + quantity;
                position.entry_price = (position.entry_price * position.quantity
                    + fill_price * quantity)
                    / total_quantity;
                position.quantity = total_quantity;
                self.positions.insert(symbol.clone(), position);
            }
            Some(position) => {
                // Opposing side: a closing fill, possibly larger than the
                // open position. §9.1 applied: the excess flips to a new
                // position in the fill's direction instead of being
                // discarded.
                let closed = position.quantity.min(quantity);
                let pnl = match position.direction {
                    Side::Buy => (fill_price - position.entry_price) * closed - commission,
                    Side::Sell => (position.entry_price - fill_price) * closed - commission,
                };
                self.trade_log.push(Trade {
                    symbol: symbol.clone(),
                    direction: position.direction,
                    quantity: closed,
                    entry_price: position.entry_price,
                    exit_price: fill_price,
                    pnl,
                });

                let remaining_open = position.quantity - closed;
                if remaining_open > POSITION_EPSILON {
                    self.positions.insert(
                        symbol.clone(),
                        Position {
                            quantity: remaining_open,
                            ..position
                        },
                    );
                }

                let residual_fill = quantity - closed;
                if residual_fill > POSITION_EPSILON {
                    self.positions.insert(
                        symbol.clone(),
                        Position {
                            symbol: symbol.clone(),
                            direction,
                            quantity: residual_fill,
                            entry_price: fill_price,
                        },
                    );
                }
            }
        }

        let shadow_fill = gb_types::orders::Fill::new(
            Uuid::new_v4(),
            symbol.clone(),
            direction,
            quantity,
            fill_price,
            commission,
            "portfolio-engine".to_string(),
        );
        self.shadow.apply_fill(&shadow_fill);
    }

    /// `equity = cash + Σ(position.quantity × price)`, marking to the latest
    /// cached market price (§9.2) and falling back to the position's own
    /// entry price for a symbol that has never produced a `Market`/
    /// `OrderBook` event (cannot happen once a position exists, but keeps
    /// the function total).
    fn equity(&self) -> Decimal {
        let positions_value: Decimal = self
            .positions
            .values()
            .map(|p| {
                let price = self.prices.get(&p.symbol).copied().unwrap_or(p.entry_price);
                p.quantity * price
            })
            .sum();
        self.cash + positions_value
    }

    /// Checks the "negative cash with no short positions" invariant from
    /// spec.md §7. A debug build panics immediately via `debug_assert!`; a
    /// release build logs the violation and forces an orderly shutdown by
    /// publishing the terminal `System` event itself, matching "the
    /// pipeline aborts via the terminal System event."
    fn check_invariants(&self, bus: &EventBus) {
        let has_short_exposure = self.positions.values().any(|p| p.direction == Side::Sell);
        let violated = self.cash < Decimal::ZERO && !has_short_exposure;
        debug_assert!(
            !violated,
            "invariant violated: negative cash ({}) with no short positions open",
            self.cash
        );
        if violated {
            error!(cash = %self.cash, "invariant violation: negative cash with no short exposure, forcing shutdown");
            bus.publish(Event::system());
        }
    }

    pub fn analytics_report(&self) -> AnalyticsReport {
        let final_equity = *self.equity_curve.last().unwrap_or(&self.initial_equity);
        let total_return_pct = if self.initial_equity > Decimal::ZERO {
            (final_equity - self.initial_equity) / self.initial_equity * Decimal::from(100)
        } else {
            Decimal::ZERO
        };

        let returns = step_returns(&self.equity_curve);
        let (sharpe_ratio, sortino_ratio) = if returns.len() >= 2 {
            (annualized_sharpe(&returns), annualized_sortino(&returns))
        } else {
            (Decimal::ZERO, Decimal::ZERO)
        };

        let max_drawdown_pct = max_drawdown_pct(&self.equity_curve);

        let total_trades = self.trade_log.len();
        let winning_trades = self.trade_log.iter().filter(|t| t.pnl > Decimal::ZERO).count();
        let win_rate_pct = if total_trades > 0 {
            Decimal::from(winning_trades) / Decimal::from(total_trades) * Decimal::from(100)
        } else {
            Decimal::ZERO
        };

        let gross_wins: Decimal = self
            .trade_log
            .iter()
            .map(|t| t.pnl)
            .filter(|pnl| *pnl > Decimal::ZERO)
            .sum();
        let gross_losses: Decimal = self
            .trade_log
            .iter()
            .map(|t| t.pnl)
            .filter(|pnl| *pnl < Decimal::ZERO)
            .sum();
        let profit_factor = if gross_losses == Decimal::ZERO {
            Decimal::ZERO
        } else {
            (gross_wins / gross_losses).abs()
        };

        AnalyticsReport {
            initial_equity: self.initial_equity,
            final_equity,
            total_return_pct,
            max_drawdown_pct,
            sharpe_ratio,
            sortino_ratio,
            total_trades,
            win_rate_pct,
            profit_factor,
        }
    }
}

fn step_returns(equity_curve: &[Decimal]) -> Vec<Decimal> {
    equity_curve
        .windows(2)
        .filter_map(|w| {
            if w[0] == Decimal::ZERO {
                None
            } else {
                Some((w[1] - w[0]) / w[0])
            }
        })
        .collect()
}

fn mean(values: &[Decimal]) -> Decimal {
    values.iter().sum::<Decimal>() / Decimal::from(values.len())
}

fn std_dev(values: &[Decimal], mean_value: Decimal) -> Decimal {
    let variance = values
        .iter()
        .map(|v| {
            let diff = (*v - mean_value).to_f64().unwrap_or(0.0);
            diff * diff
        })
        .sum::<f64>()
        / (values.len() as f64 - 1.0).max(1.0);
    Decimal::from_f64_retain(variance.sqrt()).unwrap_or_default()
}

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

fn annualized_sharpe(returns: &[Decimal]) -> Decimal {
    let mean_return = mean(returns);
    let sd = std_dev(returns, mean_return);
    if sd == Decimal::ZERO {
        return Decimal::ZERO;
    }
    let annualization = Decimal::from_f64_retain(TRADING_DAYS_PER_YEAR.sqrt()).unwrap_or_default();
    mean_return / sd * annualization
}

fn annualized_sortino(returns: &[Decimal]) -> Decimal {
    let mean_return = mean(returns);
    let downside: Vec<Decimal> = returns.iter().copied().filter(|r| *r < Decimal::ZERO).collect();
    if downside.is_empty() {
        return Decimal::ZERO;
    }
    let downside_deviation = std_dev(&downside, Decimal::ZERO);
    if downside_deviation == Decimal::ZERO {
        return Decimal::ZERO;
    }
    let annualization = Decimal::from_f64_retain(TRADING_DAYS_PER_YEAR.sqrt()).unwrap_or_default();
    mean_return / downside_deviation * annualization
}

fn max_drawdown_pct(equity_curve: &[Decimal]) -> Decimal {
    let mut peak = match equity_curve.first() {
        Some(v) => *v,
        None => return Decimal::ZERO,
    };
    let mut max_drawdown = Decimal::ZERO;
    for value in equity_curve {
        if *value > peak {
            peak = *value;
        }
        if peak > Decimal::ZERO {
            let drawdown = (peak - *value) / peak;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }
    }
    max_drawdown * Decimal::from(100)
}
