//! Control-surface payload shapes (spec.md §6).
//!
//! The HTTP control API itself is an external collaborator (out of scope);
//! this module exposes the two payload shapes `GET /report` and `GET /pnl`
//! would serve, so a real HTTP layer is a thin wrapper away.

use serde_json::{json, Value};

use crate::portfolio::{AnalyticsReport, PortfolioEngine};

pub fn to_json(report: &AnalyticsReport) -> Value {
    json!({
        "initial_equity": report.initial_equity,
        "final_equity": report.final_equity,
        "total_return_pct": report.total_return_pct,
        "max_drawdown_pct": report.max_drawdown_pct,
        "sharpe_ratio": report.sharpe_ratio,
        "sortino_ratio": report.sortino_ratio,
        "total_trades": report.total_trades,
        "win_rate_pct": report.win_rate_pct,
        "profit_factor": report.profit_factor,
    })
}

pub fn pnl_snapshot(engine: &PortfolioEngine) -> Value {
    let total_pnl: rust_decimal::Decimal = engine.trade_log().iter().map(|t| t.pnl).sum();
    json!({
        "total_pnl": total_pnl,
        "total_trades": engine.trade_log().len(),
    })
}
