//! Real-time risk metrics and monitoring pipeline for GlowBack.
//!
//! Provides:
//! - Continuous portfolio-level risk assessment (VaR, drawdown, exposure)
//! - Per-position risk metrics (concentration, Greeks placeholder)
//! - Configurable risk limits with breach detection
//! - Event-driven monitoring via channels

pub mod alerts;
pub mod confidence;
pub mod metrics;
pub mod monitor;
pub mod sizing;

pub use alerts::{RiskAlert, RiskAlertKind, RiskSeverity};
pub use confidence::{ConfidenceOracle, NoModelOracle};
pub use metrics::{PortfolioRiskSnapshot, PositionRisk, RiskMetricsCalculator};
pub use monitor::{RiskMonitor, RiskMonitorConfig};
pub use sizing::{SizingConfig, SizingGate};
