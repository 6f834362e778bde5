//! Configuration loading (spec.md §6, SPEC_FULL §4.8).
//!
//! Deserializes the single JSON configuration document into strongly typed
//! structs. A missing file or malformed JSON is a fatal [`GbError::Config`],
//! surfaced before any thread starts, per spec.md §7.

use std::collections::HashMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gb_types::{GbError, GbResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunMode {
    Backtest,
    Live,
    Optimization,
    WalkForward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub symbol: String,
    pub data_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfigDoc {
    pub commission_pct: Decimal,
    pub slippage_pct: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskConfigDoc {
    pub risk_per_trade_pct: Decimal,
    #[serde(default)]
    pub use_dynamic_sizing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfigDoc {
    #[serde(default = "default_true")]
    pub calculate_sharpe: bool,
    #[serde(default = "default_true")]
    pub calculate_max_drawdown: bool,
}

fn default_true() -> bool {
    true
}

impl Default for AnalyticsConfigDoc {
    fn default() -> Self {
        Self {
            calculate_sharpe: true,
            calculate_max_drawdown: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    #[serde(default)]
    pub lookback_levels: Option<usize>,
    #[serde(default)]
    pub imbalance_threshold: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfigDoc {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub params: StrategyParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSocketConfig {
    pub host: String,
    pub port: u16,
    pub target: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationConfig {
    pub strategy_name: String,
    pub param_ranges: HashMap<String, Vec<Decimal>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardConfig {
    pub start_date: String,
    pub end_date: String,
    pub in_sample_days: u32,
    pub out_of_sample_days: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineLearningConfig {
    #[serde(default)]
    pub model_path: String,
}

/// The single JSON configuration document described in spec.md §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub run_mode: RunMode,
    pub initial_capital: Decimal,
    pub data: DataConfig,
    pub execution: ExecutionConfigDoc,
    pub risk: RiskConfigDoc,
    #[serde(default)]
    pub analytics: AnalyticsConfigDoc,
    #[serde(default)]
    pub strategies: Vec<StrategyConfigDoc>,
    #[serde(default)]
    pub websocket: Option<WebSocketConfig>,
    #[serde(default)]
    pub optimization: Option<OptimizationConfig>,
    #[serde(default)]
    pub walk_forward: Option<WalkForwardConfig>,
    #[serde(default)]
    pub machine_learning: MachineLearningConfig,
}

impl EngineConfig {
    /// Loads and parses the configuration document at `path`. Any failure
    /// (missing file, malformed JSON) is a fatal [`GbError::Config`] —
    /// surfaced before any thread starts, per spec.md §7.
    pub fn load(path: impl AsRef<Path>) -> GbResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| GbError::Config(format!("reading {}: {e}", path.display())))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> GbResult<Self> {
        serde_json::from_str(contents).map_err(|e| GbError::Config(format!("parsing config: {e}")))
    }

    /// `run_mode`s this core can actually orchestrate. `OPTIMIZATION` and
    /// `WALK_FORWARD` parse successfully (so config files containing those
    /// sections round-trip and validate) but are rejected here: their
    /// algorithms are out of scope per spec.md §1.
    pub fn validate_run_mode(&self) -> GbResult<()> {
        match self.run_mode {
            RunMode::Backtest | RunMode::Live => Ok(()),
            RunMode::Optimization | RunMode::WalkForward => Err(GbError::Config(format!(
                "run_mode {:?} is recognized but not implemented in this core",
                self.run_mode
            ))),
        }
    }
}
