//! The sizing gate's sole model-integration point (spec.md §4.5.1).

use gb_types::market::Symbol;
use rust_decimal::Decimal;

/// Given a symbol, returns a confidence in `[0, 1]` used to scale position
/// size. The core treats this as opaque.
pub trait ConfidenceOracle: Send + Sync {
    fn confidence(&self, symbol: &Symbol) -> Decimal;
}

/// The no-model default: always full confidence. Selected whenever
/// `machine_learning.model_path` is empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModelOracle;

impl ConfidenceOracle for NoModelOracle {
    fn confidence(&self, _symbol: &Symbol) -> Decimal {
        Decimal::ONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_model_oracle_is_always_full_confidence() {
        let oracle = NoModelOracle;
        assert_eq!(oracle.confidence(&Symbol::crypto("BTC-USD")), Decimal::ONE);
    }
}
