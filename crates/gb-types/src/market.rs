use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a financial symbol with exchange information
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub symbol: String,
    pub exchange: String,
    pub asset_class: AssetClass,
}

impl Symbol {
    pub fn new(symbol: &str, exchange: &str, asset_class: AssetClass) -> Self {
        Self {
            symbol: symbol.to_string(),
            exchange: exchange.to_string(),
            asset_class,
        }
    }

    pub fn equity(symbol: &str) -> Self {
        Self::new(symbol, "NASDAQ", AssetClass::Equity)
    }

    pub fn crypto(symbol: &str) -> Self {
        Self::new(symbol, "BINANCE", AssetClass::Crypto)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

/// Asset classes supported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    Crypto,
    Forex,
    Commodity,
    Bond,
}

impl AssetClass {
    /// Returns true if this asset class trades 24/7 (no market close/weekends).
    pub fn is_24_7(&self) -> bool {
        matches!(self, AssetClass::Crypto)
    }

    /// Returns true if this asset class supports fractional quantities natively.
    pub fn supports_fractional_quantities(&self) -> bool {
        matches!(self, AssetClass::Crypto | AssetClass::Forex)
    }

    /// Default exchange identifier for this asset class.
    pub fn default_exchange(&self) -> &'static str {
        match self {
            AssetClass::Equity => "NASDAQ",
            AssetClass::Crypto => "BINANCE",
            AssetClass::Forex => "FOREX",
            AssetClass::Commodity => "CME",
            AssetClass::Bond => "NYSE",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssetClass::Equity => "Equity",
            AssetClass::Crypto => "Crypto",
            AssetClass::Forex => "Forex",
            AssetClass::Commodity => "Commodity",
            AssetClass::Bond => "Bond",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_class_is_24_7() {
        assert!(AssetClass::Crypto.is_24_7());
        assert!(!AssetClass::Equity.is_24_7());
        assert!(!AssetClass::Forex.is_24_7());
    }

    #[test]
    fn test_asset_class_fractional() {
        assert!(AssetClass::Crypto.supports_fractional_quantities());
        assert!(AssetClass::Forex.supports_fractional_quantities());
        assert!(!AssetClass::Equity.supports_fractional_quantities());
    }

    #[test]
    fn test_asset_class_default_exchange() {
        assert_eq!(AssetClass::Crypto.default_exchange(), "BINANCE");
        assert_eq!(AssetClass::Equity.default_exchange(), "NASDAQ");
    }

    #[test]
    fn test_asset_class_display() {
        assert_eq!(format!("{}", AssetClass::Crypto), "Crypto");
        assert_eq!(format!("{}", AssetClass::Equity), "Equity");
    }

    #[test]
    fn test_symbol_crypto_constructor() {
        let s = Symbol::crypto("BTC-USD");
        assert_eq!(s.symbol, "BTC-USD");
        assert_eq!(s.exchange, "BINANCE");
        assert_eq!(s.asset_class, AssetClass::Crypto);
    }
}
