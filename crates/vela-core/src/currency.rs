//! Currency definitions.
//!
//! Grounded on `original_source/nautilus_core/objects.py`'s `Currency`
//! dataclass and its predefined constants. A currency is value-equal by
//! code alone, the way the original compares by ISO/crypto code.

use std::fmt;

use crate::enums::CurrencyType;

#[derive(Debug, Clone)]
pub struct Currency {
    code: String,
    precision: u8,
    currency_type: CurrencyType,
}

impl Currency {
    pub fn new(code: impl Into<String>, precision: u8, currency_type: CurrencyType) -> Self {
        Currency { code: code.into(), precision, currency_type }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn currency_type(&self) -> CurrencyType {
        self.currency_type
    }

    pub fn usd() -> Self {
        Currency::new("USD", 2, CurrencyType::Fiat)
    }

    pub fn eur() -> Self {
        Currency::new("EUR", 2, CurrencyType::Fiat)
    }

    pub fn gbp() -> Self {
        Currency::new("GBP", 2, CurrencyType::Fiat)
    }

    pub fn jpy() -> Self {
        Currency::new("JPY", 0, CurrencyType::Fiat)
    }

    pub fn btc() -> Self {
        Currency::new("BTC", 8, CurrencyType::Crypto)
    }

    pub fn eth() -> Self {
        Currency::new("ETH", 8, CurrencyType::Crypto)
    }

    pub fn usdt() -> Self {
        Currency::new("USDT", 6, CurrencyType::Crypto)
    }
}

impl PartialEq for Currency {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}

impl Eq for Currency {}

impl std::hash::Hash for Currency {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.code.hash(state);
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}
