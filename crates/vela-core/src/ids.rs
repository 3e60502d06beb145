//! Opaque, string-backed identifiers.
//!
//! Every identifier in the system is a non-empty string, hashed and
//! compared structurally. Grounded on
//! `original_source/nautilus_core/identifiers.py`'s `_Identifier` base and
//! its per-kind subclasses; the teacher crate uses the equivalent newtype
//! pattern for every domain key in `mqk-execution::types`.

use std::fmt;

use crate::error::DomainError;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(DomainError::EmptyIdentifier);
                }
                Ok($name(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

opaque_id!(TraderId);
opaque_id!(StrategyId);
opaque_id!(AccountId);
opaque_id!(VenueId);
opaque_id!(Symbol);
opaque_id!(ClientOrderId);
opaque_id!(VenueOrderId);
opaque_id!(TradeId);
opaque_id!(PositionId);

/// `"{Symbol}.{Venue}"`. Composed and decomposed rather than freely
/// constructed, so the two halves always stay in sync.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrumentId {
    symbol: Symbol,
    venue: VenueId,
}

impl InstrumentId {
    pub fn new(symbol: Symbol, venue: VenueId) -> Self {
        InstrumentId { symbol, venue }
    }

    /// Parse `"{Symbol}.{Venue}"`, splitting on the last `.` (symbols may
    /// themselves contain dots, e.g. `"BRK.B.NASDAQ"`).
    pub fn from_str(value: &str) -> Result<Self, DomainError> {
        let (symbol, venue) = value.rsplit_once('.').ok_or_else(|| {
            DomainError::MalformedInstrumentId { input: value.to_string() }
        })?;
        Ok(InstrumentId { symbol: Symbol::new(symbol)?, venue: VenueId::new(venue)? })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn venue(&self) -> &VenueId {
        &self.venue
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.symbol, self.venue)
    }
}
