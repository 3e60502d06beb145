//! Tradable instrument definitions.
//!
//! The original system (`original_source/nautilus_core/instruments.py`)
//! models each asset class as its own subclass of a common `Instrument`
//! base. Per the redesign note in the spec's design notes, this is
//! collapsed into a single struct parameterized by an `AssetClass` tag —
//! the state machine and matching engine are orthogonal to the asset
//! class, so a class hierarchy would only add indirection.

use crate::currency::Currency;
use crate::decimal::Decimal;
use crate::enums::AssetClass;
use crate::error::DomainError;
use crate::ids::InstrumentId;
use crate::money::{Price, Quantity};

#[derive(Debug, Clone)]
pub struct Instrument {
    pub instrument_id: InstrumentId,
    pub asset_class: AssetClass,
    pub quote_currency: Currency,
    pub price_precision: u8,
    pub size_precision: u8,
    pub min_quantity: Option<Quantity>,
    pub max_quantity: Option<Quantity>,
    pub taker_fee: Decimal,
    pub maker_fee: Decimal,
    pub leverage: Decimal,
}

impl Instrument {
    /// Construct and quantize a [`Price`] at this instrument's declared
    /// price precision.
    pub fn make_price(&self, value: Decimal) -> Result<Price, DomainError> {
        Price::new(value.rescale(self.price_precision))
    }

    /// Construct and quantize a [`Quantity`] at this instrument's declared
    /// size precision.
    pub fn make_qty(&self, value: Decimal) -> Result<Quantity, DomainError> {
        Quantity::new(value.rescale(self.size_precision))
    }
}
