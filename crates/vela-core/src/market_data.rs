//! Market data types: bars, quotes, trades, and the closed variant that
//! lets the driver dispatch on kind with an exhaustive match.
//!
//! Grounded on `original_source/nautilus_core/data.py`.

use std::fmt;

use crate::enums::{BarAggregation, PriceType};
use crate::ids::InstrumentId;
use crate::money::{Price, Quantity};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BarSpecification {
    pub step: u32,
    pub aggregation: BarAggregation,
    pub price_type: PriceType,
}

impl fmt::Display for BarSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.step, self.aggregation, self.price_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BarType {
    pub instrument_id: InstrumentId,
    pub spec: BarSpecification,
}

impl fmt::Display for BarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.instrument_id, self.spec)
    }
}

#[derive(Debug, Clone)]
pub struct Bar {
    pub bar_type: BarType,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    pub ts_event: i64,
}

#[derive(Debug, Clone)]
pub struct QuoteTick {
    pub instrument_id: InstrumentId,
    pub bid_price: Price,
    pub ask_price: Price,
    pub bid_size: Quantity,
    pub ask_size: Quantity,
    pub ts_event: i64,
}

#[derive(Debug, Clone)]
pub struct TradeTick {
    pub instrument_id: InstrumentId,
    pub price: Price,
    pub size: Quantity,
    pub ts_event: i64,
}

/// Closed variant over every market data kind the driver can receive.
/// Dispatch on this becomes an exhaustive match rather than a trait object
/// over an open-ended "any tick" payload.
#[derive(Debug, Clone)]
pub enum MarketData {
    Bar(Bar),
    Quote(QuoteTick),
    Trade(TradeTick),
}

impl MarketData {
    pub fn ts_event(&self) -> i64 {
        match self {
            MarketData::Bar(b) => b.ts_event,
            MarketData::Quote(q) => q.ts_event,
            MarketData::Trade(t) => t.ts_event,
        }
    }

    pub fn instrument_id(&self) -> &InstrumentId {
        match self {
            MarketData::Bar(b) => &b.bar_type.instrument_id,
            MarketData::Quote(q) => &q.instrument_id,
            MarketData::Trade(t) => &t.instrument_id,
        }
    }
}
