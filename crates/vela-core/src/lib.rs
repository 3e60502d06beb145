//! Shared scalar types, identifiers, market data, clock, and events for the
//! backtesting engine. Every other crate in the workspace depends on this
//! one; nothing in here depends on anything else in the workspace.

pub mod clock;
pub mod counter;
pub mod currency;
pub mod decimal;
pub mod enums;
pub mod error;
pub mod events;
pub mod ids;
pub mod instrument;
pub mod market_data;
pub mod money;

pub use clock::{TestClock, TimeEvent};
pub use currency::Currency;
pub use decimal::{Decimal, DecimalError};
pub use error::DomainError;
pub use ids::{
    AccountId, ClientOrderId, InstrumentId, PositionId, StrategyId, Symbol, TradeId, TraderId,
    VenueId, VenueOrderId,
};
pub use instrument::Instrument;
pub use market_data::{Bar, BarSpecification, BarType, MarketData, QuoteTick, TradeTick};
pub use money::{AccountBalance, Money, Price, Quantity};
