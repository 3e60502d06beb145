//! Pre-trade risk validation.
//!
//! Grounded on `original_source/nautilus_core/risk_engine.py::validate_order`
//! for the six ordered rules (first failure wins) and on the teacher
//! crate's `mqk-risk/src/types.rs` (`RiskConfig::sane_defaults`) for the
//! configuration-struct idiom. Like the teacher's `mqk-risk`, this crate
//! depends only on the order/core types — it never depends on the cache —
//! so instrument lookup and net-position lookup are passed in by the
//! caller (`vela-execution`) rather than pulled in as a dependency.

use vela_core::decimal::Decimal;
use vela_core::enums::{OrderSide, TradingState};
use vela_core::instrument::Instrument;
use vela_oms::Order;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskDenial {
    pub reason: String,
}

impl RiskDenial {
    fn new(reason: impl Into<String>) -> Self {
        RiskDenial { reason: reason.into() }
    }
}

impl std::fmt::Display for RiskDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for RiskDenial {}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub trading_state: TradingState,
}

impl RiskConfig {
    pub fn sane_defaults() -> Self {
        RiskConfig { trading_state: TradingState::Active }
    }
}

pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        RiskEngine { config }
    }

    pub fn trading_state(&self) -> TradingState {
        self.config.trading_state
    }

    pub fn set_trading_state(&mut self, state: TradingState) {
        self.config.trading_state = state;
    }

    /// Validate `order` against the six ordered rules. `instrument` is
    /// `None` when the instrument has not been registered in the cache.
    /// `net_position` is the caller's current signed net quantity for
    /// `order.instrument_id` under `order.strategy_id` (zero if flat or
    /// unknown), only consulted under rule 6.
    pub fn validate_order(
        &self,
        order: &Order,
        instrument: Option<&Instrument>,
        net_position: Decimal,
    ) -> Result<(), RiskDenial> {
        if self.config.trading_state == TradingState::Halted {
            return Err(RiskDenial::new("trading state is HALTED"));
        }

        let instrument = instrument.ok_or_else(|| {
            RiskDenial::new(format!("instrument {} not found", order.instrument_id))
        })?;

        if order.quantity.precision() != instrument.size_precision {
            return Err(RiskDenial::new(format!(
                "quantity precision {} does not match instrument size_precision {}",
                order.quantity.precision(),
                instrument.size_precision
            )));
        }

        if let Some(min) = instrument.min_quantity {
            if order.quantity < min {
                return Err(RiskDenial::new(format!(
                    "quantity {} below instrument minimum {min}",
                    order.quantity
                )));
            }
        }
        if let Some(max) = instrument.max_quantity {
            if order.quantity > max {
                return Err(RiskDenial::new(format!(
                    "quantity {} above instrument maximum {max}",
                    order.quantity
                )));
            }
        }

        if let Some(price) = order.price {
            if price.precision() != instrument.price_precision {
                return Err(RiskDenial::new(format!(
                    "price precision {} does not match instrument price_precision {}",
                    price.precision(),
                    instrument.price_precision
                )));
            }
        }

        if self.config.trading_state == TradingState::Reducing {
            let reduces = match order.side {
                OrderSide::Buy => net_position.is_negative(),
                OrderSide::Sell => net_position.signum() > 0,
            };
            if !reduces {
                return Err(RiskDenial::new(
                    "trading state is REDUCING: order does not reduce net position",
                ));
            }
        }

        Ok(())
    }
}
