//! The position engine: weighted-average-cost accounting, side flips, and
//! realized/unrealized P&L.
//!
//! Grounded on `original_source/nautilus_core/position.py`
//! (`_apply_buy`/`_apply_sell`, `_update_side_and_qty`, `unrealized_pnl`,
//! `total_pnl`, `notional_value`), folding the original's buy/sell
//! branches into one direction-signed implementation since the two are
//! exact mirror images of each other.

use std::collections::HashMap;

use vela_core::currency::Currency;
use vela_core::decimal::Decimal;
use vela_core::enums::{OrderSide, PositionSide};
use vela_core::events::PositionEvent;
use vela_core::ids::{AccountId, InstrumentId, PositionId, StrategyId, TraderId};
use vela_core::money::{Money, Price, Quantity};

/// What kind of mutation a fill produced, so the caller (which owns the
/// deterministic id counters and clock) can construct and publish the
/// matching `PositionEvent` with proper identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionOutcome {
    Opened,
    Changed,
    Closed,
}

#[derive(Debug, Clone)]
pub struct Position {
    pub id: PositionId,
    pub instrument_id: InstrumentId,
    pub strategy_id: StrategyId,
    pub trader_id: TraderId,
    pub account_id: AccountId,
    pub currency: Currency,
    pub side: PositionSide,
    pub signed_qty: Decimal,
    pub avg_px_open: Decimal,
    pub avg_px_close: Option<Decimal>,
    pub realized_pnl: Money,
    pub commissions: HashMap<String, Decimal>,
    pub events: Vec<PositionEvent>,
}

impl Position {
    /// Open a new position from the first fill.
    pub fn open(
        id: PositionId,
        instrument_id: InstrumentId,
        strategy_id: StrategyId,
        trader_id: TraderId,
        account_id: AccountId,
        currency: Currency,
        side: OrderSide,
        last_qty: Quantity,
        last_px: Price,
        commission: Money,
    ) -> Self {
        let signed_qty = signed_delta(side, last_qty);
        let mut position = Position {
            id,
            instrument_id,
            strategy_id,
            trader_id,
            account_id,
            currency: currency.clone(),
            side: side_from_signed(signed_qty),
            signed_qty,
            avg_px_open: last_px.as_decimal(),
            avg_px_close: None,
            realized_pnl: Money::zero(currency),
            commissions: HashMap::new(),
            events: Vec::new(),
        };
        position.accumulate_commission(&commission);
        position
    }

    pub fn quantity(&self) -> Decimal {
        self.signed_qty.abs()
    }

    pub fn is_closed(&self) -> bool {
        self.side == PositionSide::Flat && !self.events.is_empty()
    }

    pub fn push_event(&mut self, event: PositionEvent) {
        self.events.push(event);
    }

    fn accumulate_commission(&mut self, commission: &Money) {
        let code = commission.currency().code().to_string();
        let entry = self
            .commissions
            .entry(code)
            .or_insert_with(|| Decimal::zero(commission.amount().precision()));
        *entry = *entry + commission.amount();
    }

    /// Apply a fill to an already-open position, per the weighted-average
    /// cost / flip rules. Returns whether the position stayed open,
    /// changed, or fully closed.
    pub fn apply_fill(
        &mut self,
        side: OrderSide,
        last_qty: Quantity,
        last_px: Price,
        commission: Money,
    ) -> PositionOutcome {
        let last_px_dec = last_px.as_decimal();
        let signed_last = signed_delta(side, last_qty);
        let prior_signed = self.signed_qty;
        let same_direction = prior_signed.is_zero() || prior_signed.signum() == signed_last.signum();

        if same_direction {
            let prior_abs = prior_signed.abs();
            let total = prior_abs + last_qty.as_decimal();
            self.avg_px_open =
                weighted_avg(self.avg_px_open, prior_abs, last_px_dec, last_qty.as_decimal(), total);
            self.signed_qty = prior_signed + signed_last;
        } else {
            let prior_abs = prior_signed.abs();
            let close_qty = last_qty.as_decimal().min(prior_abs);
            let pnl_per_unit = if prior_signed.is_negative() {
                self.avg_px_open - last_px_dec
            } else {
                last_px_dec - self.avg_px_open
            };
            let realized_delta =
                close_qty.mul_rescale(pnl_per_unit, self.realized_pnl.amount().precision());
            self.realized_pnl = self
                .realized_pnl
                .checked_add(&Money::new(realized_delta, self.currency.clone()))
                .expect("position realized_pnl always shares the position's currency");
            self.signed_qty = prior_signed + signed_last;

            if self.signed_qty.is_zero() {
                self.avg_px_close = Some(last_px_dec);
            } else if self.signed_qty.signum() == signed_last.signum() {
                self.avg_px_open = last_px_dec;
            }
        }

        self.side = side_from_signed(self.signed_qty);
        self.accumulate_commission(&commission);

        if self.signed_qty.is_zero() {
            PositionOutcome::Closed
        } else {
            PositionOutcome::Changed
        }
    }

    /// Mark-to-market P&L on the open quantity at `last_price`.
    pub fn unrealized_pnl(&self, last_price: Price) -> Money {
        let last_px_dec = last_price.as_decimal();
        let amount = match self.side {
            PositionSide::Flat => Decimal::zero(self.realized_pnl.amount().precision()),
            PositionSide::Long => self.quantity().mul_rescale(
                last_px_dec - self.avg_px_open,
                self.realized_pnl.amount().precision(),
            ),
            PositionSide::Short => self.quantity().mul_rescale(
                self.avg_px_open - last_px_dec,
                self.realized_pnl.amount().precision(),
            ),
        };
        Money::new(amount, self.currency.clone())
    }

    pub fn total_pnl(&self, last_price: Price) -> Money {
        self.realized_pnl
            .checked_add(&self.unrealized_pnl(last_price))
            .expect("same currency by construction")
    }

    pub fn notional_value(&self, last_price: Price) -> Money {
        let amount =
            self.quantity().mul_rescale(last_price.as_decimal(), self.realized_pnl.amount().precision());
        Money::new(amount, self.currency.clone())
    }

    pub fn total_commissions(&self, currency_code: &str) -> Decimal {
        self.commissions.get(currency_code).copied().unwrap_or(Decimal::zero(0))
    }
}

fn signed_delta(side: OrderSide, qty: Quantity) -> Decimal {
    match side {
        OrderSide::Buy => qty.as_decimal(),
        OrderSide::Sell => -qty.as_decimal(),
    }
}

fn side_from_signed(signed_qty: Decimal) -> PositionSide {
    match signed_qty.signum() {
        0 => PositionSide::Flat,
        n if n > 0 => PositionSide::Long,
        _ => PositionSide::Short,
    }
}

fn weighted_avg(avg: Decimal, prior_qty: Decimal, last_px: Decimal, last_qty: Decimal, total_qty: Decimal) -> Decimal {
    let out_precision = last_px.precision();
    if total_qty.is_zero() {
        return Decimal::zero(out_precision);
    }
    let numerator_precision = out_precision + last_qty.precision();
    let prior_notional = avg.mul_rescale(prior_qty, numerator_precision);
    let fill_notional = last_px.mul_rescale(last_qty, numerator_precision);
    let numerator = prior_notional + fill_notional;
    let divisor_raw = total_qty.raw();
    if divisor_raw == 0 {
        return Decimal::zero(out_precision);
    }
    let raw = div_round_half_up(numerator.raw(), divisor_raw);
    let result_precision = numerator_precision as i32 - total_qty.precision() as i32;
    Decimal::from_raw(raw, result_precision.max(0) as u8)
        .unwrap_or_else(|_| Decimal::zero(out_precision))
        .rescale(out_precision)
}

fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    if denominator == 0 {
        return 0;
    }
    let sign = if (numerator < 0) != (denominator < 0) { -1 } else { 1 };
    let n = numerator.unsigned_abs() as i128;
    let d = denominator.unsigned_abs() as i128;
    let quotient = n / d;
    let remainder = n % d;
    let rounded = if remainder * 2 >= d { quotient + 1 } else { quotient };
    sign * rounded
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::ids::{Symbol, VenueId};

    fn ids() -> (PositionId, InstrumentId, StrategyId, TraderId, AccountId) {
        (
            PositionId::new("P-1").unwrap(),
            InstrumentId::new(Symbol::new("AAPL").unwrap(), VenueId::new("NASDAQ").unwrap()),
            StrategyId::new("S-1").unwrap(),
            TraderId::new("TRADER-1").unwrap(),
            AccountId::new("NASDAQ-001").unwrap(),
        )
    }

    fn zero_commission() -> Money {
        Money::zero(Currency::usd())
    }

    #[test]
    fn open_and_close_round_trip_is_pnl_neutral() {
        let (id, inst, strat, trader, acct) = ids();
        let mut pos = Position::open(
            id,
            inst,
            strat,
            trader,
            acct,
            Currency::usd(),
            OrderSide::Buy,
            Quantity::parse("100", 0).unwrap(),
            Price::parse("150", 2).unwrap(),
            zero_commission(),
        );
        let outcome = pos.apply_fill(
            OrderSide::Sell,
            Quantity::parse("100", 0).unwrap(),
            Price::parse("150", 2).unwrap(),
            zero_commission(),
        );
        assert_eq!(outcome, PositionOutcome::Closed);
        assert_eq!(pos.side, PositionSide::Flat);
        assert_eq!(pos.realized_pnl.amount(), Decimal::zero(2));
    }

    #[test]
    fn short_close_with_profit() {
        let (id, inst, strat, trader, acct) = ids();
        let mut pos = Position::open(
            id,
            inst,
            strat,
            trader,
            acct,
            Currency::usd(),
            OrderSide::Sell,
            Quantity::parse("100", 0).unwrap(),
            Price::parse("150", 2).unwrap(),
            zero_commission(),
        );
        pos.apply_fill(
            OrderSide::Buy,
            Quantity::parse("100", 0).unwrap(),
            Price::parse("140", 2).unwrap(),
            zero_commission(),
        );
        assert_eq!(pos.realized_pnl.amount().to_string(), "1000.00");
        assert_eq!(pos.side, PositionSide::Flat);
    }

    #[test]
    fn partial_close_keeps_position_open_at_same_avg_px() {
        let (id, inst, strat, trader, acct) = ids();
        let mut pos = Position::open(
            id,
            inst,
            strat,
            trader,
            acct,
            Currency::usd(),
            OrderSide::Buy,
            Quantity::parse("100", 0).unwrap(),
            Price::parse("150", 2).unwrap(),
            zero_commission(),
        );
        let outcome = pos.apply_fill(
            OrderSide::Sell,
            Quantity::parse("50", 0).unwrap(),
            Price::parse("160", 2).unwrap(),
            zero_commission(),
        );
        assert_eq!(outcome, PositionOutcome::Changed);
        assert_eq!(pos.realized_pnl.amount().to_string(), "500.00");
        assert_eq!(pos.quantity().to_string(), "50");
        assert_eq!(pos.side, PositionSide::Long);
        assert_eq!(pos.avg_px_open.to_string(), "150.00");
    }

    #[test]
    fn flip_from_short_to_long_resets_avg_px_open() {
        let (id, inst, strat, trader, acct) = ids();
        let mut pos = Position::open(
            id,
            inst,
            strat,
            trader,
            acct,
            Currency::usd(),
            OrderSide::Sell,
            Quantity::parse("100", 0).unwrap(),
            Price::parse("150", 2).unwrap(),
            zero_commission(),
        );
        pos.apply_fill(
            OrderSide::Buy,
            Quantity::parse("150", 0).unwrap(),
            Price::parse("140", 2).unwrap(),
            zero_commission(),
        );
        assert_eq!(pos.side, PositionSide::Long);
        assert_eq!(pos.quantity().to_string(), "50");
        assert_eq!(pos.avg_px_open.to_string(), "140.00");
    }

    #[test]
    fn unrealized_pnl_long() {
        let (id, inst, strat, trader, acct) = ids();
        let pos = Position::open(
            id,
            inst,
            strat,
            trader,
            acct,
            Currency::usd(),
            OrderSide::Buy,
            Quantity::parse("100", 0).unwrap(),
            Price::parse("150", 2).unwrap(),
            zero_commission(),
        );
        let pnl = pos.unrealized_pnl(Price::parse("160", 2).unwrap());
        assert_eq!(pnl.amount().to_string(), "1000.00");
    }
}
