//! The order entity and its state machine.
//!
//! Grounded on the teacher crate's `mqk-execution/src/oms/state_machine.rs`
//! for the transition-table style (`match (&self.status, event)` over a
//! closed tagged union, a dedicated `TransitionError` with a manual
//! `Display`/`Error` impl) and on
//! `original_source/nautilus_core/orders.py` for the exact field set,
//! fill-application formula, and the per-`order_type` required-field
//! validation the original scatters across its `Order` subclasses.

use vela_core::enums::{OrderSide, OrderStatus, OrderType, TimeInForce};
use vela_core::events::OrderEvent;
use vela_core::ids::{ClientOrderId, InstrumentId, StrategyId, TraderId, VenueOrderId};
use vela_core::money::{Price, Quantity};
use vela_core::Decimal;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub event: &'static str,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal transition: {} cannot move {} -> {}",
            self.event, self.from, self.to
        )
    }
}

impl std::error::Error for TransitionError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OmsError {
    MissingPrice,
    MissingTriggerPrice,
    Transition(TransitionError),
}

impl std::fmt::Display for OmsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OmsError::MissingPrice => write!(f, "order_type requires a price"),
            OmsError::MissingTriggerPrice => write!(f, "order_type requires a trigger_price"),
            OmsError::Transition(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OmsError {}

impl From<TransitionError> for OmsError {
    fn from(e: TransitionError) -> Self {
        OmsError::Transition(e)
    }
}

/// Permitted target statuses for a given source status. `&[]` means
/// terminal — no event may move the order further.
fn allowed_targets(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        Initialized => &[Denied, Submitted],
        Submitted => &[Accepted, Rejected, Canceled],
        Accepted => {
            &[Canceled, Expired, Triggered, PendingUpdate, PendingCancel, PartiallyFilled, Filled]
        }
        Triggered => &[Canceled, Expired, PendingUpdate, PendingCancel, PartiallyFilled, Filled],
        PendingUpdate => {
            &[Accepted, Canceled, Expired, Triggered, PartiallyFilled, Filled]
        }
        PendingCancel => &[Canceled, Accepted, PartiallyFilled, Filled],
        PartiallyFilled => {
            &[Canceled, Expired, PendingUpdate, PendingCancel, PartiallyFilled, Filled]
        }
        Denied | Rejected | Canceled | Expired | Filled => &[],
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub client_order_id: ClientOrderId,
    pub instrument_id: InstrumentId,
    pub trader_id: TraderId,
    pub strategy_id: StrategyId,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub filled_qty: Quantity,
    pub leaves_qty: Quantity,
    pub avg_px: Decimal,
    pub time_in_force: TimeInForce,
    pub status: OrderStatus,
    pub venue_order_id: Option<VenueOrderId>,
    pub price: Option<Price>,
    pub trigger_price: Option<Price>,
    pub events: Vec<OrderEvent>,
    pub ts_init: i64,
    pub ts_last: i64,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_order_id: ClientOrderId,
        instrument_id: InstrumentId,
        trader_id: TraderId,
        strategy_id: StrategyId,
        side: OrderSide,
        order_type: OrderType,
        quantity: Quantity,
        time_in_force: TimeInForce,
        price: Option<Price>,
        trigger_price: Option<Price>,
        ts_init: i64,
    ) -> Result<Self, OmsError> {
        match order_type {
            OrderType::Market => {}
            OrderType::Limit => {
                if price.is_none() {
                    return Err(OmsError::MissingPrice);
                }
            }
            OrderType::StopMarket => {
                if trigger_price.is_none() {
                    return Err(OmsError::MissingTriggerPrice);
                }
            }
            OrderType::StopLimit => {
                if price.is_none() {
                    return Err(OmsError::MissingPrice);
                }
                if trigger_price.is_none() {
                    return Err(OmsError::MissingTriggerPrice);
                }
            }
        }
        Ok(Order {
            client_order_id,
            instrument_id,
            trader_id,
            strategy_id,
            side,
            order_type,
            leaves_qty: quantity,
            filled_qty: Quantity::zero(quantity.precision()),
            quantity,
            avg_px: Decimal::zero(price.map(Price::precision).unwrap_or(0)),
            time_in_force,
            status: OrderStatus::Initialized,
            venue_order_id: None,
            price,
            trigger_price,
            events: Vec::new(),
            ts_init,
            ts_last: ts_init,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    fn check_transition(&self, to: OrderStatus, event_name: &'static str) -> Result<(), TransitionError> {
        if allowed_targets(self.status).contains(&to) {
            Ok(())
        } else {
            Err(TransitionError { from: self.status, to, event: event_name })
        }
    }

    /// Apply an event to the order, enforcing the transition graph.
    ///
    /// On failure the order is left entirely unchanged — the event is not
    /// recorded and no field is mutated.
    pub fn apply(&mut self, event: OrderEvent) -> Result<(), OmsError> {
        match &event {
            OrderEvent::Filled { last_qty, last_px, venue_order_id, .. } => {
                let new_filled = self.filled_qty + *last_qty;
                let target = if new_filled == self.quantity {
                    OrderStatus::Filled
                } else {
                    OrderStatus::PartiallyFilled
                };
                self.check_transition(target, event.name())?;

                // Weighted-average price: divide accumulated notional by
                // filled quantity. `Decimal` has no division operator (the
                // domain never needs general decimal division outside this
                // one formula), so it is inlined via raw i128 arithmetic in
                // `weighted_avg_px`.
                self.avg_px = weighted_avg_px(
                    self.avg_px,
                    self.filled_qty,
                    *last_px,
                    *last_qty,
                    new_filled,
                );

                self.filled_qty = new_filled;
                self.leaves_qty =
                    Quantity::new(self.quantity.as_decimal() - new_filled.as_decimal())
                        .expect("leaves_qty cannot go negative: fill exceeded remaining quantity");
                self.status = target;
                self.venue_order_id = Some(venue_order_id.clone());
            }
            OrderEvent::Updated { quantity, price, .. } => {
                self.check_transition(OrderStatus::Accepted, event.name())?;
                let new_leaves = quantity.as_decimal() - self.filled_qty.as_decimal();
                let leaves_qty = Quantity::new(new_leaves)
                    .map_err(|_| TransitionError {
                        from: self.status,
                        to: OrderStatus::Accepted,
                        event: event.name(),
                    })?;
                self.quantity = *quantity;
                self.leaves_qty = leaves_qty;
                if let Some(p) = price {
                    self.price = Some(*p);
                }
                self.status = OrderStatus::Accepted;
            }
            OrderEvent::Accepted { venue_order_id, .. } => {
                self.check_transition(OrderStatus::Accepted, event.name())?;
                self.status = OrderStatus::Accepted;
                self.venue_order_id = Some(venue_order_id.clone());
            }
            _ => {
                let target = event.target_status();
                self.check_transition(target, event.name())?;
                self.status = target;
            }
        }
        self.ts_last = self.ts_last.max(event.meta().ts_event);
        self.events.push(event);
        Ok(())
    }
}

/// `(avg_px * filled_qty + last_px * last_qty) / new_filled`, quantized to
/// the fill's own price precision (the order's `avg_px` has no price
/// precision of its own before the first fill, since market orders carry
/// no `price` field).
fn weighted_avg_px(
    avg_px: Decimal,
    filled_qty: Quantity,
    last_px: Price,
    last_qty: Quantity,
    new_filled: Quantity,
) -> Decimal {
    let out_precision = last_px.precision();
    if new_filled.is_zero() {
        return Decimal::zero(out_precision);
    }
    let numerator_precision = out_precision + last_qty.precision();
    let prior_numerator = avg_px.mul_rescale(filled_qty.as_decimal(), numerator_precision);
    let fill_numerator = last_px.as_decimal().mul_rescale(last_qty.as_decimal(), numerator_precision);
    let numerator = prior_numerator + fill_numerator;

    let qty_raw = new_filled.as_decimal().raw();
    if qty_raw == 0 {
        return Decimal::zero(out_precision);
    }
    // numerator is scaled at `numerator_precision`; dividing the raw
    // integer by the raw quantity (scaled at `new_filled.precision()`)
    // leaves a value scaled at `numerator_precision - new_filled.precision()`.
    let result_precision = numerator_precision as i32 - new_filled.precision() as i32;
    let raw = div_round_half_up(numerator.raw(), qty_raw);
    let result = Decimal::from_raw(raw, result_precision.max(0) as u8)
        .unwrap_or_else(|_| Decimal::zero(out_precision));
    result.rescale(out_precision)
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

    fn instrument_id() -> InstrumentId {
        InstrumentId::new(Symbol::new("AAPL").unwrap(), VenueId::new("NASDAQ").unwrap())
    }

    fn market_order() -> Order {
        Order::new(
            ClientOrderId::new("O-1").unwrap(),
            instrument_id(),
            TraderId::new("TRADER-1").unwrap(),
            StrategyId::new("S-1").unwrap(),
            OrderSide::Buy,
            OrderType::Market,
            Quantity::parse("100", 0).unwrap(),
            TimeInForce::Gtc,
            None,
            None,
            0,
        )
        .unwrap()
    }

    fn submitted_event(ts: i64) -> OrderEvent {
        use vela_core::events::EventMeta;
        OrderEvent::Submitted {
            meta: EventMeta { event_id: format!("EVT-{ts}"), ts_event: ts },
            client_order_id: ClientOrderId::new("O-1").unwrap(),
        }
    }

    fn accepted_event(ts: i64) -> OrderEvent {
        use vela_core::events::EventMeta;
        OrderEvent::Accepted {
            meta: EventMeta { event_id: format!("EVT-{ts}"), ts_event: ts },
            client_order_id: ClientOrderId::new("O-1").unwrap(),
            venue_order_id: VenueOrderId::new("V-NASDAQ-1").unwrap(),
        }
    }

    #[test]
    fn limit_order_requires_price() {
        let result = Order::new(
            ClientOrderId::new("O-1").unwrap(),
            instrument_id(),
            TraderId::new("TRADER-1").unwrap(),
            StrategyId::new("S-1").unwrap(),
            OrderSide::Buy,
            OrderType::Limit,
            Quantity::parse("100", 0).unwrap(),
            TimeInForce::Gtc,
            None,
            None,
            0,
        );
        assert_eq!(result.unwrap_err(), OmsError::MissingPrice);
    }

    #[test]
    fn submitted_then_accepted_succeeds() {
        let mut order = market_order();
        order.apply(submitted_event(1)).unwrap();
        assert_eq!(order.status, OrderStatus::Submitted);
        order.apply(accepted_event(2)).unwrap();
        assert_eq!(order.status, OrderStatus::Accepted);
        assert_eq!(order.ts_last, 2);
    }

    #[test]
    fn illegal_transition_is_rejected_and_order_unchanged() {
        let mut order = market_order();
        let before = order.status;
        let result = order.apply(accepted_event(1));
        assert!(result.is_err());
        assert_eq!(order.status, before);
        assert!(order.events.is_empty());
    }

    #[test]
    fn fill_updates_weighted_average_price() {
        let mut order = market_order();
        order.apply(submitted_event(1)).unwrap();
        order.apply(accepted_event(2)).unwrap();

        use vela_core::events::EventMeta;
        use vela_core::enums::LiquiditySide;
        use vela_core::{Currency, Money};

        let fill = OrderEvent::Filled {
            meta: EventMeta { event_id: "EVT-3".into(), ts_event: 3 },
            client_order_id: ClientOrderId::new("O-1").unwrap(),
            venue_order_id: VenueOrderId::new("V-NASDAQ-1").unwrap(),
            trade_id: vela_core::TradeId::new("T-NASDAQ-1").unwrap(),
            position_id: None,
            instrument_id: instrument_id(),
            side: OrderSide::Buy,
            last_qty: Quantity::parse("100", 0).unwrap(),
            last_px: Price::parse("100.50", 2).unwrap(),
            commission: Money::zero(Currency::usd()),
            liquidity_side: LiquiditySide::Taker,
        };
        order.apply(fill).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.filled_qty, Quantity::parse("100", 0).unwrap());
        assert_eq!(order.leaves_qty, Quantity::zero(0));
        assert_eq!(order.avg_px.to_string(), "100.50");
    }

    #[test]
    fn fill_while_terminal_is_illegal() {
        let mut order = market_order();
        order.apply(submitted_event(1)).unwrap();
        order.apply(vela_core::events::OrderEvent::Rejected {
            meta: vela_core::events::EventMeta { event_id: "EVT-2".into(), ts_event: 2 },
            client_order_id: ClientOrderId::new("O-1").unwrap(),
            reason: "no liquidity".into(),
        })
        .unwrap();
        assert!(order.status.is_closed());

        use vela_core::events::EventMeta;
        use vela_core::enums::LiquiditySide;
        use vela_core::{Currency, Money};
        let fill = OrderEvent::Filled {
            meta: EventMeta { event_id: "EVT-3".into(), ts_event: 3 },
            client_order_id: ClientOrderId::new("O-1").unwrap(),
            venue_order_id: VenueOrderId::new("V-NASDAQ-1").unwrap(),
            trade_id: vela_core::TradeId::new("T-NASDAQ-1").unwrap(),
            position_id: None,
            instrument_id: instrument_id(),
            side: OrderSide::Buy,
            last_qty: Quantity::parse("100", 0).unwrap(),
            last_px: Price::parse("100.50", 2).unwrap(),
            commission: Money::zero(Currency::usd()),
            liquidity_side: LiquiditySide::Taker,
        };
        assert!(order.apply(fill).is_err());
    }
}
