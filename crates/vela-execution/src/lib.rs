//! The execution engine: risk-gated order submission, venue routing, and
//! fill/event dispatch into the order state machine and position flow.
//!
//! Grounded on `original_source/nautilus_core/execution_engine.py`'s
//! `ExecutionEngine` (`submit_order`/`cancel_order`/`modify_order`,
//! `process_event`, the netting/hedging fill split). Like `vela-risk` and
//! `vela-data`, this crate holds no owned reference to the cache, bus, or
//! venue it acts on — the caller (`vela-backtest`'s event loop) passes
//! each in per call, and owns the `SimulatedExchange` per venue itself.
//! Deterministic event and position ids are assigned from this crate's
//! own counters, the same `"{prefix}-{n}"` scheme as everywhere else.

use std::collections::HashMap;

use vela_bus::{BusMessage, MessageBus};
use vela_cache::{Cache, Filter};
use vela_core::counter::Counter;
use vela_core::enums::{LiquiditySide, OmsType};
use vela_core::events::{EventMeta, OrderEvent, PositionEvent};
use vela_core::ids::{AccountId, ClientOrderId, PositionId, VenueId};
use vela_core::instrument::Instrument;
use vela_core::money::{Price, Quantity};
use vela_core::Decimal;
use vela_exchange::{ExchangeError, Fill, SimulatedExchange};
use vela_oms::{OmsError, Order};
use vela_portfolio::{Position, PositionOutcome};
use vela_risk::RiskEngine;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    UnknownOrder { client_order_id: ClientOrderId },
    Exchange(ExchangeError),
    Oms(OmsError),
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionError::UnknownOrder { client_order_id } => {
                write!(f, "no cached order for {client_order_id}")
            }
            ExecutionError::Exchange(e) => write!(f, "{e}"),
            ExecutionError::Oms(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ExecutionError {}

impl From<ExchangeError> for ExecutionError {
    fn from(e: ExchangeError) -> Self {
        ExecutionError::Exchange(e)
    }
}

impl From<OmsError> for ExecutionError {
    fn from(e: OmsError) -> Self {
        ExecutionError::Oms(e)
    }
}

/// Per-venue OMS policy. Account ids are not separately configured — like
/// the original, they are derived deterministically from the venue as
/// `"{venue}-001"`.
#[derive(Default)]
pub struct ExecutionEngine {
    oms_types: HashMap<VenueId, OmsType>,
    position_counter: Counter,
    event_counter: Counter,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        ExecutionEngine::default()
    }

    /// Register a venue's OMS policy. Unregistered venues default to
    /// `HEDGING`, matching the original's `register_venue` default.
    pub fn register_venue(&mut self, venue: VenueId, oms_type: OmsType) {
        self.oms_types.insert(venue, oms_type);
    }

    pub fn oms_type(&self, venue: &VenueId) -> OmsType {
        self.oms_types.get(venue).copied().unwrap_or(OmsType::Hedging)
    }

    fn account_id(&self, venue: &VenueId) -> AccountId {
        AccountId::new(format!("{venue}-001")).expect("venue id is always non-empty")
    }

    fn next_event_id(&mut self) -> String {
        self.event_counter.next_id("EVT")
    }

    /// Validate `order` against `risk_engine`; if denied, record and
    /// publish `OrderDenied` and stop. Otherwise emit `OrderSubmitted`,
    /// persist to the cache, route to `exchange`, then emit `OrderAccepted`
    /// once the exchange has accepted it onto its resting book.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_order(
        &mut self,
        mut order: Order,
        instrument: Option<&Instrument>,
        net_position: Decimal,
        risk_engine: &RiskEngine,
        exchange: &mut SimulatedExchange,
        cache: &mut Cache,
        bus: &mut MessageBus,
        ts_event: i64,
    ) {
        let topic = format!("events.order.{}", order.strategy_id);

        if let Err(denial) = risk_engine.validate_order(&order, instrument, net_position) {
            let event = OrderEvent::Denied {
                meta: EventMeta { event_id: self.next_event_id(), ts_event },
                client_order_id: order.client_order_id.clone(),
                reason: denial.to_string(),
            };
            order.apply(event.clone()).expect("Initialized -> Denied is always legal");
            cache.add_order(order);
            bus.publish(&topic, &BusMessage::Order(event));
            return;
        }

        let submitted = OrderEvent::Submitted {
            meta: EventMeta { event_id: self.next_event_id(), ts_event },
            client_order_id: order.client_order_id.clone(),
        };
        order.apply(submitted.clone()).expect("Initialized -> Submitted is always legal");
        cache.add_order(order.clone());
        bus.publish(&topic, &BusMessage::Order(submitted));

        let venue_order_id = exchange.process_order(
            order.client_order_id.clone(),
            order.instrument_id.clone(),
            order.side,
            order.order_type,
            order.price,
            order.trigger_price,
            order.leaves_qty,
        );

        let accepted = OrderEvent::Accepted {
            meta: EventMeta { event_id: self.next_event_id(), ts_event },
            client_order_id: order.client_order_id.clone(),
            venue_order_id,
        };
        order.apply(accepted.clone()).expect("Submitted -> Accepted is always legal");
        cache.update_order(order);
        bus.publish(&topic, &BusMessage::Order(accepted));
    }

    pub fn cancel_order(
        &mut self,
        client_order_id: &ClientOrderId,
        exchange: &mut SimulatedExchange,
        cache: &mut Cache,
        bus: &mut MessageBus,
        ts_event: i64,
    ) -> Result<(), ExecutionError> {
        let mut order = cache
            .order(client_order_id)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownOrder { client_order_id: client_order_id.clone() })?;
        exchange.cancel_order(client_order_id)?;

        let event = OrderEvent::Canceled {
            meta: EventMeta { event_id: self.next_event_id(), ts_event },
            client_order_id: client_order_id.clone(),
        };
        order.apply(event.clone())?;
        let topic = format!("events.order.{}", order.strategy_id);
        cache.update_order(order);
        bus.publish(&topic, &BusMessage::Order(event));
        Ok(())
    }

    /// `quantity: None` keeps the order's current quantity; the resting
    /// order on `exchange` and the cached order's `leaves_qty` are updated
    /// together so the two never drift.
    #[allow(clippy::too_many_arguments)]
    pub fn modify_order(
        &mut self,
        client_order_id: &ClientOrderId,
        quantity: Option<Quantity>,
        price: Option<Price>,
        trigger_price: Option<Price>,
        exchange: &mut SimulatedExchange,
        cache: &mut Cache,
        bus: &mut MessageBus,
        ts_event: i64,
    ) -> Result<(), ExecutionError> {
        let mut order = cache
            .order(client_order_id)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownOrder { client_order_id: client_order_id.clone() })?;
        exchange.modify_order(client_order_id, quantity, price, trigger_price)?;

        let new_quantity = quantity.unwrap_or(order.quantity);
        let event = OrderEvent::Updated {
            meta: EventMeta { event_id: self.next_event_id(), ts_event },
            client_order_id: client_order_id.clone(),
            quantity: new_quantity,
            price,
        };
        order.apply(event.clone())?;
        let topic = format!("events.order.{}", order.strategy_id);
        cache.update_order(order);
        bus.publish(&topic, &BusMessage::Order(event));
        Ok(())
    }

    /// Apply one matching-engine fill: update the order state machine,
    /// publish the resulting `OrderFilled`, then route into the netting or
    /// hedging position flow for the fill's venue.
    pub fn process_fill(
        &mut self,
        fill: Fill,
        cache: &mut Cache,
        bus: &mut MessageBus,
        ts_event: i64,
    ) -> Result<(), ExecutionError> {
        let mut order = cache
            .order(&fill.client_order_id)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownOrder { client_order_id: fill.client_order_id.clone() })?;

        let event = OrderEvent::Filled {
            meta: EventMeta { event_id: self.next_event_id(), ts_event },
            client_order_id: fill.client_order_id.clone(),
            venue_order_id: fill.venue_order_id.clone(),
            trade_id: fill.trade_id.clone(),
            position_id: None,
            instrument_id: order.instrument_id.clone(),
            side: fill.side,
            last_qty: fill.fill_qty,
            last_px: fill.fill_px,
            commission: fill.commission.clone(),
            liquidity_side: LiquiditySide::Taker,
        };
        order.apply(event.clone())?;
        let order_topic = format!("events.order.{}", order.strategy_id);
        cache.update_order(order.clone());
        bus.publish(&order_topic, &BusMessage::Order(event.clone()));

        match self.oms_type(order.instrument_id.venue()) {
            OmsType::Netting => self.handle_fill_netting(&event, &order, cache, bus),
            OmsType::Hedging => self.handle_fill_hedging(&event, &order, cache, bus),
        }
        Ok(())
    }

    /// Netting: at most one open position per instrument. A fill with no
    /// open position opens one; otherwise the existing position absorbs
    /// the fill (which may reduce, flip, or close it).
    fn handle_fill_netting(&mut self, event: &OrderEvent, order: &Order, cache: &mut Cache, bus: &mut MessageBus) {
        let filter = Filter { instrument_id: Some(&order.instrument_id), strategy_id: None };
        let existing = cache.positions_open(filter).first().map(|p| p.id.clone());
        match existing {
            Some(position_id) => self.apply_fill_to_position(&position_id, event, order, cache, bus),
            None => self.open_position(event, order, cache, bus),
        }
    }

    /// Hedging: a fill carrying a `position_id` targets that position
    /// directly. This matching engine never assigns one (it has no notion
    /// of position allocation), so every hedging fill falls back to the
    /// same "first open position for the instrument, else open one" rule
    /// netting uses — matching the original's `_handle_fill_hedging`
    /// behavior when `event.position_id` is absent.
    fn handle_fill_hedging(&mut self, event: &OrderEvent, order: &Order, cache: &mut Cache, bus: &mut MessageBus) {
        let position_id = match event {
            OrderEvent::Filled { position_id: Some(id), .. } => Some(id.clone()),
            _ => None,
        };
        let target = position_id.or_else(|| {
            let filter = Filter { instrument_id: Some(&order.instrument_id), strategy_id: None };
            cache.positions_open(filter).first().map(|p| p.id.clone())
        });
        match target {
            Some(position_id) => self.apply_fill_to_position(&position_id, event, order, cache, bus),
            None => self.open_position(event, order, cache, bus),
        }
    }

    fn apply_fill_to_position(
        &mut self,
        position_id: &PositionId,
        event: &OrderEvent,
        order: &Order,
        cache: &mut Cache,
        bus: &mut MessageBus,
    ) {
        let OrderEvent::Filled { side, last_qty, last_px, commission, .. } = event else {
            return;
        };
        let Some(mut position) = cache.position(position_id).cloned() else { return };

        let outcome = position.apply_fill(*side, *last_qty, *last_px, commission.clone());
        let meta = EventMeta { event_id: self.next_event_id(), ts_event: event.meta().ts_event };
        let pos_event = match outcome {
            PositionOutcome::Closed => PositionEvent::Closed {
                meta,
                position_id: position.id.clone(),
                realized_pnl: position.realized_pnl.clone(),
            },
            // `Position::apply_fill` never returns `Opened` — a position
            // already on the cache is by definition not brand new.
            PositionOutcome::Changed | PositionOutcome::Opened => PositionEvent::Changed {
                meta,
                position_id: position.id.clone(),
                side: position.side,
                signed_qty: Quantity::new(position.signed_qty.abs())
                    .expect("abs() of a signed quantity is never negative"),
                avg_px_open: Price::new(position.avg_px_open)
                    .expect("an open position's avg_px_open is always positive"),
                realized_pnl: position.realized_pnl.clone(),
            },
        };
        position.push_event(pos_event.clone());
        cache.update_position(position);
        bus.publish(&format!("events.position.{}", order.strategy_id), &BusMessage::Position(pos_event));
    }

    fn open_position(&mut self, event: &OrderEvent, order: &Order, cache: &mut Cache, bus: &mut MessageBus) {
        let OrderEvent::Filled { side, last_qty, last_px, commission, .. } = event else {
            return;
        };
        let position_id =
            PositionId::new(self.position_counter.next_id("P")).expect("counter-generated id is never empty");
        let account_id = self.account_id(order.instrument_id.venue());

        let position = Position::open(
            position_id.clone(),
            order.instrument_id.clone(),
            order.strategy_id.clone(),
            order.trader_id.clone(),
            account_id,
            commission.currency().clone(),
            *side,
            *last_qty,
            *last_px,
            commission.clone(),
        );

        let pos_event = PositionEvent::Opened {
            meta: EventMeta { event_id: self.next_event_id(), ts_event: event.meta().ts_event },
            position_id,
            instrument_id: order.instrument_id.clone(),
            strategy_id: order.strategy_id.clone(),
            side: position.side,
            signed_qty: Quantity::new(position.signed_qty.abs())
                .expect("abs() of a signed quantity is never negative"),
            avg_px_open: Price::new(position.avg_px_open)
                .expect("a freshly opened position's avg_px_open is always positive"),
        };
        let mut position = position;
        position.push_event(pos_event.clone());
        cache.add_position(position);
        bus.publish(&format!("events.position.{}", order.strategy_id), &BusMessage::Position(pos_event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::enums::{AccountType, AssetClass, OrderSide, OrderType, TimeInForce};
    use vela_core::ids::{ClientOrderId, InstrumentId, StrategyId, Symbol, TraderId};
    use vela_core::money::{Money, Price};
    use vela_core::{Currency, Decimal as CoreDecimal};
    use vela_risk::RiskConfig;

    fn instrument_id() -> InstrumentId {
        InstrumentId::new(Symbol::new("AAPL").unwrap(), VenueId::new("NASDAQ").unwrap())
    }

    fn instrument() -> Instrument {
        Instrument {
            instrument_id: instrument_id(),
            asset_class: AssetClass::Equity,
            quote_currency: Currency::usd(),
            price_precision: 2,
            size_precision: 0,
            min_quantity: None,
            max_quantity: None,
            taker_fee: CoreDecimal::parse("0.001", 4).unwrap(),
            maker_fee: CoreDecimal::parse("0.0005", 4).unwrap(),
            leverage: CoreDecimal::parse("1", 0).unwrap(),
        }
    }

    fn new_order(id: &str) -> Order {
        Order::new(
            ClientOrderId::new(id).unwrap(),
            instrument_id(),
            TraderId::new("TRADER-1").unwrap(),
            StrategyId::new("S-1").unwrap(),
            OrderSide::Buy,
            OrderType::Market,
            Quantity::parse("10", 0).unwrap(),
            TimeInForce::Gtc,
            None,
            None,
            0,
        )
        .unwrap()
    }

    fn exchange() -> SimulatedExchange {
        let mut ex = SimulatedExchange::new(
            VenueId::new("NASDAQ").unwrap(),
            OmsType::Netting,
            AccountType::Cash,
            Currency::usd(),
            Money::new(CoreDecimal::parse("100000", 2).unwrap(), Currency::usd()),
        );
        ex.add_instrument(instrument());
        ex
    }

    fn bar(open: &str, high: &str, low: &str, close: &str) -> vela_core::market_data::Bar {
        use vela_core::enums::{BarAggregation, PriceType};
        use vela_core::market_data::{BarSpecification, BarType};
        vela_core::market_data::Bar {
            bar_type: BarType {
                instrument_id: instrument_id(),
                spec: BarSpecification { step: 1, aggregation: BarAggregation::Minute, price_type: PriceType::Last },
            },
            open: Price::parse(open, 2).unwrap(),
            high: Price::parse(high, 2).unwrap(),
            low: Price::parse(low, 2).unwrap(),
            close: Price::parse(close, 2).unwrap(),
            volume: Quantity::parse("1000", 0).unwrap(),
            ts_event: 1,
        }
    }

    #[test]
    fn denied_order_publishes_denied_and_never_reaches_exchange() {
        let mut engine = ExecutionEngine::new();
        let risk = RiskEngine::new(RiskConfig { trading_state: vela_core::enums::TradingState::Halted });
        let mut exchange = exchange();
        let mut cache = Cache::new();
        let mut bus = MessageBus::new();

        engine.submit_order(
            new_order("O-1"),
            Some(&instrument()),
            CoreDecimal::zero(0),
            &risk,
            &mut exchange,
            &mut cache,
            &mut bus,
            0,
        );

        let order = cache.order(&ClientOrderId::new("O-1").unwrap()).unwrap();
        assert_eq!(order.status, vela_core::enums::OrderStatus::Denied);
        assert_eq!(exchange.open_order_count(), 0);
    }

    #[test]
    fn accepted_order_routes_to_exchange_and_records_venue_order_id() {
        let mut engine = ExecutionEngine::new();
        let risk = RiskEngine::new(RiskConfig::sane_defaults());
        let mut exchange = exchange();
        let mut cache = Cache::new();
        let mut bus = MessageBus::new();

        engine.submit_order(
            new_order("O-1"),
            Some(&instrument()),
            CoreDecimal::zero(0),
            &risk,
            &mut exchange,
            &mut cache,
            &mut bus,
            0,
        );

        let order = cache.order(&ClientOrderId::new("O-1").unwrap()).unwrap();
        assert_eq!(order.status, vela_core::enums::OrderStatus::Accepted);
        assert!(order.venue_order_id.is_some());
        assert_eq!(exchange.open_order_count(), 1);
    }

    #[test]
    fn fill_with_no_open_position_opens_one() {
        let mut engine = ExecutionEngine::new();
        engine.register_venue(VenueId::new("NASDAQ").unwrap(), OmsType::Netting);
        let risk = RiskEngine::new(RiskConfig::sane_defaults());
        let mut exchange = exchange();
        let mut cache = Cache::new();
        let mut bus = MessageBus::new();

        engine.submit_order(
            new_order("O-1"),
            Some(&instrument()),
            CoreDecimal::zero(0),
            &risk,
            &mut exchange,
            &mut cache,
            &mut bus,
            0,
        );
        let fills = exchange.process_bar(&bar("100", "101", "99", "100.5"));
        assert_eq!(fills.len(), 1);
        engine.process_fill(fills.into_iter().next().unwrap(), &mut cache, &mut bus, 1).unwrap();

        let filter = Filter { instrument_id: Some(&instrument_id()), strategy_id: None };
        let positions = cache.positions_open(filter);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity().to_string(), "10");
    }

    #[test]
    fn closing_fill_publishes_position_closed() {
        let mut engine = ExecutionEngine::new();
        engine.register_venue(VenueId::new("NASDAQ").unwrap(), OmsType::Netting);
        let risk = RiskEngine::new(RiskConfig::sane_defaults());
        let mut exchange = exchange();
        let mut cache = Cache::new();
        let mut bus = MessageBus::new();

        engine.submit_order(
            new_order("O-1"),
            Some(&instrument()),
            CoreDecimal::zero(0),
            &risk,
            &mut exchange,
            &mut cache,
            &mut bus,
            0,
        );
        let fills = exchange.process_bar(&bar("100", "101", "99", "100.5"));
        engine.process_fill(fills.into_iter().next().unwrap(), &mut cache, &mut bus, 1).unwrap();

        let mut sell = new_order("O-2");
        sell.side = OrderSide::Sell;
        engine.submit_order(
            sell,
            Some(&instrument()),
            CoreDecimal::parse("10", 0).unwrap(),
            &risk,
            &mut exchange,
            &mut cache,
            &mut bus,
            2,
        );
        let fills = exchange.process_bar(&bar("100", "101", "99", "100.5"));
        engine.process_fill(fills.into_iter().next().unwrap(), &mut cache, &mut bus, 3).unwrap();

        let filter = Filter { instrument_id: Some(&instrument_id()), strategy_id: None };
        assert_eq!(cache.positions_open(filter).len(), 0);
        let closed = cache.positions_closed(Filter::default());
        assert_eq!(closed.len(), 1);
        assert!(closed[0].realized_pnl.amount().is_zero());
    }

    #[test]
    fn cancel_removes_order_from_exchange_and_cache_reflects_canceled() {
        let mut engine = ExecutionEngine::new();
        let risk = RiskEngine::new(RiskConfig::sane_defaults());
        let mut exchange = exchange();
        let mut cache = Cache::new();
        let mut bus = MessageBus::new();

        let mut limit = new_order("O-1");
        limit.order_type = OrderType::Limit;
        limit.price = Some(Price::parse("50", 2).unwrap());
        engine.submit_order(
            limit,
            Some(&instrument()),
            CoreDecimal::zero(0),
            &risk,
            &mut exchange,
            &mut cache,
            &mut bus,
            0,
        );
        engine
            .cancel_order(&ClientOrderId::new("O-1").unwrap(), &mut exchange, &mut cache, &mut bus, 1)
            .unwrap();

        assert_eq!(exchange.open_order_count(), 0);
        let order = cache.order(&ClientOrderId::new("O-1").unwrap()).unwrap();
        assert_eq!(order.status, vela_core::enums::OrderStatus::Canceled);
    }

    #[test]
    fn cancel_unknown_order_is_an_error() {
        let mut engine = ExecutionEngine::new();
        let mut exchange = exchange();
        let mut cache = Cache::new();
        let mut bus = MessageBus::new();
        let result = engine.cancel_order(&ClientOrderId::new("O-1").unwrap(), &mut exchange, &mut cache, &mut bus, 0);
        assert!(result.is_err());
    }
}
