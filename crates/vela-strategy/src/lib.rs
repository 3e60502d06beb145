//! The strategy base: a `Strategy` trait implementors write user logic
//! against, an `OrderFactory` for deterministic client order ids, and the
//! `Commands` bundle a strategy uses to reach the engines that act on its
//! behalf.
//!
//! Grounded on `original_source/nautilus_core/trading/strategy.py`'s
//! `Strategy` base class (lifecycle hooks, data/event handlers, the
//! `submit_order`/`cancel_order`/`modify_order`/`close_position` command
//! surface, `register_indicator_for_bars`) and the teacher crate's
//! `mqk-strategy` host/registry split for how a strategy is wired to its
//! collaborators rather than owning them directly.
//!
//! The original injects `cache`/`msgbus`/`order_factory`/`_exec_engine`
//! onto `self` at `register()` time, so a strategy method can call
//! `self.submit_order(...)` with no extra arguments. A `Box<dyn Strategy>`
//! cannot hold borrowed references to engines another part of the system
//! also needs to borrow mutably in the same tick, so here a strategy's
//! data handlers instead receive a [`Commands`] bundle of short-lived
//! references for the duration of that one call — the same dependency-light
//! shape `vela-risk`/`vela-data`/`vela-execution` already use, just handed
//! to the strategy instead of held by an engine. `on_start` gets the
//! narrower [`Subscriptions`] bundle instead, matching how the original's
//! `on_start` typically does nothing but call `self.subscribe_bars(...)`.

use std::collections::{HashMap, HashSet};

use vela_cache::{Cache, Filter};
use vela_core::counter::Counter;
use vela_core::enums::{OrderSide, PositionSide, TimeInForce};
use vela_core::events::{OrderEvent, PositionEvent};
use vela_core::ids::{
    ClientOrderId, InstrumentId, PositionId, StrategyId, TraderId,
};
use vela_core::instrument::Instrument;
use vela_core::market_data::{Bar, BarType, QuoteTick, TradeTick};
use vela_core::money::{Price, Quantity};
use vela_bus::MessageBus;
use vela_data::DataEngine;
use vela_exchange::SimulatedExchange;
use vela_execution::{ExecutionEngine, ExecutionError};
use vela_oms::{OmsError, Order};
use vela_risk::RiskEngine;

/// Builds orders on behalf of one strategy, stamping each with a
/// deterministic `"O-{strategy_id}-{n}"` client order id.
///
/// Grounded on the usage pattern in `strategy.py`'s `close_position`
/// (`order_factory.market(instrument_id, side, quantity, ts_init)`) —
/// `original_source` has no standalone `order_factory.py` to port
/// directly, so the four constructors here are shaped by what the base
/// class actually calls plus spec.md's order-type table.
pub struct OrderFactory {
    trader_id: TraderId,
    strategy_id: StrategyId,
    counter: Counter,
}

impl OrderFactory {
    pub fn new(trader_id: TraderId, strategy_id: StrategyId) -> Self {
        OrderFactory { trader_id, strategy_id, counter: Counter::new() }
    }

    fn next_client_order_id(&mut self) -> ClientOrderId {
        let prefix = format!("O-{}", self.strategy_id);
        ClientOrderId::new(self.counter.next_id(&prefix))
            .expect("counter-generated id is never empty")
    }

    pub fn market(
        &mut self,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        ts_init: i64,
    ) -> Result<Order, OmsError> {
        Order::new(
            self.next_client_order_id(),
            instrument_id,
            self.trader_id.clone(),
            self.strategy_id.clone(),
            side,
            vela_core::enums::OrderType::Market,
            quantity,
            TimeInForce::Gtc,
            None,
            None,
            ts_init,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn limit(
        &mut self,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        price: Price,
        time_in_force: TimeInForce,
        ts_init: i64,
    ) -> Result<Order, OmsError> {
        Order::new(
            self.next_client_order_id(),
            instrument_id,
            self.trader_id.clone(),
            self.strategy_id.clone(),
            side,
            vela_core::enums::OrderType::Limit,
            quantity,
            time_in_force,
            Some(price),
            None,
            ts_init,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn stop_market(
        &mut self,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        trigger_price: Price,
        time_in_force: TimeInForce,
        ts_init: i64,
    ) -> Result<Order, OmsError> {
        Order::new(
            self.next_client_order_id(),
            instrument_id,
            self.trader_id.clone(),
            self.strategy_id.clone(),
            side,
            vela_core::enums::OrderType::StopMarket,
            quantity,
            time_in_force,
            None,
            Some(trigger_price),
            ts_init,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn stop_limit(
        &mut self,
        instrument_id: InstrumentId,
        side: OrderSide,
        quantity: Quantity,
        price: Price,
        trigger_price: Price,
        time_in_force: TimeInForce,
        ts_init: i64,
    ) -> Result<Order, OmsError> {
        Order::new(
            self.next_client_order_id(),
            instrument_id,
            self.trader_id.clone(),
            self.strategy_id.clone(),
            side,
            vela_core::enums::OrderType::StopLimit,
            quantity,
            time_in_force,
            Some(price),
            Some(trigger_price),
            ts_init,
        )
    }
}

/// The shared engines a `StrategyRuntime::handle_*` call borrows from its
/// caller, minus the order factory — that part lives on the runtime
/// itself, scoped to its own strategy, and gets spliced in when the
/// runtime builds its [`Commands`] internally. `vela-backtest`'s event
/// loop is the sole owner of every field; it builds one `Engines` per
/// call and hands it to whichever `StrategyRuntime` needs to see that
/// datum.
pub struct Engines<'a> {
    pub execution: &'a mut ExecutionEngine,
    pub exchange: &'a mut SimulatedExchange,
    pub risk: &'a RiskEngine,
    pub cache: &'a mut Cache,
    pub bus: &'a mut MessageBus,
    pub ts_event: i64,
}

/// The engines a strategy reaches through during one data-handler call.
/// Borrowed for the duration of that call only.
pub struct Commands<'a> {
    pub execution: &'a mut ExecutionEngine,
    pub exchange: &'a mut SimulatedExchange,
    pub risk: &'a RiskEngine,
    pub cache: &'a mut Cache,
    pub bus: &'a mut MessageBus,
    pub order_factory: &'a mut OrderFactory,
    pub ts_event: i64,
}

impl<'a> Commands<'a> {
    pub fn submit_order(&mut self, order: Order, instrument: Option<&Instrument>, net_position: vela_core::Decimal) {
        self.execution.submit_order(
            order,
            instrument,
            net_position,
            self.risk,
            self.exchange,
            self.cache,
            self.bus,
            self.ts_event,
        );
    }

    pub fn cancel_order(&mut self, client_order_id: &ClientOrderId) -> Result<(), ExecutionError> {
        self.execution.cancel_order(client_order_id, self.exchange, self.cache, self.bus, self.ts_event)
    }

    pub fn modify_order(
        &mut self,
        client_order_id: &ClientOrderId,
        quantity: Option<Quantity>,
        price: Option<Price>,
        trigger_price: Option<Price>,
    ) -> Result<(), ExecutionError> {
        self.execution.modify_order(
            client_order_id,
            quantity,
            price,
            trigger_price,
            self.exchange,
            self.cache,
            self.bus,
            self.ts_event,
        )
    }

    pub fn cancel_all_orders(&mut self, instrument_id: &InstrumentId, strategy_id: &StrategyId) {
        let ids: Vec<ClientOrderId> = {
            let filter = Filter { instrument_id: Some(instrument_id), strategy_id: Some(strategy_id) };
            self.cache.orders_open(filter).into_iter().map(|o| o.client_order_id.clone()).collect()
        };
        for id in ids {
            let _ = self.cancel_order(&id);
        }
    }

    /// Submit a reducing market order against `position_id`'s full open
    /// quantity. A flat or already-closed position is a no-op.
    pub fn close_position(&mut self, position_id: &PositionId, ts_init: i64, instrument: Option<&Instrument>) {
        let Some(position) = self.cache.position(position_id).cloned() else { return };
        if position.is_closed() {
            return;
        }
        let side = match position.side {
            PositionSide::Long => OrderSide::Sell,
            PositionSide::Short => OrderSide::Buy,
            PositionSide::Flat => return,
        };
        let Ok(quantity) = Quantity::new(position.quantity()) else { return };
        let Ok(order) = self.order_factory.market(position.instrument_id.clone(), side, quantity, ts_init) else {
            return;
        };
        let net_position = self.cache.net_position(&position.instrument_id, &position.strategy_id);
        self.submit_order(order, instrument, net_position);
    }

    pub fn close_all_positions(
        &mut self,
        instrument_id: &InstrumentId,
        strategy_id: &StrategyId,
        ts_init: i64,
        instrument: Option<&Instrument>,
    ) {
        let ids: Vec<PositionId> = {
            let filter = Filter { instrument_id: Some(instrument_id), strategy_id: Some(strategy_id) };
            self.cache.positions_open(filter).into_iter().map(|p| p.id.clone()).collect()
        };
        for id in ids {
            self.close_position(&id, ts_init, instrument);
        }
    }
}

/// Lets `on_start` register the bar/tick subscriptions it needs, the way
/// the original's `self.subscribe_bars(...)` does from inside the base
/// class's injected `self`. Borrowed for the duration of that one call;
/// `StrategyRuntime` owns the subscription sets this writes into and the
/// `DataEngine` reference is borrowed in from the caller for that call only.
pub struct Subscriptions<'a> {
    data_engine: &'a mut DataEngine,
    bar_subscriptions: &'a mut HashSet<BarType>,
    quote_subscriptions: &'a mut HashSet<InstrumentId>,
    trade_subscriptions: &'a mut HashSet<InstrumentId>,
}

impl<'a> Subscriptions<'a> {
    pub fn subscribe_bars(&mut self, bar_type: BarType) {
        self.data_engine.subscribe_bars(bar_type.clone());
        self.bar_subscriptions.insert(bar_type);
    }

    pub fn unsubscribe_bars(&mut self, bar_type: &BarType) {
        self.bar_subscriptions.remove(bar_type);
    }

    pub fn subscribe_quote_ticks(&mut self, instrument_id: InstrumentId) {
        self.data_engine.subscribe_quote_ticks(instrument_id.clone());
        self.quote_subscriptions.insert(instrument_id);
    }

    pub fn unsubscribe_quote_ticks(&mut self, instrument_id: &InstrumentId) {
        self.quote_subscriptions.remove(instrument_id);
    }

    pub fn subscribe_trade_ticks(&mut self, instrument_id: InstrumentId) {
        self.data_engine.subscribe_trade_ticks(instrument_id.clone());
        self.trade_subscriptions.insert(instrument_id);
    }

    pub fn unsubscribe_trade_ticks(&mut self, instrument_id: &InstrumentId) {
        self.trade_subscriptions.remove(instrument_id);
    }
}

/// User-supplied trading logic. Every hook has a no-op default so an
/// implementor only overrides what it cares about, matching the original's
/// base class where most handlers are `pass`.
pub trait Strategy {
    fn id(&self) -> &StrategyId;

    fn on_start(&mut self, _subscriptions: &mut Subscriptions) {}
    fn on_stop(&mut self) {}
    fn on_reset(&mut self) {}

    fn on_bar(&mut self, _bar: &Bar, _commands: &mut Commands) {}
    fn on_quote_tick(&mut self, _tick: &QuoteTick, _commands: &mut Commands) {}
    fn on_trade_tick(&mut self, _tick: &TradeTick, _commands: &mut Commands) {}

    // `on_order_initialized` is dispatched here though the original's
    // `_handle_order_event` never calls it (see DESIGN.md decision 2).
    fn on_order_initialized(&mut self, _event: &OrderEvent) {}
    fn on_order_submitted(&mut self, _event: &OrderEvent) {}
    fn on_order_accepted(&mut self, _event: &OrderEvent) {}
    fn on_order_denied(&mut self, _event: &OrderEvent) {}
    fn on_order_rejected(&mut self, _event: &OrderEvent) {}
    fn on_order_canceled(&mut self, _event: &OrderEvent) {}
    fn on_order_filled(&mut self, _event: &OrderEvent) {}

    fn on_position_opened(&mut self, _event: &PositionEvent) {}
    fn on_position_changed(&mut self, _event: &PositionEvent) {}
    fn on_position_closed(&mut self, _event: &PositionEvent) {}
}

/// Wires a [`Strategy`] to its subscriptions, indicators, and order
/// factory, and dispatches inbound bars/ticks/events to it.
///
/// Subscribing to data both registers with `DataEngine` (so the engine
/// knows to publish that topic at all) and records membership here (so
/// this runtime knows whether to forward a given bar to its strategy).
/// The original also subscribes the strategy's dispatch method directly
/// onto the bus; a `Box<dyn Strategy>` held by this runtime can't also be
/// captured into a `Box<dyn FnMut>` bus handler without shared mutable
/// ownership the rest of this workspace's dependency-light design avoids,
/// so `vela-backtest`'s event loop calls `handle_bar`/`handle_order_event`/
/// `handle_position_event` directly instead of through the bus.
pub struct StrategyRuntime {
    strategy: Box<dyn Strategy>,
    order_factory: OrderFactory,
    bar_subscriptions: HashSet<BarType>,
    quote_subscriptions: HashSet<InstrumentId>,
    trade_subscriptions: HashSet<InstrumentId>,
    indicators: HashMap<BarType, Vec<Box<dyn FnMut(&Bar)>>>,
}

impl StrategyRuntime {
    pub fn new(strategy: Box<dyn Strategy>, trader_id: TraderId) -> Self {
        let order_factory = OrderFactory::new(trader_id, strategy.id().clone());
        StrategyRuntime {
            strategy,
            order_factory,
            bar_subscriptions: HashSet::new(),
            quote_subscriptions: HashSet::new(),
            trade_subscriptions: HashSet::new(),
            indicators: HashMap::new(),
        }
    }

    pub fn id(&self) -> &StrategyId {
        self.strategy.id()
    }

    pub fn order_factory(&mut self) -> &mut OrderFactory {
        &mut self.order_factory
    }

    pub fn subscribe_bars(&mut self, bar_type: BarType, data_engine: &mut DataEngine) {
        data_engine.subscribe_bars(bar_type.clone());
        self.bar_subscriptions.insert(bar_type);
    }

    pub fn unsubscribe_bars(&mut self, bar_type: &BarType) {
        self.bar_subscriptions.remove(bar_type);
    }

    pub fn subscribe_quote_ticks(&mut self, instrument_id: InstrumentId, data_engine: &mut DataEngine) {
        data_engine.subscribe_quote_ticks(instrument_id.clone());
        self.quote_subscriptions.insert(instrument_id);
    }

    pub fn unsubscribe_quote_ticks(&mut self, instrument_id: &InstrumentId) {
        self.quote_subscriptions.remove(instrument_id);
    }

    pub fn subscribe_trade_ticks(&mut self, instrument_id: InstrumentId, data_engine: &mut DataEngine) {
        data_engine.subscribe_trade_ticks(instrument_id.clone());
        self.trade_subscriptions.insert(instrument_id);
    }

    pub fn unsubscribe_trade_ticks(&mut self, instrument_id: &InstrumentId) {
        self.trade_subscriptions.remove(instrument_id);
    }

    /// Register an indicator callback to run against every bar of
    /// `bar_type`, before `on_bar` is called for that same bar.
    pub fn register_indicator_for_bars(&mut self, bar_type: BarType, indicator: Box<dyn FnMut(&Bar)>) {
        self.indicators.entry(bar_type).or_default().push(indicator);
    }

    pub fn on_start(&mut self, data_engine: &mut DataEngine) {
        let mut subs = Subscriptions {
            data_engine,
            bar_subscriptions: &mut self.bar_subscriptions,
            quote_subscriptions: &mut self.quote_subscriptions,
            trade_subscriptions: &mut self.trade_subscriptions,
        };
        self.strategy.on_start(&mut subs);
    }

    pub fn on_stop(&mut self) {
        self.strategy.on_stop();
    }

    pub fn on_reset(&mut self) {
        self.strategy.on_reset();
    }

    pub fn handle_bar(&mut self, bar: &Bar, engines: &mut Engines) {
        if !self.bar_subscriptions.contains(&bar.bar_type) {
            return;
        }
        if let Some(indicators) = self.indicators.get_mut(&bar.bar_type) {
            for indicator in indicators.iter_mut() {
                indicator(bar);
            }
        }
        // Named field access (not a helper method) so the borrow checker
        // sees `self.order_factory` and `self.strategy` as disjoint: a
        // method call would instead borrow all of `self` for as long as
        // the returned `Commands` lives, conflicting with the `on_bar`
        // call below.
        let mut commands = Commands {
            execution: &mut *engines.execution,
            exchange: &mut *engines.exchange,
            risk: engines.risk,
            cache: &mut *engines.cache,
            bus: &mut *engines.bus,
            order_factory: &mut self.order_factory,
            ts_event: engines.ts_event,
        };
        self.strategy.on_bar(bar, &mut commands);
    }

    pub fn handle_quote_tick(&mut self, tick: &QuoteTick, engines: &mut Engines) {
        if !self.quote_subscriptions.contains(&tick.instrument_id) {
            return;
        }
        let mut commands = Commands {
            execution: &mut *engines.execution,
            exchange: &mut *engines.exchange,
            risk: engines.risk,
            cache: &mut *engines.cache,
            bus: &mut *engines.bus,
            order_factory: &mut self.order_factory,
            ts_event: engines.ts_event,
        };
        self.strategy.on_quote_tick(tick, &mut commands);
    }

    pub fn handle_trade_tick(&mut self, tick: &TradeTick, engines: &mut Engines) {
        if !self.trade_subscriptions.contains(&tick.instrument_id) {
            return;
        }
        let mut commands = Commands {
            execution: &mut *engines.execution,
            exchange: &mut *engines.exchange,
            risk: engines.risk,
            cache: &mut *engines.cache,
            bus: &mut *engines.bus,
            order_factory: &mut self.order_factory,
            ts_event: engines.ts_event,
        };
        self.strategy.on_trade_tick(tick, &mut commands);
    }

    pub fn handle_order_event(&mut self, event: &OrderEvent) {
        match event {
            OrderEvent::Initialized { .. } => self.strategy.on_order_initialized(event),
            OrderEvent::Submitted { .. } => self.strategy.on_order_submitted(event),
            OrderEvent::Accepted { .. } => self.strategy.on_order_accepted(event),
            OrderEvent::Denied { .. } => self.strategy.on_order_denied(event),
            OrderEvent::Rejected { .. } => self.strategy.on_order_rejected(event),
            OrderEvent::Canceled { .. } => self.strategy.on_order_canceled(event),
            OrderEvent::Filled { .. } => self.strategy.on_order_filled(event),
            OrderEvent::Updated { .. }
            | OrderEvent::Expired { .. }
            | OrderEvent::Triggered { .. }
            | OrderEvent::PendingUpdate { .. }
            | OrderEvent::PendingCancel { .. } => {}
        }
    }

    pub fn handle_position_event(&mut self, event: &PositionEvent) {
        match event {
            PositionEvent::Opened { .. } => self.strategy.on_position_opened(event),
            PositionEvent::Changed { .. } => self.strategy.on_position_changed(event),
            PositionEvent::Closed { .. } => self.strategy.on_position_closed(event),
        }
    }
}
