//! In-memory indexed store for orders, positions, instruments, and market
//! data, keyed by identifier with secondary indices by instrument,
//! strategy, and venue. No eviction; lifetime is the backtest run.
//!
//! Grounded on `original_source/nautilus_core/cache.py`'s `Cache` class —
//! the primary/secondary index split and the `orders`/`positions` query
//! shape (optionally filtered by instrument or strategy) are carried over
//! directly; `orders_closed`/`positions_closed`/`orders_for_venue`/
//! `positions_for_venue` round out the original's `orders_open`/
//! `positions_open`/venue-index query pair.

use std::collections::HashMap;

use vela_core::ids::{ClientOrderId, InstrumentId, PositionId, StrategyId, VenueId};
use vela_core::market_data::{Bar, BarType, QuoteTick, TradeTick};
use vela_core::Instrument;
use vela_oms::Order;
use vela_portfolio::Position;

#[derive(Default)]
pub struct Cache {
    instruments: HashMap<InstrumentId, Instrument>,
    orders: HashMap<ClientOrderId, Order>,
    positions: HashMap<PositionId, Position>,
    bars: HashMap<BarType, Vec<Bar>>,
    quote_ticks: HashMap<InstrumentId, Vec<QuoteTick>>,
    trade_ticks: HashMap<InstrumentId, Vec<TradeTick>>,

    orders_by_venue: HashMap<VenueId, Vec<ClientOrderId>>,
    orders_by_strategy: HashMap<StrategyId, Vec<ClientOrderId>>,
    orders_by_instrument: HashMap<InstrumentId, Vec<ClientOrderId>>,
    positions_by_venue: HashMap<VenueId, Vec<PositionId>>,
    positions_by_strategy: HashMap<StrategyId, Vec<PositionId>>,
    positions_by_instrument: HashMap<InstrumentId, Vec<PositionId>>,
}

/// Optional filter shared by the `orders*`/`positions*` query family.
#[derive(Default, Clone, Copy)]
pub struct Filter<'a> {
    pub instrument_id: Option<&'a InstrumentId>,
    pub strategy_id: Option<&'a StrategyId>,
}

impl Cache {
    pub fn new() -> Self {
        Cache::default()
    }

    // --- Instruments ---

    pub fn add_instrument(&mut self, instrument: Instrument) {
        self.instruments.insert(instrument.instrument_id.clone(), instrument);
    }

    pub fn instrument(&self, instrument_id: &InstrumentId) -> Option<&Instrument> {
        self.instruments.get(instrument_id)
    }

    pub fn instruments(&self) -> Vec<&Instrument> {
        self.instruments.values().collect()
    }

    // --- Orders ---

    pub fn add_order(&mut self, order: Order) {
        let id = order.client_order_id.clone();
        let venue = order.instrument_id.venue().clone();
        self.orders_by_venue.entry(venue).or_default().push(id.clone());
        self.orders_by_strategy.entry(order.strategy_id.clone()).or_default().push(id.clone());
        self.orders_by_instrument.entry(order.instrument_id.clone()).or_default().push(id.clone());
        self.orders.insert(id, order);
    }

    pub fn update_order(&mut self, order: Order) {
        self.orders.insert(order.client_order_id.clone(), order);
    }

    pub fn order(&self, client_order_id: &ClientOrderId) -> Option<&Order> {
        self.orders.get(client_order_id)
    }

    pub fn order_mut(&mut self, client_order_id: &ClientOrderId) -> Option<&mut Order> {
        self.orders.get_mut(client_order_id)
    }

    pub fn orders(&self, filter: Filter) -> Vec<&Order> {
        self.filtered_orders(filter).collect()
    }

    pub fn orders_open(&self, filter: Filter) -> Vec<&Order> {
        self.filtered_orders(filter).filter(|o| o.is_open()).collect()
    }

    pub fn orders_closed(&self, filter: Filter) -> Vec<&Order> {
        self.filtered_orders(filter).filter(|o| o.is_closed()).collect()
    }

    pub fn orders_for_venue(&self, venue: &VenueId) -> Vec<&Order> {
        self.orders_by_venue
            .get(venue)
            .into_iter()
            .flatten()
            .filter_map(|id| self.orders.get(id))
            .collect()
    }

    fn filtered_orders(&self, filter: Filter) -> impl Iterator<Item = &Order> {
        let ids: Option<&Vec<ClientOrderId>> = if let Some(instrument_id) = filter.instrument_id {
            self.orders_by_instrument.get(instrument_id)
        } else if let Some(strategy_id) = filter.strategy_id {
            self.orders_by_strategy.get(strategy_id)
        } else {
            None
        };
        match ids {
            Some(ids) => Box::new(ids.iter().filter_map(|id| self.orders.get(id))) as Box<dyn Iterator<Item = &Order>>,
            None => Box::new(self.orders.values()) as Box<dyn Iterator<Item = &Order>>,
        }
    }

    // --- Positions ---

    pub fn add_position(&mut self, position: Position) {
        let id = position.id.clone();
        let venue = position.instrument_id.venue().clone();
        self.positions_by_venue.entry(venue).or_default().push(id.clone());
        self.positions_by_strategy.entry(position.strategy_id.clone()).or_default().push(id.clone());
        self.positions_by_instrument.entry(position.instrument_id.clone()).or_default().push(id.clone());
        self.positions.insert(id, position);
    }

    pub fn update_position(&mut self, position: Position) {
        self.positions.insert(position.id.clone(), position);
    }

    pub fn position(&self, position_id: &PositionId) -> Option<&Position> {
        self.positions.get(position_id)
    }

    pub fn position_mut(&mut self, position_id: &PositionId) -> Option<&mut Position> {
        self.positions.get_mut(position_id)
    }

    pub fn positions(&self, filter: Filter) -> Vec<&Position> {
        self.filtered_positions(filter).collect()
    }

    pub fn positions_open(&self, filter: Filter) -> Vec<&Position> {
        self.filtered_positions(filter).filter(|p| !p.is_closed()).collect()
    }

    pub fn positions_closed(&self, filter: Filter) -> Vec<&Position> {
        self.filtered_positions(filter).filter(|p| p.is_closed()).collect()
    }

    pub fn positions_for_venue(&self, venue: &VenueId) -> Vec<&Position> {
        self.positions_by_venue
            .get(venue)
            .into_iter()
            .flatten()
            .filter_map(|id| self.positions.get(id))
            .collect()
    }

    /// Signed net quantity for `instrument_id` under `strategy_id`, summed
    /// across every still-open position — what `vela-risk`'s REDUCING-state
    /// rule consults.
    pub fn net_position(&self, instrument_id: &InstrumentId, strategy_id: &StrategyId) -> vela_core::Decimal {
        let filter = Filter { instrument_id: Some(instrument_id), strategy_id: None };
        self.filtered_positions(filter)
            .filter(|p| p.strategy_id == *strategy_id)
            .fold(vela_core::Decimal::zero(0), |acc, p| acc + p.signed_qty)
    }

    fn filtered_positions(&self, filter: Filter) -> impl Iterator<Item = &Position> {
        let ids: Option<&Vec<PositionId>> = if let Some(instrument_id) = filter.instrument_id {
            self.positions_by_instrument.get(instrument_id)
        } else if let Some(strategy_id) = filter.strategy_id {
            self.positions_by_strategy.get(strategy_id)
        } else {
            None
        };
        match ids {
            Some(ids) => Box::new(ids.iter().filter_map(|id| self.positions.get(id))) as Box<dyn Iterator<Item = &Position>>,
            None => Box::new(self.positions.values()) as Box<dyn Iterator<Item = &Position>>,
        }
    }

    // --- Bars / ticks ---

    pub fn add_bar(&mut self, bar: Bar) {
        self.bars.entry(bar.bar_type.clone()).or_default().push(bar);
    }

    pub fn bars(&self, bar_type: &BarType) -> &[Bar] {
        self.bars.get(bar_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_quote_tick(&mut self, tick: QuoteTick) {
        self.quote_ticks.entry(tick.instrument_id.clone()).or_default().push(tick);
    }

    pub fn quote_ticks(&self, instrument_id: &InstrumentId) -> &[QuoteTick] {
        self.quote_ticks.get(instrument_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn add_trade_tick(&mut self, tick: TradeTick) {
        self.trade_ticks.entry(tick.instrument_id.clone()).or_default().push(tick);
    }

    pub fn trade_ticks(&self, instrument_id: &InstrumentId) -> &[TradeTick] {
        self.trade_ticks.get(instrument_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::enums::{AssetClass, OrderSide, OrderStatus, OrderType, TimeInForce};
    use vela_core::ids::{Symbol, TraderId};
    use vela_core::money::{Price, Quantity};
    use vela_core::{Currency, Decimal};

    fn instrument_id() -> InstrumentId {
        InstrumentId::new(Symbol::new("AAPL").unwrap(), VenueId::new("NASDAQ").unwrap())
    }

    fn sample_order(status: OrderStatus) -> Order {
        let mut order = Order::new(
            ClientOrderId::new("O-1").unwrap(),
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
        .unwrap();
        order.status = status;
        order
    }

    #[test]
    fn order_round_trips_by_primary_key() {
        let mut cache = Cache::new();
        cache.add_order(sample_order(OrderStatus::Accepted));
        let id = ClientOrderId::new("O-1").unwrap();
        assert!(cache.order(&id).is_some());
    }

    #[test]
    fn orders_filtered_by_instrument_and_venue() {
        let mut cache = Cache::new();
        cache.add_order(sample_order(OrderStatus::Accepted));
        let filter = Filter { instrument_id: Some(&instrument_id()), strategy_id: None };
        assert_eq!(cache.orders(filter).len(), 1);
        assert_eq!(cache.orders_for_venue(&VenueId::new("NASDAQ").unwrap()).len(), 1);
        assert_eq!(cache.orders_for_venue(&VenueId::new("NYSE").unwrap()).len(), 0);
    }

    #[test]
    fn orders_open_and_closed_partition_by_status() {
        let mut cache = Cache::new();
        cache.add_order(sample_order(OrderStatus::Accepted));
        cache.add_order({
            let mut o = sample_order(OrderStatus::Filled);
            o.client_order_id = ClientOrderId::new("O-2").unwrap();
            o
        });
        let filter = Filter::default();
        assert_eq!(cache.orders_open(filter).len(), 1);
        assert_eq!(cache.orders_closed(filter).len(), 1);
    }

    #[test]
    fn instrument_lookup_round_trips() {
        let mut cache = Cache::new();
        let instrument = Instrument {
            instrument_id: instrument_id(),
            asset_class: AssetClass::Equity,
            quote_currency: Currency::usd(),
            price_precision: 2,
            size_precision: 0,
            min_quantity: None,
            max_quantity: None,
            taker_fee: Decimal::parse("0.001", 4).unwrap(),
            maker_fee: Decimal::parse("0.0005", 4).unwrap(),
            leverage: Decimal::parse("1", 0).unwrap(),
        };
        cache.add_instrument(instrument);
        assert!(cache.instrument(&instrument_id()).is_some());
    }

    #[test]
    fn net_position_sums_open_positions_for_strategy() {
        let mut cache = Cache::new();
        let position = Position::open(
            PositionId::new("P-1").unwrap(),
            instrument_id(),
            StrategyId::new("S-1").unwrap(),
            TraderId::new("TRADER-1").unwrap(),
            vela_core::AccountId::new("NASDAQ-001").unwrap(),
            Currency::usd(),
            OrderSide::Buy,
            Quantity::parse("10", 0).unwrap(),
            Price::parse("100", 0).unwrap(),
            vela_core::Money::zero(Currency::usd()),
        );
        cache.add_position(position);
        let net = cache.net_position(&instrument_id(), &StrategyId::new("S-1").unwrap());
        assert_eq!(net.to_string(), "10");
    }
}
