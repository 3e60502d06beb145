//! Subscription registry and bus-publishing data engine.
//!
//! Grounded on `original_source/nautilus_core/data_engine.py`'s
//! `DataEngine` — a thin `subscribe_*`/`process_*` pair per data kind,
//! each writing to the cache before publishing to the bus. Like
//! `vela-risk`, this engine holds no owned reference to the cache or bus
//! it acts on; both are passed in by the caller (`vela-backtest`'s event
//! loop), which is the sole owner of either for the run's duration.

use std::collections::HashSet;

use vela_bus::{BusMessage, MessageBus};
use vela_cache::Cache;
use vela_core::ids::InstrumentId;
use vela_core::market_data::{Bar, BarType, MarketData, QuoteTick, TradeTick};

#[derive(Default)]
pub struct DataEngine {
    bar_subscriptions: HashSet<BarType>,
    quote_subscriptions: HashSet<InstrumentId>,
    trade_subscriptions: HashSet<InstrumentId>,
}

impl DataEngine {
    pub fn new() -> Self {
        DataEngine::default()
    }

    pub fn subscribe_bars(&mut self, bar_type: BarType) {
        self.bar_subscriptions.insert(bar_type);
    }

    pub fn unsubscribe_bars(&mut self, bar_type: &BarType) {
        self.bar_subscriptions.remove(bar_type);
    }

    pub fn subscribe_quote_ticks(&mut self, instrument_id: InstrumentId) {
        self.quote_subscriptions.insert(instrument_id);
    }

    pub fn unsubscribe_quote_ticks(&mut self, instrument_id: &InstrumentId) {
        self.quote_subscriptions.remove(instrument_id);
    }

    pub fn subscribe_trade_ticks(&mut self, instrument_id: InstrumentId) {
        self.trade_subscriptions.insert(instrument_id);
    }

    pub fn unsubscribe_trade_ticks(&mut self, instrument_id: &InstrumentId) {
        self.trade_subscriptions.remove(instrument_id);
    }

    pub fn is_subscribed_to_bars(&self, bar_type: &BarType) -> bool {
        self.bar_subscriptions.contains(bar_type)
    }

    pub fn process_bar(&self, bar: Bar, cache: &mut Cache, bus: &mut MessageBus) {
        cache.add_bar(bar.clone());
        let topic = format!("data.bars.{}", bar.bar_type);
        bus.publish(&topic, &BusMessage::Data(MarketData::Bar(bar)));
    }

    pub fn process_quote_tick(&self, tick: QuoteTick, cache: &mut Cache, bus: &mut MessageBus) {
        cache.add_quote_tick(tick.clone());
        let topic = format!("data.quotes.{}", tick.instrument_id);
        bus.publish(&topic, &BusMessage::Data(MarketData::Quote(tick)));
    }

    pub fn process_trade_tick(&self, tick: TradeTick, cache: &mut Cache, bus: &mut MessageBus) {
        cache.add_trade_tick(tick.clone());
        let topic = format!("data.trades.{}", tick.instrument_id);
        bus.publish(&topic, &BusMessage::Data(MarketData::Trade(tick)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use vela_core::enums::{BarAggregation, PriceType};
    use vela_core::ids::{Symbol, VenueId};
    use vela_core::market_data::BarSpecification;
    use vela_core::money::{Price, Quantity};

    fn instrument_id() -> InstrumentId {
        InstrumentId::new(Symbol::new("AAPL").unwrap(), VenueId::new("NASDAQ").unwrap())
    }

    fn bar_type() -> BarType {
        BarType {
            instrument_id: instrument_id(),
            spec: BarSpecification { step: 1, aggregation: BarAggregation::Minute, price_type: PriceType::Last },
        }
    }

    fn sample_bar() -> Bar {
        Bar {
            bar_type: bar_type(),
            open: Price::parse("100", 2).unwrap(),
            high: Price::parse("101", 2).unwrap(),
            low: Price::parse("99", 2).unwrap(),
            close: Price::parse("100.5", 2).unwrap(),
            volume: Quantity::parse("1000", 0).unwrap(),
            ts_event: 1,
        }
    }

    #[test]
    fn process_bar_writes_cache_and_publishes_to_topic() {
        let mut engine = DataEngine::new();
        engine.subscribe_bars(bar_type());
        let mut cache = Cache::new();
        let mut bus = MessageBus::new();

        let received = Rc::new(RefCell::new(Vec::new()));
        let r = received.clone();
        let topic = format!("data.bars.{}", bar_type());
        bus.subscribe(topic, "strategy-a", Box::new(move |msg: &BusMessage| {
            if let BusMessage::Data(MarketData::Bar(b)) = msg {
                r.borrow_mut().push(b.close);
            }
        }));

        engine.process_bar(sample_bar(), &mut cache, &mut bus);

        assert_eq!(cache.bars(&bar_type()).len(), 1);
        assert_eq!(received.borrow().len(), 1);
        assert_eq!(received.borrow()[0].to_string(), "100.50");
    }

    #[test]
    fn subscription_registry_tracks_membership() {
        let mut engine = DataEngine::new();
        assert!(!engine.is_subscribed_to_bars(&bar_type()));
        engine.subscribe_bars(bar_type());
        assert!(engine.is_subscribed_to_bars(&bar_type()));
        engine.unsubscribe_bars(&bar_type());
        assert!(!engine.is_subscribed_to_bars(&bar_type()));
    }
}
