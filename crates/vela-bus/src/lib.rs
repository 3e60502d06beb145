//! Synchronous topic pub/sub plus point-to-point endpoints.
//!
//! Grounded on `original_source/nautilus_core/msgbus.py`'s `MessageBus`
//! (`subscribe`/`unsubscribe`/`publish`, `register`/`deregister`/`send`).
//! The original dedups subscriptions by Python function identity; Rust
//! closures have no such identity, so a subscription here is keyed by a
//! caller-supplied `subscriber_id` instead — resubscribing the same id to
//! the same topic replaces the handler rather than adding a second one.
//! Per spec.md §9's note to "avoid a single any payload on the hot path",
//! the bus carries the closed [`BusMessage`] union rather than a
//! downcasted `Any`.

use std::collections::HashMap;

use vela_core::events::{OrderEvent, PositionEvent};
use vela_core::market_data::MarketData;

#[derive(Debug, Clone)]
pub enum BusMessage {
    Data(MarketData),
    Order(OrderEvent),
    Position(PositionEvent),
}

type Handler = Box<dyn FnMut(&BusMessage)>;

#[derive(Default)]
pub struct MessageBus {
    subscriptions: HashMap<String, Vec<(String, Handler)>>,
    endpoints: HashMap<String, Handler>,
}

impl MessageBus {
    pub fn new() -> Self {
        MessageBus { subscriptions: HashMap::new(), endpoints: HashMap::new() }
    }

    /// Subscribe `subscriber_id` to `topic`. Resubscribing the same id to
    /// the same topic replaces its handler rather than registering a
    /// second one.
    pub fn subscribe(&mut self, topic: impl Into<String>, subscriber_id: impl Into<String>, handler: Handler) {
        let topic = topic.into();
        let subscriber_id = subscriber_id.into();
        let subs = self.subscriptions.entry(topic).or_default();
        if let Some(existing) = subs.iter_mut().find(|(id, _)| *id == subscriber_id) {
            existing.1 = handler;
        } else {
            subs.push((subscriber_id, handler));
        }
    }

    pub fn unsubscribe(&mut self, topic: &str, subscriber_id: &str) {
        if let Some(subs) = self.subscriptions.get_mut(topic) {
            subs.retain(|(id, _)| id != subscriber_id);
        }
    }

    /// Invoke every handler subscribed to `topic`, in subscription order.
    pub fn publish(&mut self, topic: &str, msg: &BusMessage) {
        if let Some(subs) = self.subscriptions.get_mut(topic) {
            for (_, handler) in subs.iter_mut() {
                handler(msg);
            }
        }
    }

    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.subscriptions.get(topic).is_some_and(|subs| !subs.is_empty())
    }

    pub fn subscriber_ids(&self, topic: &str) -> Vec<&str> {
        self.subscriptions
            .get(topic)
            .map(|subs| subs.iter().map(|(id, _)| id.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<&str> {
        self.subscriptions
            .iter()
            .filter(|(_, subs)| !subs.is_empty())
            .map(|(topic, _)| topic.as_str())
            .collect()
    }

    pub fn register(&mut self, endpoint: impl Into<String>, handler: Handler) {
        self.endpoints.insert(endpoint.into(), handler);
    }

    pub fn deregister(&mut self, endpoint: &str) {
        self.endpoints.remove(endpoint);
    }

    pub fn send(&mut self, endpoint: &str, msg: &BusMessage) {
        if let Some(handler) = self.endpoints.get_mut(endpoint) {
            handler(msg);
        }
    }

    pub fn endpoints(&self) -> Vec<&str> {
        self.endpoints.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use vela_core::enums::{BarAggregation, PriceType};
    use vela_core::ids::{InstrumentId, Symbol, VenueId};
    use vela_core::market_data::{Bar, BarSpecification, BarType};

    fn sample_bar_message() -> BusMessage {
        let instrument_id = InstrumentId::new(Symbol::new("AAPL").unwrap(), VenueId::new("NASDAQ").unwrap());
        let spec = BarSpecification { step: 1, aggregation: BarAggregation::Minute, price_type: PriceType::Last };
        let bar_type = BarType { instrument_id, spec };
        let bar = Bar {
            bar_type,
            open: vela_core::Price::parse("100", 0).unwrap(),
            high: vela_core::Price::parse("101", 0).unwrap(),
            low: vela_core::Price::parse("99", 0).unwrap(),
            close: vela_core::Price::parse("100", 0).unwrap(),
            volume: vela_core::Quantity::parse("10", 0).unwrap(),
            ts_event: 0,
        };
        BusMessage::Data(MarketData::Bar(bar))
    }

    #[test]
    fn publish_invokes_subscribers_in_order() {
        let mut bus = MessageBus::new();
        let calls = Rc::new(RefCell::new(Vec::new()));

        let calls_a = calls.clone();
        bus.subscribe("data.bars.x", "strategy-a", Box::new(move |_| calls_a.borrow_mut().push("a")));
        let calls_b = calls.clone();
        bus.subscribe("data.bars.x", "strategy-b", Box::new(move |_| calls_b.borrow_mut().push("b")));

        bus.publish("data.bars.x", &sample_bar_message());
        assert_eq!(*calls.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn resubscribing_same_id_replaces_handler() {
        let mut bus = MessageBus::new();
        let calls = Rc::new(RefCell::new(0));

        let c1 = calls.clone();
        bus.subscribe("topic", "sub-1", Box::new(move |_| *c1.borrow_mut() += 1));
        let c2 = calls.clone();
        bus.subscribe("topic", "sub-1", Box::new(move |_| *c2.borrow_mut() += 10));

        bus.publish("topic", &sample_bar_message());
        assert_eq!(*calls.borrow(), 10);
        assert_eq!(bus.subscriber_ids("topic").len(), 1);
    }

    #[test]
    fn unsubscribe_removes_handler() {
        let mut bus = MessageBus::new();
        let calls = Rc::new(RefCell::new(0));
        let c = calls.clone();
        bus.subscribe("topic", "sub-1", Box::new(move |_| *c.borrow_mut() += 1));
        bus.unsubscribe("topic", "sub-1");
        bus.publish("topic", &sample_bar_message());
        assert_eq!(*calls.borrow(), 0);
        assert!(!bus.has_subscribers("topic"));
    }

    #[test]
    fn endpoint_send_invokes_registered_handler_only() {
        let mut bus = MessageBus::new();
        let calls = Rc::new(RefCell::new(0));
        let c = calls.clone();
        bus.register("exec-engine", Box::new(move |_| *c.borrow_mut() += 1));
        bus.send("exec-engine", &sample_bar_message());
        bus.send("unknown-endpoint", &sample_bar_message());
        assert_eq!(*calls.borrow(), 1);
    }
}
