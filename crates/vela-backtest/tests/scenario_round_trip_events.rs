//! Opens a position on bar 1, closes it on bar 3, and checks that the
//! strategy actually observes `on_order_filled`/`on_position_opened`/
//! `on_position_closed` — exercising the driver's deferred event-buffer
//! drain rather than just the resulting report numbers.

use std::cell::RefCell;
use std::rc::Rc;

use vela_backtest::{BacktestConfig, BacktestDriver};
use vela_core::enums::{AccountType, AssetClass, BarAggregation, OmsType, OrderSide, PriceType};
use vela_core::events::{OrderEvent, PositionEvent};
use vela_core::ids::{InstrumentId, StrategyId, Symbol, VenueId};
use vela_core::instrument::Instrument;
use vela_core::market_data::{Bar, BarSpecification, BarType, MarketData};
use vela_core::money::{Price, Quantity};
use vela_core::{Currency, Decimal};
use vela_strategy::{Commands, Strategy, Subscriptions};

fn instrument_id() -> InstrumentId {
    InstrumentId::new(Symbol::new("AAPL").unwrap(), VenueId::new("NASDAQ").unwrap())
}

fn bar_type() -> BarType {
    BarType {
        instrument_id: instrument_id(),
        spec: BarSpecification { step: 1, aggregation: BarAggregation::Minute, price_type: PriceType::Last },
    }
}

fn bar(open: &str, ts_event: i64) -> Bar {
    let px = Price::parse(open, 2).unwrap();
    Bar { bar_type: bar_type(), open: px, high: px, low: px, close: px, volume: Quantity::parse("1000", 0).unwrap(), ts_event }
}

/// Buys on bar 1, sells the whole position on bar 3, recording every
/// fill/position event it is handed along the way.
struct RoundTripper {
    id: StrategyId,
    bar_count: u32,
    fills_seen: Rc<RefCell<Vec<&'static str>>>,
    positions_seen: Rc<RefCell<Vec<&'static str>>>,
}

impl Strategy for RoundTripper {
    fn id(&self) -> &StrategyId {
        &self.id
    }

    fn on_start(&mut self, subscriptions: &mut Subscriptions) {
        subscriptions.subscribe_bars(bar_type());
    }

    fn on_bar(&mut self, bar: &Bar, commands: &mut Commands) {
        self.bar_count += 1;
        if self.bar_count == 1 {
            let order = commands
                .order_factory
                .market(bar.bar_type.instrument_id.clone(), OrderSide::Buy, Quantity::parse("10", 0).unwrap(), bar.ts_event)
                .unwrap();
            commands.submit_order(order, None, Decimal::zero(0));
        } else if self.bar_count == 3 {
            let order = commands
                .order_factory
                .market(bar.bar_type.instrument_id.clone(), OrderSide::Sell, Quantity::parse("10", 0).unwrap(), bar.ts_event)
                .unwrap();
            commands.submit_order(order, None, Decimal::parse("10", 0).unwrap());
        }
    }

    fn on_order_filled(&mut self, _event: &OrderEvent) {
        self.fills_seen.borrow_mut().push("filled");
    }

    fn on_position_opened(&mut self, _event: &PositionEvent) {
        self.positions_seen.borrow_mut().push("opened");
    }

    fn on_position_closed(&mut self, _event: &PositionEvent) {
        self.positions_seen.borrow_mut().push("closed");
    }
}

#[test]
fn strategy_observes_deferred_fill_and_position_events() {
    let mut driver = BacktestDriver::new(BacktestConfig::test_defaults());
    driver.add_venue(
        VenueId::new("NASDAQ").unwrap(),
        OmsType::Netting,
        AccountType::Cash,
        Currency::usd(),
        Decimal::parse("1000000", 2).unwrap(),
    );
    driver
        .add_instrument(Instrument {
            instrument_id: instrument_id(),
            asset_class: AssetClass::Equity,
            quote_currency: Currency::usd(),
            price_precision: 2,
            size_precision: 0,
            min_quantity: None,
            max_quantity: None,
            taker_fee: Decimal::zero(4),
            maker_fee: Decimal::zero(4),
            leverage: Decimal::parse("1", 0).unwrap(),
        })
        .unwrap();

    let opens = ["100.00", "101.00", "102.00", "103.00", "104.00"];
    for (i, open) in opens.iter().enumerate() {
        driver.add_data(MarketData::Bar(bar(open, (i as i64 + 1) * 60_000_000_000)));
    }

    let fills_seen = Rc::new(RefCell::new(Vec::new()));
    let positions_seen = Rc::new(RefCell::new(Vec::new()));
    driver.add_strategy(Box::new(RoundTripper {
        id: StrategyId::new("S-1").unwrap(),
        bar_count: 0,
        fills_seen: fills_seen.clone(),
        positions_seen: positions_seen.clone(),
    }));

    let report = driver.run(None, None).unwrap();
    assert_eq!(report.total_orders, 2);
    assert_eq!(report.total_fills, 2);
    assert_eq!(*fills_seen.borrow(), vec!["filled", "filled"]);
    assert_eq!(*positions_seen.borrow(), vec!["opened", "closed"]);
}
