//! Single instrument, ten bars, one strategy that buys once and holds.
//! A market order submitted while bar N is being processed must not fill
//! until bar N+1's open — this is the core no-lookahead guarantee the
//! rest of the workspace's determinism rests on.

use vela_backtest::{BacktestConfig, BacktestDriver};
use vela_core::enums::{AccountType, AssetClass, BarAggregation, OmsType, OrderSide, PriceType};
use vela_core::ids::{Symbol, VenueId};
use vela_core::instrument::Instrument;
use vela_core::market_data::{Bar, BarSpecification, BarType, MarketData};
use vela_core::money::{Price, Quantity};
use vela_core::{Currency, Decimal};
use vela_strategy::{Commands, Strategy, Subscriptions};

fn instrument_id() -> vela_core::ids::InstrumentId {
    vela_core::ids::InstrumentId::new(Symbol::new("AAPL").unwrap(), VenueId::new("NASDAQ").unwrap())
}

fn bar_type() -> BarType {
    BarType {
        instrument_id: instrument_id(),
        spec: BarSpecification { step: 1, aggregation: BarAggregation::Minute, price_type: PriceType::Last },
    }
}

fn bar(open: &str, ts_event: i64) -> Bar {
    let px = Price::parse(open, 2).unwrap();
    Bar {
        bar_type: bar_type(),
        open: px,
        high: px,
        low: px,
        close: px,
        volume: Quantity::parse("1000", 0).unwrap(),
        ts_event,
    }
}

struct BuyOnce {
    id: vela_core::ids::StrategyId,
    bought: bool,
}

impl Strategy for BuyOnce {
    fn id(&self) -> &vela_core::ids::StrategyId {
        &self.id
    }

    fn on_start(&mut self, subscriptions: &mut Subscriptions) {
        subscriptions.subscribe_bars(bar_type());
    }

    fn on_bar(&mut self, bar: &Bar, commands: &mut Commands) {
        if self.bought {
            return;
        }
        let order = commands
            .order_factory
            .market(bar.bar_type.instrument_id.clone(), OrderSide::Buy, Quantity::parse("100", 0).unwrap(), bar.ts_event)
            .unwrap();
        commands.submit_order(order, None, Decimal::zero(0));
        self.bought = true;
    }
}

#[test]
fn order_submitted_on_bar_one_fills_at_bar_two_open() {
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

    let opens = ["100.00", "100.50", "101.00", "101.50", "102.00", "102.50", "103.00", "103.50", "104.00", "104.50"];
    for (i, open) in opens.iter().enumerate() {
        driver.add_data(MarketData::Bar(bar(open, (i as i64 + 1) * 60_000_000_000)));
    }

    driver.add_strategy(Box::new(BuyOnce { id: vela_core::ids::StrategyId::new("S-1").unwrap(), bought: false }));

    let report = driver.run(None, None).unwrap();
    assert_eq!(report.total_orders, 1);
    assert_eq!(report.total_fills, 1);
    assert_eq!(report.total_positions, 1);
    assert!(report.ending_balance < report.starting_balance);
}
