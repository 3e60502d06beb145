//! Order, position, and account events.
//!
//! Grounded on `original_source/nautilus_core/events.py`. The original
//! stamps every event with `uuid.uuid4()`; this workspace cannot do that
//! and stay deterministic (two runs over identical input must produce
//! byte-identical output per the concurrency model), so `event_id` here is
//! a caller-supplied deterministic string built from a monotonic counter
//! instead (`"EVT-{n}"`), matching the counter-id convention the original
//! already uses for venue/trade/position ids elsewhere.

use serde::Serialize;

use crate::enums::{LiquiditySide, OrderSide, OrderStatus, OrderType, PositionSide};
use crate::ids::{AccountId, ClientOrderId, InstrumentId, PositionId, StrategyId, TradeId, TraderId, VenueOrderId};
use crate::money::{AccountBalance, Money, Price, Quantity};

#[derive(Debug, Clone, Serialize)]
pub struct EventMeta {
    pub event_id: String,
    pub ts_event: i64,
}

#[derive(Debug, Clone)]
pub enum OrderEvent {
    Initialized { meta: EventMeta, client_order_id: ClientOrderId, order_type: OrderType },
    Denied { meta: EventMeta, client_order_id: ClientOrderId, reason: String },
    Submitted { meta: EventMeta, client_order_id: ClientOrderId },
    Accepted { meta: EventMeta, client_order_id: ClientOrderId, venue_order_id: VenueOrderId },
    Rejected { meta: EventMeta, client_order_id: ClientOrderId, reason: String },
    Canceled { meta: EventMeta, client_order_id: ClientOrderId },
    Expired { meta: EventMeta, client_order_id: ClientOrderId },
    Triggered { meta: EventMeta, client_order_id: ClientOrderId },
    PendingUpdate { meta: EventMeta, client_order_id: ClientOrderId },
    PendingCancel { meta: EventMeta, client_order_id: ClientOrderId },
    Updated { meta: EventMeta, client_order_id: ClientOrderId, quantity: Quantity, price: Option<Price> },
    Filled {
        meta: EventMeta,
        client_order_id: ClientOrderId,
        venue_order_id: VenueOrderId,
        trade_id: TradeId,
        position_id: Option<PositionId>,
        instrument_id: InstrumentId,
        side: OrderSide,
        last_qty: Quantity,
        last_px: Price,
        commission: Money,
        liquidity_side: LiquiditySide,
    },
}

impl OrderEvent {
    pub fn meta(&self) -> &EventMeta {
        match self {
            OrderEvent::Initialized { meta, .. }
            | OrderEvent::Denied { meta, .. }
            | OrderEvent::Submitted { meta, .. }
            | OrderEvent::Accepted { meta, .. }
            | OrderEvent::Rejected { meta, .. }
            | OrderEvent::Canceled { meta, .. }
            | OrderEvent::Expired { meta, .. }
            | OrderEvent::Triggered { meta, .. }
            | OrderEvent::PendingUpdate { meta, .. }
            | OrderEvent::PendingCancel { meta, .. }
            | OrderEvent::Updated { meta, .. }
            | OrderEvent::Filled { meta, .. } => meta,
        }
    }

    pub fn client_order_id(&self) -> &ClientOrderId {
        match self {
            OrderEvent::Initialized { client_order_id, .. }
            | OrderEvent::Denied { client_order_id, .. }
            | OrderEvent::Submitted { client_order_id, .. }
            | OrderEvent::Accepted { client_order_id, .. }
            | OrderEvent::Rejected { client_order_id, .. }
            | OrderEvent::Canceled { client_order_id, .. }
            | OrderEvent::Expired { client_order_id, .. }
            | OrderEvent::Triggered { client_order_id, .. }
            | OrderEvent::PendingUpdate { client_order_id, .. }
            | OrderEvent::PendingCancel { client_order_id, .. }
            | OrderEvent::Updated { client_order_id, .. }
            | OrderEvent::Filled { client_order_id, .. } => client_order_id,
        }
    }

    /// Variant name, used in transition-error messages.
    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Initialized { .. } => "OrderInitialized",
            OrderEvent::Denied { .. } => "OrderDenied",
            OrderEvent::Submitted { .. } => "OrderSubmitted",
            OrderEvent::Accepted { .. } => "OrderAccepted",
            OrderEvent::Rejected { .. } => "OrderRejected",
            OrderEvent::Canceled { .. } => "OrderCanceled",
            OrderEvent::Expired { .. } => "OrderExpired",
            OrderEvent::Triggered { .. } => "OrderTriggered",
            OrderEvent::PendingUpdate { .. } => "OrderPendingUpdate",
            OrderEvent::PendingCancel { .. } => "OrderPendingCancel",
            OrderEvent::Updated { .. } => "OrderUpdated",
            OrderEvent::Filled { .. } => "OrderFilled",
        }
    }

    /// The `OrderStatus` this event drives the order toward, used by the
    /// state machine's transition table in `vela-oms`.
    pub fn target_status(&self) -> OrderStatus {
        match self {
            OrderEvent::Initialized { .. } => OrderStatus::Initialized,
            OrderEvent::Denied { .. } => OrderStatus::Denied,
            OrderEvent::Submitted { .. } => OrderStatus::Submitted,
            OrderEvent::Accepted { .. } => OrderStatus::Accepted,
            OrderEvent::Rejected { .. } => OrderStatus::Rejected,
            OrderEvent::Canceled { .. } => OrderStatus::Canceled,
            OrderEvent::Expired { .. } => OrderStatus::Expired,
            OrderEvent::Triggered { .. } => OrderStatus::Triggered,
            OrderEvent::PendingUpdate { .. } => OrderStatus::PendingUpdate,
            OrderEvent::PendingCancel { .. } => OrderStatus::PendingCancel,
            OrderEvent::Updated { .. } => OrderStatus::Accepted,
            OrderEvent::Filled { .. } => OrderStatus::Filled,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PositionEvent {
    Opened {
        meta: EventMeta,
        position_id: PositionId,
        instrument_id: InstrumentId,
        strategy_id: StrategyId,
        side: PositionSide,
        signed_qty: Quantity,
        avg_px_open: Price,
    },
    Changed {
        meta: EventMeta,
        position_id: PositionId,
        side: PositionSide,
        signed_qty: Quantity,
        avg_px_open: Price,
        realized_pnl: Money,
    },
    Closed {
        meta: EventMeta,
        position_id: PositionId,
        realized_pnl: Money,
    },
}

impl PositionEvent {
    pub fn position_id(&self) -> &PositionId {
        match self {
            PositionEvent::Opened { position_id, .. }
            | PositionEvent::Changed { position_id, .. }
            | PositionEvent::Closed { position_id, .. } => position_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccountStateEvent {
    pub meta: EventMeta,
    pub account_id: AccountId,
    pub trader_id: TraderId,
    pub balances: Vec<AccountBalance>,
}
