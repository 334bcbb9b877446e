//! Record types and tables of the per-exchange history store

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::define_table;
use crate::types::{FundId, OrderId, OrderKind, PairKey, Symbol, TradeKind};

/// Bookkeeping for an order we believe is live on the venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveOrderRecord {
    pub order_id: OrderId,
    pub fund: FundId,
    /// Which component created the order ("lifecycle", "reconciler")
    pub creator: String,
}

/// Static attributes of a completed (or completing) order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedOrderRecord {
    pub order_id: OrderId,
    pub fund: FundId,
    pub pair: PairKey,
    pub kind: OrderKind,
    pub trade: TradeKind,
}

/// One persisted fill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillRecord {
    pub fill_id: String,
    pub order_id: OrderId,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
    pub commission_coin: Symbol,
    pub commission: Decimal,
    pub executed_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
}

define_table!(LiveOrderTable, String, LiveOrderRecord, 0x01);
define_table!(CompletedOrderTable, String, CompletedOrderRecord, 0x02);
// Keyed "<order id>/<fill id>" so fills scan as a prefix of their order.
define_table!(FillTable, String, FillRecord, 0x03);
