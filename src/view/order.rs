//! Live order records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{FundId, OrderId, OrderKind, PairKey, Symbol, TradeKind};

/// An order currently resting on a venue. Created on submission (or by
/// reconciliation discovering a previously-unknown live order) and removed
/// when no longer live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub fund: FundId,
    pub pair: PairKey,
    pub kind: OrderKind,
    pub trade: TradeKind,
    /// Submitted input amount, in the input coin
    pub amount_in: Decimal,
    /// Expected output amount, in the output coin
    pub amount_out: Decimal,
    /// Unfilled input amount
    pub remaining_in: Decimal,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Order {
    pub fn input_coin(&self) -> &Symbol {
        self.trade.input_coin(&self.pair)
    }

    pub fn output_coin(&self) -> &Symbol {
        self.trade.output_coin(&self.pair)
    }
}
