//! Completed-order history: one record per order id, fills keyed by fill id

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{FundId, OrderId, OrderKind, PairKey, TradeKind};

/// One partial or complete execution of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: String,
    /// Input spent, in the order's input coin
    pub amount_in: Decimal,
    /// Output received, in the order's output coin (gross of commission)
    pub amount_out: Decimal,
    pub commission_coin: crate::types::Symbol,
    pub commission: Decimal,
    pub executed_at: DateTime<Utc>,
    /// Whether this fill's effect has been booked into the fund partitions.
    /// Both the immediate-fill path and the reconciliation path funnel
    /// through this flag, so a fill is applied exactly once.
    pub applied: bool,
}

/// Immutable historical record of the fills belonging to one order id.
/// Created once, mutated only by appending fills (idempotent by fill id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCompleted {
    pub order_id: OrderId,
    pub fund: FundId,
    pub pair: PairKey,
    pub kind: OrderKind,
    pub trade: TradeKind,
    pub created: DateTime<Utc>,
    pub fills: BTreeMap<String, Fill>,
}

impl OrderCompleted {
    pub fn new(
        order_id: OrderId,
        fund: FundId,
        pair: PairKey,
        kind: OrderKind,
        trade: TradeKind,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            fund,
            pair,
            kind,
            trade,
            created,
            fills: BTreeMap::new(),
        }
    }

    /// Append a fill. A fill id seen before leaves the existing record
    /// (and its `applied` flag) untouched. Returns true if the fill was new.
    pub fn upsert_fill(&mut self, fill: Fill) -> bool {
        if self.fills.contains_key(&fill.fill_id) {
            return false;
        }
        self.fills.insert(fill.fill_id.clone(), fill);
        true
    }

    pub fn total_in(&self) -> Decimal {
        self.fills.values().map(|f| f.amount_in).sum()
    }

    pub fn total_out(&self) -> Decimal {
        self.fills.values().map(|f| f.amount_out).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(id: &str, amount_in: Decimal) -> Fill {
        Fill {
            fill_id: id.to_string(),
            amount_in,
            amount_out: dec!(1),
            commission_coin: "USD".into(),
            commission: Decimal::ZERO,
            executed_at: Utc::now(),
            applied: false,
        }
    }

    #[test]
    fn upsert_fill_is_idempotent_by_fill_id() {
        let pair = PairKey::new("kraken", "BTC", "USD");
        let mut completed = OrderCompleted::new(
            "42".into(),
            FundId::main(),
            pair,
            OrderKind::Limit,
            TradeKind::QuoteToBase,
            Utc::now(),
        );

        assert!(completed.upsert_fill(fill("t1", dec!(100))));
        completed.fills.get_mut("t1").unwrap().applied = true;

        // Re-reported by a later history poll: ignored, applied flag kept.
        assert!(!completed.upsert_fill(fill("t1", dec!(100))));
        assert!(completed.fills["t1"].applied);

        assert!(completed.upsert_fill(fill("t2", dec!(50))));
        assert_eq!(completed.total_in(), dec!(150));
    }
}
