//! Per-coin balance with its fund partition breakdown

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{FundId, Symbol};

/// Venue-reported balance for one coin plus the local split across funds.
///
/// Invariant: the partition amounts always sum to `total`. `assign` keeps
/// the invariant by routing unattributed venue-side deltas to the main
/// fund; `change_fund_balance` keeps it by moving `total` together with the
/// partition it adjusts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub coin: Symbol,
    /// Venue-reported total for this coin
    pub total: Decimal,
    /// Amount the venue reports as held by resting orders
    pub held: Decimal,
    /// Timestamp of the venue snapshot this balance reflects
    pub updated: DateTime<Utc>,
    /// Breakdown across funds; sums to `total`
    pub funds: HashMap<FundId, Decimal>,
}

impl Balance {
    pub fn new(coin: Symbol) -> Self {
        Self {
            coin,
            total: Decimal::ZERO,
            held: Decimal::ZERO,
            updated: DateTime::<Utc>::MIN_UTC,
            funds: HashMap::new(),
        }
    }

    /// Sum of all fund partitions
    pub fn partition_sum(&self) -> Decimal {
        self.funds.values().copied().sum()
    }

    /// Partition amount for one fund (zero if the fund has no entry)
    pub fn fund_amount(&self, fund: &FundId) -> Decimal {
        self.funds.get(fund).copied().unwrap_or(Decimal::ZERO)
    }

    /// Merge a venue-reported (total, held, timestamp). Returns false and
    /// mutates nothing when the report is not newer than what we hold
    /// (last-writer-wins by timestamp, not by arrival order).
    pub fn assign(&mut self, total: Decimal, held: Decimal, timestamp: DateTime<Utc>) -> bool {
        if timestamp <= self.updated {
            return false;
        }
        let delta = total - self.partition_sum();
        if !delta.is_zero() {
            *self.funds.entry(FundId::main()).or_insert(Decimal::ZERO) += delta;
        }
        self.total = total;
        self.held = held;
        self.updated = timestamp;
        true
    }
}
