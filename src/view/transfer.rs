//! Deposit / withdrawal records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferKind {
    Deposit,
    Withdrawal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed,
}

/// One deposit or withdrawal, append/update-only by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub id: String,
    pub coin: Symbol,
    pub amount: Decimal,
    pub kind: TransferKind,
    pub status: TransferStatus,
    pub timestamp: DateTime<Utc>,
}
