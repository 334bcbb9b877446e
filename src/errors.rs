//! Error kinds surfaced by the core
//!
//! Validation failures are rejected before any venue call and are fully
//! recoverable by the caller. Venue failures are recovered per update
//! category inside the scheduler and never cross the background/writer
//! boundary. Consistency failures indicate a broken invariant and are
//! logged loud rather than handled.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{FundId, OrderId, PairKey, Symbol};

/// Failure talking to a venue. Produced by `VenueApi` implementations.
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("venue returned HTTP status {0}")]
    Status(u16),
    #[error("request rate limit exceeded")]
    RateLimited,
    #[error("venue rejected credentials (forbidden)")]
    Forbidden,
    #[error("venue temporarily unavailable")]
    Unavailable,
    #[error("request cancelled")]
    Cancelled,
}

/// Fund/balance bookkeeping failure. `Consistency` is fatal by design:
/// it means the partition-sum invariant no longer holds.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("fund partitions for {coin} sum to {sum} but the exchange total is {total}")]
    Consistency {
        coin: Symbol,
        sum: Decimal,
        total: Decimal,
    },
}

/// Order placement / cancellation failure, surfaced synchronously to the
/// caller.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("pair {0} does not belong to this exchange")]
    WrongExchange(PairKey),
    #[error("unknown pair {0}")]
    UnknownPair(PairKey),
    #[error("fund {fund} has {available} {coin} available, needs {needed}")]
    InsufficientBalance {
        fund: FundId,
        coin: Symbol,
        available: Decimal,
        needed: Decimal,
    },
    #[error("trading is globally disabled")]
    TradingDisabled,
    #[error("order creation re-entered while a placement is in flight")]
    Reentrant,
    #[error("order {0} is not known")]
    UnknownOrder(OrderId),
    #[error(transparent)]
    Venue(#[from] VenueError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("exchange service has stopped")]
    ServiceStopped,
}

impl OrderError {
    /// True for failures rejected before any venue call was made.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            OrderError::InvalidAmount(_)
                | OrderError::WrongExchange(_)
                | OrderError::UnknownPair(_)
                | OrderError::InsufficientBalance { .. }
                | OrderError::TradingDisabled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn validation_classification() {
        let err = OrderError::InsufficientBalance {
            fund: "main".into(),
            coin: "BTC".into(),
            available: dec!(0.5),
            needed: dec!(1),
        };
        assert!(err.is_validation());
        assert!(!OrderError::Venue(VenueError::RateLimited).is_validation());
        assert!(!OrderError::Reentrant.is_validation());
    }
}
