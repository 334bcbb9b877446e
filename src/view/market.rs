//! Coins and trade pairs
//!
//! Both are created lazily the first time a symbol or market is referenced
//! by pairs, balances or orders, and are never removed afterwards; other
//! entities hold long-lived references to their keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ExchangeId, PairKey, Symbol};

/// A currency symbol scoped to exactly one exchange. A virtual
/// cross-exchange pseudo-exchange may reference coins of two real exchanges
/// to represent a transfer pair; each such coin still belongs to its own
/// real exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coin {
    pub symbol: Symbol,
    pub exchange: ExchangeId,
    pub created: DateTime<Utc>,
}

impl Coin {
    pub fn new(symbol: Symbol, exchange: ExchangeId, created: DateTime<Utc>) -> Self {
        Self {
            symbol,
            exchange,
            created,
        }
    }
}

/// A market between two coins on one exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePair {
    pub key: PairKey,
    pub created: DateTime<Utc>,
}

impl TradePair {
    pub fn new(key: PairKey, created: DateTime<Utc>) -> Self {
        Self { key, created }
    }
}
