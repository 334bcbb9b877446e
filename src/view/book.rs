//! Cached order-book snapshot per pair
//!
//! Read by the writer task when placing orders, replaced wholesale by the
//! market-data poll, and optimistically consumed after a local trade so the
//! book does not advertise liquidity we just took (the remote book will not
//! reflect the trade until the next poll).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::TradeKind;

/// One aggregated price level: price and base-denominated size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// A venue-reported book snapshot, as fetched
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub taken_at: DateTime<Utc>,
}

/// The locally cached book for one pair
#[derive(Debug, Clone, Default)]
pub struct BookCache {
    /// Price -> base size; iterate in reverse for best bid
    bids: BTreeMap<Decimal, Decimal>,
    /// Price -> base size; iterate forward for best ask
    asks: BTreeMap<Decimal, Decimal>,
    updated: DateTime<Utc>,
}

impl BookCache {
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            updated: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// Replace the cache with a fresh venue snapshot
    pub fn replace(&mut self, snapshot: &BookSnapshot) {
        self.bids = snapshot
            .bids
            .iter()
            .map(|level| (level.price, level.size))
            .collect();
        self.asks = snapshot
            .asks
            .iter()
            .map(|level| (level.price, level.size))
            .collect();
        self.updated = snapshot.taken_at;
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next_back()
            .map(|(p, s)| PriceLevel::new(*p, *s))
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.iter().next().map(|(p, s)| PriceLevel::new(*p, *s))
    }

    pub fn bid_levels(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_levels(&self) -> usize {
        self.asks.len()
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.updated
    }

    /// Export the cached depth, best levels first.
    pub fn snapshot(&self) -> BookSnapshot {
        BookSnapshot {
            bids: self
                .bids
                .iter()
                .rev()
                .map(|(p, s)| PriceLevel::new(*p, *s))
                .collect(),
            asks: self
                .asks
                .iter()
                .map(|(p, s)| PriceLevel::new(*p, *s))
                .collect(),
            taken_at: self.updated,
        }
    }

    /// Remove matched liquidity after a local trade: `base` base units
    /// executed at `price`. A quote-to-base trade took from the asks, a
    /// base-to-quote trade from the bids.
    pub fn consume(&mut self, trade: TradeKind, price: Decimal, base: Decimal) {
        let side = match trade {
            TradeKind::QuoteToBase => &mut self.asks,
            TradeKind::BaseToQuote => &mut self.bids,
        };
        if let Some(size) = side.get_mut(&price) {
            *size -= base;
            if *size <= Decimal::ZERO {
                side.remove(&price);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot() -> BookSnapshot {
        BookSnapshot {
            bids: vec![
                PriceLevel::new(dec!(99), dec!(2)),
                PriceLevel::new(dec!(98), dec!(5)),
            ],
            asks: vec![
                PriceLevel::new(dec!(101), dec!(1)),
                PriceLevel::new(dec!(102), dec!(4)),
            ],
            taken_at: Utc::now(),
        }
    }

    #[test]
    fn best_levels_after_replace() {
        let mut book = BookCache::new();
        book.replace(&snapshot());
        assert_eq!(book.best_bid().unwrap().price, dec!(99));
        assert_eq!(book.best_ask().unwrap().price, dec!(101));
    }

    #[test]
    fn consume_shrinks_and_removes_levels() {
        let mut book = BookCache::new();
        book.replace(&snapshot());

        // Partial take from the asks.
        book.consume(TradeKind::QuoteToBase, dec!(102), dec!(1));
        assert_eq!(book.asks.get(&dec!(102)), Some(&dec!(3)));

        // Full take removes the level.
        book.consume(TradeKind::QuoteToBase, dec!(101), dec!(1));
        assert_eq!(book.best_ask().unwrap().price, dec!(102));

        // Bids untouched.
        assert_eq!(book.bid_levels(), 2);
    }
}
