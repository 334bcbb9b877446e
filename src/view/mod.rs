//! MarketView: the per-exchange local model
//!
//! One instance each of coins, pairs, balances, live orders, history and
//! transfers, plus the cached order books. Mutated only by the single
//! writer task; every container is timestamped and carries a wait/notify
//! primitive for consumers that block until fresh data arrives.

pub mod balance;
pub mod book;
pub mod collection;
pub mod history;
pub mod market;
pub mod order;
pub mod transfer;

pub use balance::Balance;
pub use book::{BookCache, BookSnapshot, PriceLevel};
pub use collection::VersionedMap;
pub use history::{Fill, OrderCompleted};
pub use market::{Coin, TradePair};
pub use order::Order;
pub use transfer::Transfer;

use chrono::Utc;
use std::collections::HashMap;

use crate::types::{ExchangeId, OrderId, PairKey, Symbol};

pub struct MarketView {
    pub exchange: ExchangeId,
    pub coins: VersionedMap<Symbol, Coin>,
    pub pairs: VersionedMap<PairKey, TradePair>,
    pub balances: VersionedMap<Symbol, Balance>,
    pub orders: VersionedMap<OrderId, Order>,
    pub history: VersionedMap<OrderId, OrderCompleted>,
    pub transfers: VersionedMap<String, Transfer>,
    pub books: HashMap<PairKey, BookCache>,
}

impl MarketView {
    pub fn new(exchange: ExchangeId) -> Self {
        Self {
            exchange,
            coins: VersionedMap::new(),
            pairs: VersionedMap::new(),
            balances: VersionedMap::new(),
            orders: VersionedMap::new(),
            history: VersionedMap::new(),
            transfers: VersionedMap::new(),
            books: HashMap::new(),
        }
    }

    /// Lazily create a coin the first time its symbol is referenced.
    pub fn ensure_coin(&mut self, symbol: &Symbol) {
        if !self.coins.contains(symbol) {
            let coin = Coin::new(symbol.clone(), self.exchange.clone(), Utc::now());
            self.coins.insert(symbol.clone(), coin);
            self.coins.touch(Utc::now());
        }
    }

    /// Lazily create a pair (and its coins) the first time it is referenced.
    pub fn ensure_pair(&mut self, key: &PairKey) {
        self.ensure_coin(&key.base);
        self.ensure_coin(&key.quote);
        if !self.pairs.contains(key) {
            self.pairs
                .insert(key.clone(), TradePair::new(key.clone(), Utc::now()));
            self.pairs.touch(Utc::now());
        }
    }

    pub fn book_mut(&mut self, pair: &PairKey) -> &mut BookCache {
        self.books.entry(pair.clone()).or_default()
    }
}
