//! Per-exchange history store
//!
//! Type-safe tables on a single RocksDB instance: live-order bookkeeping,
//! completed-order attributes and individual fills. One store per
//! exchange; reset when switching into or out of simulation mode.

pub mod codec;
pub mod models;
pub mod store;
pub mod table;

pub use models::{CompletedOrderRecord, FillRecord, LiveOrderRecord};
pub use store::{StoreError, TypedStore};

use std::path::Path;

use crate::types::{FundId, OrderId};
use models::{CompletedOrderTable, FillTable, LiveOrderTable};

pub struct HistoryStore {
    store: TypedStore,
}

impl HistoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path.as_ref()).ok();
        Ok(Self {
            store: TypedStore::open(path)?,
        })
    }

    pub fn upsert_live_order(&self, record: &LiveOrderRecord) -> Result<(), StoreError> {
        self.store
            .put::<LiveOrderTable>(&record.order_id.to_string(), record)
    }

    pub fn remove_live_order(&self, order_id: &OrderId) -> Result<(), StoreError> {
        self.store.delete::<LiveOrderTable>(&order_id.to_string())
    }

    pub fn live_order(&self, order_id: &OrderId) -> Result<Option<LiveOrderRecord>, StoreError> {
        self.store.get::<LiveOrderTable>(&order_id.to_string())
    }

    pub fn upsert_completed_order(&self, record: &CompletedOrderRecord) -> Result<(), StoreError> {
        self.store
            .put::<CompletedOrderTable>(&record.order_id.to_string(), record)
    }

    pub fn completed_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<CompletedOrderRecord>, StoreError> {
        self.store.get::<CompletedOrderTable>(&order_id.to_string())
    }

    pub fn upsert_fill(&self, record: &FillRecord) -> Result<(), StoreError> {
        let key = fill_key(&record.order_id, &record.fill_id);
        self.store.put::<FillTable>(&key, record)
    }

    pub fn fills_for_order(&self, order_id: &OrderId) -> Result<Vec<FillRecord>, StoreError> {
        let prefix = format!("{order_id}/");
        Ok(self
            .store
            .scan_prefix::<FillTable>(prefix.as_bytes())?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    /// Which fund owns the given order, checking completed then live
    /// bookkeeping.
    pub fn fund_for_order(&self, order_id: &OrderId) -> Result<Option<FundId>, StoreError> {
        if let Some(completed) = self.completed_order(order_id)? {
            return Ok(Some(completed.fund));
        }
        Ok(self.live_order(order_id)?.map(|record| record.fund))
    }

    /// Drop everything. Called when the owning exchange switches into or
    /// out of simulation mode.
    pub fn reset(&self) -> Result<(), StoreError> {
        self.store.clear()
    }
}

fn fill_key(order_id: &OrderId, fill_id: &str) -> String {
    format!("{order_id}/{fill_id}")
}
