//! Exchange façade
//!
//! [`Exchange::spawn`] wires one venue into a writer task plus an update
//! scheduler and returns the [`ExchangeHandle`] callers use. The
//! [`ExchangeSet`] groups the handles of every enabled exchange.

mod handle;
mod service;

pub use handle::ExchangeHandle;
pub use service::{ExchangeCommand, ExchangeState, ViewCategory};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use dashmap::DashSet;
use tokio::sync::{mpsc, watch};

use crate::config::ExchangeConfig;
use crate::scheduler::{DirtyFlags, ExchangeStatus, UpdateScheduler};
use crate::store::HistoryStore;
use crate::types::{ExchangeId, Symbol};
use crate::venue::VenueApi;

const COMMAND_QUEUE: usize = 64;
const ACTION_QUEUE: usize = 256;

pub struct Exchange;

impl Exchange {
    /// Bring one exchange online: open its history store, start the
    /// writer and scheduler tasks, hand back the caller-side handle.
    pub fn spawn(
        cfg: &ExchangeConfig,
        data_dir: &Path,
        venue: Arc<dyn VenueApi>,
        coins_of_interest: Vec<Symbol>,
        trading_enabled: bool,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<ExchangeHandle> {
        let exchange = ExchangeId::from(cfg.name.as_str());
        let store = HistoryStore::open(data_dir.join("history").join(&cfg.name))
            .with_context(|| format!("opening history store for {exchange}"))?;

        let flags = Arc::new(DirtyFlags::default());
        let status = Arc::new(ExchangeStatus::default());
        let tracked: Arc<DashSet<crate::types::PairKey>> = Arc::new(DashSet::new());
        let (venue_tx, venue_rx) = watch::channel(venue.clone());
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (action_tx, action_rx) = mpsc::channel(ACTION_QUEUE);

        let state = ExchangeState::new(
            exchange.clone(),
            store,
            venue,
            venue_tx,
            flags.clone(),
            tracked.clone(),
            cfg.fee_rate,
            trading_enabled,
        );
        let scheduler = UpdateScheduler::new(
            exchange.clone(),
            venue_rx,
            action_tx,
            flags.clone(),
            status.clone(),
            tracked.clone(),
            coins_of_interest,
            cfg.tick_ms,
            &cfg.periods,
        );

        tokio::spawn(service::run(
            state,
            command_rx,
            action_rx,
            shutdown.clone(),
        ));
        tokio::spawn(scheduler.run(shutdown));

        Ok(ExchangeHandle::new(
            exchange, command_tx, flags, status, tracked,
        ))
    }
}

/// Handles of every running exchange, keyed by id.
#[derive(Default)]
pub struct ExchangeSet {
    inner: HashMap<ExchangeId, ExchangeHandle>,
}

impl ExchangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ExchangeHandle) {
        self.inner.insert(handle.exchange().clone(), handle);
    }

    pub fn get(&self, exchange: &ExchangeId) -> Option<&ExchangeHandle> {
        self.inner.get(exchange)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ExchangeId, &ExchangeHandle)> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RefreshPeriods;
    use crate::lifecycle::OrderRequest;
    use crate::types::{OrderKind, PairKey, TradeKind};
    use crate::venue::sim::SimVenue;
    use crate::view::PriceLevel;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn config() -> ExchangeConfig {
        ExchangeConfig {
            name: "sim".to_string(),
            enabled: true,
            fee_rate: dec!(0.001),
            color: None,
            tick_ms: 20,
            periods: RefreshPeriods::default(),
            seed_balances: Default::default(),
            seed_books: Vec::new(),
        }
    }

    #[tokio::test]
    async fn spawned_exchange_discovers_markets_and_trades() {
        let sim = Arc::new(SimVenue::new("sim".into(), dec!(0.001)));
        sim.seed_balance("USD".into(), dec!(1000)).await;
        sim.seed_book(
            PairKey::new("sim", "BTC", "USD"),
            vec![PriceLevel::new(dec!(9990), dec!(1))],
            vec![PriceLevel::new(dec!(10000), dec!(1))],
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Exchange::spawn(
            &config(),
            dir.path(),
            sim,
            vec!["BTC".into(), "USD".into()],
            true,
            shutdown_rx,
        )
        .unwrap();

        // The scheduler discovers the market and the seeded balance.
        let pair = PairKey::new("sim", "BTC", "USD");
        for _ in 0..100 {
            let pairs = handle.pairs().await.unwrap();
            let balances = handle.balances().await.unwrap();
            if pairs.contains(&pair) && !balances.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(handle.pairs().await.unwrap().contains(&pair));

        handle.track_pair(pair.clone());
        let placed = handle
            .create_order(OrderRequest {
                fund: "main".into(),
                pair: pair.clone(),
                kind: OrderKind::Limit,
                trade: TradeKind::QuoteToBase,
                amount_in: dec!(100),
                amount_out: dec!(100) / dec!(9000),
            })
            .await
            .unwrap();
        let order_id = placed.order_id.expect("resting order");

        let orders = handle.orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, order_id);
        assert_eq!(
            handle
                .available_balance("main".into(), "USD".into())
                .await
                .unwrap(),
            dec!(900)
        );

        handle.cancel_order(order_id).await.unwrap();
        assert!(handle.orders().await.unwrap().is_empty());

        shutdown_tx.send(true).unwrap();
    }

    #[tokio::test]
    async fn racing_orders_admit_exactly_one_winner() {
        let sim = Arc::new(SimVenue::new("sim".into(), dec!(0.001)));
        sim.seed_balance("USD".into(), dec!(1000)).await;
        let pair = PairKey::new("sim", "BTC", "USD");
        sim.seed_book(
            pair.clone(),
            vec![PriceLevel::new(dec!(9990), dec!(1))],
            vec![PriceLevel::new(dec!(10000), dec!(1))],
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = Exchange::spawn(
            &config(),
            dir.path(),
            sim,
            vec!["BTC".into(), "USD".into()],
            true,
            shutdown_rx,
        )
        .unwrap();

        for _ in 0..100 {
            if handle
                .available_balance("main".into(), "USD".into())
                .await
                .unwrap()
                == dec!(1000)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Two passive buys of 700 each race for a balance that covers
        // only one; the single writer task must serialize them so
        // exactly one wins and the other sees the hold.
        let request = || OrderRequest {
            fund: "main".into(),
            pair: pair.clone(),
            kind: OrderKind::Limit,
            trade: TradeKind::QuoteToBase,
            amount_in: dec!(700),
            amount_out: dec!(700) / dec!(9000),
        };
        let first = handle.clone();
        let second = handle.clone();
        let (a, b) = tokio::join!(first.create_order(request()), second.create_order(request()));

        let (winner, loser) = match (&a, &b) {
            (Ok(_), Err(_)) => (a.unwrap(), b.unwrap_err()),
            (Err(_), Ok(_)) => (b.unwrap(), a.unwrap_err()),
            other => panic!("expected one winner and one rejection, got {other:?}"),
        };
        assert!(winner.order_id.is_some());
        match loser {
            crate::errors::OrderError::InsufficientBalance {
                available, needed, ..
            } => {
                assert_eq!(available, dec!(300));
                assert_eq!(needed, dec!(700));
            }
            other => panic!("unexpected error {other}"),
        }

        assert_eq!(handle.orders().await.unwrap().len(), 1);
        assert_eq!(
            handle
                .available_balance("main".into(), "USD".into())
                .await
                .unwrap(),
            dec!(300)
        );

        shutdown_tx.send(true).unwrap();
    }
}
