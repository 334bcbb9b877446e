//! Caller-side handle to an exchange writer task

use std::sync::Arc;

use dashmap::DashSet;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot, Notify};

use crate::errors::OrderError;
use crate::exchange::service::{ExchangeCommand, ViewCategory};
use crate::lifecycle::{OrderPlacement, OrderRequest};
use crate::scheduler::{DirtyFlags, ExchangeStatus};
use crate::types::{ExchangeId, FundId, OrderId, PairKey, Symbol};
use crate::view::{Balance, BookSnapshot, Order, OrderCompleted, Transfer};

/// Cheap to clone; every clone talks to the same writer task.
#[derive(Clone)]
pub struct ExchangeHandle {
    exchange: ExchangeId,
    commands: mpsc::Sender<ExchangeCommand>,
    flags: Arc<DirtyFlags>,
    status: Arc<ExchangeStatus>,
    tracked: Arc<DashSet<PairKey>>,
}

impl ExchangeHandle {
    pub(super) fn new(
        exchange: ExchangeId,
        commands: mpsc::Sender<ExchangeCommand>,
        flags: Arc<DirtyFlags>,
        status: Arc<ExchangeStatus>,
        tracked: Arc<DashSet<PairKey>>,
    ) -> Self {
        Self {
            exchange,
            commands,
            flags,
            status,
            tracked,
        }
    }

    pub fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    async fn ask<T>(
        &self,
        command: ExchangeCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, OrderError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| OrderError::ServiceStopped)?;
        rx.await.map_err(|_| OrderError::ServiceStopped)
    }

    pub async fn create_order(&self, request: OrderRequest) -> Result<OrderPlacement, OrderError> {
        let (resp, rx) = oneshot::channel();
        self.ask(ExchangeCommand::CreateOrder { request, resp }, rx)
            .await?
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> Result<(), OrderError> {
        let (resp, rx) = oneshot::channel();
        self.ask(ExchangeCommand::CancelOrder { order_id, resp }, rx)
            .await?
    }

    pub async fn balances(&self) -> Result<Vec<Balance>, OrderError> {
        let (resp, rx) = oneshot::channel();
        self.ask(ExchangeCommand::Balances { resp }, rx).await
    }

    pub async fn orders(&self) -> Result<Vec<Order>, OrderError> {
        let (resp, rx) = oneshot::channel();
        self.ask(ExchangeCommand::Orders { resp }, rx).await
    }

    pub async fn history(&self) -> Result<Vec<OrderCompleted>, OrderError> {
        let (resp, rx) = oneshot::channel();
        self.ask(ExchangeCommand::History { resp }, rx).await
    }

    pub async fn transfers(&self) -> Result<Vec<Transfer>, OrderError> {
        let (resp, rx) = oneshot::channel();
        self.ask(ExchangeCommand::Transfers { resp }, rx).await
    }

    pub async fn pairs(&self) -> Result<Vec<PairKey>, OrderError> {
        let (resp, rx) = oneshot::channel();
        self.ask(ExchangeCommand::Pairs { resp }, rx).await
    }

    pub async fn book(&self, pair: PairKey) -> Result<Option<BookSnapshot>, OrderError> {
        let (resp, rx) = oneshot::channel();
        self.ask(ExchangeCommand::Book { pair, resp }, rx).await
    }

    pub async fn available_balance(
        &self,
        fund: FundId,
        coin: Symbol,
    ) -> Result<Decimal, OrderError> {
        let (resp, rx) = oneshot::channel();
        self.ask(ExchangeCommand::AvailableBalance { fund, coin, resp }, rx)
            .await
    }

    /// Change-notification handle for one view container.
    pub async fn watch(&self, category: ViewCategory) -> Result<Arc<Notify>, OrderError> {
        let (resp, rx) = oneshot::channel();
        self.ask(ExchangeCommand::Watch { category, resp }, rx).await
    }

    /// Block until the given container changes. Arm before triggering the
    /// change you wait for, or pair with a version check, to avoid races.
    pub async fn wait_for_update(&self, category: ViewCategory) -> Result<(), OrderError> {
        let notify = self.watch(category).await?;
        notify.notified().await;
        Ok(())
    }

    /// Swap the exchange between its real venue and a seeded simulator.
    pub async fn set_sim_mode(&self, enable: bool) -> anyhow::Result<()> {
        let (resp, rx) = oneshot::channel();
        self.ask(ExchangeCommand::SetSimMode { enable, resp }, rx)
            .await??;
        Ok(())
    }

    pub async fn set_trading_enabled(&self, enable: bool) -> Result<(), OrderError> {
        self.commands
            .send(ExchangeCommand::SetTradingEnabled { enable })
            .await
            .map_err(|_| OrderError::ServiceStopped)
    }

    /// Add a pair to the book-refresh set and refresh it straight away.
    pub fn track_pair(&self, pair: PairKey) {
        self.tracked.insert(pair);
        self.flags.request_market_update();
    }

    pub fn untrack_pair(&self, pair: &PairKey) {
        self.tracked.remove(pair);
    }

    pub fn request_pairs_update(&self) {
        self.flags.request_pairs_update();
    }

    pub fn request_balances_update(&self) {
        self.flags.request_balances_update();
    }

    pub fn request_market_update(&self) {
        self.flags.request_market_update();
    }

    pub fn request_orders_update(&self) {
        self.flags.request_orders_update();
    }

    pub fn request_transfers_update(&self) {
        self.flags.request_transfers_update();
    }

    pub fn is_public_only(&self) -> bool {
        self.status.is_public_only()
    }

    /// Resume private polling after credentials were fixed: clears the
    /// public-only degradation and marks every private category dirty.
    pub fn reset_public_only(&self) {
        self.status.reset_public_only();
        self.flags.request_balances_update();
        self.flags.request_orders_update();
        self.flags.request_transfers_update();
    }

    pub fn is_unavailable(&self) -> bool {
        self.status.is_unavailable()
    }
}
