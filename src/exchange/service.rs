//! Exchange writer task
//!
//! All mutable per-exchange state lives in [`ExchangeState`], owned by a
//! single task. The task drains two channels: commands from callers (via
//! [`super::ExchangeHandle`]) and [`IntegrationAction`] data from the
//! scheduler. No locks around the view; ownership is the synchronisation.

use std::sync::Arc;

use dashmap::DashSet;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::errors::OrderError;
use crate::ledger::{self, HoldLedger};
use crate::lifecycle::{OrderPlacement, OrderRequest};
use crate::reconcile;
use crate::scheduler::{DirtyFlags, IntegrationAction};
use crate::store::{CompletedOrderRecord, FillRecord, HistoryStore, StoreError};
use crate::types::{ExchangeId, FundId, OrderId, PairKey, Symbol};
use crate::venue::sim::SimVenue;
use crate::venue::{FillReport, VenueApi};
use crate::view::{Balance, BookSnapshot, Fill, MarketView, Order, OrderCompleted, Transfer};

/// Which view container a caller wants change notifications for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCategory {
    Coins,
    Pairs,
    Balances,
    Orders,
    History,
    Transfers,
}

pub enum ExchangeCommand {
    CreateOrder {
        request: OrderRequest,
        resp: oneshot::Sender<Result<OrderPlacement, OrderError>>,
    },
    CancelOrder {
        order_id: OrderId,
        resp: oneshot::Sender<Result<(), OrderError>>,
    },
    Balances {
        resp: oneshot::Sender<Vec<Balance>>,
    },
    Orders {
        resp: oneshot::Sender<Vec<Order>>,
    },
    History {
        resp: oneshot::Sender<Vec<OrderCompleted>>,
    },
    Transfers {
        resp: oneshot::Sender<Vec<Transfer>>,
    },
    Pairs {
        resp: oneshot::Sender<Vec<PairKey>>,
    },
    Book {
        pair: PairKey,
        resp: oneshot::Sender<Option<BookSnapshot>>,
    },
    AvailableBalance {
        fund: FundId,
        coin: Symbol,
        resp: oneshot::Sender<Decimal>,
    },
    Watch {
        category: ViewCategory,
        resp: oneshot::Sender<Arc<tokio::sync::Notify>>,
    },
    SetSimMode {
        enable: bool,
        resp: oneshot::Sender<Result<(), StoreError>>,
    },
    SetTradingEnabled {
        enable: bool,
    },
}

pub struct ExchangeState {
    pub exchange: ExchangeId,
    pub view: MarketView,
    pub holds: HoldLedger,
    pub store: HistoryStore,
    pub trading_enabled: bool,
    pub sim_mode: bool,
    pub fee_rate: Decimal,
    pub flags: Arc<DirtyFlags>,
    pub tracked: Arc<DashSet<PairKey>>,
    /// Guards against a caller re-entering create/cancel from inside the
    /// writer task while an earlier venue call is still in flight.
    pub(crate) creating: bool,
    real_venue: Arc<dyn VenueApi>,
    sim_venue: Option<Arc<SimVenue>>,
    /// The scheduler follows this channel, so a sim-mode flip redirects
    /// its fetches too.
    venue_tx: watch::Sender<Arc<dyn VenueApi>>,
}

impl ExchangeState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: ExchangeId,
        store: HistoryStore,
        real_venue: Arc<dyn VenueApi>,
        venue_tx: watch::Sender<Arc<dyn VenueApi>>,
        flags: Arc<DirtyFlags>,
        tracked: Arc<DashSet<PairKey>>,
        fee_rate: Decimal,
        trading_enabled: bool,
    ) -> Self {
        Self {
            view: MarketView::new(exchange.clone()),
            exchange,
            holds: HoldLedger::new(),
            store,
            trading_enabled,
            sim_mode: false,
            fee_rate,
            flags,
            tracked,
            creating: false,
            real_venue,
            sim_venue: None,
            venue_tx,
        }
    }

    /// The venue trading and fetching currently go to.
    pub fn venue(&self) -> Arc<dyn VenueApi> {
        match &self.sim_venue {
            Some(sim) => sim.clone(),
            None => self.real_venue.clone(),
        }
    }

    /// What `fund` can still spend of `coin`: its partition minus every
    /// hold pinned against it.
    pub fn available_balance(&self, fund: &FundId, coin: &Symbol) -> Decimal {
        let owned = self
            .view
            .balances
            .get(coin)
            .map(|b| b.fund_amount(fund))
            .unwrap_or_default();
        owned - self.holds.held_for(fund, coin)
    }

    /// Switch between the real venue and a simulator seeded from the
    /// current view. Either direction invalidates local order state and
    /// the persisted history.
    pub async fn set_sim_mode(&mut self, enable: bool) -> Result<(), StoreError> {
        if enable == self.sim_mode {
            return Ok(());
        }
        if enable {
            let sim = Arc::new(SimVenue::new(self.exchange.clone(), self.fee_rate));
            for (coin, balance) in self.view.balances.iter() {
                sim.seed_balance(coin.clone(), balance.total).await;
            }
            for (pair, book) in &self.view.books {
                let snapshot = book.snapshot();
                sim.seed_book(pair.clone(), snapshot.bids, snapshot.asks)
                    .await;
            }
            let _ = self.venue_tx.send(sim.clone() as Arc<dyn VenueApi>);
            self.sim_venue = Some(sim);
        } else {
            self.sim_venue = None;
            let _ = self.venue_tx.send(self.real_venue.clone());
        }
        self.sim_mode = enable;

        // Orders, holds and stored history all belong to the venue we
        // just left.
        self.view.orders.clear();
        self.view.history.clear();
        self.holds = HoldLedger::new();
        self.store.reset()?;

        self.flags.request_balances_update();
        self.flags.request_orders_update();
        info!(exchange = %self.exchange, sim = enable, "venue mode switched");
        Ok(())
    }

    /// Fold one scheduler delivery into the view.
    pub fn apply(&mut self, action: IntegrationAction) {
        match action {
            IntegrationAction::Markets { pairs, taken_at } => {
                for info in pairs {
                    let key = PairKey::new(self.exchange.clone(), info.base, info.quote);
                    self.view.ensure_pair(&key);
                }
                self.view.pairs.touch(taken_at);
            }
            IntegrationAction::Balances { reports, taken_at } => {
                let mut changed = false;
                for report in reports {
                    self.view.ensure_coin(&report.coin);
                    changed |= ledger::assign_fund_balance(
                        &mut self.view.balances,
                        &report.coin,
                        report.total,
                        report.held,
                        report.timestamp,
                    );
                }
                if changed {
                    self.view.balances.touch(taken_at);
                }
            }
            IntegrationAction::Fills { reports } => {
                for report in reports {
                    self.record_fill(&report);
                }
            }
            IntegrationAction::OpenOrders { orders, taken_at } => {
                if let Err(e) = reconcile::synchronise_orders(
                    &mut self.view,
                    &mut self.holds,
                    &self.store,
                    &orders,
                    taken_at,
                ) {
                    error!(exchange = %self.exchange, error = %e, "order reconciliation failed");
                }
            }
            IntegrationAction::Book { pair, snapshot } => {
                self.view.book_mut(&pair).replace(&snapshot);
            }
            IntegrationAction::Transfers { reports, taken_at } => {
                let mut changed = false;
                for report in reports {
                    self.view.ensure_coin(&report.coin);
                    changed = true;
                    self.view.transfers.insert(
                        report.id.clone(),
                        Transfer {
                            id: report.id,
                            coin: report.coin,
                            amount: report.amount,
                            kind: report.kind,
                            status: report.status,
                            timestamp: report.timestamp,
                        },
                    );
                }
                if changed {
                    self.view.transfers.touch(taken_at);
                }
            }
        }
    }

    /// Record one venue-reported fill into history and the store. Fills
    /// of orders we no longer (or never) track are final, so their funds
    /// move immediately; fills of live orders wait for resolution.
    fn record_fill(&mut self, report: &FillReport) {
        let fund = self.fund_for(&report.order_id);
        let completed = self
            .view
            .history
            .entry(report.order_id.clone())
            .or_insert_with(|| {
                OrderCompleted::new(
                    report.order_id.clone(),
                    fund,
                    report.pair.clone(),
                    report.kind,
                    report.trade,
                    report.executed_at,
                )
            });
        let inserted = completed.upsert_fill(Fill {
            fill_id: report.fill_id.clone(),
            amount_in: report.amount_in,
            amount_out: report.amount_out,
            commission_coin: report.commission_coin.clone(),
            commission: report.commission,
            executed_at: report.executed_at,
            applied: false,
        });
        if !inserted {
            return;
        }
        self.view.history.touch(report.executed_at);

        if let Err(e) = self.persist_completed(report) {
            warn!(order_id = %report.order_id, error = %e, "failed to persist fill");
        }

        if !self.view.orders.contains(&report.order_id) {
            if let Some(completed) = self.view.history.get_mut(&report.order_id) {
                if let Err(e) =
                    ledger::apply_completed_order_to_fund(&mut self.view.balances, completed)
                {
                    error!(order_id = %report.order_id, error = %e, "fund application failed");
                }
            }
        }
    }

    fn persist_completed(&self, report: &FillReport) -> Result<(), StoreError> {
        self.store
            .upsert_completed_order(&CompletedOrderRecord {
                order_id: report.order_id.clone(),
                fund: self.fund_for(&report.order_id),
                pair: report.pair.clone(),
                kind: report.kind,
                trade: report.trade,
            })?;
        self.store.upsert_fill(&FillRecord {
            fill_id: report.fill_id.clone(),
            order_id: report.order_id.clone(),
            amount_in: report.amount_in,
            amount_out: report.amount_out,
            commission_coin: report.commission_coin.clone(),
            commission: report.commission,
            executed_at: report.executed_at,
            recorded_at: chrono::Utc::now(),
        })
    }

    fn fund_for(&self, order_id: &OrderId) -> FundId {
        if let Some(order) = self.view.orders.get(order_id) {
            return order.fund.clone();
        }
        if let Some(completed) = self.view.history.get(order_id) {
            return completed.fund.clone();
        }
        match self.store.fund_for_order(order_id) {
            Ok(Some(fund)) => fund,
            Ok(None) => FundId::main(),
            Err(e) => {
                warn!(%order_id, error = %e, "fund lookup failed, attributing to main");
                FundId::main()
            }
        }
    }

    async fn handle_command(&mut self, command: ExchangeCommand) {
        match command {
            ExchangeCommand::CreateOrder { request, resp } => {
                let result = self.create_order(request).await;
                let _ = resp.send(result);
            }
            ExchangeCommand::CancelOrder { order_id, resp } => {
                let result = self.cancel_order(&order_id).await;
                let _ = resp.send(result);
            }
            ExchangeCommand::Balances { resp } => {
                let _ = resp.send(self.view.balances.values().cloned().collect());
            }
            ExchangeCommand::Orders { resp } => {
                let _ = resp.send(self.view.orders.values().cloned().collect());
            }
            ExchangeCommand::History { resp } => {
                let _ = resp.send(self.view.history.values().cloned().collect());
            }
            ExchangeCommand::Transfers { resp } => {
                let _ = resp.send(self.view.transfers.values().cloned().collect());
            }
            ExchangeCommand::Pairs { resp } => {
                let _ = resp.send(self.view.pairs.keys().cloned().collect());
            }
            ExchangeCommand::Book { pair, resp } => {
                let _ = resp.send(self.view.books.get(&pair).map(|b| b.snapshot()));
            }
            ExchangeCommand::AvailableBalance { fund, coin, resp } => {
                let _ = resp.send(self.available_balance(&fund, &coin));
            }
            ExchangeCommand::Watch { category, resp } => {
                let notify = match category {
                    ViewCategory::Coins => self.view.coins.watch(),
                    ViewCategory::Pairs => self.view.pairs.watch(),
                    ViewCategory::Balances => self.view.balances.watch(),
                    ViewCategory::Orders => self.view.orders.watch(),
                    ViewCategory::History => self.view.history.watch(),
                    ViewCategory::Transfers => self.view.transfers.watch(),
                };
                let _ = resp.send(notify);
            }
            ExchangeCommand::SetSimMode { enable, resp } => {
                let _ = resp.send(self.set_sim_mode(enable).await);
            }
            ExchangeCommand::SetTradingEnabled { enable } => {
                self.trading_enabled = enable;
                info!(exchange = %self.exchange, enable, "trading toggled");
            }
        }
    }
}

/// The writer loop. Exits when shutdown fires or both channels close.
pub async fn run(
    mut state: ExchangeState,
    mut commands: mpsc::Receiver<ExchangeCommand>,
    mut actions: mpsc::Receiver<IntegrationAction>,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(exchange = %state.exchange, "exchange writer started");
    let mut actions_open = true;
    loop {
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            command = commands.recv() => match command {
                Some(command) => state.handle_command(command).await,
                None => break,
            },
            action = actions.recv(), if actions_open => match action {
                Some(action) => state.apply(action),
                // A closed action channel only means the scheduler is
                // gone; commands still work.
                None => actions_open = false,
            },
        }
    }
    debug!(exchange = %state.exchange, "exchange writer stopped");
}
