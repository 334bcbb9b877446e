//! Per-exchange update scheduler
//!
//! One scheduler task runs next to each exchange's writer task. It never
//! touches exchange state itself: it fetches from the venue on its own
//! cadence and ships the results to the writer as [`IntegrationAction`]
//! values over a bounded channel. Callers can cut a wait short by raising
//! a dirty flag, which wakes the scheduler immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::RefreshPeriods;
use crate::errors::VenueError;
use crate::types::{ExchangeId, PairKey, Symbol};
use crate::venue::{BalanceReport, FillReport, LiveOrder, PairInfo, TransferReport, VenueApi};
use crate::view::BookSnapshot;

/// Depth requested on every order-book fetch.
const BOOK_DEPTH: usize = 25;

/// Fetched venue data on its way to the exchange writer task.
#[derive(Debug, Clone)]
pub enum IntegrationAction {
    Markets {
        pairs: Vec<PairInfo>,
        taken_at: DateTime<Utc>,
    },
    Balances {
        reports: Vec<BalanceReport>,
        taken_at: DateTime<Utc>,
    },
    Fills {
        reports: Vec<FillReport>,
    },
    OpenOrders {
        orders: Vec<LiveOrder>,
        taken_at: DateTime<Utc>,
    },
    Book {
        pair: PairKey,
        snapshot: BookSnapshot,
    },
    Transfers {
        reports: Vec<TransferReport>,
        taken_at: DateTime<Utc>,
    },
}

/// One flag per update category. Raising a flag wakes the scheduler and
/// makes that category due on the next pass regardless of its period.
#[derive(Debug, Default)]
pub struct DirtyFlags {
    pairs: AtomicBool,
    balances: AtomicBool,
    market: AtomicBool,
    orders: AtomicBool,
    transfers: AtomicBool,
    wake: Notify,
}

impl DirtyFlags {
    pub fn request_pairs_update(&self) {
        self.pairs.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn request_balances_update(&self) {
        self.balances.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn request_market_update(&self) {
        self.market.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn request_orders_update(&self) {
        self.orders.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn request_transfers_update(&self) {
        self.transfers.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    fn take_pairs(&self) -> bool {
        self.pairs.swap(false, Ordering::AcqRel)
    }

    fn take_balances(&self) -> bool {
        self.balances.swap(false, Ordering::AcqRel)
    }

    fn take_market(&self) -> bool {
        self.market.swap(false, Ordering::AcqRel)
    }

    fn take_orders(&self) -> bool {
        self.orders.swap(false, Ordering::AcqRel)
    }

    fn take_transfers(&self) -> bool {
        self.transfers.swap(false, Ordering::AcqRel)
    }

    async fn woken(&self) {
        self.wake.notified().await;
    }
}

/// Connectivity status shared between the scheduler and the façade.
#[derive(Debug, Default)]
pub struct ExchangeStatus {
    public_only: AtomicBool,
    unavailable: AtomicBool,
}

impl ExchangeStatus {
    /// Private endpoints rejected our credentials; only public data flows.
    pub fn is_public_only(&self) -> bool {
        self.public_only.load(Ordering::Acquire)
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable.load(Ordering::Acquire)
    }

    fn set_public_only(&self, exchange: &ExchangeId) {
        if !self.public_only.swap(true, Ordering::AcqRel) {
            warn!(%exchange, "credentials rejected, dropping to public-only mode");
        }
    }

    /// Clear the public-only degradation after credentials were fixed so
    /// private polling resumes.
    pub fn reset_public_only(&self) {
        self.public_only.store(false, Ordering::Release);
    }

    fn set_unavailable(&self, exchange: &ExchangeId, error: &VenueError) {
        if !self.unavailable.swap(true, Ordering::AcqRel) {
            warn!(%exchange, %error, "venue unavailable");
        }
    }

    fn set_available(&self, exchange: &ExchangeId) {
        if self.unavailable.swap(false, Ordering::AcqRel) {
            info!(%exchange, "venue available again");
        }
    }
}

/// Tracks when a category last ran against its refresh period.
#[derive(Debug)]
struct Cadence {
    period: Duration,
    last: Option<Instant>,
}

impl Cadence {
    fn new(period_ms: u64) -> Self {
        Self {
            period: Duration::from_millis(period_ms),
            last: None,
        }
    }

    fn due(&self, dirty: bool) -> bool {
        dirty || self.last.map_or(true, |t| t.elapsed() >= self.period)
    }

    fn mark(&mut self) {
        self.last = Some(Instant::now());
    }
}

pub struct UpdateScheduler {
    exchange: ExchangeId,
    venue_rx: watch::Receiver<Arc<dyn VenueApi>>,
    actions: mpsc::Sender<IntegrationAction>,
    flags: Arc<DirtyFlags>,
    status: Arc<ExchangeStatus>,
    tracked: Arc<DashSet<PairKey>>,
    coins_of_interest: Vec<Symbol>,
    tick: Duration,
    balances: Cadence,
    market: Cadence,
    orders: Cadence,
    transfers: Cadence,
    /// The pair catalogue has no period: fetched once at startup, then
    /// only on demand.
    pairs_fetched: bool,
    /// High-water mark for trade-history fetches.
    fills_since: DateTime<Utc>,
}

impl UpdateScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: ExchangeId,
        venue_rx: watch::Receiver<Arc<dyn VenueApi>>,
        actions: mpsc::Sender<IntegrationAction>,
        flags: Arc<DirtyFlags>,
        status: Arc<ExchangeStatus>,
        tracked: Arc<DashSet<PairKey>>,
        coins_of_interest: Vec<Symbol>,
        tick_ms: u64,
        periods: &RefreshPeriods,
    ) -> Self {
        Self {
            exchange,
            venue_rx,
            actions,
            flags,
            status,
            tracked,
            coins_of_interest,
            tick: Duration::from_millis(tick_ms),
            balances: Cadence::new(periods.balances_ms),
            market: Cadence::new(periods.market_ms),
            orders: Cadence::new(periods.orders_ms),
            transfers: Cadence::new(periods.transfers_ms),
            pairs_fetched: false,
            fills_since: Utc::now(),
        }
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(exchange = %self.exchange, "update scheduler started");
        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = self.flags.woken() => {}
                _ = tokio::time::sleep(self.tick) => {}
            }
            if self.pass(&mut shutdown).await.is_none() {
                break;
            }
        }
        debug!(exchange = %self.exchange, "update scheduler stopped");
    }

    /// One scheduling pass. Returns `None` when shutdown interrupted it.
    async fn pass(&mut self, shutdown: &mut watch::Receiver<bool>) -> Option<()> {
        let venue = self.venue_rx.borrow().clone();
        let private_ok = !self.status.is_public_only();

        if self.flags.take_pairs() || !self.pairs_fetched {
            let coins = self.coins_of_interest.clone();
            let result = self
                .fetch(shutdown, &venue, venue.fetch_markets(&coins))
                .await?;
            if let Some(pairs) = self.note(result) {
                // Marked only on success so a failed startup fetch is
                // retried on the next tick.
                self.pairs_fetched = true;
                self.ship(shutdown, IntegrationAction::Markets {
                    pairs,
                    taken_at: Utc::now(),
                })
                .await?;
            }
        }

        if self.market.due(self.flags.take_market()) {
            self.market.mark();
            let pairs: Vec<PairKey> = self.tracked.iter().map(|p| p.clone()).collect();
            for pair in pairs {
                let result = self
                    .fetch(shutdown, &venue, venue.fetch_order_book(&pair, BOOK_DEPTH))
                    .await?;
                if let Some(snapshot) = self.note(result) {
                    self.ship(shutdown, IntegrationAction::Book { pair, snapshot }).await?;
                }
            }
        }

        if private_ok && self.balances.due(self.flags.take_balances()) {
            self.balances.mark();
            let result = self.fetch(shutdown, &venue, venue.fetch_balances()).await?;
            if let Some(reports) = self.note(result) {
                self.ship(shutdown, IntegrationAction::Balances {
                    reports,
                    taken_at: Utc::now(),
                })
                .await?;
            }
        }

        if private_ok && self.orders.due(self.flags.take_orders()) {
            self.orders.mark();
            // Fills first: open-order resolution needs the history that
            // explains a disappearance to already be in the view.
            let since = self.fills_since;
            let result = self
                .fetch(shutdown, &venue, venue.fetch_trade_history(since))
                .await?;
            if let Some(reports) = self.note(result) {
                if let Some(latest) = reports.iter().map(|f| f.executed_at).max() {
                    self.fills_since = latest;
                }
                if !reports.is_empty() {
                    self.ship(shutdown, IntegrationAction::Fills { reports }).await?;
                }
            }

            let taken_at = Utc::now();
            let result = self
                .fetch(shutdown, &venue, venue.fetch_open_orders())
                .await?;
            if let Some(orders) = self.note(result) {
                self.ship(shutdown, IntegrationAction::OpenOrders { orders, taken_at })
                    .await?;
            }
        }

        if private_ok && self.transfers.due(self.flags.take_transfers()) {
            self.transfers.mark();
            let result = self.fetch(shutdown, &venue, venue.fetch_transfers()).await?;
            if let Some(reports) = self.note(result) {
                self.ship(shutdown, IntegrationAction::Transfers {
                    reports,
                    taken_at: Utc::now(),
                })
                .await?;
            }
        }

        Some(())
    }

    /// Rate-limited venue call raced against shutdown.
    async fn fetch<T>(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        venue: &Arc<dyn VenueApi>,
        fut: impl std::future::Future<Output = Result<T, VenueError>>,
    ) -> Option<Result<T, VenueError>> {
        venue.rate_limiter().acquire().await;
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    None
                } else {
                    Some(Err(VenueError::Cancelled))
                }
            }
            result = fut => Some(result),
        }
    }

    /// Record the call outcome on the shared status and unwrap it.
    fn note<T>(&self, result: Result<T, VenueError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.status.set_available(&self.exchange);
                Some(value)
            }
            Err(VenueError::Forbidden) => {
                self.status.set_public_only(&self.exchange);
                None
            }
            Err(VenueError::Cancelled) => None,
            Err(e @ (VenueError::Unavailable | VenueError::Transport(_))) => {
                self.status.set_unavailable(&self.exchange, &e);
                None
            }
            Err(e) => {
                debug!(exchange = %self.exchange, error = %e, "venue call failed");
                None
            }
        }
    }

    /// Deliver to the writer, giving up if shutdown fires while the
    /// channel is full. A dropped action is refetched next period.
    async fn ship(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        action: IntegrationAction,
    ) -> Option<()> {
        tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    None
                } else {
                    Some(())
                }
            }
            sent = self.actions.send(action) => sent.ok(),
        }
    }
}
