//! Order lifecycle: placement and cancellation
//!
//! Both run inside the exchange writer task, so the view they validate
//! against cannot move underneath them. The funds-safety rule: a hold on
//! the input coin exists before the venue ever hears about the order, and
//! every error path removes it. Only a confirmed resting order keeps one,
//! re-pinned to the venue's order id.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::errors::OrderError;
use crate::exchange::ExchangeState;
use crate::ledger;
use crate::store::{CompletedOrderRecord, FillRecord, LiveOrderRecord, StoreError};
use crate::types::{FundId, OrderId, OrderKind, PairKey, TradeKind};
use crate::venue::{FillReport, SubmitRequest};
use crate::view::{Fill, Order, OrderCompleted};

/// What a caller asks for. `amount_in` is denominated in the trade's
/// input coin; `amount_out` is the limit target (ignored for market
/// orders).
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub fund: FundId,
    pub pair: PairKey,
    pub kind: OrderKind,
    pub trade: TradeKind,
    pub amount_in: Decimal,
    pub amount_out: Decimal,
}

/// Placement outcome. `order_id` is present when anything executed or
/// rests at the venue; `fills` are the immediate executions.
#[derive(Debug, Clone)]
pub struct OrderPlacement {
    pub order_id: Option<OrderId>,
    pub fills: Vec<FillReport>,
}

impl ExchangeState {
    pub async fn create_order(
        &mut self,
        request: OrderRequest,
    ) -> Result<OrderPlacement, OrderError> {
        if !self.trading_enabled {
            return Err(OrderError::TradingDisabled);
        }
        if self.creating {
            return Err(OrderError::Reentrant);
        }
        if request.pair.exchange != self.exchange {
            return Err(OrderError::WrongExchange(request.pair));
        }
        if !self.view.pairs.contains(&request.pair) {
            return Err(OrderError::UnknownPair(request.pair));
        }
        if request.amount_in <= Decimal::ZERO {
            return Err(OrderError::InvalidAmount(format!(
                "amount_in must be positive, got {}",
                request.amount_in
            )));
        }
        if request.kind == OrderKind::Limit && request.amount_out <= Decimal::ZERO {
            return Err(OrderError::InvalidAmount(format!(
                "limit orders need a positive amount_out, got {}",
                request.amount_out
            )));
        }

        let in_coin = request.trade.input_coin(&request.pair).clone();
        let available = self.available_balance(&request.fund, &in_coin);
        if available < request.amount_in {
            return Err(OrderError::InsufficientBalance {
                fund: request.fund,
                coin: in_coin,
                available,
                needed: request.amount_in,
            });
        }

        // Pin the input before the venue call; from here on every exit
        // either keeps exactly one hold (resting order) or none.
        let hold_id = self.holds.create(
            request.fund.clone(),
            in_coin,
            request.amount_in,
            None,
        );

        self.creating = true;
        let submitted = self
            .venue()
            .submit_order(&SubmitRequest {
                pair: request.pair.clone(),
                kind: request.kind,
                trade: request.trade,
                amount_in: request.amount_in,
                amount_out: request.amount_out,
            })
            .await;
        self.creating = false;

        let ack = match submitted {
            Ok(ack) => ack,
            Err(e) => {
                self.holds.remove(hold_id);
                return Err(e.into());
            }
        };

        let now = Utc::now();
        let filled_in: Decimal = ack.fills.iter().map(|f| f.amount_in).sum();
        if !ack.fills.is_empty() {
            self.settle_immediate_fills(&request, &ack.fills)?;
        }

        let remaining = request.amount_in - filled_in;
        let rests = request.kind == OrderKind::Limit && remaining > Decimal::ZERO;
        let mut resting = false;
        if let Some(order_id) = ack.order_id.clone().filter(|_| rests) {
            resting = true;
            self.view.orders.insert(
                order_id.clone(),
                Order {
                    id: order_id.clone(),
                    fund: request.fund.clone(),
                    pair: request.pair.clone(),
                    kind: request.kind,
                    trade: request.trade,
                    amount_in: request.amount_in,
                    amount_out: request.amount_out,
                    remaining_in: remaining,
                    created: now,
                    updated: now,
                },
            );
            self.view.orders.touch(now);
            self.holds.confirm(hold_id, order_id.clone(), remaining);
            if let Err(e) = self.store.upsert_live_order(&LiveOrderRecord {
                order_id: order_id.clone(),
                fund: request.fund.clone(),
                creator: "lifecycle".to_string(),
            }) {
                warn!(%order_id, error = %e, "failed to persist live-order record");
            }
        } else {
            self.holds.remove(hold_id);
        }

        self.tracked.insert(request.pair.clone());
        self.flags.request_balances_update();
        self.flags.request_orders_update();

        info!(
            exchange = %self.exchange,
            fund = %request.fund,
            pair = %request.pair,
            order_id = ?ack.order_id,
            fills = ack.fills.len(),
            %remaining,
            resting,
            "order placed"
        );

        Ok(OrderPlacement {
            order_id: ack.order_id,
            fills: ack.fills,
        })
    }

    /// Fold venue-acknowledged immediate fills into history, the store,
    /// the owning fund and the cached book.
    fn settle_immediate_fills(
        &mut self,
        request: &OrderRequest,
        fills: &[FillReport],
    ) -> Result<(), OrderError> {
        let order_id = fills[0].order_id.clone();
        let completed = self
            .view
            .history
            .entry(order_id.clone())
            .or_insert_with(|| {
                OrderCompleted::new(
                    order_id.clone(),
                    request.fund.clone(),
                    request.pair.clone(),
                    request.kind,
                    request.trade,
                    Utc::now(),
                )
            });
        for fill in fills {
            completed.upsert_fill(Fill {
                fill_id: fill.fill_id.clone(),
                amount_in: fill.amount_in,
                amount_out: fill.amount_out,
                commission_coin: fill.commission_coin.clone(),
                commission: fill.commission,
                executed_at: fill.executed_at,
                applied: false,
            });
        }
        self.view.history.touch(Utc::now());

        for fill in fills {
            if let Err(e) = self.persist_fill(fill) {
                warn!(%order_id, error = %e, "failed to persist fill");
            }
        }

        if let Some(completed) = self.view.history.get_mut(&order_id) {
            ledger::apply_completed_order_to_fund(&mut self.view.balances, completed)?;
        }

        // Withdraw matched liquidity from the cached book so pricing
        // decisions between two refreshes see what is actually left.
        for fill in fills {
            let (price, base) = match request.trade {
                TradeKind::QuoteToBase => {
                    if fill.amount_out.is_zero() {
                        continue;
                    }
                    (fill.amount_in / fill.amount_out, fill.amount_out)
                }
                TradeKind::BaseToQuote => {
                    if fill.amount_in.is_zero() {
                        continue;
                    }
                    (fill.amount_out / fill.amount_in, fill.amount_in)
                }
            };
            self.view
                .book_mut(&request.pair)
                .consume(request.trade, price, base);
        }
        Ok(())
    }

    pub async fn cancel_order(&mut self, order_id: &OrderId) -> Result<(), OrderError> {
        if self.creating {
            return Err(OrderError::Reentrant);
        }
        let pair = match self.view.orders.get(order_id) {
            Some(order) => order.pair.clone(),
            None => return Err(OrderError::UnknownOrder(order_id.clone())),
        };

        // The kill switch blocks new venue calls, not local unwinding:
        // with trading disabled skip the delegation and drop the order
        // (and its hold) directly.
        if self.trading_enabled {
            self.creating = true;
            let cancelled = self.venue().cancel_order(&pair, order_id).await;
            self.creating = false;

            match cancelled {
                Ok(true) => {}
                Ok(false) => {
                    // The venue no longer knows the order; it filled or was
                    // cancelled elsewhere. Let the reconciler resolve it from
                    // fresh history rather than guess here.
                    info!(exchange = %self.exchange, %order_id, "cancel found no live order, reconciling");
                    self.flags.request_balances_update();
                    self.flags.request_orders_update();
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            info!(exchange = %self.exchange, %order_id, "trading disabled, dropping order without venue call");
        }

        self.view.orders.remove(order_id);
        self.view.orders.touch(Utc::now());
        if let Some(hold) = self.holds.remove_by_order(order_id) {
            // The venue's own held figure lags its cancel ack;
            // lower it now instead of waiting a balance period.
            if !hold.is_local() {
                if let Some(balance) = self.view.balances.get_mut(&hold.coin) {
                    balance.held = (balance.held - hold.amount).max(Decimal::ZERO);
                }
            }
        }
        if let Err(e) = self.store.remove_live_order(order_id) {
            warn!(%order_id, error = %e, "failed to drop live-order record");
        }
        info!(exchange = %self.exchange, %order_id, "order cancelled");

        self.flags.request_balances_update();
        self.flags.request_orders_update();
        Ok(())
    }

    fn persist_fill(&self, fill: &FillReport) -> Result<(), StoreError> {
        self.store
            .upsert_completed_order(&CompletedOrderRecord {
                order_id: fill.order_id.clone(),
                fund: self
                    .view
                    .history
                    .get(&fill.order_id)
                    .map(|c| c.fund.clone())
                    .unwrap_or_else(FundId::main),
                pair: fill.pair.clone(),
                kind: fill.kind,
                trade: fill.trade,
            })?;
        self.store.upsert_fill(&FillRecord {
            fill_id: fill.fill_id.clone(),
            order_id: fill.order_id.clone(),
            amount_in: fill.amount_in,
            amount_out: fill.amount_out,
            commission_coin: fill.commission_coin.clone(),
            commission: fill.commission,
            executed_at: fill.executed_at,
            recorded_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ExchangeState;
    use crate::scheduler::DirtyFlags;
    use crate::store::HistoryStore;
    use crate::venue::sim::SimVenue;
    use crate::venue::VenueApi;
    use crate::view::PriceLevel;
    use dashmap::DashSet;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tokio::sync::watch;

    fn pair() -> PairKey {
        PairKey::new("sim", "BTC", "USD")
    }

    async fn seeded_state() -> (ExchangeState, tempfile::TempDir) {
        let sim = Arc::new(SimVenue::new("sim".into(), dec!(0.001)));
        sim.seed_balance("USD".into(), dec!(1000)).await;
        sim.seed_book(
            pair(),
            vec![PriceLevel::new(dec!(9990), dec!(1))],
            vec![PriceLevel::new(dec!(10000), dec!(0.05))],
        )
        .await;

        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("history")).unwrap();
        let venue: Arc<dyn VenueApi> = sim;
        let (venue_tx, _venue_rx) = watch::channel(venue.clone());
        let mut state = ExchangeState::new(
            "sim".into(),
            store,
            venue,
            venue_tx,
            Arc::new(DirtyFlags::default()),
            Arc::new(DashSet::new()),
            dec!(0.001),
            true,
        );
        state.view.ensure_pair(&pair());
        ledger::assign_fund_balance(
            &mut state.view.balances,
            &"USD".into(),
            dec!(1000),
            Decimal::ZERO,
            Utc::now(),
        );
        ledger::assign_fund_balance(
            &mut state.view.balances,
            &"BTC".into(),
            Decimal::ZERO,
            Decimal::ZERO,
            Utc::now(),
        );
        (state, dir)
    }

    fn passive_buy(fund: &str, amount_in: Decimal) -> OrderRequest {
        OrderRequest {
            fund: fund.into(),
            pair: pair(),
            kind: OrderKind::Limit,
            trade: TradeKind::QuoteToBase,
            amount_in,
            // Below the best ask of 10000: nothing crosses.
            amount_out: amount_in / dec!(9000),
        }
    }

    #[tokio::test]
    async fn resting_order_pins_a_hold_until_cancel() {
        let (mut state, _dir) = seeded_state().await;

        let placed = state.create_order(passive_buy("main", dec!(42))).await.unwrap();
        let order_id = placed.order_id.expect("resting order id");
        assert!(placed.fills.is_empty());

        assert!(state.view.orders.contains(&order_id));
        let hold = state.holds.try_get(&order_id).expect("confirmed hold");
        assert!(!hold.is_local());
        assert_eq!(hold.amount, dec!(42));
        assert_eq!(
            state.available_balance(&"main".into(), &"USD".into()),
            dec!(958)
        );
        assert!(state.store.live_order(&order_id).unwrap().is_some());

        state.cancel_order(&order_id).await.unwrap();
        assert!(!state.view.orders.contains(&order_id));
        assert!(state.holds.is_empty());
        assert_eq!(
            state.available_balance(&"main".into(), &"USD".into()),
            dec!(1000)
        );
        assert!(state.store.live_order(&order_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn immediate_fill_moves_funds_and_leaves_no_hold() {
        let (mut state, _dir) = seeded_state().await;

        // Crosses the 10000 ask for 0.05 BTC = 500 USD.
        let placed = state
            .create_order(OrderRequest {
                fund: "main".into(),
                pair: pair(),
                kind: OrderKind::Limit,
                trade: TradeKind::QuoteToBase,
                amount_in: dec!(500),
                amount_out: dec!(0.05),
            })
            .await
            .unwrap();
        assert_eq!(placed.fills.len(), 1);

        assert!(state.holds.is_empty());
        assert!(state.view.orders.is_empty());

        let usd = state.view.balances.get(&"USD".into()).unwrap();
        assert_eq!(usd.fund_amount(&"main".into()), dec!(500));
        let btc = state.view.balances.get(&"BTC".into()).unwrap();
        // 0.05 minus the 0.1% commission taken in BTC.
        assert_eq!(btc.fund_amount(&"main".into()), dec!(0.04995));

        // History carries the fill, already applied.
        let order_id = placed.order_id.unwrap();
        let completed = state.view.history.get(&order_id).unwrap();
        assert!(completed.fills.values().all(|f| f.applied));
    }

    #[tokio::test]
    async fn second_order_cannot_spend_held_funds() {
        let (mut state, _dir) = seeded_state().await;

        state.create_order(passive_buy("main", dec!(700))).await.unwrap();
        let err = state
            .create_order(passive_buy("main", dec!(700)))
            .await
            .unwrap_err();
        match err {
            OrderError::InsufficientBalance {
                available, needed, ..
            } => {
                assert_eq!(available, dec!(300));
                assert_eq!(needed, dec!(700));
            }
            other => panic!("unexpected error {other}"),
        }
        // Exactly the first order's hold remains.
        assert_eq!(state.holds.len(), 1);
    }

    #[tokio::test]
    async fn venue_rejection_releases_the_hold() {
        let (mut state, _dir) = seeded_state().await;
        let ghost = PairKey::new("sim", "ETH", "USD");
        state.view.ensure_pair(&ghost);
        ledger::assign_fund_balance(
            &mut state.view.balances,
            &"USD".into(),
            dec!(1000),
            Decimal::ZERO,
            Utc::now(),
        );

        // Known locally, but the venue has no such market.
        let err = state
            .create_order(OrderRequest {
                fund: "main".into(),
                pair: ghost,
                kind: OrderKind::Limit,
                trade: TradeKind::QuoteToBase,
                amount_in: dec!(100),
                amount_out: dec!(0.05),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Venue(_)));
        assert!(state.holds.is_empty());
    }

    #[tokio::test]
    async fn validation_rejects_before_any_hold() {
        let (mut state, _dir) = seeded_state().await;

        let foreign = OrderRequest {
            fund: "main".into(),
            pair: PairKey::new("other", "BTC", "USD"),
            kind: OrderKind::Limit,
            trade: TradeKind::QuoteToBase,
            amount_in: dec!(1),
            amount_out: dec!(1),
        };
        assert!(matches!(
            state.create_order(foreign).await.unwrap_err(),
            OrderError::WrongExchange(_)
        ));

        state.trading_enabled = false;
        assert!(matches!(
            state.create_order(passive_buy("main", dec!(1))).await.unwrap_err(),
            OrderError::TradingDisabled
        ));
        assert!(state.holds.is_empty());
    }

    #[tokio::test]
    async fn cancel_with_trading_disabled_still_releases_the_hold() {
        let (mut state, _dir) = seeded_state().await;

        let placed = state.create_order(passive_buy("main", dec!(500))).await.unwrap();
        let order_id = placed.order_id.expect("resting order id");
        assert_eq!(
            state.available_balance(&"main".into(), &"USD".into()),
            dec!(500)
        );

        state.trading_enabled = false;
        state.cancel_order(&order_id).await.unwrap();

        assert!(!state.view.orders.contains(&order_id));
        assert!(state.holds.is_empty());
        assert_eq!(
            state.available_balance(&"main".into(), &"USD".into()),
            dec!(1000)
        );
        assert!(state.store.live_order(&order_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn overlapping_submission_is_rejected() {
        let (mut state, _dir) = seeded_state().await;

        state.creating = true;
        assert!(matches!(
            state.create_order(passive_buy("main", dec!(1))).await.unwrap_err(),
            OrderError::Reentrant
        ));
        assert!(state.holds.is_empty());

        state.creating = false;
        state.create_order(passive_buy("main", dec!(1))).await.unwrap();
        assert_eq!(state.holds.len(), 1);
    }
}
