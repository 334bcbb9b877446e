//! Live-order / history reconciliation
//!
//! Resolves the local Orders view against the venue's authoritative
//! live-order list. Orders the venue no longer reports are either filled
//! (an OrderCompleted exists: its fills are booked into the owning fund)
//! or cancelled (nothing more to do). Venue-reported orders we did not
//! know about are adopted with a fresh exchange-confirmed hold.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::LedgerError;
use crate::ledger::{self, HoldLedger};
use crate::store::{HistoryStore, LiveOrderRecord};
use crate::types::{FundId, OrderId};
use crate::venue::LiveOrder;
use crate::view::{MarketView, Order};

/// Apply the venue's live-order snapshot, taken at `taken_at`, to the
/// local model.
pub fn synchronise_orders(
    view: &mut MarketView,
    holds: &mut HoldLedger,
    store: &HistoryStore,
    live: &[LiveOrder],
    taken_at: DateTime<Utc>,
) -> Result<(), LedgerError> {
    let mut changed = false;

    // Pass one: resolve local orders the venue no longer reports.
    let local_ids: Vec<OrderId> = view.orders.keys().cloned().collect();
    for order_id in local_ids {
        if live.iter().any(|l| l.id == order_id) {
            continue;
        }
        // An order created at or after the snapshot may simply not have
        // propagated to the venue's view yet; judging it now would race
        // against its own confirmation. Wall-clock comparison, so venue
        // clock drift can delay (never corrupt) resolution.
        let created = view
            .orders
            .get(&order_id)
            .map(|o| o.created)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if created >= taken_at {
            debug!(%order_id, "order newer than snapshot, skipping");
            continue;
        }

        view.orders.remove(&order_id);
        holds.remove_by_order(&order_id);
        if let Err(e) = store.remove_live_order(&order_id) {
            warn!(%order_id, error = %e, "failed to drop live-order record");
        }
        changed = true;

        if let Some(completed) = view.history.get_mut(&order_id) {
            // Filled: book its trades into the fund. Already-applied fills
            // are skipped, so resolution and the immediate-fill path never
            // double count.
            let applied = ledger::apply_completed_order_to_fund(&mut view.balances, completed)?;
            info!(%order_id, fills = applied, "resolved order as filled");
        } else {
            info!(%order_id, "resolved order as cancelled");
        }
    }

    // Pass two: adopt or refresh every venue-reported live order.
    for reported in live {
        view.ensure_pair(&reported.pair);
        match view.orders.get_mut(&reported.id) {
            Some(order) => {
                // Update in place; a remove+insert would notify observers
                // of a phantom disappearance.
                if order.remaining_in != reported.remaining_in {
                    order.remaining_in = reported.remaining_in;
                    order.updated = taken_at;
                    changed = true;
                }
            }
            None => {
                let fund = fund_for(store, &reported.id);
                debug!(order_id = %reported.id, %fund, "adopting venue-reported order");
                view.orders.insert(
                    reported.id.clone(),
                    Order {
                        id: reported.id.clone(),
                        fund: fund.clone(),
                        pair: reported.pair.clone(),
                        kind: reported.kind,
                        trade: reported.trade,
                        amount_in: reported.amount_in,
                        amount_out: reported.amount_out,
                        remaining_in: reported.remaining_in,
                        created: reported.created,
                        updated: taken_at,
                    },
                );
                if let Err(e) = store.upsert_live_order(&LiveOrderRecord {
                    order_id: reported.id.clone(),
                    fund,
                    creator: "reconciler".to_string(),
                }) {
                    warn!(order_id = %reported.id, error = %e, "failed to persist live-order record");
                }
                changed = true;
            }
        }

        // Exactly one exchange-confirmed hold per live order, pinned to
        // its remaining input.
        let in_coin = reported.trade.input_coin(&reported.pair).clone();
        match holds.try_get_mut(&reported.id) {
            Some(hold) => {
                hold.amount = reported.remaining_in;
            }
            None => {
                let fund = view
                    .orders
                    .get(&reported.id)
                    .map(|o| o.fund.clone())
                    .unwrap_or_else(FundId::main);
                holds.create(fund, in_coin, reported.remaining_in, Some(reported.id.clone()));
            }
        }
    }

    if changed {
        view.orders.touch(Utc::now());
    }
    Ok(())
}

fn fund_for(store: &HistoryStore, order_id: &OrderId) -> FundId {
    match store.fund_for_order(order_id) {
        Ok(Some(fund)) => fund,
        Ok(None) => FundId::main(),
        Err(e) => {
            warn!(%order_id, error = %e, "fund lookup failed, attributing to main");
            FundId::main()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::assign_fund_balance;
    use crate::types::{OrderKind, PairKey, TradeKind};
    use crate::view::{Fill, OrderCompleted};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn pair() -> PairKey {
        PairKey::new("kraken", "BTC", "USD")
    }

    fn fixture() -> (MarketView, HoldLedger, HistoryStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::open(dir.path().join("history")).unwrap();
        let mut view = MarketView::new("kraken".into());
        view.ensure_pair(&pair());
        assign_fund_balance(
            &mut view.balances,
            &"USD".into(),
            dec!(1000),
            Decimal::ZERO,
            Utc::now(),
        );
        assign_fund_balance(
            &mut view.balances,
            &"BTC".into(),
            Decimal::ZERO,
            Decimal::ZERO,
            Utc::now(),
        );
        (view, HoldLedger::new(), store, dir)
    }

    fn local_order(view: &mut MarketView, holds: &mut HoldLedger, id: &str, created: DateTime<Utc>) {
        view.orders.insert(
            id.into(),
            Order {
                id: id.into(),
                fund: FundId::main(),
                pair: pair(),
                kind: OrderKind::Limit,
                trade: TradeKind::QuoteToBase,
                amount_in: dec!(100),
                amount_out: dec!(0.01),
                remaining_in: dec!(100),
                created,
                updated: created,
            },
        );
        holds.create(
            FundId::main(),
            "USD".into(),
            dec!(100),
            Some(id.into()),
        );
    }

    fn reported(id: &str, remaining: Decimal, created: DateTime<Utc>) -> LiveOrder {
        LiveOrder {
            id: id.into(),
            pair: pair(),
            kind: OrderKind::Limit,
            trade: TradeKind::QuoteToBase,
            amount_in: dec!(100),
            amount_out: dec!(0.01),
            remaining_in: remaining,
            created,
        }
    }

    #[test]
    fn resolves_filled_order_and_applies_fills_once() {
        let (mut view, mut holds, store, _dir) = fixture();
        let now = Utc::now();
        let earlier = now - Duration::seconds(10);

        local_order(&mut view, &mut holds, "7", earlier);
        local_order(&mut view, &mut holds, "9", earlier);

        // Order 9 has history: it was filled.
        let mut completed = OrderCompleted::new(
            "9".into(),
            FundId::main(),
            pair(),
            OrderKind::Limit,
            TradeKind::QuoteToBase,
            earlier,
        );
        completed.upsert_fill(Fill {
            fill_id: "t1".into(),
            amount_in: dec!(100),
            amount_out: dec!(0.01),
            commission_coin: "BTC".into(),
            commission: Decimal::ZERO,
            executed_at: earlier,
            applied: false,
        });
        view.history.insert("9".into(), completed);

        let live = vec![reported("7", dec!(100), earlier)];
        synchronise_orders(&mut view, &mut holds, &store, &live, now).unwrap();

        assert!(view.orders.contains(&"7".into()));
        assert!(!view.orders.contains(&"9".into()));
        assert!(holds.try_get(&"9".into()).is_none());

        let usd = view.balances.get(&"USD".into()).unwrap();
        assert_eq!(usd.fund_amount(&FundId::main()), dec!(900));
        let btc = view.balances.get(&"BTC".into()).unwrap();
        assert_eq!(btc.fund_amount(&FundId::main()), dec!(0.01));

        // One hold per live order.
        assert_eq!(holds.len(), 1);
        assert_eq!(holds.try_get(&"7".into()).unwrap().amount, dec!(100));
    }

    #[test]
    fn repeat_synchronise_is_idempotent() {
        let (mut view, mut holds, store, _dir) = fixture();
        let now = Utc::now();
        let earlier = now - Duration::seconds(10);

        local_order(&mut view, &mut holds, "7", earlier);
        let live = vec![reported("7", dec!(40), earlier)];

        synchronise_orders(&mut view, &mut holds, &store, &live, now).unwrap();
        let version = view.orders.version();
        let usd_total = view.balances.get(&"USD".into()).unwrap().total;

        synchronise_orders(&mut view, &mut holds, &store, &live, now).unwrap();
        assert_eq!(view.orders.version(), version);
        assert_eq!(view.balances.get(&"USD".into()).unwrap().total, usd_total);
        assert_eq!(holds.len(), 1);
        assert_eq!(holds.try_get(&"7".into()).unwrap().amount, dec!(40));
    }

    #[test]
    fn keeps_orders_newer_than_the_snapshot() {
        let (mut view, mut holds, store, _dir) = fixture();
        let snapshot_at = Utc::now() - Duration::seconds(5);
        // Placed after the snapshot was taken: must survive an empty list.
        local_order(&mut view, &mut holds, "11", Utc::now());

        synchronise_orders(&mut view, &mut holds, &store, &[], snapshot_at).unwrap();
        assert!(view.orders.contains(&"11".into()));
        assert_eq!(holds.len(), 1);
    }

    #[test]
    fn adopts_unknown_live_orders_with_hold() {
        let (mut view, mut holds, store, _dir) = fixture();
        let now = Utc::now();
        let earlier = now - Duration::seconds(30);

        store
            .upsert_live_order(&LiveOrderRecord {
                order_id: "55".into(),
                fund: "bot-a".into(),
                creator: "lifecycle".into(),
            })
            .unwrap();

        let live = vec![reported("55", dec!(60), earlier)];
        synchronise_orders(&mut view, &mut holds, &store, &live, now).unwrap();

        let order = view.orders.get(&"55".into()).unwrap();
        assert_eq!(order.fund, "bot-a".into());
        let hold = holds.try_get(&"55".into()).unwrap();
        assert_eq!(hold.amount, dec!(60));
        assert_eq!(hold.fund, "bot-a".into());
        assert_eq!(hold.coin, "USD".into());
    }
}
