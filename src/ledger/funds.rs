//! Fund partition bookkeeping
//!
//! Every mutation re-checks the partition-sum invariant: for each coin,
//! the fund partitions sum to the venue-reported total. A mismatch is a
//! broken invariant and is logged loud, never papered over.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, warn};

use crate::errors::LedgerError;
use crate::types::{FundId, Symbol};
use crate::view::{Balance, OrderCompleted, VersionedMap};

/// Merge a venue-reported (total, held, timestamp) into the balance for
/// `coin`. Stale reports (older than the balance's own timestamp) are
/// ignored entirely: no mutation, no notification. Returns whether the
/// report was applied.
pub fn assign_fund_balance(
    balances: &mut VersionedMap<Symbol, Balance>,
    coin: &Symbol,
    total: Decimal,
    held: Decimal,
    timestamp: chrono::DateTime<Utc>,
) -> bool {
    let balance = balances
        .entry(coin.clone())
        .or_insert_with(|| Balance::new(coin.clone()));
    if !balance.assign(total, held, timestamp) {
        debug!(%coin, %total, "ignoring stale balance report");
        return false;
    }
    balances.touch(Utc::now());
    true
}

/// Adjust one fund's partition of `coin` by `delta`, moving the coin total
/// with it, and verify the invariant afterwards.
pub fn change_fund_balance(
    balances: &mut VersionedMap<Symbol, Balance>,
    fund: &FundId,
    coin: &Symbol,
    delta: Decimal,
) -> Result<(), LedgerError> {
    let balance = balances
        .entry(coin.clone())
        .or_insert_with(|| Balance::new(coin.clone()));

    let entry = balance.funds.entry(fund.clone()).or_insert(Decimal::ZERO);
    *entry += delta;
    if entry.is_sign_negative() {
        // Venue data may lag a local fill; the next balance poll trues it up.
        warn!(%fund, %coin, amount = %entry, "fund partition went negative");
    }
    balance.total += delta;

    let sum = balance.partition_sum();
    if sum != balance.total {
        let err = LedgerError::Consistency {
            coin: coin.clone(),
            sum,
            total: balance.total,
        };
        error!(%fund, %coin, %delta, "{err}");
        return Err(err);
    }

    balances.touch(Utc::now());
    Ok(())
}

/// Book every not-yet-applied fill of a completed order into its owning
/// fund: debit the input coin, credit the output coin, debit the
/// commission. This is the sole path by which a filled trade changes
/// fund-level bookkeeping. Returns the number of fills applied.
pub fn apply_completed_order_to_fund(
    balances: &mut VersionedMap<Symbol, Balance>,
    completed: &mut OrderCompleted,
) -> Result<usize, LedgerError> {
    let fund = completed.fund.clone();
    let in_coin = completed.trade.input_coin(&completed.pair).clone();
    let out_coin = completed.trade.output_coin(&completed.pair).clone();

    let mut applied = 0usize;
    for fill in completed.fills.values_mut().filter(|f| !f.applied) {
        change_fund_balance(balances, &fund, &in_coin, -fill.amount_in)?;
        change_fund_balance(balances, &fund, &out_coin, fill.amount_out)?;
        if fill.commission > Decimal::ZERO {
            change_fund_balance(balances, &fund, &fill.commission_coin, -fill.commission)?;
        }
        fill.applied = true;
        applied += 1;
    }

    if applied > 0 {
        debug!(
            order_id = %completed.order_id,
            %fund,
            fills = applied,
            "applied completed order to fund"
        );
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderKind, PairKey, TradeKind};
    use crate::view::Fill;
    use rust_decimal_macros::dec;

    fn balances_with(coin: &str, total: Decimal) -> VersionedMap<Symbol, Balance> {
        let mut balances = VersionedMap::new();
        assign_fund_balance(&mut balances, &coin.into(), total, Decimal::ZERO, Utc::now());
        balances
    }

    #[test]
    fn change_fund_balance_keeps_invariant() {
        let mut balances = balances_with("USD", dec!(1000));
        change_fund_balance(&mut balances, &"bot-a".into(), &"USD".into(), dec!(-250)).unwrap();

        let bal = balances.get(&"USD".into()).unwrap();
        assert_eq!(bal.total, dec!(750));
        assert_eq!(bal.partition_sum(), dec!(750));
        assert_eq!(bal.fund_amount(&"bot-a".into()), dec!(-250));
        assert_eq!(bal.fund_amount(&FundId::main()), dec!(1000));
    }

    #[test]
    fn assign_then_change_preserves_sum() {
        let mut balances = balances_with("BTC", dec!(2));
        change_fund_balance(&mut balances, &FundId::main(), &"BTC".into(), dec!(0.5)).unwrap();
        assign_fund_balance(
            &mut balances,
            &"BTC".into(),
            dec!(3),
            Decimal::ZERO,
            Utc::now() + chrono::Duration::seconds(1),
        );

        let bal = balances.get(&"BTC".into()).unwrap();
        assert_eq!(bal.partition_sum(), bal.total);
        assert_eq!(bal.total, dec!(3));
    }

    #[test]
    fn completed_order_applies_each_fill_once() {
        let mut balances = balances_with("USD", dec!(1000));
        assign_fund_balance(
            &mut balances,
            &"BTC".into(),
            Decimal::ZERO,
            Decimal::ZERO,
            Utc::now(),
        );

        let pair = PairKey::new("kraken", "BTC", "USD");
        let mut completed = OrderCompleted::new(
            "42".into(),
            FundId::main(),
            pair,
            OrderKind::Limit,
            TradeKind::QuoteToBase,
            Utc::now(),
        );
        completed.upsert_fill(Fill {
            fill_id: "t1".into(),
            amount_in: dec!(100),
            amount_out: dec!(0.001),
            commission_coin: "USD".into(),
            commission: dec!(0.25),
            executed_at: Utc::now(),
            applied: false,
        });

        let applied = apply_completed_order_to_fund(&mut balances, &mut completed).unwrap();
        assert_eq!(applied, 1);

        let usd = balances.get(&"USD".into()).unwrap();
        assert_eq!(usd.fund_amount(&FundId::main()), dec!(899.75));
        assert_eq!(usd.partition_sum(), usd.total);

        let btc = balances.get(&"BTC".into()).unwrap();
        assert_eq!(btc.fund_amount(&FundId::main()), dec!(0.001));

        // Applying again is a no-op.
        let applied = apply_completed_order_to_fund(&mut balances, &mut completed).unwrap();
        assert_eq!(applied, 0);
        assert_eq!(
            balances.get(&"USD".into()).unwrap().fund_amount(&FundId::main()),
            dec!(899.75)
        );
    }
}
