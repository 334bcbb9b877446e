//! Provisional reservations against fund balances
//!
//! A hold bridges the latency between "order submitted locally" and "order
//! confirmed by the venue". It starts *local* (no order id yet) and is
//! upgraded to *exchange-confirmed* once the venue returns an id. Exactly
//! one hold exists per open order per fund at any time.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::types::{FundId, OrderId, Symbol};

#[derive(Debug, Clone)]
pub struct Hold {
    pub id: Uuid,
    pub fund: FundId,
    pub coin: Symbol,
    pub amount: Decimal,
    /// None while the venue has not responded yet
    pub order_id: Option<OrderId>,
}

impl Hold {
    pub fn is_local(&self) -> bool {
        self.order_id.is_none()
    }
}

#[derive(Debug, Default)]
pub struct HoldLedger {
    holds: Vec<Hold>,
}

impl HoldLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `amount` of `coin` against `fund`. Returns the hold id used
    /// to confirm or release the reservation.
    pub fn create(
        &mut self,
        fund: FundId,
        coin: Symbol,
        amount: Decimal,
        order_id: Option<OrderId>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.holds.push(Hold {
            id,
            fund,
            coin,
            amount,
            order_id,
        });
        id
    }

    /// Upgrade a local hold to exchange-confirmed, re-pinning its amount to
    /// the order's remaining input.
    pub fn confirm(&mut self, hold_id: Uuid, order_id: OrderId, remaining: Decimal) {
        if let Some(hold) = self.holds.iter_mut().find(|h| h.id == hold_id) {
            hold.order_id = Some(order_id);
            hold.amount = remaining;
        }
    }

    pub fn remove(&mut self, hold_id: Uuid) -> Option<Hold> {
        let idx = self.holds.iter().position(|h| h.id == hold_id)?;
        Some(self.holds.swap_remove(idx))
    }

    pub fn remove_by_order(&mut self, order_id: &OrderId) -> Option<Hold> {
        let idx = self
            .holds
            .iter()
            .position(|h| h.order_id.as_ref() == Some(order_id))?;
        Some(self.holds.swap_remove(idx))
    }

    pub fn try_get(&self, order_id: &OrderId) -> Option<&Hold> {
        self.holds
            .iter()
            .find(|h| h.order_id.as_ref() == Some(order_id))
    }

    pub fn try_get_mut(&mut self, order_id: &OrderId) -> Option<&mut Hold> {
        self.holds
            .iter_mut()
            .find(|h| h.order_id.as_ref() == Some(order_id))
    }

    /// Total reserved for one fund/coin. The fund's available balance is
    /// its partition amount minus this.
    pub fn held_for(&self, fund: &FundId, coin: &Symbol) -> Decimal {
        self.holds
            .iter()
            .filter(|h| &h.fund == fund && &h.coin == coin)
            .map(|h| h.amount)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hold> {
        self.holds.iter()
    }

    pub fn len(&self) -> usize {
        self.holds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holds.is_empty()
    }
}
