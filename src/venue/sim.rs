//! Simulation venue
//!
//! Implements the full `VenueApi` contract against a seeded in-memory
//! market, so the rest of the pipeline (holds, reconciliation, fund
//! bookkeeping) runs unchanged in back-testing mode. Orders match against
//! the seeded book: liquidity inside the limit price fills immediately,
//! any remainder rests under a venue-style order id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::cmp::min;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::errors::VenueError;
use crate::types::{ExchangeId, OrderId, OrderKind, PairKey, Symbol, TradeKind};
use crate::venue::{
    BalanceReport, FillReport, LiveOrder, PairInfo, RateLimiter, SubmitAck, SubmitRequest,
    TransferReport, VenueApi,
};
use crate::view::book::{BookSnapshot, PriceLevel};

#[derive(Debug, Default, Clone, Copy)]
struct SimBalance {
    total: Decimal,
    held: Decimal,
}

#[derive(Default)]
struct SimState {
    books: HashMap<PairKey, BookSnapshot>,
    balances: HashMap<Symbol, SimBalance>,
    open: HashMap<OrderId, LiveOrder>,
    fills: Vec<FillReport>,
    next_order: u64,
}

pub struct SimVenue {
    exchange: ExchangeId,
    fee_rate: Decimal,
    limiter: RateLimiter,
    state: Mutex<SimState>,
}

impl SimVenue {
    pub fn new(exchange: ExchangeId, fee_rate: Decimal) -> Self {
        Self {
            exchange,
            fee_rate,
            // The simulation answers from memory; a tiny interval keeps the
            // limiter exercised without slowing tests down.
            limiter: RateLimiter::new(Duration::from_millis(1)),
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn exchange(&self) -> &ExchangeId {
        &self.exchange
    }

    /// Seed the book for one pair
    pub async fn seed_book(&self, pair: PairKey, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) {
        let mut state = self.state.lock().await;
        state.books.insert(
            pair,
            BookSnapshot {
                bids,
                asks,
                taken_at: Utc::now(),
            },
        );
    }

    /// Seed the venue-side balance for one coin
    pub async fn seed_balance(&self, coin: Symbol, total: Decimal) {
        let mut state = self.state.lock().await;
        state.balances.insert(
            coin,
            SimBalance {
                total,
                held: Decimal::ZERO,
            },
        );
    }

    fn next_order_id(state: &mut SimState) -> OrderId {
        state.next_order += 1;
        OrderId::from(format!("sim-{}", state.next_order))
    }

    /// Match `request` against the seeded book, consuming taken liquidity.
    /// Returns (fills, remaining input).
    fn execute(
        &self,
        state: &mut SimState,
        request: &SubmitRequest,
        now: DateTime<Utc>,
        order_id: &OrderId,
    ) -> Result<(Vec<FillReport>, Decimal), VenueError> {
        let book = state
            .books
            .get_mut(&request.pair)
            .ok_or_else(|| VenueError::Transport(format!("no market {}", request.pair)))?;

        // Quote per base; None for market orders (no price cap).
        let cap = match request.kind {
            OrderKind::Market => None,
            OrderKind::Limit => Some(match request.trade {
                TradeKind::QuoteToBase => request.amount_in / request.amount_out,
                TradeKind::BaseToQuote => request.amount_out / request.amount_in,
            }),
        };

        let mut fills = Vec::new();
        let mut remaining = request.amount_in;

        match request.trade {
            TradeKind::QuoteToBase => {
                // Spend quote against the asks, cheapest first.
                let mut asks = book.asks.clone();
                asks.sort_by(|a, b| a.price.cmp(&b.price));
                for level in &mut asks {
                    if remaining <= Decimal::ZERO {
                        break;
                    }
                    if let Some(cap) = cap {
                        if level.price > cap {
                            break;
                        }
                    }
                    let affordable = remaining / level.price;
                    let base = min(level.size, affordable);
                    if base.is_zero() {
                        break;
                    }
                    // Decimal division rounds, so base * price can land a
                    // hair above what is left; clamp so the fills never
                    // sum past the submitted amount_in.
                    let spend = min(base * level.price, remaining);
                    remaining -= spend;
                    level.size -= base;
                    fills.push(FillReport {
                        fill_id: Uuid::new_v4().to_string(),
                        order_id: order_id.clone(),
                        pair: request.pair.clone(),
                        kind: request.kind,
                        trade: request.trade,
                        amount_in: spend,
                        amount_out: base,
                        commission_coin: request.pair.base.clone(),
                        commission: base * self.fee_rate,
                        executed_at: now,
                    });
                }
                book.asks = asks.into_iter().filter(|l| l.size > Decimal::ZERO).collect();
            }
            TradeKind::BaseToQuote => {
                // Sell base into the bids, best first.
                let mut bids = book.bids.clone();
                bids.sort_by(|a, b| b.price.cmp(&a.price));
                for level in &mut bids {
                    if remaining <= Decimal::ZERO {
                        break;
                    }
                    if let Some(cap) = cap {
                        if level.price < cap {
                            break;
                        }
                    }
                    let base = min(level.size, remaining);
                    if base.is_zero() {
                        break;
                    }
                    let proceeds = base * level.price;
                    remaining -= base;
                    level.size -= base;
                    fills.push(FillReport {
                        fill_id: Uuid::new_v4().to_string(),
                        order_id: order_id.clone(),
                        pair: request.pair.clone(),
                        kind: request.kind,
                        trade: request.trade,
                        amount_in: base,
                        amount_out: proceeds,
                        commission_coin: request.pair.quote.clone(),
                        commission: proceeds * self.fee_rate,
                        executed_at: now,
                    });
                }
                book.bids = bids.into_iter().filter(|l| l.size > Decimal::ZERO).collect();
            }
        }
        book.taken_at = now;

        Ok((fills, remaining))
    }

    fn settle_fills(state: &mut SimState, request: &SubmitRequest, fills: &[FillReport]) {
        let in_coin = request.trade.input_coin(&request.pair).clone();
        let out_coin = request.trade.output_coin(&request.pair).clone();
        for fill in fills {
            let debit = state.balances.entry(in_coin.clone()).or_default();
            debit.total -= fill.amount_in;
            let credit = state.balances.entry(out_coin.clone()).or_default();
            credit.total += fill.amount_out;
            let fee = state
                .balances
                .entry(fill.commission_coin.clone())
                .or_default();
            fee.total -= fill.commission;
        }
    }
}

#[async_trait]
impl VenueApi for SimVenue {
    async fn fetch_markets(
        &self,
        _coins_of_interest: &[Symbol],
    ) -> Result<Vec<PairInfo>, VenueError> {
        let state = self.state.lock().await;
        Ok(state
            .books
            .keys()
            .map(|pair| PairInfo {
                base: pair.base.clone(),
                quote: pair.quote.clone(),
            })
            .collect())
    }

    async fn fetch_balances(&self) -> Result<Vec<BalanceReport>, VenueError> {
        let state = self.state.lock().await;
        let now = Utc::now();
        Ok(state
            .balances
            .iter()
            .map(|(coin, bal)| BalanceReport {
                coin: coin.clone(),
                total: bal.total,
                held: bal.held,
                timestamp: now,
            })
            .collect())
    }

    async fn fetch_open_orders(&self) -> Result<Vec<LiveOrder>, VenueError> {
        let state = self.state.lock().await;
        Ok(state.open.values().cloned().collect())
    }

    async fn fetch_trade_history(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<FillReport>, VenueError> {
        let state = self.state.lock().await;
        Ok(state
            .fills
            .iter()
            .filter(|f| f.executed_at >= since)
            .cloned()
            .collect())
    }

    async fn fetch_order_book(
        &self,
        pair: &PairKey,
        depth: usize,
    ) -> Result<BookSnapshot, VenueError> {
        let state = self.state.lock().await;
        let book = state
            .books
            .get(pair)
            .ok_or_else(|| VenueError::Transport(format!("no market {pair}")))?;
        let mut snapshot = book.clone();
        snapshot.bids.sort_by(|a, b| b.price.cmp(&a.price));
        snapshot.asks.sort_by(|a, b| a.price.cmp(&b.price));
        snapshot.bids.truncate(depth);
        snapshot.asks.truncate(depth);
        Ok(snapshot)
    }

    async fn fetch_transfers(&self) -> Result<Vec<TransferReport>, VenueError> {
        // The simulator moves no real funds.
        Ok(Vec::new())
    }

    async fn submit_order(&self, request: &SubmitRequest) -> Result<SubmitAck, VenueError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let order_id = Self::next_order_id(&mut state);

        let (fills, remaining) = self.execute(&mut state, request, now, &order_id)?;
        Self::settle_fills(&mut state, request, &fills);
        state.fills.extend(fills.iter().cloned());

        let resting = remaining > Decimal::ZERO && request.kind == OrderKind::Limit;
        if resting {
            let in_coin = request.trade.input_coin(&request.pair).clone();
            state.balances.entry(in_coin).or_default().held += remaining;
            state.open.insert(
                order_id.clone(),
                LiveOrder {
                    id: order_id.clone(),
                    pair: request.pair.clone(),
                    kind: request.kind,
                    trade: request.trade,
                    amount_in: request.amount_in,
                    amount_out: request.amount_out,
                    remaining_in: remaining,
                    created: now,
                },
            );
        }

        debug!(
            %order_id,
            pair = %request.pair,
            fills = fills.len(),
            %remaining,
            resting,
            "sim order submitted"
        );

        Ok(SubmitAck {
            order_id: if resting || !fills.is_empty() {
                Some(order_id)
            } else {
                None
            },
            fills,
        })
    }

    async fn cancel_order(
        &self,
        _pair: &PairKey,
        order_id: &OrderId,
    ) -> Result<bool, VenueError> {
        let mut state = self.state.lock().await;
        match state.open.remove(order_id) {
            Some(order) => {
                let in_coin = order.trade.input_coin(&order.pair).clone();
                if let Some(bal) = state.balances.get_mut(&in_coin) {
                    bal.held = (bal.held - order.remaining_in).max(Decimal::ZERO);
                }
                debug!(%order_id, "sim order cancelled");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}
