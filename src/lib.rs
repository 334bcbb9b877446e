//! venuesync: multi-exchange market aggregation and order service
//!
//! One writer task per exchange owns its [`view::MarketView`]; a
//! scheduler task feeds it fetched venue data, and callers reach it
//! through an [`exchange::ExchangeHandle`]. Trading goes through hold
//! accounting in [`ledger`] so concurrent strategies cannot overspend a
//! fund, and a [`venue::sim::SimVenue`] slots in for back-testing.

pub mod cli;
pub mod config;
pub mod errors;
pub mod exchange;
pub mod ledger;
pub mod lifecycle;
pub mod logging;
pub mod reconcile;
pub mod scheduler;
pub mod store;
pub mod types;
pub mod venue;
pub mod view;
