//! Hold ledger and fund partition reconciliation

pub mod funds;
pub mod holds;

pub use funds::{apply_completed_order_to_fund, assign_fund_balance, change_fund_balance};
pub use holds::{Hold, HoldLedger};
