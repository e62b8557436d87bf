//! Shared data model for spinledger.

pub mod casino;
pub mod ledger;

pub use ledger::{Account, AccountInvariantError, Transaction, TransactionType};
