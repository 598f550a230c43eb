//! Balance Book keeps track of personal accounts and the money moving in and
//! out of them.
//!
//! Each account's balance is kept in step with its transactions: creating,
//! editing or deleting a transaction adjusts the balance of the account it is
//! applied to, and editing an account's balance directly records a
//! transaction that explains the change. Every change happens inside one
//! SQLite transaction so a failure part way through never leaves a balance
//! out of step with its history.
//!
//! Start with [Ledger].

#![warn(missing_docs)]

mod account;
mod config;
mod database_id;
mod db;
mod error;
mod ledger;
mod logging;
mod ownership;
mod reconcile;
mod summary;
mod timezone;
mod transaction;
mod user;

pub use account::{Account, AccountForm, AccountName, AccountType, MAX_ACCOUNT_NAME_LENGTH};
pub use config::{AccountDeletePolicy, DEFAULT_TIMEZONE, LedgerConfig};
pub use database_id::{AccountId, DatabaseId, TransactionId};
pub use db::initialize as initialize_db;
pub use error::{Error, ErrorCategory, ValidationError};
pub use ledger::Ledger;
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
pub use reconcile::{BalanceAudit, Effect, balance_delta};
pub use summary::{DEFAULT_LARGEST_EXPENSES, Summary, SummaryFilter};
pub use timezone::local_today;
pub use transaction::{
    BALANCE_ADJUSTMENT_NOTE, MAX_NOTE_LENGTH, Note, Transaction, TransactionForm, TransactionType,
};
pub use user::UserId;
