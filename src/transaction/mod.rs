//! Transactions: money earned or spent through an account.
//!
//! This module contains the `Transaction` model, the form used to create and
//! edit transactions, and the database functions for storing and querying them.
//! The functions here never touch account balances, see [crate::ledger].

mod core;

pub use core::{
    BALANCE_ADJUSTMENT_NOTE, MAX_NOTE_LENGTH, Note, Transaction, TransactionFields,
    TransactionForm, TransactionType, create_transaction_table, get_transaction_for_user,
    insert_transaction, list_transactions_for_account, list_transactions_for_user,
    soft_delete_transaction, update_transaction,
};

#[cfg(test)]
pub use core::count_transactions;
