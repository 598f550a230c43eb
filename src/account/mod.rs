//! Accounts: where money is kept.
//!
//! This module contains the `Account` model, the form used to create and edit
//! accounts, and the database functions for storing and querying them.

mod core;

pub use core::{
    Account, AccountForm, AccountName, AccountType, MAX_ACCOUNT_NAME_LENGTH, adjust_balance,
    create_account_table, find_account_by_name, get_account_for_user, insert_account,
    list_accounts_for_user, soft_delete_account, update_account_details,
};
