//! The entry point for reading and changing accounts and transactions.
//!
//! Every change runs as one unit of work: the rows are written, the affected
//! account balances are adjusted, and the ownership links are recorded, all
//! inside a single SQLite transaction. If any step fails the whole operation
//! is rolled back.

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    account::{
        Account, AccountForm, AccountName, adjust_balance, find_account_by_name, get_account_for_user,
        insert_account, list_accounts_for_user, soft_delete_account, update_account_details,
    },
    config::{AccountDeletePolicy, LedgerConfig},
    database_id::{AccountId, TransactionId},
    db::{begin_unit_of_work, initialize},
    ownership::{link_account, link_transaction},
    reconcile::{BalanceAudit, account_deltas, audit_balance, balance_delta, balance_edit_effect},
    summary::{Summary, SummaryFilter, summarize},
    timezone::local_today,
    transaction::{
        Transaction, TransactionFields, TransactionForm, get_transaction_for_user,
        insert_transaction, list_transactions_for_account, list_transactions_for_user,
        soft_delete_transaction, update_transaction,
    },
    user::UserId,
};

const ADJUST_BALANCE: &str = "adjust account balance";
const LINK_OWNER: &str = "link owner";

/// Keeps account balances in step with their transactions.
///
/// Cloning a ledger is cheap, clones share the same database connection.
#[derive(Debug, Clone)]
pub struct Ledger {
    connection: Arc<Mutex<Connection>>,
    config: LedgerConfig,
}

impl Ledger {
    /// Create a ledger over `connection`, creating the tables if needed.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::InvalidTimezone] if the configured timezone is unknown,
    /// - [Error::StoreUnavailable] if the database cannot be opened or is locked,
    /// - or [Error::SqlError] if the tables cannot be created.
    pub fn new(connection: Connection, config: LedgerConfig) -> Result<Self, Error> {
        local_today(&config.local_timezone)?;
        initialize(&connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            config,
        })
    }

    /// The configuration the ledger was created with.
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::StoreUnavailable(error.to_string())
        })
    }

    fn today(&self) -> Result<Date, Error> {
        local_today(&self.config.local_timezone)
    }

    /// Run `work` inside one SQLite transaction, committing if it succeeds and
    /// rolling back otherwise.
    ///
    /// `work` receives the time to stamp rows with, so every row written by
    /// one operation gets the same `last_updated`.
    fn unit_of_work<T, F>(&self, operation: &'static str, work: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection, OffsetDateTime) -> Result<T, Error>,
    {
        let connection = self.lock()?;
        let transaction = begin_unit_of_work(&connection)?;

        match work(&*transaction, OffsetDateTime::now_utc()) {
            Ok(value) => {
                transaction
                    .commit()
                    .map_err(|error| Error::from(error).during(operation, "commit"))?;
                tracing::info!("{operation} committed");

                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = transaction.rollback() {
                    tracing::error!("could not roll back {operation}: {rollback_error}");
                }

                match error {
                    Error::ReconciliationFailure { .. } | Error::StoreUnavailable(_) => {
                        tracing::error!("{operation} rolled back: {error}")
                    }
                    _ => tracing::warn!("{operation} rolled back: {error}"),
                }

                Err(error)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------------

    /// Create an account owned by `user_id` and return its ID.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::Validation] if the form is invalid, in which case nothing is written,
    /// - [Error::ReconciliationFailure] if the ownership link cannot be recorded,
    /// - or any other [Error] from the store.
    pub fn create_account(&self, user_id: UserId, form: AccountForm) -> Result<AccountId, Error> {
        const OPERATION: &str = "create account";
        tracing::debug!("{OPERATION} for user {user_id}");

        let fields = form.validate_new()?;

        self.unit_of_work(OPERATION, |connection, now| {
            let account_id = insert_account(&fields, now, connection)?;

            link_account(user_id, account_id, connection)
                .map_err(|error| error.during(OPERATION, LINK_OWNER))?;

            Ok(account_id)
        })
    }

    /// Edit the name, type and balance of an account.
    ///
    /// If the balance changes, a transaction dated today is created to
    /// explain the change and its ID is returned.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::Validation] if the form is invalid, in which case nothing is written,
    /// - [Error::AccountNotFound] if `account_id` does not refer to a live account
    ///   owned by `user_id`,
    /// - [Error::AmountOverflow] if the change in balance does not fit in a decimal,
    /// - [Error::ReconciliationFailure] if the balance adjustment cannot be recorded,
    /// - or any other [Error] from the store.
    pub fn update_account(
        &self,
        user_id: UserId,
        account_id: AccountId,
        form: AccountForm,
    ) -> Result<Option<TransactionId>, Error> {
        const OPERATION: &str = "update account";
        tracing::debug!("{OPERATION} {account_id} for user {user_id}");

        let fields = form.validate_edit()?;
        let today = self.today()?;

        self.unit_of_work(OPERATION, |connection, now| {
            let account = get_account_for_user(user_id, account_id, connection)?;
            let effect = balance_edit_effect(account.balance, fields.balance)?;
            update_account_details(account_id, &fields, now, connection)?;

            let Some(effect) = effect else {
                return Ok(None);
            };

            let adjustment = TransactionFields::balance_adjustment(account_id, effect, today);
            let transaction_id = insert_transaction(&adjustment, now, connection)
                .map_err(|error| error.during(OPERATION, "record balance adjustment"))?;

            balance_delta(None, Some(effect))
                .and_then(|delta| adjust_balance(account_id, delta, now, connection))
                .map_err(|error| error.during(OPERATION, ADJUST_BALANCE))?;

            link_transaction(user_id, transaction_id, connection)
                .map_err(|error| error.during(OPERATION, LINK_OWNER))?;

            Ok(Some(transaction_id))
        })
    }

    /// Delete an account.
    ///
    /// What happens to the account's transactions depends on the configured
    /// [AccountDeletePolicy]. Returns the number of transactions that were
    /// deleted along with the account.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::AccountNotFound] if `account_id` does not refer to a live account
    ///   owned by `user_id`,
    /// - [Error::ReconciliationFailure] if the account's transactions cannot be deleted,
    /// - or any other [Error] from the store.
    pub fn delete_account(&self, user_id: UserId, account_id: AccountId) -> Result<usize, Error> {
        const OPERATION: &str = "delete account";
        tracing::debug!("{OPERATION} {account_id} for user {user_id}");

        let policy = self.config.account_delete_policy;

        self.unit_of_work(OPERATION, |connection, now| {
            get_account_for_user(user_id, account_id, connection)?;
            soft_delete_account(account_id, now, connection)?;

            if policy == AccountDeletePolicy::Orphan {
                return Ok(0);
            }

            let transactions = list_transactions_for_account(account_id, connection)
                .map_err(|error| error.during(OPERATION, "list account transactions"))?;

            for transaction in &transactions {
                let deleted = soft_delete_transaction(transaction.id, now, connection)
                    .map_err(|error| error.during(OPERATION, "delete account transactions"))?;

                balance_delta(Some(deleted.effect), None)
                    .and_then(|delta| adjust_balance(deleted.account_id, delta, now, connection))
                    .map_err(|error| error.during(OPERATION, ADJUST_BALANCE))?;
            }

            Ok(transactions.len())
        })
    }

    /// Retrieve the live accounts owned by `user_id`, ordered by name.
    ///
    /// # Errors
    /// Returns an [Error] if the store cannot be read.
    pub fn list_accounts_for_user(&self, user_id: UserId) -> Result<Vec<Account>, Error> {
        list_accounts_for_user(user_id, &*self.lock()?)
    }

    /// Retrieve a live account owned by `user_id`.
    ///
    /// # Errors
    /// Returns [Error::AccountNotFound] if `account_id` does not refer to a live
    /// account owned by `user_id`.
    pub fn get_account(&self, user_id: UserId, account_id: AccountId) -> Result<Account, Error> {
        get_account_for_user(user_id, account_id, &*self.lock()?)
    }

    /// Find the live account owned by `user_id` called `name`.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::Validation] if `name` is not a valid account name,
    /// - [Error::NotFound] if there is no such account,
    /// - [Error::DuplicateAmbiguity] if more than one account has that name,
    /// - or any other [Error] from the store.
    pub fn find_account_by_name(&self, user_id: UserId, name: &str) -> Result<Account, Error> {
        let name = AccountName::new(name)?;

        find_account_by_name(user_id, &name, &*self.lock()?)
    }

    /// Check the stored balance of an account against its opening balance and
    /// live transactions.
    ///
    /// # Errors
    /// Returns [Error::AccountNotFound] if `account_id` does not refer to a live
    /// account owned by `user_id`.
    pub fn audit_account(
        &self,
        user_id: UserId,
        account_id: AccountId,
    ) -> Result<BalanceAudit, Error> {
        let connection = self.lock()?;
        let account = get_account_for_user(user_id, account_id, &connection)?;
        let transactions = list_transactions_for_account(account_id, &connection)?;

        let audit = audit_balance(
            account.opening_balance,
            account.balance,
            transactions.iter().map(Transaction::effect),
        )?;

        if let BalanceAudit::Discrepancy {
            expected, actual, ..
        } = audit
        {
            tracing::warn!(
                "account {account_id} balance is {actual} but its history adds up to {expected}"
            );
        }

        Ok(audit)
    }

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    /// Record a transaction for `user_id` and apply it to the account balance.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::Validation] if the form is invalid, in which case nothing is written,
    /// - [Error::AccountNotFound] if the account is not a live account owned by `user_id`,
    /// - [Error::ReconciliationFailure] if the balance or ownership link cannot be updated,
    /// - or any other [Error] from the store.
    pub fn create_transaction(
        &self,
        user_id: UserId,
        form: TransactionForm,
    ) -> Result<TransactionId, Error> {
        const OPERATION: &str = "create transaction";
        tracing::debug!("{OPERATION} for user {user_id}");

        let fields = form.validate(self.today()?)?;

        self.unit_of_work(OPERATION, |connection, now| {
            get_account_for_user(user_id, fields.account_id, connection)?;
            let transaction_id = insert_transaction(&fields, now, connection)?;

            balance_delta(None, Some(fields.effect()))
                .and_then(|delta| adjust_balance(fields.account_id, delta, now, connection))
                .map_err(|error| error.during(OPERATION, ADJUST_BALANCE))?;

            link_transaction(user_id, transaction_id, connection)
                .map_err(|error| error.during(OPERATION, LINK_OWNER))?;

            Ok(transaction_id)
        })
    }

    /// Overwrite a transaction and move its effect on account balances from
    /// the old values to the new ones.
    ///
    /// The transaction may be moved to another live account owned by `user_id`.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::Validation] if the form is invalid, in which case nothing is written,
    /// - [Error::TransactionNotFound] if `transaction_id` does not refer to a live
    ///   transaction owned by `user_id`,
    /// - [Error::AccountNotFound] if the transaction is moved to an account that
    ///   is not a live account owned by `user_id`,
    /// - [Error::ReconciliationFailure] if a balance cannot be updated,
    /// - or any other [Error] from the store.
    pub fn update_transaction(
        &self,
        user_id: UserId,
        transaction_id: TransactionId,
        form: TransactionForm,
    ) -> Result<(), Error> {
        const OPERATION: &str = "update transaction";
        tracing::debug!("{OPERATION} {transaction_id} for user {user_id}");

        let fields = form.validate(self.today()?)?;

        self.unit_of_work(OPERATION, |connection, now| {
            let old = get_transaction_for_user(user_id, transaction_id, connection)?;

            if fields.account_id != old.account_id {
                get_account_for_user(user_id, fields.account_id, connection)?;
            }

            update_transaction(transaction_id, &fields, now, connection)?;

            let deltas = account_deltas(
                Some((old.account_id, old.effect())),
                Some((fields.account_id, fields.effect())),
            )
            .map_err(|error| error.during(OPERATION, ADJUST_BALANCE))?;

            for (account_id, delta) in deltas {
                adjust_balance(account_id, delta, now, connection)
                    .map_err(|error| error.during(OPERATION, ADJUST_BALANCE))?;
            }

            Ok(())
        })
    }

    /// Delete a transaction and reverse its effect on the account balance.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::TransactionNotFound] if `transaction_id` does not refer to a live
    ///   transaction owned by `user_id`,
    /// - [Error::ReconciliationFailure] if the balance cannot be updated,
    /// - or any other [Error] from the store.
    pub fn delete_transaction(
        &self,
        user_id: UserId,
        transaction_id: TransactionId,
    ) -> Result<(), Error> {
        const OPERATION: &str = "delete transaction";
        tracing::debug!("{OPERATION} {transaction_id} for user {user_id}");

        self.unit_of_work(OPERATION, |connection, now| {
            get_transaction_for_user(user_id, transaction_id, connection)?;
            let deleted = soft_delete_transaction(transaction_id, now, connection)?;

            balance_delta(Some(deleted.effect), None)
                .and_then(|delta| adjust_balance(deleted.account_id, delta, now, connection))
                .map_err(|error| error.during(OPERATION, ADJUST_BALANCE))?;

            Ok(())
        })
    }

    /// Retrieve the live transactions owned by `user_id`, newest first.
    ///
    /// # Errors
    /// Returns an [Error] if the store cannot be read.
    pub fn list_transactions_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>, Error> {
        list_transactions_for_user(user_id, &*self.lock()?)
    }

    /// Retrieve a live transaction owned by `user_id`.
    ///
    /// # Errors
    /// Returns [Error::TransactionNotFound] if `transaction_id` does not refer to
    /// a live transaction owned by `user_id`.
    pub fn get_transaction(
        &self,
        user_id: UserId,
        transaction_id: TransactionId,
    ) -> Result<Transaction, Error> {
        get_transaction_for_user(user_id, transaction_id, &*self.lock()?)
    }

    /// Total up the income and expenses of `user_id`.
    ///
    /// # Errors
    /// Returns an [Error] if the store cannot be read, or
    /// [Error::AmountOverflow] if a total does not fit in a decimal.
    pub fn summarize(&self, user_id: UserId, filter: &SummaryFilter) -> Result<Summary, Error> {
        let connection = self.lock()?;
        let accounts = list_accounts_for_user(user_id, &connection)?;
        let transactions = list_transactions_for_user(user_id, &connection)?;

        summarize(&accounts, &transactions, filter)
    }
}
