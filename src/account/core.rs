//! Defines the core data models and database queries for accounts.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row, params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use unicode_segmentation::UnicodeSegmentation;

use crate::{
    Error,
    database_id::AccountId,
    db::{decimal_to_sql, get_decimal},
    error::ValidationError,
    user::UserId,
};

// ============================================================================
// MODELS
// ============================================================================

/// The maximum number of characters (grapheme clusters) in an account name.
pub const MAX_ACCOUNT_NAME_LENGTH: usize = 30;

/// A validated, non-empty account name of at most [MAX_ACCOUNT_NAME_LENGTH] characters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct AccountName(String);

impl AccountName {
    /// Create an account name.
    ///
    /// Leading and trailing whitespace is removed.
    ///
    /// # Errors
    ///
    /// This function will return a:
    /// - [ValidationError::EmptyAccountName] if `name` is empty or only whitespace,
    /// - or [ValidationError::AccountNameTooLong] if `name` is longer than [MAX_ACCOUNT_NAME_LENGTH].
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        let length = name.graphemes(true).count();

        if name.is_empty() {
            Err(ValidationError::EmptyAccountName)
        } else if length > MAX_ACCOUNT_NAME_LENGTH {
            Err(ValidationError::AccountNameTooLong(length))
        } else {
            Ok(Self(name.to_string()))
        }
    }

    /// Create an account name without validation.
    ///
    /// The caller should ensure that the string is not empty and not too long.
    ///
    /// This function has `_unchecked` in the name but is not `unsafe`, because if the invariants
    /// are violated it will cause incorrect behaviour but not affect memory safety.
    pub fn new_unchecked(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for AccountName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccountName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountName::new(s)
    }
}

impl Display for AccountName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of account holds the money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Physical cash, e.g. a wallet.
    Cash,
    /// A savings account.
    Savings,
    /// An everyday transaction account.
    Checking,
}

impl AccountType {
    /// The name the type is stored under.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Cash => "Cash",
            AccountType::Savings => "Savings",
            AccountType::Checking => "Checking",
        }
    }
}

impl Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cash" => Ok(AccountType::Cash),
            "savings" => Ok(AccountType::Savings),
            "checking" => Ok(AccountType::Checking),
            other => Err(format!(
                "unknown account type \"{other}\", expected one of cash, savings or checking"
            )),
        }
    }
}

impl ToSql for AccountType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AccountType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}

/// A place money is kept, e.g. a wallet or a bank account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    /// The ID of the account.
    pub id: AccountId,
    /// The display name of the account.
    pub name: AccountName,
    /// What kind of account this is.
    #[serde(rename = "type")]
    pub account_type: AccountType,
    /// The current balance.
    ///
    /// Maintained incrementally from the transactions applied to the account.
    pub balance: Decimal,
    /// The balance the account was created with.
    pub opening_balance: Decimal,
    /// Whether the account has been soft-deleted.
    pub deleted: bool,
    /// When the account row was last written.
    pub last_updated: OffsetDateTime,
}

/// The fields a caller submits to create or edit an account.
///
/// Required fields are optional here so that a missing value can be reported
/// as a validation error rather than failing to parse.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountForm {
    /// The display name of the account.
    pub name: Option<String>,
    /// What kind of account this is.
    #[serde(rename = "type")]
    pub account_type: AccountType,
    /// The opening balance when creating, or the new balance when editing.
    pub balance: Option<Decimal>,
}

impl AccountForm {
    /// Create a form with every field filled in.
    pub fn new(name: &str, account_type: AccountType, balance: Decimal) -> Self {
        Self {
            name: Some(name.to_owned()),
            account_type,
            balance: Some(balance),
        }
    }

    /// Validate the form for creating a new account.
    ///
    /// # Errors
    /// Returns a [ValidationError] if the name or balance is missing or
    /// invalid, or if the balance is negative.
    pub fn validate_new(self) -> Result<AccountFields, ValidationError> {
        let fields = self.validate()?;

        if fields.balance < Decimal::ZERO {
            return Err(ValidationError::NegativeOpeningBalance(fields.balance));
        }

        Ok(fields)
    }

    /// Validate the form for editing an existing account.
    ///
    /// Unlike [AccountForm::validate_new], negative balances are accepted.
    ///
    /// # Errors
    /// Returns a [ValidationError] if the name or balance is missing or invalid.
    pub fn validate_edit(self) -> Result<AccountFields, ValidationError> {
        self.validate()
    }

    fn validate(self) -> Result<AccountFields, ValidationError> {
        let name = self.name.ok_or(ValidationError::MissingAccountName)?;
        let name = AccountName::new(&name)?;
        let balance = self.balance.ok_or(ValidationError::MissingBalance)?;

        Ok(AccountFields {
            name,
            account_type: self.account_type,
            balance,
        })
    }
}

/// Validated account fields, ready to be written to the database.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountFields {
    /// The display name of the account.
    pub name: AccountName,
    /// What kind of account this is.
    pub account_type: AccountType,
    /// The opening balance when creating, or the requested balance when editing.
    pub balance: Decimal,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the account table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS account (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('Cash', 'Savings', 'Checking')),
            balance TEXT NOT NULL,
            opening_balance TEXT NOT NULL,
            deleted INTEGER NOT NULL DEFAULT 0,
            last_updated TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_account_name ON account(name);",
    )?;

    Ok(())
}

const ACCOUNT_COLUMNS: &str =
    "account.id, account.name, account.type, account.balance, account.opening_balance, \
    account.deleted, account.last_updated";

/// Map a database row to an [Account].
///
/// The row must contain the columns in [ACCOUNT_COLUMNS] order.
fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    let id = row.get(0)?;
    let raw_name: String = row.get(1)?;
    let account_type = row.get(2)?;
    let balance = get_decimal(row, 3)?;
    let opening_balance = get_decimal(row, 4)?;
    let deleted = row.get(5)?;
    let last_updated = row.get(6)?;

    Ok(Account {
        id,
        name: AccountName::new_unchecked(&raw_name),
        account_type,
        balance,
        opening_balance,
        deleted,
        last_updated,
    })
}

/// Insert a new account and return its generated ID.
///
/// The opening balance is recorded alongside the balance so the balance can
/// later be audited against the account's transactions.
///
/// # Errors
/// Returns an [Error::SqlError] if there is some SQL error.
pub fn insert_account(
    fields: &AccountFields,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<AccountId, Error> {
    let balance = decimal_to_sql(fields.balance);

    connection
        .prepare(
            "INSERT INTO account (name, type, balance, opening_balance, deleted, last_updated)
             VALUES (?1, ?2, ?3, ?3, 0, ?4)
             RETURNING id",
        )?
        .query_row(
            params![fields.name.as_ref(), fields.account_type, balance, now],
            |row| row.get(0),
        )
        .map_err(Error::from)
}

/// Retrieve a live (not soft-deleted) account by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if `id` does not refer to a live account,
/// - or [Error::SqlError] there is some other SQL error.
#[cfg(test)]
pub fn get_account(id: AccountId, connection: &Connection) -> Result<Account, Error> {
    connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = :id AND deleted = 0"
        ))?
        .query_row(&[(":id", &id)], map_row_to_account)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::AccountNotFound(id),
            error => error.into(),
        })
}

/// Retrieve a live account by its `id` if it is owned by `user_id`.
///
/// Accounts owned by other users are reported as missing.
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if `id` does not refer to a live account owned by `user_id`,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_account_for_user(
    user_id: UserId,
    id: AccountId,
    connection: &Connection,
) -> Result<Account, Error> {
    connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account
             INNER JOIN user_account ON user_account.account_id = account.id
             WHERE account.id = :id AND user_account.user_id = :user_id AND account.deleted = 0"
        ))?
        .query_row(
            rusqlite::named_params! {":id": id, ":user_id": user_id},
            map_row_to_account,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::AccountNotFound(id),
            error => error.into(),
        })
}

/// Overwrite the name and type of an account.
///
/// The balance is deliberately left alone: balance changes go through
/// [adjust_balance] so that each one is explained by a transaction.
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if `id` does not refer to a live account,
/// - or [Error::SqlError] there is some other SQL error.
pub fn update_account_details(
    id: AccountId,
    fields: &AccountFields,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE account
        SET \
            name = ?1, \
            type = ?2, \
            last_updated = ?3 \
        WHERE id = ?4 AND deleted = 0;",
        params![fields.name.as_ref(), fields.account_type, now, id],
    )?;

    if rows_affected == 0 {
        return Err(Error::AccountNotFound(id));
    }

    Ok(())
}

/// Add `delta` to the stored balance of an account and return the new balance.
///
/// Soft-deleted accounts are still adjusted: an orphaned transaction that is
/// edited or deleted later must still have its effect reversed on the account
/// it was applied to.
///
/// Must be called inside a unit of work that already holds the write lock,
/// see [crate::db].
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if `id` does not refer to an account,
/// - [Error::AmountOverflow] if the new balance does not fit in a [Decimal],
/// - or [Error::SqlError] there is some other SQL error.
pub fn adjust_balance(
    id: AccountId,
    delta: Decimal,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<Decimal, Error> {
    let current = connection
        .query_row(
            "SELECT balance FROM account WHERE id = ?1",
            [id],
            |row| get_decimal(row, 0),
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::AccountNotFound(id),
            error => error.into(),
        })?;

    let Some(updated) = current.checked_add(delta) else {
        tracing::warn!("account {id} balance {current} cannot absorb delta {delta}");
        return Err(Error::AmountOverflow);
    };

    connection.execute(
        "UPDATE account SET balance = ?1, last_updated = ?2 WHERE id = ?3",
        params![decimal_to_sql(updated), now, id],
    )?;

    tracing::debug!("account {id} balance {current} -> {updated} (delta {delta})");

    Ok(updated)
}

/// Mark an account as deleted.
///
/// Transactions and ownership links are left untouched.
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if `id` does not refer to a live account,
/// - or [Error::SqlError] there is some other SQL error.
pub fn soft_delete_account(
    id: AccountId,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE account SET deleted = 1, last_updated = ?1 WHERE id = ?2 AND deleted = 0",
        params![now, id],
    )?;

    if rows_affected == 0 {
        return Err(Error::AccountNotFound(id));
    }

    Ok(())
}

/// Retrieve the live accounts owned by `user_id`, ordered by name.
///
/// # Errors
/// Returns an [Error::SqlError] if there is some SQL error.
pub fn list_accounts_for_user(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<Account>, Error> {
    connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account
             INNER JOIN user_account ON user_account.account_id = account.id
             WHERE user_account.user_id = :user_id AND account.deleted = 0
             ORDER BY account.name ASC, account.id ASC"
        ))?
        .query_map(&[(":user_id", &user_id)], map_row_to_account)?
        .map(|maybe_account| maybe_account.map_err(|error| error.into()))
        .collect()
}

/// Find the live account owned by `user_id` called `name`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if no live account has that name,
/// - [Error::DuplicateAmbiguity] if more than one live account has that name,
/// - or [Error::SqlError] there is some other SQL error.
pub fn find_account_by_name(
    user_id: UserId,
    name: &AccountName,
    connection: &Connection,
) -> Result<Account, Error> {
    let mut matches: Vec<Account> = connection
        .prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM account
             INNER JOIN user_account ON user_account.account_id = account.id
             WHERE user_account.user_id = :user_id AND account.name = :name
                AND account.deleted = 0
             ORDER BY account.last_updated DESC, account.id DESC"
        ))?
        .query_map(
            rusqlite::named_params! {":user_id": user_id, ":name": name.as_ref()},
            map_row_to_account,
        )?
        .collect::<Result<_, _>>()?;

    match matches.len() {
        0 => Err(Error::NotFound),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::DuplicateAmbiguity {
            entity: "account",
            candidates: matches.iter().map(|account| account.id).collect(),
        }),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod account_name_tests {
    use crate::error::ValidationError;

    use super::{AccountName, MAX_ACCOUNT_NAME_LENGTH};

    #[test]
    fn new_fails_on_empty_string() {
        assert_eq!(AccountName::new(""), Err(ValidationError::EmptyAccountName));
    }

    #[test]
    fn new_fails_on_just_whitespace() {
        assert_eq!(
            AccountName::new("\n\t \r"),
            Err(ValidationError::EmptyAccountName)
        );
    }

    #[test]
    fn new_trims_whitespace() {
        assert_eq!(AccountName::new("  Wallet ").unwrap().as_ref(), "Wallet");
    }

    #[test]
    fn new_accepts_name_at_limit() {
        let name = "a".repeat(MAX_ACCOUNT_NAME_LENGTH);

        assert!(AccountName::new(&name).is_ok());
    }

    #[test]
    fn new_fails_on_long_name() {
        let name = "a".repeat(MAX_ACCOUNT_NAME_LENGTH + 1);

        assert_eq!(
            AccountName::new(&name),
            Err(ValidationError::AccountNameTooLong(MAX_ACCOUNT_NAME_LENGTH + 1))
        );
    }

    #[test]
    fn length_counts_graphemes_not_bytes() {
        let name = "🔥".repeat(MAX_ACCOUNT_NAME_LENGTH);

        assert!(AccountName::new(&name).is_ok());
    }
}

#[cfg(test)]
mod account_form_tests {
    use rust_decimal_macros::dec;

    use crate::error::ValidationError;

    use super::{AccountForm, AccountType};

    #[test]
    fn missing_name_is_rejected() {
        let form = AccountForm {
            name: None,
            account_type: AccountType::Cash,
            balance: Some(dec!(1)),
        };

        assert_eq!(form.validate_new(), Err(ValidationError::MissingAccountName));
    }

    #[test]
    fn missing_balance_is_rejected() {
        let form = AccountForm {
            name: Some("Wallet".to_owned()),
            account_type: AccountType::Cash,
            balance: None,
        };

        assert_eq!(form.validate_new(), Err(ValidationError::MissingBalance));
    }

    #[test]
    fn negative_opening_balance_is_rejected() {
        let form = AccountForm::new("Wallet", AccountType::Cash, dec!(-0.01));

        assert_eq!(
            form.validate_new(),
            Err(ValidationError::NegativeOpeningBalance(dec!(-0.01)))
        );
    }

    #[test]
    fn negative_balance_is_accepted_when_editing() {
        let form = AccountForm::new("Wallet", AccountType::Cash, dec!(-20));

        assert_eq!(form.validate_edit().unwrap().balance, dec!(-20));
    }

    #[test]
    fn zero_opening_balance_is_accepted() {
        let form = AccountForm::new("Wallet", AccountType::Cash, dec!(0));

        assert!(form.validate_new().is_ok());
    }

    #[test]
    fn parses_account_type_case_insensitively() {
        assert_eq!("SAVINGS".parse(), Ok(AccountType::Savings));
        assert!("credit".parse::<AccountType>().is_err());
    }
}
