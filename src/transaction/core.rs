//! Defines the core data models and database queries for transactions.

use std::{fmt::Display, str::FromStr};

use rusqlite::{
    Connection, Row, params,
    types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use unicode_segmentation::UnicodeSegmentation;

use crate::{
    Error,
    database_id::{AccountId, TransactionId},
    db::{decimal_to_sql, get_decimal},
    error::ValidationError,
    reconcile::Effect,
    user::UserId,
};

// ============================================================================
// MODELS
// ============================================================================

/// The maximum number of characters (grapheme clusters) in a transaction note.
pub const MAX_NOTE_LENGTH: usize = 256;

/// The note attached to transactions that the ledger creates to explain a
/// direct edit of an account's balance.
pub const BALANCE_ADJUSTMENT_NOTE: &str = "Automatic balance adjustment";

/// Whether money came into or went out of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Money earned, increases the account balance.
    Income,
    /// Money spent, decreases the account balance.
    Expense,
}

impl TransactionType {
    /// The name the type is stored under.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "Income",
            TransactionType::Expense => "Expense",
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            other => Err(format!(
                "unknown transaction type \"{other}\", expected income or expense"
            )),
        }
    }
}

impl ToSql for TransactionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|error: String| FromSqlError::Other(error.into()))
    }
}

/// A free text note of at most [MAX_NOTE_LENGTH] characters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Note(String);

impl Note {
    /// Create a note, treating blank text as no note at all.
    ///
    /// # Errors
    ///
    /// This function will return a [ValidationError::NoteTooLong] if `text` is
    /// longer than [MAX_NOTE_LENGTH].
    pub fn new(text: &str) -> Result<Option<Self>, ValidationError> {
        let text = text.trim();

        if text.is_empty() {
            return Ok(None);
        }

        let length = text.graphemes(true).count();

        if length > MAX_NOTE_LENGTH {
            return Err(ValidationError::NoteTooLong(length));
        }

        Ok(Some(Self(text.to_owned())))
    }

    /// Create a note without validation.
    ///
    /// The caller should ensure that the string is not blank and not too long.
    pub fn new_unchecked(text: &str) -> Self {
        Self(text.to_owned())
    }
}

impl AsRef<str> for Note {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Note {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An expense or income, i.e. an event where money was either spent or earned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// The ID of the transaction.
    pub id: TransactionId,
    /// The account the money moved in or out of.
    pub account_id: AccountId,
    /// Whether the money was earned or spent.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// When the transaction happened.
    pub date: Date,
    /// How much money moved. Always positive.
    pub amount: Decimal,
    /// What the transaction was for.
    pub note: Option<Note>,
    /// Whether the transaction has been soft-deleted.
    pub deleted: bool,
    /// When the transaction row was last written.
    pub last_updated: OffsetDateTime,
}

impl Transaction {
    /// The balance effect of the transaction.
    pub fn effect(&self) -> Effect {
        Effect::new(self.transaction_type, self.amount)
    }
}

/// The fields a caller submits to create or edit a transaction.
///
/// Required fields are optional here so that a missing value can be reported
/// as a validation error rather than failing to parse.
///
/// To fill in every field, use [TransactionForm::build].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TransactionForm {
    /// The account the money moved in or out of.
    pub account_id: Option<AccountId>,
    /// Whether the money was earned or spent.
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    /// When the transaction happened. Must not be in the future.
    pub date: Date,
    /// How much money moved. Must be greater than zero.
    pub amount: Option<Decimal>,
    /// What the transaction was for. Blank notes are stored as no note.
    #[serde(default)]
    pub note: Option<String>,
}

impl TransactionForm {
    /// Create a form with every required field filled in and no note.
    pub fn build(
        account_id: AccountId,
        transaction_type: TransactionType,
        amount: Decimal,
        date: Date,
    ) -> Self {
        Self {
            account_id: Some(account_id),
            transaction_type,
            date,
            amount: Some(amount),
            note: None,
        }
    }

    /// Set the note for the transaction.
    pub fn note(mut self, note: &str) -> Self {
        self.note = Some(note.to_owned());
        self
    }

    /// Validate the form.
    ///
    /// `today` is the current date in the user's timezone.
    ///
    /// # Errors
    /// Returns a [ValidationError] if the account or amount is missing, the
    /// amount is not positive, the date is after `today`, or the note is too long.
    pub fn validate(self, today: Date) -> Result<TransactionFields, ValidationError> {
        let account_id = self.account_id.ok_or(ValidationError::MissingAccount)?;
        let amount = self.amount.ok_or(ValidationError::MissingAmount)?;

        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount));
        }

        if self.date > today {
            return Err(ValidationError::FutureDate(self.date));
        }

        let note = match self.note {
            Some(text) => Note::new(&text)?,
            None => None,
        };

        Ok(TransactionFields {
            account_id,
            transaction_type: self.transaction_type,
            date: self.date,
            amount,
            note,
        })
    }
}

/// Validated transaction fields, ready to be written to the database.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionFields {
    /// The account the money moved in or out of.
    pub account_id: AccountId,
    /// Whether the money was earned or spent.
    pub transaction_type: TransactionType,
    /// When the transaction happened.
    pub date: Date,
    /// How much money moved. Always positive.
    pub amount: Decimal,
    /// What the transaction was for.
    pub note: Option<Note>,
}

impl TransactionFields {
    /// The transaction that explains a direct edit of an account's balance.
    pub fn balance_adjustment(account_id: AccountId, effect: Effect, today: Date) -> Self {
        Self {
            account_id,
            transaction_type: effect.transaction_type,
            date: today,
            amount: effect.amount,
            note: Some(Note::new_unchecked(BALANCE_ADJUSTMENT_NOTE)),
        }
    }

    /// The balance effect of the transaction.
    pub fn effect(&self) -> Effect {
        Effect::new(self.transaction_type, self.amount)
    }
}

/// What remains of a transaction after it has been soft-deleted: enough to
/// reverse its effect on the account balance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeletedTransaction {
    /// The account the transaction was applied to.
    pub account_id: AccountId,
    /// The balance effect that was applied.
    pub effect: Effect,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS \"transaction\" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('Income', 'Expense')),
            date TEXT NOT NULL,
            amount TEXT NOT NULL,
            note TEXT,
            deleted INTEGER NOT NULL DEFAULT 0,
            last_updated TEXT NOT NULL,
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE RESTRICT
        );

        CREATE INDEX IF NOT EXISTS idx_transaction_account ON \"transaction\"(account_id, deleted);
        CREATE INDEX IF NOT EXISTS idx_transaction_date ON \"transaction\"(date, last_updated);",
    )?;

    Ok(())
}

const TRANSACTION_COLUMNS: &str = "\"transaction\".id, \"transaction\".account_id, \
    \"transaction\".type, \"transaction\".date, \"transaction\".amount, \"transaction\".note, \
    \"transaction\".deleted, \"transaction\".last_updated";

/// Map a database row to a [Transaction].
fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let account_id = row.get(1)?;
    let transaction_type = row.get(2)?;
    let date = row.get(3)?;
    let amount = get_decimal(row, 4)?;
    let raw_note: Option<String> = row.get(5)?;
    let deleted = row.get(6)?;
    let last_updated = row.get(7)?;

    Ok(Transaction {
        id,
        account_id,
        transaction_type,
        date,
        amount,
        note: raw_note.as_deref().map(Note::new_unchecked),
        deleted,
        last_updated,
    })
}

/// Insert a new transaction and return its generated ID.
///
/// This only records the transaction, the caller is responsible for applying
/// its effect to the account balance.
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if the account does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn insert_transaction(
    fields: &TransactionFields,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<TransactionId, Error> {
    connection
        .prepare(
            "INSERT INTO \"transaction\" (account_id, type, date, amount, note, deleted, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
             RETURNING id",
        )?
        .query_row(
            params![
                fields.account_id,
                fields.transaction_type,
                fields.date,
                decimal_to_sql(fields.amount),
                fields.note.as_ref().map(|note| note.as_ref()),
                now,
            ],
            |row| row.get(0),
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::AccountNotFound(fields.account_id),
            error => error.into(),
        })
}

/// Retrieve a live (not soft-deleted) transaction by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::TransactionNotFound] if `id` does not refer to a live transaction,
/// - or [Error::SqlError] there is some other SQL error.
#[cfg(test)]
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\" WHERE id = :id AND deleted = 0"
        ))?
        .query_row(&[(":id", &id)], map_transaction_row)
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::TransactionNotFound(id),
            error => error.into(),
        })
}

/// Retrieve a live transaction by its `id` if it is owned by `user_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::TransactionNotFound] if `id` does not refer to a live transaction owned by `user_id`,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction_for_user(
    user_id: UserId,
    id: TransactionId,
    connection: &Connection,
) -> Result<Transaction, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
             INNER JOIN user_transaction ON user_transaction.transaction_id = \"transaction\".id
             WHERE \"transaction\".id = :id AND user_transaction.user_id = :user_id
                AND \"transaction\".deleted = 0"
        ))?
        .query_row(
            rusqlite::named_params! {":id": id, ":user_id": user_id},
            map_transaction_row,
        )
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::TransactionNotFound(id),
            error => error.into(),
        })
}

/// Overwrite every field of a transaction.
///
/// The repository does not compare the old and new values, callers that need
/// the previous balance effect must read it before calling this.
///
/// # Errors
/// This function will return a:
/// - [Error::TransactionNotFound] if `id` does not refer to a live transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn update_transaction(
    id: TransactionId,
    fields: &TransactionFields,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<(), Error> {
    let rows_affected = connection.execute(
        "UPDATE \"transaction\"
        SET \
            account_id = ?1, \
            type = ?2, \
            date = ?3, \
            amount = ?4, \
            note = ?5, \
            last_updated = ?6 \
        WHERE id = ?7 AND deleted = 0;",
        params![
            fields.account_id,
            fields.transaction_type,
            fields.date,
            decimal_to_sql(fields.amount),
            fields.note.as_ref().map(|note| note.as_ref()),
            now,
            id,
        ],
    )?;

    if rows_affected == 0 {
        return Err(Error::TransactionNotFound(id));
    }

    Ok(())
}

/// Mark a transaction as deleted and return what is needed to reverse its
/// balance effect.
///
/// # Errors
/// This function will return a:
/// - [Error::TransactionNotFound] if `id` does not refer to a live transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn soft_delete_transaction(
    id: TransactionId,
    now: OffsetDateTime,
    connection: &Connection,
) -> Result<DeletedTransaction, Error> {
    connection
        .prepare(
            "UPDATE \"transaction\" SET deleted = 1, last_updated = ?1
             WHERE id = ?2 AND deleted = 0
             RETURNING account_id, type, amount",
        )?
        .query_row(params![now, id], |row| {
            Ok(DeletedTransaction {
                account_id: row.get(0)?,
                effect: Effect::new(row.get(1)?, get_decimal(row, 2)?),
            })
        })
        .map_err(|error| match error {
            rusqlite::Error::QueryReturnedNoRows => Error::TransactionNotFound(id),
            error => error.into(),
        })
}

/// Retrieve the live transactions owned by `user_id`.
///
/// Transactions are ordered newest first by date, and transactions on the
/// same date are ordered by the most recent edit.
///
/// # Errors
/// Returns an [Error::SqlError] if there is some SQL error.
pub fn list_transactions_for_user(
    user_id: UserId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
             INNER JOIN user_transaction ON user_transaction.transaction_id = \"transaction\".id
             WHERE user_transaction.user_id = :user_id AND \"transaction\".deleted = 0
             ORDER BY \"transaction\".date DESC, \"transaction\".last_updated DESC, \
                \"transaction\".id DESC"
        ))?
        .query_map(&[(":user_id", &user_id)], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Retrieve every live transaction applied to an account, oldest first.
///
/// Ownership is not checked.
///
/// # Errors
/// Returns an [Error::SqlError] if there is some SQL error.
pub fn list_transactions_for_account(
    account_id: AccountId,
    connection: &Connection,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM \"transaction\"
             WHERE account_id = :account_id AND deleted = 0
             ORDER BY date ASC, id ASC"
        ))?
        .query_map(&[(":account_id", &account_id)], map_transaction_row)?
        .map(|maybe_transaction| maybe_transaction.map_err(|error| error.into()))
        .collect()
}

/// Get the total number of transactions in the database, including deleted ones.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
#[cfg(test)]
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM \"transaction\";", [], |row| {
            row.get(0)
        })
        .map_err(|error| error.into())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod form_tests {
    use rust_decimal_macros::dec;
    use time::macros::date;

    use crate::error::ValidationError;

    use super::{MAX_NOTE_LENGTH, Note, TransactionForm, TransactionType};

    const TODAY: time::Date = date!(2025 - 10 - 05);

    #[test]
    fn missing_account_is_rejected() {
        let mut form = TransactionForm::build(1, TransactionType::Income, dec!(5), TODAY);
        form.account_id = None;

        assert_eq!(form.validate(TODAY), Err(ValidationError::MissingAccount));
    }

    #[test]
    fn missing_amount_is_rejected() {
        let mut form = TransactionForm::build(1, TransactionType::Income, dec!(5), TODAY);
        form.amount = None;

        assert_eq!(form.validate(TODAY), Err(ValidationError::MissingAmount));
    }

    #[test]
    fn zero_amount_is_rejected() {
        let form = TransactionForm::build(1, TransactionType::Expense, dec!(0), TODAY);

        assert_eq!(
            form.validate(TODAY),
            Err(ValidationError::NonPositiveAmount(dec!(0)))
        );
    }

    #[test]
    fn future_date_is_rejected() {
        let tomorrow = date!(2025 - 10 - 06);
        let form = TransactionForm::build(1, TransactionType::Expense, dec!(1), tomorrow);

        assert_eq!(
            form.validate(TODAY),
            Err(ValidationError::FutureDate(tomorrow))
        );
    }

    #[test]
    fn today_is_accepted() {
        let form = TransactionForm::build(1, TransactionType::Expense, dec!(1), TODAY);

        assert!(form.validate(TODAY).is_ok());
    }

    #[test]
    fn blank_note_becomes_none() {
        let form =
            TransactionForm::build(1, TransactionType::Expense, dec!(1), TODAY).note("   ");

        assert_eq!(form.validate(TODAY).unwrap().note, None);
    }

    #[test]
    fn long_note_is_rejected() {
        let note = "x".repeat(MAX_NOTE_LENGTH + 1);

        assert_eq!(
            Note::new(&note),
            Err(ValidationError::NoteTooLong(MAX_NOTE_LENGTH + 1))
        );
        assert!(Note::new(&"x".repeat(MAX_NOTE_LENGTH)).is_ok());
    }
}
