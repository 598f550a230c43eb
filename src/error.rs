//! Defines the crate level error type and how store errors map onto it.

use rust_decimal::Decimal;
use time::Date;

use crate::database_id::{AccountId, TransactionId};

/// A field-level problem with the input to an operation.
///
/// These are always detected before anything is written to the store, so no
/// rollback is needed when one is returned.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    /// The account name was not provided.
    #[error("account name is required")]
    MissingAccountName,

    /// The account name was provided but is empty once whitespace is trimmed.
    #[error("account name cannot be empty")]
    EmptyAccountName,

    /// The account name is longer than [crate::account::MAX_ACCOUNT_NAME_LENGTH].
    #[error("account name is {0} characters long, the limit is {limit}", limit = crate::account::MAX_ACCOUNT_NAME_LENGTH)]
    AccountNameTooLong(usize),

    /// The account balance was not provided.
    #[error("account balance is required")]
    MissingBalance,

    /// An account was created with a balance below zero.
    #[error("an account cannot be opened with a negative balance ({0})")]
    NegativeOpeningBalance(Decimal),

    /// The account for a transaction was not provided.
    #[error("a transaction must belong to an account")]
    MissingAccount,

    /// The transaction amount was not provided.
    #[error("transaction amount is required")]
    MissingAmount,

    /// The transaction amount was zero or negative.
    ///
    /// Whether money came in or went out is expressed by the transaction type,
    /// so amounts are always positive.
    #[error("transaction amount must be greater than zero, got {0}")]
    NonPositiveAmount(Decimal),

    /// The note is longer than [crate::transaction::MAX_NOTE_LENGTH].
    #[error("note is {0} characters long, the limit is {limit}", limit = crate::transaction::MAX_NOTE_LENGTH)]
    NoteTooLong(usize),

    /// A date in the future was used for a transaction.
    ///
    /// Transactions record events that have already happened, therefore future
    /// dates are not allowed.
    #[error("{0} is a date in the future, which is not allowed")]
    FutureDate(Date),
}

impl ValidationError {
    /// The name of the input field that caused the error.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingAccountName
            | ValidationError::EmptyAccountName
            | ValidationError::AccountNameTooLong(_) => "name",
            ValidationError::MissingBalance | ValidationError::NegativeOpeningBalance(_) => {
                "balance"
            }
            ValidationError::MissingAccount => "account_id",
            ValidationError::MissingAmount | ValidationError::NonPositiveAmount(_) => "amount",
            ValidationError::NoteTooLong(_) => "note",
            ValidationError::FutureDate(_) => "date",
        }
    }
}

/// Coarse grouping of [Error]s for callers that only need to decide between a
/// field-level message and an operation-level one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The input was rejected before touching the store.
    Validation,
    /// The operation failed and anything it had written was rolled back.
    Operation,
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// The input to an operation was invalid.
    #[error("invalid input for \"{field}\": {0}", field = .0.field())]
    Validation(#[from] ValidationError),

    /// The account does not exist, has been deleted, or belongs to another user.
    #[error("account {0} could not be found")]
    AccountNotFound(AccountId),

    /// The transaction does not exist, has been deleted, or belongs to another user.
    #[error("transaction {0} could not be found")]
    TransactionNotFound(TransactionId),

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// A lookup by business key matched more than one row.
    ///
    /// The lookup never picks one of the candidates on the caller's behalf.
    #[error("{entity} lookup matched {} rows: {candidates:?}", .candidates.len())]
    DuplicateAmbiguity {
        /// The kind of entity that was looked up, e.g. "account".
        entity: &'static str,
        /// The IDs of every matching row.
        candidates: Vec<i64>,
    },

    /// A step after the initial mutation failed, so the whole operation was
    /// rolled back.
    #[error("{operation} failed while trying to {step}: {reason}")]
    ReconciliationFailure {
        /// The operation that was rolled back, e.g. "update transaction".
        operation: &'static str,
        /// The step that failed, e.g. "adjust account balance".
        step: &'static str,
        /// The underlying error message.
        reason: String,
    },

    /// Applying an amount would take a balance or a total outside the range
    /// a decimal can hold.
    #[error("the amount is too large to apply: the result would overflow")]
    AmountOverflow,

    /// The store could not be reached or is locked by another process.
    ///
    /// Nothing was written. Callers may retry.
    #[error("the store is unavailable: {0}")]
    StoreUnavailable(String),

    /// The configured timezone is not a canonical timezone name.
    #[error("invalid timezone {0}")]
    InvalidTimezone(String),

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),
}

impl Error {
    /// Whether the error is a field-level validation problem or an
    /// operation-level failure.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Validation(_) => ErrorCategory::Validation,
            _ => ErrorCategory::Operation,
        }
    }

    /// Wrap an error from a step that runs after the initial mutation.
    ///
    /// Store outages keep their own variant so callers can still tell that a
    /// retry might help.
    pub(crate) fn during(self, operation: &'static str, step: &'static str) -> Self {
        match self {
            error @ (Error::StoreUnavailable(_) | Error::ReconciliationFailure { .. }) => error,
            error => Error::ReconciliationFailure {
                operation,
                step,
                reason: error.to_string(),
            },
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code:
                        code @ (rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                        | rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::SystemIoFailure),
                    extended_code: _,
                },
                ref description,
            ) => {
                tracing::warn!("store unavailable ({code:?}): {description:?}");
                Error::StoreUnavailable(value.to_string())
            }
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}
