//! Records which user created each account and transaction.
//!
//! Ownership lives in link tables rather than on the entities themselves, so
//! the account and transaction tables stay free of user concerns.

use rusqlite::{Connection, params};

use crate::{
    Error,
    database_id::{AccountId, TransactionId},
    user::UserId,
};

/// Create the tables linking users to the accounts and transactions they own.
///
/// # Errors
/// Returns an error if the tables cannot be created or if there is an SQL error.
pub fn create_ownership_tables(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_account (
            user_id INTEGER NOT NULL,
            account_id INTEGER NOT NULL,
            PRIMARY KEY (user_id, account_id),
            FOREIGN KEY(account_id) REFERENCES account(id) ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS user_transaction (
            user_id INTEGER NOT NULL,
            transaction_id INTEGER NOT NULL,
            PRIMARY KEY (user_id, transaction_id),
            FOREIGN KEY(transaction_id) REFERENCES \"transaction\"(id)
                ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_user_account_account ON user_account(account_id);
        CREATE INDEX IF NOT EXISTS idx_user_transaction_transaction
            ON user_transaction(transaction_id);",
    )?;

    Ok(())
}

/// Record that `user_id` owns the account `account_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::AccountNotFound] if `account_id` does not refer to an account,
/// - or [Error::SqlError] there is some other SQL error.
pub fn link_account(
    user_id: UserId,
    account_id: AccountId,
    connection: &Connection,
) -> Result<(), Error> {
    connection
        .execute(
            "INSERT INTO user_account (user_id, account_id) VALUES (?1, ?2)",
            params![user_id, account_id],
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::AccountNotFound(account_id),
            error => error.into(),
        })?;

    Ok(())
}

/// Record that `user_id` owns the transaction `transaction_id`.
///
/// # Errors
/// This function will return a:
/// - [Error::TransactionNotFound] if `transaction_id` does not refer to a transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn link_transaction(
    user_id: UserId,
    transaction_id: TransactionId,
    connection: &Connection,
) -> Result<(), Error> {
    connection
        .execute(
            "INSERT INTO user_transaction (user_id, transaction_id) VALUES (?1, ?2)",
            params![user_id, transaction_id],
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::TransactionNotFound(transaction_id),
            error => error.into(),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;
    use time::OffsetDateTime;

    use crate::{
        Error,
        account::{AccountForm, AccountType, get_account_for_user, insert_account},
        db::initialize,
        user::UserId,
    };

    use super::{link_account, link_transaction};

    fn get_test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        conn
    }

    #[test]
    fn linked_account_is_visible_to_owner() {
        let conn = get_test_connection();
        let fields = AccountForm::new("Wallet", AccountType::Cash, dec!(0))
            .validate_new()
            .unwrap();
        let id = insert_account(&fields, OffsetDateTime::now_utc(), &conn).unwrap();

        link_account(UserId::new(3), id, &conn).unwrap();

        assert!(get_account_for_user(UserId::new(3), id, &conn).is_ok());
    }

    #[test]
    fn link_fails_for_missing_account() {
        let conn = get_test_connection();

        assert_eq!(
            link_account(UserId::new(1), 404, &conn),
            Err(Error::AccountNotFound(404))
        );
    }

    #[test]
    fn link_fails_for_missing_transaction() {
        let conn = get_test_connection();

        assert_eq!(
            link_transaction(UserId::new(1), 404, &conn),
            Err(Error::TransactionNotFound(404))
        );
    }
}
