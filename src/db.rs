//! Schema initialisation and helpers shared by the repositories.

use std::str::FromStr;

use rusqlite::{Connection, Row, Transaction as SqlTransaction, TransactionBehavior, types::Type};
use rust_decimal::Decimal;

use crate::{
    account::create_account_table, ownership::create_ownership_tables,
    transaction::create_transaction_table,
};

/// Create all the tables and indexes used by the ledger.
///
/// Safe to call on a database that has already been initialised.
///
/// # Errors
/// Returns an error if the tables cannot be created or if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.pragma_update(None, "foreign_keys", true)?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_account_table(&transaction)?;
    create_transaction_table(&transaction)?;
    create_ownership_tables(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Open a unit of work that holds the write lock from the first statement.
///
/// Starting the transaction as `IMMEDIATE` means two operations can never
/// both read an account balance and then write back a value derived from it.
/// A second writer waits for the lock (or fails with
/// [crate::Error::StoreUnavailable] once the busy timeout expires).
pub(crate) fn begin_unit_of_work(
    connection: &Connection,
) -> Result<SqlTransaction<'_>, rusqlite::Error> {
    // Using new_unchecked because we only have &Connection from the MutexGuard.
    SqlTransaction::new_unchecked(connection, TransactionBehavior::Immediate)
}

/// Read a decimal that was stored as TEXT.
pub(crate) fn get_decimal(row: &Row, index: usize) -> Result<Decimal, rusqlite::Error> {
    let raw: String = row.get(index)?;

    Decimal::from_str(&raw)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}

/// Convert a decimal to the canonical TEXT form it is stored as.
pub(crate) fn decimal_to_sql(value: Decimal) -> String {
    value.normalize().to_string()
}

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use rust_decimal_macros::dec;

    use super::{decimal_to_sql, get_decimal, initialize};

    #[test]
    fn initialize_is_idempotent() {
        let connection = Connection::open_in_memory().unwrap();

        assert_eq!(initialize(&connection), Ok(()));
        assert_eq!(initialize(&connection), Ok(()));
    }

    #[test]
    fn decimals_survive_storage_exactly() {
        let connection = Connection::open_in_memory().unwrap();
        let value = dec!(0.1) + dec!(0.2);

        let got = connection
            .query_row("SELECT ?1", [decimal_to_sql(value)], |row| {
                get_decimal(row, 0)
            })
            .unwrap();

        assert_eq!(got, dec!(0.3));
    }

    #[test]
    fn malformed_decimal_is_a_conversion_error() {
        let connection = Connection::open_in_memory().unwrap();

        let got = connection.query_row("SELECT 'twelve dollars'", [], |row| get_decimal(row, 0));

        assert!(matches!(
            got,
            Err(rusqlite::Error::FromSqlConversionFailure(0, _, _))
        ));
    }
}
