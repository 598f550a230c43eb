//! The identity of the user acting on the ledger.
//!
//! Users are managed by whatever sits in front of the ledger (a session layer,
//! a CLI flag, ...). The ledger only records which user created what.

use std::{fmt::Display, str::FromStr};

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// A newtype wrapper for integer user IDs.
///
/// This helps disambiguate user IDs from other types of IDs, leading to better compile time
/// errors, and more flexible generics that can have distinct implementations for multiple ID types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct UserId(i64);

impl UserId {
    /// Create a new user ID.
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Cast the user ID to a 64 bit integer.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(UserId)
    }
}

impl ToSql for UserId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for UserId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(UserId)
    }
}

#[cfg(test)]
mod user_id_tests {
    use rusqlite::Connection;

    use super::UserId;

    #[test]
    fn parses_from_string() {
        assert_eq!("42".parse::<UserId>(), Ok(UserId::new(42)));
    }

    #[test]
    fn round_trips_through_sqlite() {
        let connection = Connection::open_in_memory().unwrap();

        let got: UserId = connection
            .query_row("SELECT ?1", [UserId::new(7)], |row| row.get(0))
            .unwrap();

        assert_eq!(got, UserId::new(7));
    }
}
