//! Settings that change how the ledger behaves.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, timezone::get_local_offset};

/// The timezone used when no other timezone is configured.
pub const DEFAULT_TIMEZONE: &str = "Etc/UTC";

/// What happens to an account's transactions when the account is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountDeletePolicy {
    /// Leave the transactions as they are. They keep pointing at the deleted
    /// account and still show up in transaction listings.
    #[default]
    Orphan,
    /// Delete every live transaction on the account as well, reversing each
    /// one's effect on the account balance.
    Cascade,
}

impl Display for AccountDeletePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountDeletePolicy::Orphan => f.write_str("orphan"),
            AccountDeletePolicy::Cascade => f.write_str("cascade"),
        }
    }
}

impl FromStr for AccountDeletePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "orphan" => Ok(AccountDeletePolicy::Orphan),
            "cascade" => Ok(AccountDeletePolicy::Cascade),
            other => Err(format!(
                "unknown delete policy \"{other}\", expected orphan or cascade"
            )),
        }
    }
}

/// Configuration for a [crate::Ledger].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// The canonical name of the timezone used to decide what "today" is,
    /// e.g. "Pacific/Auckland".
    pub local_timezone: String,
    /// What happens to an account's transactions when the account is deleted.
    pub account_delete_policy: AccountDeletePolicy,
}

impl LedgerConfig {
    /// Create a configuration, checking that `local_timezone` is a known timezone.
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezone] if `local_timezone` is not a canonical
    /// timezone name.
    pub fn new(
        local_timezone: &str,
        account_delete_policy: AccountDeletePolicy,
    ) -> Result<Self, Error> {
        if get_local_offset(local_timezone).is_none() {
            return Err(Error::InvalidTimezone(local_timezone.to_owned()));
        }

        Ok(Self {
            local_timezone: local_timezone.to_owned(),
            account_delete_policy,
        })
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            local_timezone: DEFAULT_TIMEZONE.to_owned(),
            account_delete_policy: AccountDeletePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Error;

    use super::{AccountDeletePolicy, DEFAULT_TIMEZONE, LedgerConfig};

    #[test]
    fn default_orphans_transactions_in_utc() {
        let config = LedgerConfig::default();

        assert_eq!(config.local_timezone, DEFAULT_TIMEZONE);
        assert_eq!(config.account_delete_policy, AccountDeletePolicy::Orphan);
    }

    #[test]
    fn new_accepts_canonical_timezone() {
        let config = LedgerConfig::new("Pacific/Auckland", AccountDeletePolicy::Cascade).unwrap();

        assert_eq!(config.local_timezone, "Pacific/Auckland");
    }

    #[test]
    fn new_rejects_unknown_timezone() {
        assert_eq!(
            LedgerConfig::new("Mars/Olympus_Mons", AccountDeletePolicy::Orphan),
            Err(Error::InvalidTimezone("Mars/Olympus_Mons".to_owned()))
        );
    }

    #[test]
    fn parses_delete_policy() {
        assert_eq!("Cascade".parse(), Ok(AccountDeletePolicy::Cascade));
        assert!("shred".parse::<AccountDeletePolicy>().is_err());
    }
}
