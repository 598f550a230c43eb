//! Simple totals over a user's accounts and transactions.

use std::ops::RangeInclusive;

use rust_decimal::Decimal;
use serde::Serialize;
use time::Date;

use crate::{
    Error,
    account::Account,
    database_id::AccountId,
    transaction::{Transaction, TransactionType},
};

/// The number of expenses listed in a [Summary] unless the filter says otherwise.
pub const DEFAULT_LARGEST_EXPENSES: usize = 5;

/// Restricts which transactions are included in a [Summary].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryFilter {
    /// Only include transactions dated within this range (inclusive).
    pub date_range: Option<RangeInclusive<Date>>,
    /// Only include transactions on these accounts.
    pub account_ids: Option<Vec<AccountId>>,
    /// How many of the largest expenses to list.
    pub largest_expenses: usize,
}

impl Default for SummaryFilter {
    fn default() -> Self {
        Self {
            date_range: None,
            account_ids: None,
            largest_expenses: DEFAULT_LARGEST_EXPENSES,
        }
    }
}

impl SummaryFilter {
    fn includes(&self, transaction: &Transaction) -> bool {
        let in_range = self
            .date_range
            .as_ref()
            .is_none_or(|range| range.contains(&transaction.date));
        let in_accounts = self
            .account_ids
            .as_ref()
            .is_none_or(|ids| ids.contains(&transaction.account_id));

        in_range && in_accounts
    }
}

/// Income and expense totals for a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// The sum of the income transactions.
    pub total_income: Decimal,
    /// The sum of the expense transactions, as a positive number.
    pub total_expenses: Decimal,
    /// `total_income - total_expenses`.
    pub net: Decimal,
    /// The sum of the balances of the included accounts.
    pub total_balance: Decimal,
    /// The largest expenses, biggest first.
    pub largest_expenses: Vec<Transaction>,
}

/// Total up `transactions` and `accounts` according to `filter`.
///
/// The account filter applies to the balance total as well as the
/// transactions. Expenses with the same amount are listed newest first.
///
/// # Errors
/// Returns [Error::AmountOverflow] if a total does not fit in a [Decimal].
pub fn summarize(
    accounts: &[Account],
    transactions: &[Transaction],
    filter: &SummaryFilter,
) -> Result<Summary, Error> {
    let mut total_income = Decimal::ZERO;
    let mut total_expenses = Decimal::ZERO;
    let mut expenses = Vec::new();

    for transaction in transactions.iter().filter(|transaction| filter.includes(transaction)) {
        let total = match transaction.transaction_type {
            TransactionType::Income => &mut total_income,
            TransactionType::Expense => {
                expenses.push(transaction);
                &mut total_expenses
            }
        };

        *total = total
            .checked_add(transaction.amount)
            .ok_or(Error::AmountOverflow)?;
    }

    expenses.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then_with(|| b.date.cmp(&a.date))
            .then_with(|| b.id.cmp(&a.id))
    });

    let total_balance = accounts
        .iter()
        .filter(|account| {
            filter
                .account_ids
                .as_ref()
                .is_none_or(|ids| ids.contains(&account.id))
        })
        .try_fold(Decimal::ZERO, |total, account| total.checked_add(account.balance))
        .ok_or(Error::AmountOverflow)?;

    let net = total_income
        .checked_sub(total_expenses)
        .ok_or(Error::AmountOverflow)?;

    Ok(Summary {
        total_income,
        total_expenses,
        net,
        total_balance,
        largest_expenses: expenses
            .into_iter()
            .take(filter.largest_expenses)
            .cloned()
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use time::{Date, OffsetDateTime, macros::date};

    use crate::{
        Error,
        account::{Account, AccountName, AccountType},
        transaction::{Transaction, TransactionType},
    };

    use super::{SummaryFilter, summarize};

    fn account(id: i64, balance: Decimal) -> Account {
        Account {
            id,
            name: AccountName::new_unchecked("Wallet"),
            account_type: AccountType::Cash,
            balance,
            opening_balance: balance,
            deleted: false,
            last_updated: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn transaction(
        id: i64,
        account_id: i64,
        transaction_type: TransactionType,
        amount: Decimal,
        date: Date,
    ) -> Transaction {
        Transaction {
            id,
            account_id,
            transaction_type,
            date,
            amount,
            note: None,
            deleted: false,
            last_updated: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn sample() -> (Vec<Account>, Vec<Transaction>) {
        let accounts = vec![account(1, dec!(100)), account(2, dec!(50.50))];
        let transactions = vec![
            transaction(1, 1, TransactionType::Income, dec!(1000), date!(2025 - 01 - 15)),
            transaction(2, 1, TransactionType::Expense, dec!(250.25), date!(2025 - 01 - 20)),
            transaction(3, 2, TransactionType::Expense, dec!(20), date!(2025 - 02 - 01)),
            transaction(4, 2, TransactionType::Expense, dec!(400), date!(2025 - 02 - 10)),
            transaction(5, 1, TransactionType::Income, dec!(75), date!(2025 - 02 - 11)),
        ];
        (accounts, transactions)
    }

    #[test]
    fn totals_everything_without_filter() {
        let (accounts, transactions) = sample();

        let summary = summarize(&accounts, &transactions, &SummaryFilter::default()).unwrap();

        assert_eq!(summary.total_income, dec!(1075));
        assert_eq!(summary.total_expenses, dec!(670.25));
        assert_eq!(summary.net, dec!(404.75));
        assert_eq!(summary.total_balance, dec!(150.50));
    }

    #[test]
    fn largest_expenses_are_sorted_and_limited() {
        let (accounts, transactions) = sample();
        let filter = SummaryFilter {
            largest_expenses: 2,
            ..Default::default()
        };

        let summary = summarize(&accounts, &transactions, &filter).unwrap();

        let ids: Vec<i64> = summary.largest_expenses.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![4, 2]);
    }

    #[test]
    fn date_range_is_inclusive() {
        let (accounts, transactions) = sample();
        let filter = SummaryFilter {
            date_range: Some(date!(2025 - 01 - 20)..=date!(2025 - 02 - 10)),
            ..Default::default()
        };

        let summary = summarize(&accounts, &transactions, &filter).unwrap();

        assert_eq!(summary.total_income, dec!(0));
        assert_eq!(summary.total_expenses, dec!(670.25));
        assert_eq!(summary.net, dec!(-670.25));
    }

    #[test]
    fn account_filter_applies_to_transactions_and_balances() {
        let (accounts, transactions) = sample();
        let filter = SummaryFilter {
            account_ids: Some(vec![2]),
            ..Default::default()
        };

        let summary = summarize(&accounts, &transactions, &filter).unwrap();

        assert_eq!(summary.total_income, dec!(0));
        assert_eq!(summary.total_expenses, dec!(420));
        assert_eq!(summary.total_balance, dec!(50.50));
    }

    #[test]
    fn empty_history_sums_to_zero() {
        let summary = summarize(&[], &[], &SummaryFilter::default()).unwrap();

        assert_eq!(summary.net, dec!(0));
        assert!(summary.largest_expenses.is_empty());
    }

    #[test]
    fn income_total_beyond_the_decimal_range_is_an_error() {
        let transactions = vec![
            transaction(1, 1, TransactionType::Income, Decimal::MAX, date!(2025 - 01 - 15)),
            transaction(2, 1, TransactionType::Income, dec!(1), date!(2025 - 01 - 16)),
        ];

        assert_eq!(
            summarize(&[], &transactions, &SummaryFilter::default()),
            Err(Error::AmountOverflow)
        );
    }

    #[test]
    fn balance_total_beyond_the_decimal_range_is_an_error() {
        let accounts = vec![account(1, Decimal::MAX), account(2, dec!(1))];

        assert_eq!(
            summarize(&accounts, &[], &SummaryFilter::default()),
            Err(Error::AmountOverflow)
        );
    }
}
