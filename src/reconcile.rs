//! Computes how account balances must change when transactions change.
//!
//! Everything in this module is pure: it never reads or writes the store.
//! [crate::ledger] applies the deltas computed here inside a unit of work.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{Error, database_id::AccountId, transaction::TransactionType};

/// The effect a transaction has on the balance of its account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    /// Whether the money was earned or spent.
    pub transaction_type: TransactionType,
    /// How much money moved. Always positive.
    pub amount: Decimal,
}

impl Effect {
    /// Create a new balance effect.
    pub fn new(transaction_type: TransactionType, amount: Decimal) -> Self {
        Self {
            transaction_type,
            amount,
        }
    }

    /// The signed change to the balance: positive for income, negative for expenses.
    pub fn signed_delta(&self) -> Decimal {
        match self.transaction_type {
            TransactionType::Income => self.amount,
            TransactionType::Expense => -self.amount,
        }
    }
}

/// The amount to add to an account balance when a transaction on that
/// account changes from `old` to `new`.
///
/// `old` is `None` when the transaction is being created and `new` is `None`
/// when it is being deleted. The old effect is always reversed in full before
/// the new effect is applied, so a change of type and amount at the same
/// time needs no special handling.
///
/// # Errors
///
/// Returns [Error::AmountOverflow] if the combined change does not fit in a
/// [Decimal].
pub fn balance_delta(old: Option<Effect>, new: Option<Effect>) -> Result<Decimal, Error> {
    let reverse = old.map_or(Decimal::ZERO, |effect| -effect.signed_delta());
    let apply = new.map_or(Decimal::ZERO, |effect| effect.signed_delta());

    reverse.checked_add(apply).ok_or(Error::AmountOverflow)
}

/// The per-account balance changes for a transaction that may have moved
/// between accounts.
///
/// Each tuple pairs the account being applied to with its effect on that
/// account. Accounts whose balance does not change are left out, so editing a
/// transaction back to its current values yields no adjustments at all.
pub fn account_deltas(
    old: Option<(AccountId, Effect)>,
    new: Option<(AccountId, Effect)>,
) -> Result<Vec<(AccountId, Decimal)>, Error> {
    let deltas = match (old, new) {
        (Some((old_account, old_effect)), Some((new_account, new_effect)))
            if old_account == new_account =>
        {
            vec![(old_account, balance_delta(Some(old_effect), Some(new_effect))?)]
        }
        (old, new) => {
            let mut deltas = Vec::with_capacity(2);

            if let Some((account_id, effect)) = old {
                deltas.push((account_id, balance_delta(Some(effect), None)?));
            }

            if let Some((account_id, effect)) = new {
                deltas.push((account_id, balance_delta(None, Some(effect))?));
            }

            deltas
        }
    };

    Ok(deltas
        .into_iter()
        .filter(|(_, delta)| !delta.is_zero())
        .collect())
}

/// The transaction that explains a direct edit of a balance from `old` to `new`.
///
/// Returns `None` if the balance did not change, or [Error::AmountOverflow] if
/// the difference between the two balances does not fit in a [Decimal].
pub fn balance_edit_effect(old: Decimal, new: Decimal) -> Result<Option<Effect>, Error> {
    let difference = new.checked_sub(old).ok_or(Error::AmountOverflow)?;

    let effect = if difference.is_zero() {
        None
    } else if difference > Decimal::ZERO {
        Some(Effect::new(TransactionType::Income, difference))
    } else {
        Some(Effect::new(TransactionType::Expense, difference.abs()))
    };

    Ok(effect)
}

/// Whether an account's stored balance agrees with its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BalanceAudit {
    /// The stored balance equals the opening balance plus every live
    /// transaction on the account.
    Balanced {
        /// The stored balance.
        balance: Decimal,
    },
    /// The stored balance has drifted from the account's history.
    Discrepancy {
        /// The balance implied by the opening balance and the transactions.
        expected: Decimal,
        /// The balance that is stored.
        actual: Decimal,
        /// `actual - expected`.
        difference: Decimal,
    },
}

impl BalanceAudit {
    /// Whether the audit found no discrepancy.
    pub fn is_balanced(&self) -> bool {
        matches!(self, BalanceAudit::Balanced { .. })
    }
}

/// Compare a stored balance against the opening balance plus the effects of
/// the transactions that are still live on the account.
///
/// Deleted transactions are left out: their effect was reversed when they
/// were deleted.
pub fn audit_balance<I>(
    opening_balance: Decimal,
    actual: Decimal,
    effects: I,
) -> Result<BalanceAudit, Error>
where
    I: IntoIterator<Item = Effect>,
{
    let expected = effects
        .into_iter()
        .try_fold(opening_balance, |total, effect| {
            total.checked_add(effect.signed_delta())
        })
        .ok_or(Error::AmountOverflow)?;

    if expected == actual {
        return Ok(BalanceAudit::Balanced { balance: actual });
    }

    let difference = actual.checked_sub(expected).ok_or(Error::AmountOverflow)?;

    Ok(BalanceAudit::Discrepancy {
        expected,
        actual,
        difference,
    })
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::{
        Error,
        transaction::TransactionType::{Expense, Income},
    };

    use super::{
        BalanceAudit, Effect, account_deltas, audit_balance, balance_delta, balance_edit_effect,
    };

    #[test]
    fn creation_applies_new_effect() {
        assert_eq!(
            balance_delta(None, Some(Effect::new(Income, dec!(50)))),
            Ok(dec!(50))
        );
        assert_eq!(
            balance_delta(None, Some(Effect::new(Expense, dec!(50)))),
            Ok(dec!(-50))
        );
    }

    #[test]
    fn deletion_reverses_old_effect() {
        assert_eq!(
            balance_delta(Some(Effect::new(Expense, dec!(20))), None),
            Ok(dec!(20))
        );
        assert_eq!(
            balance_delta(Some(Effect::new(Income, dec!(20))), None),
            Ok(dec!(-20))
        );
    }

    #[test]
    fn edit_reverses_then_applies() {
        let old = Effect::new(Income, dec!(50.00));
        let new = Effect::new(Expense, dec!(20.00));

        assert_eq!(balance_delta(Some(old), Some(new)), Ok(dec!(-70.00)));
    }

    #[test]
    fn amount_only_edit_applies_the_difference() {
        let old = Effect::new(Expense, dec!(20));
        let new = Effect::new(Expense, dec!(25.5));

        assert_eq!(balance_delta(Some(old), Some(new)), Ok(dec!(-5.5)));
    }

    #[test]
    fn no_effects_means_no_change() {
        assert_eq!(balance_delta(None, None), Ok(dec!(0)));
    }

    #[test]
    fn flipping_a_huge_transaction_overflows() {
        let old = Effect::new(Expense, Decimal::MAX);
        let new = Effect::new(Income, Decimal::MAX);

        assert_eq!(balance_delta(Some(old), Some(new)), Err(Error::AmountOverflow));
        assert_eq!(
            account_deltas(Some((1, old)), Some((1, new))),
            Err(Error::AmountOverflow)
        );
    }

    #[test]
    fn unchanged_edit_yields_no_adjustments() {
        let effect = Effect::new(Income, dec!(10));

        assert_eq!(account_deltas(Some((1, effect)), Some((1, effect))), Ok(vec![]));
    }

    #[test]
    fn moving_accounts_reverses_on_old_and_applies_on_new() {
        let effect = Effect::new(Expense, dec!(10));

        assert_eq!(
            account_deltas(Some((1, effect)), Some((2, effect))),
            Ok(vec![(1, dec!(10)), (2, dec!(-10))])
        );
    }

    #[test]
    fn single_account_changes() {
        let effect = Effect::new(Income, dec!(3));

        assert_eq!(account_deltas(None, Some((4, effect))), Ok(vec![(4, dec!(3))]));
        assert_eq!(account_deltas(Some((4, effect)), None), Ok(vec![(4, dec!(-3))]));
    }

    #[test]
    fn balance_increase_is_income() {
        assert_eq!(
            balance_edit_effect(dec!(100.00), dec!(130.00)),
            Ok(Some(Effect::new(Income, dec!(30.00))))
        );
    }

    #[test]
    fn balance_decrease_is_expense() {
        assert_eq!(
            balance_edit_effect(dec!(100), dec!(-20)),
            Ok(Some(Effect::new(Expense, dec!(120))))
        );
    }

    #[test]
    fn unchanged_balance_needs_no_adjustment() {
        assert_eq!(balance_edit_effect(dec!(100.0), dec!(100.00)), Ok(None));
    }

    #[test]
    fn balance_edit_past_the_decimal_range_overflows() {
        assert_eq!(
            balance_edit_effect(dec!(1), Decimal::MIN),
            Err(Error::AmountOverflow)
        );
        assert_eq!(
            balance_edit_effect(dec!(-1), Decimal::MAX),
            Err(Error::AmountOverflow)
        );
    }

    #[test]
    fn audit_balances_against_live_transactions() {
        let effects = [Effect::new(Income, dec!(50)), Effect::new(Expense, dec!(20))];

        assert_eq!(
            audit_balance(dec!(100), dec!(130), effects),
            Ok(BalanceAudit::Balanced {
                balance: dec!(130)
            })
        );
    }

    #[test]
    fn audit_reports_drift() {
        let audit = audit_balance(dec!(100), dec!(95), [Effect::new(Income, dec!(5))]).unwrap();

        assert_eq!(
            audit,
            BalanceAudit::Discrepancy {
                expected: dec!(105),
                actual: dec!(95),
                difference: dec!(-10),
            }
        );
        assert!(!audit.is_balanced());
    }

    #[test]
    fn audit_of_history_beyond_the_decimal_range_overflows() {
        let effects = [Effect::new(Income, Decimal::MAX)];

        assert_eq!(
            audit_balance(dec!(1), dec!(0), effects),
            Err(Error::AmountOverflow)
        );
    }
}
