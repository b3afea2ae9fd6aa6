//! Client-side balance validation for transactions.
//!
//! A transfer must move exactly as much money out of the source accounts as
//! it moves into the destination accounts, per currency. Validation runs
//! before submission so an unbalanced transfer never reaches the wire.

use std::collections::BTreeMap;

use api_types::{account::Account, transaction::Transaction};

/// Per-currency component totals of a single transaction, in minor units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CurrencyTotals {
    pub positive_minor: i64,
    pub negative_minor: i64,
}

fn currency_of(accounts: &[Account], account_id: i64) -> Option<&str> {
    accounts
        .iter()
        .find(|account| account.id == Some(account_id))
        .map(|account| account.currency.as_str())
}

/// Groups component amounts by the currency of their referenced account.
///
/// Expense/income transactions fold every amount into the positive side;
/// transfers split by sign. Returns `None` when a component references an
/// account that is not in `accounts`, since its currency group cannot be
/// determined.
pub fn totals_by_currency(
    transaction: &Transaction,
    accounts: &[Account],
) -> Option<BTreeMap<String, CurrencyTotals>> {
    let mut totals: BTreeMap<String, CurrencyTotals> = BTreeMap::new();
    for component in &transaction.components {
        let currency = currency_of(accounts, component.account_id)?;
        let entry = totals.entry(currency.to_string()).or_default();
        if component.amount_minor > 0 || transaction.is_expense_income() {
            entry.positive_minor += component.amount_minor;
        } else if component.amount_minor < 0 {
            entry.negative_minor -= component.amount_minor;
        }
    }
    Some(totals)
}

/// Zero-sum check for transfers.
///
/// Expense/income transactions carry no cross-component constraint and are
/// always balanced. A transfer is balanced iff every currency group has equal
/// positive and negative totals. Unrecognized transaction types and transfers
/// with unresolvable components are rejected.
pub fn is_balanced(transaction: &Transaction, accounts: &[Account]) -> bool {
    if transaction.is_expense_income() {
        return true;
    }
    if !transaction.is_transfer() {
        return false;
    }
    match totals_by_currency(transaction, accounts) {
        Some(totals) => totals
            .values()
            .all(|total| total.positive_minor == total.negative_minor),
        None => false,
    }
}

/// Headline per-currency amounts for list rendering: the signed sum for
/// expense/income, the larger leg for transfers.
pub fn display_totals(transaction: &Transaction, accounts: &[Account]) -> BTreeMap<String, i64> {
    let Some(totals) = totals_by_currency(transaction, accounts) else {
        return BTreeMap::new();
    };
    totals
        .into_iter()
        .map(|(currency, total)| {
            let amount = if transaction.is_transfer() {
                total.positive_minor.max(total.negative_minor)
            } else {
                total.positive_minor
            };
            (currency, amount)
        })
        .collect()
}
