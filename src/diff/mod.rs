use crate::account::Transaction;
use crate::time::date::Date;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One group, keyed by `(value_date, transaction_type_name)`, whose totals
/// differ between an original and a new transaction stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDifference {
    /// The value date both groups share.
    pub value_date: Date,
    /// The transaction type both groups share.
    pub transaction_type_name: String,
    /// `new total - original total`.
    pub amount: rust_decimal::Decimal,
    /// The original stream's transactions in this group, in their original order.
    pub original_list: Vec<Transaction>,
    /// The new stream's transactions in this group, in their original order.
    pub new_list: Vec<Transaction>,
}

/// Groups `original` and `new` by `(value_date, transaction_type_name)` and
/// reports every group whose summed amount changed, keyed by value date.
///
/// A group present in only one stream is reported against a zero total on the
/// missing side, so additions and removals surface the same way as amount
/// changes.
#[must_use]
pub fn valuation_difference(
    original: &[Transaction],
    new: &[Transaction],
) -> BTreeMap<Date, Vec<TransactionDifference>> {
    let mut groups: BTreeMap<(Date, String), (Vec<Transaction>, Vec<Transaction>)> =
        BTreeMap::new();

    for transaction in original {
        groups
            .entry((
                transaction.value_date,
                transaction.transaction_type_name.clone(),
            ))
            .or_default()
            .0
            .push(transaction.clone());
    }
    for transaction in new {
        groups
            .entry((
                transaction.value_date,
                transaction.transaction_type_name.clone(),
            ))
            .or_default()
            .1
            .push(transaction.clone());
    }

    let mut result: BTreeMap<Date, Vec<TransactionDifference>> = BTreeMap::new();
    for ((value_date, transaction_type_name), (original_list, new_list)) in groups {
        let original_total: rust_decimal::Decimal = original_list.iter().map(|t| t.amount).sum();
        let new_total: rust_decimal::Decimal = new_list.iter().map(|t| t.amount).sum();
        if original_total == new_total {
            continue;
        }
        result.entry(value_date).or_default().push(TransactionDifference {
            value_date,
            transaction_type_name,
            amount: new_total - original_total,
            original_list,
            new_list,
        });
    }
    result
}
