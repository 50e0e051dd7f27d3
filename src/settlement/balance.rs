use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::amount::{Amount, AmountError};
use crate::model::{ExpenseRecord, UserId};

/// One participant's net position across a set of expenses.
///
/// Positive `net_amount` means the group owes them (creditor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_name: String,
    pub net_amount: Amount,
}

/// Net balances keyed by participant, iterated in ascending id order.
pub type Balances = BTreeMap<UserId, Balance>;

/// What one member paid, what they owe, and the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UserSummary {
    pub paid: Amount,
    pub owed: Amount,
    pub net: Amount,
}

/// Reduce expenses into one net balance per participant.
///
/// The payer is credited the full amount and every split participant is
/// debited their share, so a payer who is also in the splits gets both.
///
/// Fails with [`AmountError::Overflow`] instead of wrapping when a running
/// balance leaves the `i64` range.
pub fn calculate_balances<'a>(
    expenses: impl IntoIterator<Item = &'a ExpenseRecord>,
) -> Result<Balances, AmountError> {
    let mut balances = Balances::new();

    for expense in expenses {
        let payer = entry(&mut balances, &expense.payer_id, &expense.payer_name);
        payer.net_amount = payer.net_amount.checked_add(expense.amount)?;

        for split in &expense.splits {
            let member = entry(&mut balances, &split.user_id, &split.user_name);
            member.net_amount = member.net_amount.checked_sub(split.amount)?;
        }
    }

    Ok(balances)
}

/// Totals for a single member.
pub fn user_summary<'a>(
    user_id: &str,
    expenses: impl IntoIterator<Item = &'a ExpenseRecord>,
) -> Result<UserSummary, AmountError> {
    let mut summary = UserSummary::default();

    for expense in expenses {
        if expense.payer_id == user_id {
            summary.paid = summary.paid.checked_add(expense.amount)?;
        }
        for split in expense.splits.iter().filter(|s| s.user_id == user_id) {
            summary.owed = summary.owed.checked_add(split.amount)?;
        }
    }

    summary.net = summary.paid.checked_sub(summary.owed)?;
    Ok(summary)
}

/// Get or create a participant entry; the first name seen for an id sticks.
fn entry<'b>(balances: &'b mut Balances, user_id: &str, user_name: &str) -> &'b mut Balance {
    balances
        .entry(user_id.to_string())
        .or_insert_with(|| Balance {
            user_name: user_name.to_string(),
            net_amount: Amount::ZERO,
        })
}
