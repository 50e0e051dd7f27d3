//! Core domain types for group expenses.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Amount;

/// Member identifier (chat platform user id).
pub type UserId = String;

/// Group identifier.
pub type GroupId = String;

/// Store-assigned expense document id.
pub type ExpenseId = String;

/// Per-group human-facing expense sequence number.
pub type ExpenseNumber = u32;

/// How an expense's splits were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKind {
    /// Every group member pays the same share.
    #[default]
    Equal,
    /// Only the selected members share the cost, equally.
    Selected,
    /// Members pay according to integer weights.
    Ratio,
}

/// One participant's share of an expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub user_id: UserId,
    pub user_name: String,
    pub amount: Amount,
}

impl Split {
    pub fn new(user_id: impl Into<UserId>, user_name: impl Into<String>, amount: Amount) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            amount,
        }
    }
}

/// An expense as the store holds it.
///
/// `is_settled` only ever flips through a committed settlement, never through
/// an individual edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub id: ExpenseId,
    pub group_id: GroupId,
    pub expense_number: ExpenseNumber,
    pub payer_id: UserId,
    pub payer_name: String,
    pub amount: Amount,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub split_kind: SplitKind,
    pub splits: Vec<Split>,
    #[serde(default)]
    pub created_by: UserId,
    #[serde(default)]
    pub is_settled: bool,
}

/// An expense before the store has assigned its id and number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    pub group_id: GroupId,
    pub payer_id: UserId,
    pub payer_name: String,
    pub amount: Amount,
    pub description: String,
    pub split_kind: SplitKind,
    pub splits: Vec<Split>,
    pub created_by: UserId,
}

impl NewExpense {
    /// Attach the store-assigned identity. New expenses always start unsettled.
    pub fn into_record(self, id: ExpenseId, expense_number: ExpenseNumber) -> ExpenseRecord {
        ExpenseRecord {
            id,
            group_id: self.group_id,
            expense_number,
            payer_id: self.payer_id,
            payer_name: self.payer_name,
            amount: self.amount,
            description: self.description,
            split_kind: self.split_kind,
            splits: self.splits,
            created_by: self.created_by,
            is_settled: false,
        }
    }
}

/// How to treat records that fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Reject the whole batch on the first invalid record.
    #[default]
    Strict,
    /// Skip invalid records with a warning; missing numeric fields read as zero.
    Lenient,
}

/// A record that cannot take part in a balance computation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidExpenseError {
    #[error("expense {0}: missing payer id")]
    MissingPayer(ExpenseId),

    #[error("expense {0}: amount {1} must be positive")]
    NonPositiveAmount(ExpenseId, Amount),

    #[error("expense {0}: no splits")]
    EmptySplits(ExpenseId),

    #[error("expense {0}: split for {1} is negative ({2})")]
    NegativeShare(ExpenseId, UserId, Amount),

    #[error("expense {0}: {1} is out of range")]
    AmountOutOfRange(ExpenseId, Amount),
}

impl ExpenseRecord {
    /// Check the minimal shape a balance computation relies on.
    ///
    /// Splits are not required to sum to `amount`; rounding residue is allowed.
    pub fn validate(&self) -> Result<(), InvalidExpenseError> {
        validate_parts(&self.id, &self.payer_id, self.amount, &self.splits)
    }
}

impl NewExpense {
    pub fn validate(&self) -> Result<(), InvalidExpenseError> {
        validate_parts("<new>", &self.payer_id, self.amount, &self.splits)
    }
}

fn validate_parts(
    id: &str,
    payer_id: &str,
    amount: Amount,
    splits: &[Split],
) -> Result<(), InvalidExpenseError> {
    if payer_id.is_empty() {
        return Err(InvalidExpenseError::MissingPayer(id.to_string()));
    }
    if !amount.is_positive() {
        return Err(InvalidExpenseError::NonPositiveAmount(id.to_string(), amount));
    }
    if let Some(out) = std::iter::once(amount)
        .chain(splits.iter().map(|s| s.amount))
        .find(|a| !a.in_range())
    {
        return Err(InvalidExpenseError::AmountOutOfRange(id.to_string(), out));
    }
    if splits.is_empty() {
        return Err(InvalidExpenseError::EmptySplits(id.to_string()));
    }
    if let Some(split) = splits.iter().find(|s| s.amount.is_negative()) {
        return Err(InvalidExpenseError::NegativeShare(
            id.to_string(),
            split.user_id.clone(),
            split.amount,
        ));
    }
    Ok(())
}
