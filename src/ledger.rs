//! Expense bookkeeping on top of an [`ExpenseStore`].

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::amount::{Amount, AmountError};
use crate::model::{
    ExpenseNumber, ExpenseRecord, GroupId, InvalidExpenseError, NewExpense, SplitKind, UserId,
};
use crate::settlement::{SettlementSnapshot, UserSummary, user_summary};
use crate::split::{Member, SplitError, equal_split, ratio_split, selected_split};
use crate::storage::{ExpenseStore, StorageError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("group {0}: expense #{1:03} not found")]
    NotFound(GroupId, ExpenseNumber),

    #[error("expense #{0:03} can only be deleted by its creator, not {1}")]
    NotCreator(ExpenseNumber, UserId),

    #[error("expense #{0:03} is already settled")]
    AlreadySettled(ExpenseNumber),

    #[error("expense description is empty")]
    MissingDescription,

    #[error("{0}")]
    Split(#[from] SplitError),

    #[error("{0}")]
    InvalidExpense(#[from] InvalidExpenseError),

    #[error("{0}")]
    Amount(#[from] AmountError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

/// Who shares an expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shares {
    /// All listed group members, evenly.
    Equal(Vec<Member>),
    /// A subset of members, evenly.
    Selected(Vec<Member>),
    /// Members by integer weights, in the same order.
    Ratio(Vec<Member>, Vec<u32>),
}

/// Input for recording an expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseDraft {
    pub group_id: GroupId,
    pub payer: Member,
    pub amount: Amount,
    pub description: String,
    pub shares: Shares,
    pub created_by: UserId,
}

/// Records, lists and deletes group expenses.
#[derive(Debug)]
pub struct Ledger<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ExpenseStore + ?Sized> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Build the splits for `draft` and store it under the next expense number.
    pub async fn record(&self, draft: ExpenseDraft) -> Result<ExpenseRecord, LedgerError> {
        if draft.description.trim().is_empty() {
            return Err(LedgerError::MissingDescription);
        }

        let (split_kind, splits) = match &draft.shares {
            Shares::Equal(members) => (SplitKind::Equal, equal_split(draft.amount, members)?),
            Shares::Selected(members) => {
                (SplitKind::Selected, selected_split(draft.amount, members)?)
            }
            Shares::Ratio(members, ratios) => {
                (SplitKind::Ratio, ratio_split(draft.amount, members, ratios)?)
            }
        };

        let expense = NewExpense {
            group_id: draft.group_id,
            payer_id: draft.payer.user_id,
            payer_name: draft.payer.user_name,
            amount: draft.amount,
            description: draft.description,
            split_kind,
            splits,
            created_by: draft.created_by,
        };
        expense.validate()?;

        Ok(self.store.create_expense(expense).await?)
    }

    /// Delete an unsettled expense by number. Only its creator may do so.
    pub async fn delete(
        &self,
        group_id: &str,
        number: ExpenseNumber,
        requested_by: &str,
    ) -> Result<ExpenseRecord, LedgerError> {
        let expense = self
            .store
            .get_expense_by_number(group_id, number)
            .await?
            .ok_or_else(|| LedgerError::NotFound(group_id.to_string(), number))?;

        if expense.created_by != requested_by {
            return Err(LedgerError::NotCreator(number, requested_by.to_string()));
        }
        if expense.is_settled {
            return Err(LedgerError::AlreadySettled(number));
        }

        if !self.store.delete_expense(&expense.id).await? {
            return Err(LedgerError::NotFound(group_id.to_string(), number));
        }

        info!(group = %group_id, expense = %expense.id, number, "expense deleted");
        Ok(expense)
    }

    pub async fn unsettled(&self, group_id: &str) -> Result<Vec<ExpenseRecord>, LedgerError> {
        Ok(self.store.query_expenses(group_id, false).await?)
    }

    /// Paid / owed / net for one member over the group's unsettled expenses.
    pub async fn member_summary(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<UserSummary, LedgerError> {
        let expenses = self.store.query_expenses(group_id, false).await?;
        Ok(user_summary(user_id, &expenses)?)
    }

    pub async fn history(
        &self,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<SettlementSnapshot>, LedgerError> {
        Ok(self.store.group_settlements(group_id, limit).await?)
    }
}
