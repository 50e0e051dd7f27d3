//! Document store port for expenses and settlements.

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

use crate::model::{ExpenseId, ExpenseNumber, ExpenseRecord, GroupId, NewExpense};
use crate::settlement::SettlementSnapshot;

mod memory;
pub use memory::InMemoryStore;

/// Type alias for `Result<T, StorageError>`
pub type Result<T> = core::result::Result<T, StorageError>;

/// Errors returned by an [`ExpenseStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// A covered expense was settled, moved or deleted after the snapshot was read.
    #[error("group {group_id}: expense {expense_id} is no longer unsettled")]
    SettlementConflict {
        group_id: GroupId,
        expense_id: ExpenseId,
    },

    #[error("expense {0} not found")]
    UnknownExpense(ExpenseId),

    #[error("expense {0} already exists")]
    DuplicateExpense(ExpenseId),

    #[error("group {group_id}: expense number {number} already taken")]
    DuplicateExpenseNumber {
        group_id: GroupId,
        number: ExpenseNumber,
    },

    #[error("group {0}: no expense numbers left")]
    ExpenseNumberExhausted(GroupId),

    #[error("group {0}: settlement covers no expenses")]
    EmptySettlement(GroupId),

    #[error("group {group_id}: settlement covers expense {expense_id} twice")]
    DuplicateCoveredExpense {
        group_id: GroupId,
        expense_id: ExpenseId,
    },
}

impl StorageError {
    /// Whether re-reading and retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::SettlementConflict { .. })
    }
}

/// A settlement snapshot after the store accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedSettlement {
    /// The stored snapshot, with `id` and `settled_at` filled in.
    pub snapshot: SettlementSnapshot,
    /// Number of expenses flipped to settled.
    pub settled_count: usize,
}

/// Storage API.
#[async_trait]
pub trait ExpenseStore: Debug + Send + Sync {
    /// Writes a new expense, assigning its id and next per-group number.
    async fn create_expense(&self, expense: NewExpense) -> Result<ExpenseRecord>;

    /// Writes an expense that already carries its id and number (imports).
    async fn insert_expense(&self, expense: ExpenseRecord) -> Result<()>;

    /// Reads an expense by id.
    async fn get_expense(&self, id: &str) -> Result<Option<ExpenseRecord>>;

    /// Reads an expense by its per-group number.
    async fn get_expense_by_number(
        &self,
        group_id: &str,
        number: ExpenseNumber,
    ) -> Result<Option<ExpenseRecord>>;

    /// Removes an expense. Returns whether it existed.
    async fn delete_expense(&self, id: &str) -> Result<bool>;

    /// Reads a group's expenses with the given settled flag, ordered by number.
    async fn query_expenses(&self, group_id: &str, is_settled: bool) -> Result<Vec<ExpenseRecord>>;

    /// Persists `snapshot` and flips every expense it covers to settled, as one unit.
    ///
    /// Fails with [`StorageError::SettlementConflict`] without writing anything
    /// if any covered expense is missing, in another group, or already settled.
    /// A snapshot covering no expense, or one expense twice, is rejected too.
    async fn commit_settlement(&self, snapshot: SettlementSnapshot) -> Result<CommittedSettlement>;

    /// Reads a group's settlements, newest first.
    async fn group_settlements(&self, group_id: &str, limit: usize)
    -> Result<Vec<SettlementSnapshot>>;
}
