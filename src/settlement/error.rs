//! Error types for settlement execution.

use thiserror::Error;

use crate::amount::AmountError;
use crate::model::{GroupId, InvalidExpenseError};
use crate::storage::StorageError;

/// Top-level error returned by [`Settler`](super::Settler).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettlementError {
    #[error("group {0} has no unsettled expenses")]
    EmptySettlement(GroupId),

    #[error("invalid expense: {0}")]
    InvalidExpense(#[from] InvalidExpenseError),

    #[error("balances: {0}")]
    Amount(#[from] AmountError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

impl SettlementError {
    /// Whether the caller may re-read the group and try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SettlementError::Storage(e) => e.is_retryable(),
            _ => false,
        }
    }
}
