use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::balance::Balances;
use super::planner::PaymentPlan;
use crate::model::{ExpenseId, GroupId, UserId};

/// Store-assigned settlement document id.
pub type SettlementId = String;

/// Immutable record of one settlement event.
///
/// `id` and `settled_at` stay empty until the store commits the snapshot;
/// after that nothing in it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SettlementId>,
    pub group_id: GroupId,
    pub balances: Balances,
    pub transfer_plan: Vec<PaymentPlan>,
    pub settled_by: UserId,
    pub settled_by_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
    /// Expenses this settlement clears. Committing requires every one of them
    /// to still be unsettled.
    #[serde(default)]
    pub expense_ids: Vec<ExpenseId>,
}

impl SettlementSnapshot {
    pub fn covering(mut self, expense_ids: impl IntoIterator<Item = ExpenseId>) -> Self {
        self.expense_ids = expense_ids.into_iter().collect();
        self
    }

    pub fn is_committed(&self) -> bool {
        self.id.is_some() && self.settled_at.is_some()
    }
}

/// Package balances and plan into an uncommitted snapshot.
pub fn create_settlement_data(
    group_id: impl Into<GroupId>,
    balances: Balances,
    transfer_plan: Vec<PaymentPlan>,
    settled_by: impl Into<UserId>,
    settled_by_name: impl Into<String>,
) -> SettlementSnapshot {
    SettlementSnapshot {
        id: None,
        group_id: group_id.into(),
        balances,
        transfer_plan,
        settled_by: settled_by.into(),
        settled_by_name: settled_by_name.into(),
        settled_at: None,
        expense_ids: Vec::new(),
    }
}
