//! Settlement engine.
//!
//! Turns a group's unsettled expenses into net balances and a greedy transfer
//! plan, and commits a settlement snapshot through an [`ExpenseStore`].

use std::sync::Arc;
use tracing::{info, warn};

use crate::Amount;
use crate::model::{ExpenseRecord, ParseMode};
use crate::storage::{CommittedSettlement, ExpenseStore};

mod balance;
pub use balance::{Balance, Balances, UserSummary, calculate_balances, user_summary};

mod planner;
pub use planner::{PaymentPlan, TransferPlanner, calculate_optimal_payments};

mod snapshot;
pub use snapshot::{SettlementId, SettlementSnapshot, create_settlement_data};

mod error;
pub use error::SettlementError;

/// Knobs for how records are validated and balances matched.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementConfig {
    pub mode: ParseMode,
    /// Balances within this distance of zero count as settled.
    ///
    /// Defaults to zero: amounts are whole cents, so a 1-cent balance is a
    /// real debt and gets a transfer. Set it to one cent to treat +-0.01 as
    /// already settled.
    pub dust: Amount,
}

/// Balances and plan for a group, computed without writing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPreview {
    pub balances: Balances,
    pub transfer_plan: Vec<PaymentPlan>,
    /// Number of unsettled expenses read from the store.
    pub expense_count: usize,
}

/// Runs settlements for groups held in an [`ExpenseStore`].
#[derive(Debug)]
pub struct Settler<S: ?Sized> {
    store: Arc<S>,
    config: SettlementConfig,
}

/// Public API
impl<S: ExpenseStore + ?Sized> Settler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, SettlementConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: SettlementConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> SettlementConfig {
        self.config
    }

    /// Compute balances and plan for the group's unsettled expenses.
    pub async fn preview(&self, group_id: &str) -> Result<SettlementPreview, SettlementError> {
        let expenses = self.unsettled(group_id).await?;
        let (balances, transfer_plan) = self.compute(&expenses)?;

        Ok(SettlementPreview {
            balances,
            transfer_plan,
            expense_count: expenses.len(),
        })
    }

    /// Settle the group: snapshot the current plan and mark every expense read
    /// for it as settled, in one store commit.
    ///
    /// Rejects the call before any write when nothing is unsettled. A
    /// concurrent settlement of the same expenses surfaces as a retryable
    /// storage conflict.
    pub async fn execute(
        &self,
        group_id: &str,
        settled_by: &str,
        settled_by_name: &str,
    ) -> Result<CommittedSettlement, SettlementError> {
        let expenses = self.unsettled(group_id).await?;
        let (balances, transfer_plan) = self.compute(&expenses)?;

        let snapshot = create_settlement_data(
            group_id,
            balances,
            transfer_plan,
            settled_by,
            settled_by_name,
        )
        .covering(expenses.iter().map(|e| e.id.clone()));

        let result = self.store.commit_settlement(snapshot).await;
        match &result {
            Ok(committed) => info!(
                group = %group_id,
                settled_by = %settled_by,
                expenses = committed.settled_count,
                transfers = committed.snapshot.transfer_plan.len(),
                "settlement committed"
            ),
            Err(e) => warn!(group = %group_id, reason = %e, "settlement rejected"),
        }
        result.map_err(SettlementError::from)
    }
}

/// Private API
impl<S: ExpenseStore + ?Sized> Settler<S> {
    async fn unsettled(&self, group_id: &str) -> Result<Vec<ExpenseRecord>, SettlementError> {
        let expenses = self.store.query_expenses(group_id, false).await?;
        if expenses.is_empty() {
            return Err(SettlementError::EmptySettlement(group_id.to_string()));
        }
        Ok(expenses)
    }

    /// Validate records per the configured mode, then balance and plan.
    ///
    /// Lenient mode leaves skipped records out of the balances only; they are
    /// still covered by (and settled with) the snapshot.
    fn compute(
        &self,
        expenses: &[ExpenseRecord],
    ) -> Result<(Balances, Vec<PaymentPlan>), SettlementError> {
        let mut admitted = Vec::with_capacity(expenses.len());
        for expense in expenses {
            match (expense.validate(), self.config.mode) {
                (Ok(()), _) => admitted.push(expense),
                (Err(e), ParseMode::Strict) => return Err(e.into()),
                (Err(e), ParseMode::Lenient) => {
                    warn!(
                        group = %expense.group_id,
                        expense = %expense.id,
                        reason = %e,
                        "expense left out of balances"
                    );
                }
            }
        }

        let balances = calculate_balances(admitted)?;
        let plan = TransferPlanner::with_dust(self.config.dust).plan(&balances);
        Ok((balances, plan))
    }
}
