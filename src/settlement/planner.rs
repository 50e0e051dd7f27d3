use serde::{Deserialize, Serialize};

use super::balance::Balances;
use crate::Amount;
use crate::model::UserId;

/// A single debtor -> creditor transfer instruction. `amount` is always positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPlan {
    pub from_user_id: UserId,
    pub from_user_name: String,
    pub to_user_id: UserId,
    pub to_user_name: String,
    pub amount: Amount,
}

/// Greedy largest-debtor / largest-creditor matcher.
///
/// Balances within `dust` of zero count as settled. The threshold is applied
/// once when partitioning and again whenever a party's remaining amount drops.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferPlanner {
    dust: Amount,
}

/// A party with an outstanding amount, always tracked as a positive value.
struct Party<'a> {
    id: &'a str,
    name: &'a str,
    remaining: Amount,
}

impl TransferPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dust(dust: Amount) -> Self {
        Self { dust: dust.abs() }
    }

    pub fn dust(&self) -> Amount {
        self.dust
    }

    /// Build a transfer plan that zeroes every non-dust balance.
    ///
    /// Ties on equal amounts resolve in ascending participant id, since the
    /// sort is stable and `Balances` iterates by id.
    pub fn plan(&self, balances: &Balances) -> Vec<PaymentPlan> {
        let mut creditors = Vec::new();
        let mut debtors = Vec::new();

        for (id, balance) in balances {
            let party = Party {
                id,
                name: &balance.user_name,
                remaining: balance.net_amount.abs(),
            };
            if balance.net_amount > self.dust {
                creditors.push(party);
            } else if balance.net_amount < -self.dust {
                debtors.push(party);
            }
        }

        let mut plans = Vec::with_capacity((creditors.len() + debtors.len()).saturating_sub(1));

        while !creditors.is_empty() && !debtors.is_empty() {
            creditors.sort_by(|a, b| b.remaining.cmp(&a.remaining));
            debtors.sort_by(|a, b| b.remaining.cmp(&a.remaining));

            let creditor = &mut creditors[0];
            let debtor = &mut debtors[0];
            let amount = creditor.remaining.min(debtor.remaining);

            plans.push(PaymentPlan {
                from_user_id: debtor.id.to_string(),
                from_user_name: debtor.name.to_string(),
                to_user_id: creditor.id.to_string(),
                to_user_name: creditor.name.to_string(),
                amount,
            });

            creditor.remaining -= amount;
            debtor.remaining -= amount;

            if creditor.remaining <= self.dust {
                creditors.remove(0);
            }
            if debtor.remaining <= self.dust {
                debtors.remove(0);
            }
        }

        plans
    }
}

/// Plan transfers with exact (zero-dust) matching.
pub fn calculate_optimal_payments(balances: &Balances) -> Vec<PaymentPlan> {
    TransferPlanner::new().plan(balances)
}
