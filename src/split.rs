//! Share builders for new expenses.
//!
//! All builders work in minor units and always return shares that sum to the
//! expense amount exactly. Leftover cents go to the members with the largest
//! truncated remainder, earlier members first on ties.

use thiserror::Error;

use crate::Amount;
use crate::model::{Split, UserId};

/// A group member eligible to share an expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: UserId,
    pub user_name: String,
}

impl Member {
    pub fn new(user_id: impl Into<UserId>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplitError {
    #[error("no members to split between")]
    NoMembers,

    #[error("{ratios} ratios given for {members} members")]
    RatioCountMismatch { members: usize, ratios: usize },

    #[error("ratios sum to zero")]
    ZeroRatioTotal,

    #[error("amount {0} must be positive")]
    NonPositiveAmount(Amount),
}

/// Split `amount` evenly between every member.
pub fn equal_split(amount: Amount, members: &[Member]) -> Result<Vec<Split>, SplitError> {
    let weights = vec![1; members.len()];
    weighted_split(amount, members, &weights)
}

/// Split `amount` evenly between the selected members only.
///
/// Behaves like [`equal_split`]; kept separate so callers record the intent.
pub fn selected_split(amount: Amount, selected: &[Member]) -> Result<Vec<Split>, SplitError> {
    equal_split(amount, selected)
}

/// Split `amount` by integer weights, e.g. `[2, 1, 1]`.
pub fn ratio_split(
    amount: Amount,
    members: &[Member],
    ratios: &[u32],
) -> Result<Vec<Split>, SplitError> {
    if members.len() != ratios.len() {
        return Err(SplitError::RatioCountMismatch {
            members: members.len(),
            ratios: ratios.len(),
        });
    }
    weighted_split(amount, members, ratios)
}

fn weighted_split(
    amount: Amount,
    members: &[Member],
    weights: &[u32],
) -> Result<Vec<Split>, SplitError> {
    if members.is_empty() {
        return Err(SplitError::NoMembers);
    }
    if !amount.is_positive() {
        return Err(SplitError::NonPositiveAmount(amount));
    }
    let total_weight: i128 = weights.iter().map(|w| *w as i128).sum();
    if total_weight == 0 {
        return Err(SplitError::ZeroRatioTotal);
    }

    let minor = amount.minor() as i128;
    let mut shares: Vec<i128> = Vec::with_capacity(members.len());
    let mut remainders: Vec<(usize, i128)> = Vec::with_capacity(members.len());
    for (idx, weight) in weights.iter().enumerate() {
        let scaled = minor * *weight as i128;
        shares.push(scaled / total_weight);
        remainders.push((idx, scaled % total_weight));
    }

    let mut leftover = minor - shares.iter().sum::<i128>();
    // stable: equal remainders keep member order
    remainders.sort_by(|a, b| b.1.cmp(&a.1));
    for (idx, _) in remainders {
        if leftover == 0 {
            break;
        }
        shares[idx] += 1;
        leftover -= 1;
    }

    Ok(members
        .iter()
        .zip(shares)
        .map(|(member, share)| {
            Split::new(
                member.user_id.clone(),
                member.user_name.clone(),
                Amount::from_minor(share as i64),
            )
        })
        .collect())
}
