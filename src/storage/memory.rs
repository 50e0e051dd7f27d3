//! Store implementation in-memory. For tests and the command line tool.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use super::{CommittedSettlement, ExpenseStore, Result, StorageError};
use crate::model::{ExpenseId, ExpenseNumber, ExpenseRecord, GroupId, NewExpense};
use crate::settlement::SettlementSnapshot;

#[derive(Debug, Default)]
struct Inner {
    expenses: BTreeMap<ExpenseId, ExpenseRecord>,
    /// Next number to hand out per group. Only ever grows, so deleted numbers
    /// are never reused.
    next_numbers: HashMap<GroupId, ExpenseNumber>,
    settlements: Vec<SettlementSnapshot>,
    next_doc: u64,
}

impl Inner {
    fn doc_id(&mut self, prefix: &str) -> String {
        self.next_doc += 1;
        format!("{prefix}-{:06}", self.next_doc)
    }

    fn number_taken(&self, group_id: &str, number: ExpenseNumber) -> bool {
        self.expenses
            .values()
            .any(|e| e.group_id == group_id && e.expense_number == number)
    }
}

/// [`ExpenseStore`] implementation in-memory.
///
/// A single lock guards all collections, so `commit_settlement` is atomic with
/// respect to every other call.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert every expense of the stream, skipping (and logging) rejected ones.
    ///
    /// Returns the number of expenses stored.
    pub async fn import(&self, mut stream: impl Stream<Item = ExpenseRecord> + Unpin) -> usize {
        let mut stored = 0;
        while let Some(expense) = stream.next().await {
            let id = expense.id.clone();
            match self.insert_expense(expense).await {
                Ok(()) => stored += 1,
                Err(e) => warn!(expense = %id, reason = %e, "expense skipped"),
            }
        }
        stored
    }
}

#[async_trait]
impl ExpenseStore for InMemoryStore {
    async fn create_expense(&self, expense: NewExpense) -> Result<ExpenseRecord> {
        let mut inner = self.inner.write().await;

        let next = inner.next_numbers.entry(expense.group_id.clone()).or_insert(1);
        let number = *next;
        *next = number
            .checked_add(1)
            .ok_or_else(|| StorageError::ExpenseNumberExhausted(expense.group_id.clone()))?;

        let id = inner.doc_id("exp");
        let record = expense.into_record(id.clone(), number);
        inner.expenses.insert(id, record.clone());

        info!(group = %record.group_id, expense = %record.id, number, "expense created");
        Ok(record)
    }

    async fn insert_expense(&self, expense: ExpenseRecord) -> Result<()> {
        let mut inner = self.inner.write().await;

        if inner.expenses.contains_key(&expense.id) {
            return Err(StorageError::DuplicateExpense(expense.id));
        }
        if inner.number_taken(&expense.group_id, expense.expense_number) {
            return Err(StorageError::DuplicateExpenseNumber {
                group_id: expense.group_id,
                number: expense.expense_number,
            });
        }

        let following = expense
            .expense_number
            .checked_add(1)
            .ok_or_else(|| StorageError::ExpenseNumberExhausted(expense.group_id.clone()))?;
        let next = inner.next_numbers.entry(expense.group_id.clone()).or_insert(1);
        *next = (*next).max(following);
        inner.expenses.insert(expense.id.clone(), expense);
        Ok(())
    }

    async fn get_expense(&self, id: &str) -> Result<Option<ExpenseRecord>> {
        Ok(self.inner.read().await.expenses.get(id).cloned())
    }

    async fn get_expense_by_number(
        &self,
        group_id: &str,
        number: ExpenseNumber,
    ) -> Result<Option<ExpenseRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .expenses
            .values()
            .find(|e| e.group_id == group_id && e.expense_number == number)
            .cloned())
    }

    async fn delete_expense(&self, id: &str) -> Result<bool> {
        Ok(self.inner.write().await.expenses.remove(id).is_some())
    }

    async fn query_expenses(&self, group_id: &str, is_settled: bool) -> Result<Vec<ExpenseRecord>> {
        let inner = self.inner.read().await;
        let mut expenses: Vec<_> = inner
            .expenses
            .values()
            .filter(|e| e.group_id == group_id && e.is_settled == is_settled)
            .cloned()
            .collect();
        expenses.sort_by_key(|e| e.expense_number);
        Ok(expenses)
    }

    async fn commit_settlement(
        &self,
        mut snapshot: SettlementSnapshot,
    ) -> Result<CommittedSettlement> {
        let mut inner = self.inner.write().await;

        // check every precondition before the first write
        if snapshot.expense_ids.is_empty() {
            return Err(StorageError::EmptySettlement(snapshot.group_id));
        }
        let mut seen = HashSet::with_capacity(snapshot.expense_ids.len());
        for id in &snapshot.expense_ids {
            if !seen.insert(id) {
                return Err(StorageError::DuplicateCoveredExpense {
                    group_id: snapshot.group_id.clone(),
                    expense_id: id.clone(),
                });
            }
            let unsettled = inner
                .expenses
                .get(id)
                .is_some_and(|e| e.group_id == snapshot.group_id && !e.is_settled);
            if !unsettled {
                return Err(StorageError::SettlementConflict {
                    group_id: snapshot.group_id.clone(),
                    expense_id: id.clone(),
                });
            }
        }

        let mut settled_count = 0;
        for id in &snapshot.expense_ids {
            if let Some(expense) = inner.expenses.get_mut(id) {
                expense.is_settled = true;
                settled_count += 1;
            }
        }

        snapshot.id = Some(inner.doc_id("stl"));
        snapshot.settled_at = Some(Utc::now());
        inner.settlements.push(snapshot.clone());

        Ok(CommittedSettlement {
            settled_count,
            snapshot,
        })
    }

    async fn group_settlements(
        &self,
        group_id: &str,
        limit: usize,
    ) -> Result<Vec<SettlementSnapshot>> {
        Ok(self
            .inner
            .read()
            .await
            .settlements
            .iter()
            .rev()
            .filter(|s| s.group_id == group_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use crate::model::{Split, SplitKind};
    use crate::settlement::{Balances, create_settlement_data};

    // test utils

    fn new_expense(group: &str, payer: &str, amount: i64) -> NewExpense {
        NewExpense {
            group_id: group.into(),
            payer_id: payer.into(),
            payer_name: payer.to_uppercase(),
            amount: Amount::from_major(amount),
            description: "dinner".into(),
            split_kind: SplitKind::Equal,
            splits: vec![Split::new(payer, payer.to_uppercase(), Amount::from_major(amount))],
            created_by: payer.into(),
        }
    }

    fn record(id: &str, group: &str, number: ExpenseNumber) -> ExpenseRecord {
        new_expense(group, "a", 10).into_record(id.into(), number)
    }

    fn snapshot(group: &str, ids: &[&ExpenseId]) -> SettlementSnapshot {
        create_settlement_data(group, Balances::new(), vec![], "u", "U")
            .covering(ids.iter().map(|id| id.to_string()))
    }

    #[tokio::test]
    async fn create_assigns_sequential_numbers_per_group() {
        let store = InMemoryStore::new();
        let a1 = store.create_expense(new_expense("g1", "a", 10)).await.unwrap();
        let a2 = store.create_expense(new_expense("g1", "a", 20)).await.unwrap();
        let b1 = store.create_expense(new_expense("g2", "b", 30)).await.unwrap();

        assert_eq!((a1.expense_number, a2.expense_number), (1, 2));
        assert_eq!(b1.expense_number, 1);
        assert_ne!(a1.id, a2.id);
        assert!(!a1.is_settled);
    }

    #[tokio::test]
    async fn deleted_numbers_are_not_reused() {
        let store = InMemoryStore::new();
        store.create_expense(new_expense("g", "a", 10)).await.unwrap();
        let second = store.create_expense(new_expense("g", "a", 20)).await.unwrap();

        assert!(store.delete_expense(&second.id).await.unwrap());
        let third = store.create_expense(new_expense("g", "a", 30)).await.unwrap();

        assert_eq!(third.expense_number, 3);
    }

    #[tokio::test]
    async fn delete_missing_expense_returns_false() {
        let store = InMemoryStore::new();
        assert!(!store.delete_expense("nope").await.unwrap());
    }

    #[tokio::test]
    async fn lookup_by_number() {
        let store = InMemoryStore::new();
        let created = store.create_expense(new_expense("g", "a", 10)).await.unwrap();

        let found = store.get_expense_by_number("g", 1).await.unwrap();
        assert_eq!(found, Some(created.clone()));
        assert_eq!(store.get_expense(&created.id).await.unwrap(), Some(created));
        assert_eq!(store.get_expense_by_number("other", 1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let store = InMemoryStore::new();
        store.insert_expense(record("e1", "g", 1)).await.unwrap();

        assert_eq!(
            store.insert_expense(record("e1", "g", 2)).await,
            Err(StorageError::DuplicateExpense("e1".into()))
        );
        assert!(matches!(
            store.insert_expense(record("e2", "g", 1)).await,
            Err(StorageError::DuplicateExpenseNumber { number: 1, .. })
        ));
    }

    #[tokio::test]
    async fn insert_advances_the_number_sequence() {
        let store = InMemoryStore::new();
        store.insert_expense(record("e1", "g", 5)).await.unwrap();

        let next = store.create_expense(new_expense("g", "a", 10)).await.unwrap();
        assert_eq!(next.expense_number, 6);
    }

    #[tokio::test]
    async fn query_filters_by_group_and_state() {
        let store = InMemoryStore::new();
        store.insert_expense(record("e2", "g", 2)).await.unwrap();
        store.insert_expense(record("e1", "g", 1)).await.unwrap();
        store.insert_expense(record("x1", "other", 1)).await.unwrap();
        let mut settled = record("e3", "g", 3);
        settled.is_settled = true;
        store.insert_expense(settled).await.unwrap();

        let open = store.query_expenses("g", false).await.unwrap();
        let ids: Vec<_> = open.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e2"]);

        let closed = store.query_expenses("g", true).await.unwrap();
        assert_eq!(closed.len(), 1);
    }

    #[tokio::test]
    async fn commit_flips_covered_expenses_and_stamps_snapshot() {
        let store = InMemoryStore::new();
        let e1 = store.create_expense(new_expense("g", "a", 10)).await.unwrap();
        let e2 = store.create_expense(new_expense("g", "b", 20)).await.unwrap();

        let committed = store
            .commit_settlement(snapshot("g", &[&e1.id, &e2.id]))
            .await
            .unwrap();

        assert_eq!(committed.settled_count, 2);
        assert!(committed.snapshot.is_committed());
        assert!(store.query_expenses("g", false).await.unwrap().is_empty());
        assert_eq!(store.group_settlements("g", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_leaves_expenses_created_afterwards_alone() {
        let store = InMemoryStore::new();
        let e1 = store.create_expense(new_expense("g", "a", 10)).await.unwrap();
        let snap = snapshot("g", &[&e1.id]);
        let late = store.create_expense(new_expense("g", "b", 20)).await.unwrap();

        store.commit_settlement(snap).await.unwrap();

        let open = store.query_expenses("g", false).await.unwrap();
        assert_eq!(open, vec![late]);
    }

    #[tokio::test]
    async fn second_commit_over_same_expenses_conflicts_without_writing() {
        let store = InMemoryStore::new();
        let e1 = store.create_expense(new_expense("g", "a", 10)).await.unwrap();
        let e2 = store.create_expense(new_expense("g", "a", 10)).await.unwrap();

        store.commit_settlement(snapshot("g", &[&e1.id])).await.unwrap();
        let err = store
            .commit_settlement(snapshot("g", &[&e2.id, &e1.id]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            StorageError::SettlementConflict {
                group_id: "g".into(),
                expense_id: e1.id.clone(),
            }
        );
        assert!(err.is_retryable());
        // e2 untouched, only one snapshot stored
        assert_eq!(store.query_expenses("g", false).await.unwrap().len(), 1);
        assert_eq!(store.group_settlements("g", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_rejects_expense_from_other_group() {
        let store = InMemoryStore::new();
        let foreign = store.create_expense(new_expense("other", "a", 10)).await.unwrap();

        let err = store
            .commit_settlement(snapshot("g", &[&foreign.id]))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SettlementConflict { .. }));
    }

    #[tokio::test]
    async fn commit_rejects_empty_covered_set() {
        let store = InMemoryStore::new();
        store.create_expense(new_expense("g", "a", 10)).await.unwrap();

        let err = store.commit_settlement(snapshot("g", &[])).await.unwrap_err();

        assert_eq!(err, StorageError::EmptySettlement("g".into()));
        assert!(!err.is_retryable());
        assert!(store.group_settlements("g", 10).await.unwrap().is_empty());
        assert_eq!(store.query_expenses("g", false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_rejects_expense_covered_twice() {
        let store = InMemoryStore::new();
        let e1 = store.create_expense(new_expense("g", "a", 10)).await.unwrap();
        let e2 = store.create_expense(new_expense("g", "b", 20)).await.unwrap();

        let err = store
            .commit_settlement(snapshot("g", &[&e1.id, &e2.id, &e1.id]))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            StorageError::DuplicateCoveredExpense {
                group_id: "g".into(),
                expense_id: e1.id.clone(),
            }
        );
        assert!(store.group_settlements("g", 10).await.unwrap().is_empty());
        assert_eq!(store.query_expenses("g", false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn insert_with_last_number_is_rejected() {
        let store = InMemoryStore::new();

        let err = store
            .insert_expense(record("e1", "g", ExpenseNumber::MAX))
            .await
            .unwrap_err();

        assert_eq!(err, StorageError::ExpenseNumberExhausted("g".into()));
        assert!(store.get_expense("e1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_fails_once_numbers_run_out() {
        let store = InMemoryStore::new();
        store
            .insert_expense(record("e1", "g", ExpenseNumber::MAX - 1))
            .await
            .unwrap();

        let err = store
            .create_expense(new_expense("g", "a", 10))
            .await
            .unwrap_err();

        assert_eq!(err, StorageError::ExpenseNumberExhausted("g".into()));
        assert_eq!(store.query_expenses("g", false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn settlements_are_listed_newest_first() {
        let store = InMemoryStore::new();
        let e1 = store.create_expense(new_expense("g", "a", 10)).await.unwrap();
        let first = store.commit_settlement(snapshot("g", &[&e1.id])).await.unwrap();
        let e2 = store.create_expense(new_expense("g", "a", 10)).await.unwrap();
        let second = store.commit_settlement(snapshot("g", &[&e2.id])).await.unwrap();

        let listed = store.group_settlements("g", 10).await.unwrap();
        assert_eq!(listed, vec![second.snapshot.clone(), first.snapshot]);

        let limited = store.group_settlements("g", 1).await.unwrap();
        assert_eq!(limited, vec![second.snapshot]);
    }

    #[tokio::test]
    async fn import_skips_rejected_expenses() {
        let store = InMemoryStore::new();
        let records = vec![record("e1", "g", 1), record("e1", "g", 2), record("e3", "g", 3)];

        let stored = store.import(tokio_stream::iter(records)).await;

        assert_eq!(stored, 2);
        assert_eq!(store.query_expenses("g", false).await.unwrap().len(), 2);
    }
}
