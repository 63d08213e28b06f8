//! Fault-injecting store wrapper for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use splitledger_core::{ExpenseId, GroupId, UserId};
use splitledger_ledger::{Expense, LedgerShare, NewExpense, NewSettlement, SettlementTransaction};

use crate::store::{InMemoryLedgerStore, LedgerStore, StoreError};

/// In-memory store whose individual operations can be switched to fail or hang.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryLedgerStore,
    fail_delete: AtomicBool,
    fail_upsert: AtomicBool,
    stall_reads: AtomicBool,
    failing_user: Mutex<Option<UserId>>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_delete(&self, on: bool) {
        self.fail_delete.store(on, Ordering::SeqCst);
    }

    pub fn fail_upsert(&self, on: bool) {
        self.fail_upsert.store(on, Ordering::SeqCst);
    }

    /// Share reads never complete while set.
    pub fn stall_reads(&self, on: bool) {
        self.stall_reads.store(on, Ordering::SeqCst);
    }

    /// Fail every share read that involves `user` (as payer or holder).
    pub fn fail_reads_for(&self, user: Option<UserId>) {
        *self.failing_user.lock().unwrap() = user;
    }

    fn injected(operation: &'static str) -> StoreError {
        StoreError::backend(operation, "injected fault")
    }
}

#[async_trait::async_trait]
impl LedgerStore for FaultyStore {
    async fn insert_expense(&self, expense: NewExpense) -> Result<Expense, StoreError> {
        self.inner.insert_expense(expense).await
    }

    async fn delete_expense(&self, expense_id: ExpenseId) -> Result<(), StoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::injected("delete_expense"));
        }
        self.inner.delete_expense(expense_id).await
    }

    async fn get_expense(&self, expense_id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        self.inner.get_expense(expense_id).await
    }

    async fn list_expenses(&self, group_id: GroupId) -> Result<Vec<Expense>, StoreError> {
        self.inner.list_expenses(group_id).await
    }

    async fn upsert_shares(
        &self,
        expense_id: ExpenseId,
        shares: &[LedgerShare],
    ) -> Result<(), StoreError> {
        if self.fail_upsert.load(Ordering::SeqCst) {
            return Err(Self::injected("upsert_shares"));
        }
        self.inner.upsert_shares(expense_id, shares).await
    }

    async fn shares_by_expense(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<LedgerShare>, StoreError> {
        self.inner.shares_by_expense(expense_id).await
    }

    async fn shares_for_user_across_expenses(
        &self,
        group_id: GroupId,
        payer_id: UserId,
        user_id: UserId,
    ) -> Result<Vec<LedgerShare>, StoreError> {
        if self.stall_reads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failing = *self.failing_user.lock().unwrap();
        if failing.is_some_and(|u| u == payer_id || u == user_id) {
            return Err(Self::injected("shares_for_user_across_expenses"));
        }
        self.inner
            .shares_for_user_across_expenses(group_id, payer_id, user_id)
            .await
    }

    async fn record_settlement(
        &self,
        tx: NewSettlement,
    ) -> Result<SettlementTransaction, StoreError> {
        self.inner.record_settlement(tx).await
    }

    async fn settlements_between(
        &self,
        group_id: GroupId,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<i64>, StoreError> {
        self.inner.settlements_between(group_id, a, b).await
    }

    async fn list_settlements(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<SettlementTransaction>, StoreError> {
        self.inner.list_settlements(group_id).await
    }

    async fn participants(&self, group_id: GroupId) -> Result<Vec<UserId>, StoreError> {
        self.inner.participants(group_id).await
    }
}
