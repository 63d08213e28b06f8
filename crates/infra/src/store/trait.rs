use std::sync::Arc;

use thiserror::Error;

use splitledger_core::{ExpenseId, GroupId, UserId};
use splitledger_ledger::{Expense, LedgerShare, NewExpense, NewSettlement, SettlementTransaction};

/// Ledger store operation error.
///
/// These are **infrastructure errors** (I/O, connectivity, decoding) as opposed
/// to calculator/domain errors. They surface to callers verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend error in {operation}: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("connection pool closed")]
    PoolClosed,

    #[error("failed to decode stored row: {0}")]
    Decode(String),

    #[error("lock poisoned in {0}")]
    LockPoisoned(&'static str),
}

impl StoreError {
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }
}

/// Durable home of expense headers, ledger shares and settlement transactions.
///
/// ## Contract
///
/// - `upsert_shares` is keyed by `(expense_id, user_id)`; a second upsert for
///   the same key replaces the amount (last writer wins). One call is atomic.
/// - No share-level validation happens here; the store trusts its input.
/// - Settlement transactions are insert-only.
/// - There is no transaction spanning header insert and share upsert.
///
/// Implementations must be safe to share across concurrent callers; per-key
/// safety relies on the backend's native atomic upsert/insert.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a header and assign its identity and creation time.
    async fn insert_expense(&self, expense: NewExpense) -> Result<Expense, StoreError>;

    /// Remove a header and any shares attached to it. Deleting a missing
    /// expense is not an error.
    async fn delete_expense(&self, expense_id: ExpenseId) -> Result<(), StoreError>;

    async fn get_expense(&self, expense_id: ExpenseId) -> Result<Option<Expense>, StoreError>;

    /// Headers for a group, newest first.
    async fn list_expenses(&self, group_id: GroupId) -> Result<Vec<Expense>, StoreError>;

    async fn upsert_shares(
        &self,
        expense_id: ExpenseId,
        shares: &[LedgerShare],
    ) -> Result<(), StoreError>;

    /// Shares of one expense, ordered by user id. Empty for a pending expense.
    async fn shares_by_expense(&self, expense_id: ExpenseId)
    -> Result<Vec<LedgerShare>, StoreError>;

    /// Shares `user_id` holds on expenses paid by `payer_id` within the group.
    async fn shares_for_user_across_expenses(
        &self,
        group_id: GroupId,
        payer_id: UserId,
        user_id: UserId,
    ) -> Result<Vec<LedgerShare>, StoreError>;

    async fn record_settlement(
        &self,
        tx: NewSettlement,
    ) -> Result<SettlementTransaction, StoreError>;

    /// Settlement amounts between `a` and `b`, signed from `a`'s side:
    /// positive when `a` paid `b`, negative when `b` paid `a`.
    async fn settlements_between(
        &self,
        group_id: GroupId,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<i64>, StoreError>;

    /// Settlement transactions for a group, newest first.
    async fn list_settlements(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<SettlementTransaction>, StoreError>;

    /// Every user that appears in the group's ledger (payers, share holders,
    /// settlement parties), sorted.
    async fn participants(&self, group_id: GroupId) -> Result<Vec<UserId>, StoreError>;

    /// End of the store's lifecycle. Further calls may fail.
    async fn close(&self) {}
}

#[async_trait::async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn insert_expense(&self, expense: NewExpense) -> Result<Expense, StoreError> {
        (**self).insert_expense(expense).await
    }

    async fn delete_expense(&self, expense_id: ExpenseId) -> Result<(), StoreError> {
        (**self).delete_expense(expense_id).await
    }

    async fn get_expense(&self, expense_id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        (**self).get_expense(expense_id).await
    }

    async fn list_expenses(&self, group_id: GroupId) -> Result<Vec<Expense>, StoreError> {
        (**self).list_expenses(group_id).await
    }

    async fn upsert_shares(
        &self,
        expense_id: ExpenseId,
        shares: &[LedgerShare],
    ) -> Result<(), StoreError> {
        (**self).upsert_shares(expense_id, shares).await
    }

    async fn shares_by_expense(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<LedgerShare>, StoreError> {
        (**self).shares_by_expense(expense_id).await
    }

    async fn shares_for_user_across_expenses(
        &self,
        group_id: GroupId,
        payer_id: UserId,
        user_id: UserId,
    ) -> Result<Vec<LedgerShare>, StoreError> {
        (**self)
            .shares_for_user_across_expenses(group_id, payer_id, user_id)
            .await
    }

    async fn record_settlement(
        &self,
        tx: NewSettlement,
    ) -> Result<SettlementTransaction, StoreError> {
        (**self).record_settlement(tx).await
    }

    async fn settlements_between(
        &self,
        group_id: GroupId,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<i64>, StoreError> {
        (**self).settlements_between(group_id, a, b).await
    }

    async fn list_settlements(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<SettlementTransaction>, StoreError> {
        (**self).list_settlements(group_id).await
    }

    async fn participants(&self, group_id: GroupId) -> Result<Vec<UserId>, StoreError> {
        (**self).participants(group_id).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}
