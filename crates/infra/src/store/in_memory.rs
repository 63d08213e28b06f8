use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::Utc;

use splitledger_core::{ExpenseId, GroupId, SettlementId, UserId};
use splitledger_ledger::{Expense, LedgerShare, NewExpense, NewSettlement, SettlementTransaction};

use super::r#trait::{LedgerStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    expenses: HashMap<ExpenseId, Expense>,
    /// Per expense, in first-insert order; upserts replace in place.
    shares: HashMap<ExpenseId, Vec<LedgerShare>>,
    settlements: Vec<SettlementTransaction>,
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, operation: &'static str) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::LockPoisoned(operation))
    }

    fn write(
        &self,
        operation: &'static str,
    ) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::LockPoisoned(operation))
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_expense(&self, expense: NewExpense) -> Result<Expense, StoreError> {
        let stored = Expense::from_new(ExpenseId::new(), expense, Utc::now());
        let mut tables = self.write("insert_expense")?;
        tables.expenses.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete_expense(&self, expense_id: ExpenseId) -> Result<(), StoreError> {
        let mut tables = self.write("delete_expense")?;
        tables.expenses.remove(&expense_id);
        tables.shares.remove(&expense_id);
        Ok(())
    }

    async fn get_expense(&self, expense_id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        let tables = self.read("get_expense")?;
        Ok(tables.expenses.get(&expense_id).cloned())
    }

    async fn list_expenses(&self, group_id: GroupId) -> Result<Vec<Expense>, StoreError> {
        let tables = self.read("list_expenses")?;
        let mut expenses: Vec<_> = tables
            .expenses
            .values()
            .filter(|e| e.group_id == group_id)
            .cloned()
            .collect();
        expenses.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(expenses)
    }

    async fn upsert_shares(
        &self,
        expense_id: ExpenseId,
        shares: &[LedgerShare],
    ) -> Result<(), StoreError> {
        let mut tables = self.write("upsert_shares")?;
        let rows = tables.shares.entry(expense_id).or_default();

        for share in shares {
            let share = LedgerShare::new(expense_id, share.user_id, share.amount);
            match rows.iter_mut().find(|r| r.user_id == share.user_id) {
                Some(existing) => *existing = share,
                None => rows.push(share),
            }
        }

        Ok(())
    }

    async fn shares_by_expense(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<LedgerShare>, StoreError> {
        let tables = self.read("shares_by_expense")?;
        let mut rows = tables.shares.get(&expense_id).cloned().unwrap_or_default();
        rows.sort_by_key(|s| s.user_id);
        Ok(rows)
    }

    async fn shares_for_user_across_expenses(
        &self,
        group_id: GroupId,
        payer_id: UserId,
        user_id: UserId,
    ) -> Result<Vec<LedgerShare>, StoreError> {
        let tables = self.read("shares_for_user_across_expenses")?;

        Ok(tables
            .expenses
            .values()
            .filter(|e| e.group_id == group_id && e.payer_id == payer_id)
            .filter_map(|e| tables.shares.get(&e.id))
            .flat_map(|rows| rows.iter().filter(|r| r.user_id == user_id).copied())
            .collect())
    }

    async fn record_settlement(
        &self,
        tx: NewSettlement,
    ) -> Result<SettlementTransaction, StoreError> {
        let stored = SettlementTransaction::from_new(SettlementId::new(), tx, Utc::now());
        let mut tables = self.write("record_settlement")?;
        tables.settlements.push(stored.clone());
        Ok(stored)
    }

    async fn settlements_between(
        &self,
        group_id: GroupId,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<i64>, StoreError> {
        let tables = self.read("settlements_between")?;
        Ok(tables
            .settlements
            .iter()
            .filter(|tx| tx.group_id == group_id)
            .filter_map(|tx| tx.oriented(a, b))
            .collect())
    }

    async fn list_settlements(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<SettlementTransaction>, StoreError> {
        let tables = self.read("list_settlements")?;
        let mut txs: Vec<_> = tables
            .settlements
            .iter()
            .filter(|tx| tx.group_id == group_id)
            .cloned()
            .collect();
        txs.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then(b.id.cmp(&a.id)));
        Ok(txs)
    }

    async fn participants(&self, group_id: GroupId) -> Result<Vec<UserId>, StoreError> {
        let tables = self.read("participants")?;
        let mut users = BTreeSet::new();

        for expense in tables.expenses.values().filter(|e| e.group_id == group_id) {
            users.insert(expense.payer_id);
            if let Some(rows) = tables.shares.get(&expense.id) {
                users.extend(rows.iter().map(|r| r.user_id));
            }
        }
        for tx in tables.settlements.iter().filter(|tx| tx.group_id == group_id) {
            users.insert(tx.debtor_id);
            users.insert(tx.creditor_id);
        }

        Ok(users.into_iter().collect())
    }
}
