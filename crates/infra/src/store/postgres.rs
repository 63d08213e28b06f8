//! Postgres-backed ledger store.
//!
//! ## Schema
//!
//! - `expenses`: one row per header.
//! - `expense_shares`: primary key `(expense_id, user_id)`, cascades on header
//!   delete. Upserts go through `ON CONFLICT ... DO UPDATE`, so re-running a
//!   share assignment replaces amounts instead of duplicating rows.
//! - `settlements`: insert-only.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database (any code) | `Backend` (with operation + message) |
//! | PoolClosed | `PoolClosed` |
//! | ColumnDecode / Decode | `Decode` |
//! | Other | `Backend` |

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use splitledger_core::{ExpenseId, GroupId, SettlementId, UserId};
use splitledger_ledger::{
    Expense, LedgerShare, NewExpense, NewSettlement, SettlementTransaction, SplitStrategy,
};

use super::r#trait::{LedgerStore, StoreError};
use crate::config::StoreConfig;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS expenses (
        id          UUID PRIMARY KEY,
        group_id    UUID NOT NULL,
        payer_id    UUID NOT NULL,
        amount      BIGINT NOT NULL CHECK (amount > 0),
        description TEXT NOT NULL,
        strategy    TEXT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS expense_shares (
        expense_id UUID NOT NULL REFERENCES expenses (id) ON DELETE CASCADE,
        user_id    UUID NOT NULL,
        amount     BIGINT NOT NULL,
        PRIMARY KEY (expense_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settlements (
        id          UUID PRIMARY KEY,
        group_id    UUID NOT NULL,
        debtor_id   UUID NOT NULL,
        creditor_id UUID NOT NULL,
        amount      BIGINT NOT NULL CHECK (amount > 0),
        recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CHECK (debtor_id <> creditor_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS expenses_group_payer_idx ON expenses (group_id, payer_id)",
    "CREATE INDEX IF NOT EXISTS expense_shares_user_idx ON expense_shares (user_id)",
    "CREATE INDEX IF NOT EXISTS settlements_group_idx ON settlements (group_id, debtor_id, creditor_id)",
];

/// Postgres-backed ledger store.
///
/// Uses a SQLx connection pool (`Send + Sync`), so one handle can be shared by
/// every caller. Only `upsert_shares` opens a transaction; every other
/// operation is a single statement.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool sized from `config`.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        tracing::info!(statements = SCHEMA.len(), "ledger schema ensured");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {
    #[instrument(
        skip(self, expense),
        fields(group_id = %expense.group_id, payer_id = %expense.payer_id),
        err
    )]
    async fn insert_expense(&self, expense: NewExpense) -> Result<Expense, StoreError> {
        let id = ExpenseId::new();

        let row = sqlx::query(
            r#"
            INSERT INTO expenses (id, group_id, payer_id, amount, description, strategy)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, group_id, payer_id, amount, description, strategy, created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(expense.group_id.as_uuid())
        .bind(expense.payer_id.as_uuid())
        .bind(expense.amount)
        .bind(&expense.description)
        .bind(expense.strategy.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_expense", e))?;

        decode_expense(&row)
    }

    #[instrument(skip(self), fields(expense_id = %expense_id), err)]
    async fn delete_expense(&self, expense_id: ExpenseId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM expenses WHERE id = $1")
            .bind(expense_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_expense", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(expense_id = %expense_id), err)]
    async fn get_expense(&self, expense_id: ExpenseId) -> Result<Option<Expense>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, group_id, payer_id, amount, description, strategy, created_at
            FROM expenses
            WHERE id = $1
            "#,
        )
        .bind(expense_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_expense", e))?;

        row.as_ref().map(decode_expense).transpose()
    }

    #[instrument(skip(self), fields(group_id = %group_id), err)]
    async fn list_expenses(&self, group_id: GroupId) -> Result<Vec<Expense>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, group_id, payer_id, amount, description, strategy, created_at
            FROM expenses
            WHERE group_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(group_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_expenses", e))?;

        rows.iter().map(decode_expense).collect()
    }

    #[instrument(
        skip(self, shares),
        fields(expense_id = %expense_id, share_count = shares.len()),
        err
    )]
    async fn upsert_shares(
        &self,
        expense_id: ExpenseId,
        shares: &[LedgerShare],
    ) -> Result<(), StoreError> {
        if shares.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("upsert_shares", e))?;

        for share in shares {
            sqlx::query(
                r#"
                INSERT INTO expense_shares (expense_id, user_id, amount)
                VALUES ($1, $2, $3)
                ON CONFLICT (expense_id, user_id) DO UPDATE SET amount = EXCLUDED.amount
                "#,
            )
            .bind(expense_id.as_uuid())
            .bind(share.user_id.as_uuid())
            .bind(share.amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_shares", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("upsert_shares", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(expense_id = %expense_id), err)]
    async fn shares_by_expense(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<LedgerShare>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT expense_id, user_id, amount
            FROM expense_shares
            WHERE expense_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(expense_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("shares_by_expense", e))?;

        decode_shares(&rows)
    }

    #[instrument(
        skip(self),
        fields(group_id = %group_id, payer_id = %payer_id, user_id = %user_id),
        err
    )]
    async fn shares_for_user_across_expenses(
        &self,
        group_id: GroupId,
        payer_id: UserId,
        user_id: UserId,
    ) -> Result<Vec<LedgerShare>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT s.expense_id, s.user_id, s.amount
            FROM expense_shares s
            JOIN expenses e ON e.id = s.expense_id
            WHERE e.group_id = $1 AND e.payer_id = $2 AND s.user_id = $3
            "#,
        )
        .bind(group_id.as_uuid())
        .bind(payer_id.as_uuid())
        .bind(user_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("shares_for_user_across_expenses", e))?;

        decode_shares(&rows)
    }

    #[instrument(
        skip(self, tx),
        fields(group_id = %tx.group_id, debtor_id = %tx.debtor_id, creditor_id = %tx.creditor_id),
        err
    )]
    async fn record_settlement(
        &self,
        tx: NewSettlement,
    ) -> Result<SettlementTransaction, StoreError> {
        let id = SettlementId::new();

        let row = sqlx::query(
            r#"
            INSERT INTO settlements (id, group_id, debtor_id, creditor_id, amount)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, group_id, debtor_id, creditor_id, amount, recorded_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(tx.group_id.as_uuid())
        .bind(tx.debtor_id.as_uuid())
        .bind(tx.creditor_id.as_uuid())
        .bind(tx.amount)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_settlement", e))?;

        SettlementRow::from_row(&row)
            .map(Into::into)
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    #[instrument(skip(self), fields(group_id = %group_id, a = %a, b = %b), err)]
    async fn settlements_between(
        &self,
        group_id: GroupId,
        a: UserId,
        b: UserId,
    ) -> Result<Vec<i64>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT CASE WHEN debtor_id = $2 THEN amount ELSE -amount END AS signed
            FROM settlements
            WHERE group_id = $1
              AND ((debtor_id = $2 AND creditor_id = $3)
                OR (debtor_id = $3 AND creditor_id = $2))
            "#,
        )
        .bind(group_id.as_uuid())
        .bind(a.as_uuid())
        .bind(b.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("settlements_between", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<i64, _>("signed")
                    .map_err(|e| StoreError::Decode(e.to_string()))
            })
            .collect()
    }

    #[instrument(skip(self), fields(group_id = %group_id), err)]
    async fn list_settlements(
        &self,
        group_id: GroupId,
    ) -> Result<Vec<SettlementTransaction>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, group_id, debtor_id, creditor_id, amount, recorded_at
            FROM settlements
            WHERE group_id = $1
            ORDER BY recorded_at DESC, id DESC
            "#,
        )
        .bind(group_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_settlements", e))?;

        rows.iter()
            .map(|row| {
                SettlementRow::from_row(row)
                    .map(Into::into)
                    .map_err(|e| StoreError::Decode(e.to_string()))
            })
            .collect()
    }

    #[instrument(skip(self), fields(group_id = %group_id), err)]
    async fn participants(&self, group_id: GroupId) -> Result<Vec<UserId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT payer_id AS user_id FROM expenses WHERE group_id = $1
            UNION
            SELECT s.user_id FROM expense_shares s
              JOIN expenses e ON e.id = s.expense_id
             WHERE e.group_id = $1
            UNION
            SELECT debtor_id FROM settlements WHERE group_id = $1
            UNION
            SELECT creditor_id FROM settlements WHERE group_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(group_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("participants", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<uuid::Uuid, _>("user_id")
                    .map(UserId::from_uuid)
                    .map_err(|e| StoreError::Decode(e.to_string()))
            })
            .collect()
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("ledger store pool closed");
    }
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = match db_err.code() {
                Some(code) => format!("{} (code {})", db_err.message(), code),
                None => db_err.message().to_string(),
            };
            StoreError::backend(operation, message)
        }
        sqlx::Error::PoolClosed => StoreError::PoolClosed,
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        _ => StoreError::backend(operation, err.to_string()),
    }
}

fn decode_expense(row: &PgRow) -> Result<Expense, StoreError> {
    ExpenseRow::from_row(row)
        .map_err(|e| StoreError::Decode(e.to_string()))?
        .try_into()
}

fn decode_shares(rows: &[PgRow]) -> Result<Vec<LedgerShare>, StoreError> {
    rows.iter()
        .map(|row| {
            ShareRow::from_row(row)
                .map(Into::into)
                .map_err(|e| StoreError::Decode(e.to_string()))
        })
        .collect()
}

// SQLx row types

#[derive(Debug)]
struct ExpenseRow {
    id: uuid::Uuid,
    group_id: uuid::Uuid,
    payer_id: uuid::Uuid,
    amount: i64,
    description: String,
    strategy: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ExpenseRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ExpenseRow {
            id: row.try_get("id")?,
            group_id: row.try_get("group_id")?,
            payer_id: row.try_get("payer_id")?,
            amount: row.try_get("amount")?,
            description: row.try_get("description")?,
            strategy: row.try_get("strategy")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<ExpenseRow> for Expense {
    type Error = StoreError;

    fn try_from(row: ExpenseRow) -> Result<Self, Self::Error> {
        let strategy = SplitStrategy::from_str(&row.strategy)
            .map_err(|e| StoreError::Decode(format!("expense {}: {e}", row.id)))?;

        Ok(Expense {
            id: ExpenseId::from_uuid(row.id),
            group_id: GroupId::from_uuid(row.group_id),
            payer_id: UserId::from_uuid(row.payer_id),
            amount: row.amount,
            description: row.description,
            strategy,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct ShareRow {
    expense_id: uuid::Uuid,
    user_id: uuid::Uuid,
    amount: i64,
}

impl<'r> FromRow<'r, PgRow> for ShareRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ShareRow {
            expense_id: row.try_get("expense_id")?,
            user_id: row.try_get("user_id")?,
            amount: row.try_get("amount")?,
        })
    }
}

impl From<ShareRow> for LedgerShare {
    fn from(row: ShareRow) -> Self {
        LedgerShare::new(
            ExpenseId::from_uuid(row.expense_id),
            UserId::from_uuid(row.user_id),
            row.amount,
        )
    }
}

#[derive(Debug)]
struct SettlementRow {
    id: uuid::Uuid,
    group_id: uuid::Uuid,
    debtor_id: uuid::Uuid,
    creditor_id: uuid::Uuid,
    amount: i64,
    recorded_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for SettlementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SettlementRow {
            id: row.try_get("id")?,
            group_id: row.try_get("group_id")?,
            debtor_id: row.try_get("debtor_id")?,
            creditor_id: row.try_get("creditor_id")?,
            amount: row.try_get("amount")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }
}

impl From<SettlementRow> for SettlementTransaction {
    fn from(row: SettlementRow) -> Self {
        SettlementTransaction {
            id: SettlementId::from_uuid(row.id),
            group_id: GroupId::from_uuid(row.group_id),
            debtor_id: UserId::from_uuid(row.debtor_id),
            creditor_id: UserId::from_uuid(row.creditor_id),
            amount: row.amount,
            recorded_at: row.recorded_at,
        }
    }
}

#[cfg(test)]
mod tests {
    //! Require a reachable Postgres at `DATABASE_URL`:
    //! `cargo test -p splitledger-infra -- --ignored`

    use super::*;

    async fn store() -> PostgresLedgerStore {
        let config = StoreConfig::from_env().expect("DATABASE_URL must be set");
        let store = PostgresLedgerStore::connect(&config)
            .await
            .expect("failed to connect to test database");
        store.ensure_schema().await.expect("failed to ensure schema");
        store
    }

    fn header(group_id: GroupId, payer_id: UserId) -> NewExpense {
        NewExpense {
            group_id,
            payer_id,
            amount: 90,
            description: "groceries".to_string(),
            strategy: SplitStrategy::Equal,
        }
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn insert_and_get_round_trip_header() {
        let store = store().await;
        let (g, a) = (GroupId::new(), UserId::new());

        let stored = store.insert_expense(header(g, a)).await.unwrap();
        let loaded = store.get_expense(stored.id).await.unwrap().unwrap();

        assert_eq!(loaded.id, stored.id);
        assert_eq!(loaded.strategy, SplitStrategy::Equal);
        assert_eq!(store.list_expenses(g).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn upsert_is_idempotent_and_delete_cascades() {
        let store = store().await;
        let (g, a, b) = (GroupId::new(), UserId::new(), UserId::new());
        let e = store.insert_expense(header(g, a)).await.unwrap();
        let shares = vec![LedgerShare::new(e.id, b, -45), LedgerShare::new(e.id, a, 45)];

        store.upsert_shares(e.id, &shares).await.unwrap();
        store.upsert_shares(e.id, &shares).await.unwrap();
        assert_eq!(store.shares_by_expense(e.id).await.unwrap().len(), 2);
        assert_eq!(
            store.shares_for_user_across_expenses(g, a, b).await.unwrap(),
            vec![LedgerShare::new(e.id, b, -45)]
        );

        store.delete_expense(e.id).await.unwrap();
        assert!(store.shares_by_expense(e.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn settlements_are_signed_from_first_user() {
        let store = store().await;
        let (g, a, b) = (GroupId::new(), UserId::new(), UserId::new());

        store.record_settlement(NewSettlement::new(g, a, b, 20)).await.unwrap();
        store.record_settlement(NewSettlement::new(g, b, a, 5)).await.unwrap();

        let mut signed = store.settlements_between(g, a, b).await.unwrap();
        signed.sort();
        assert_eq!(signed, vec![-5, 20]);
        assert_eq!(store.participants(g).await.unwrap().len(), 2);
    }
}
