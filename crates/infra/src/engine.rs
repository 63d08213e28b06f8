//! `LedgerEngine`: the single entry point callers use.
//!
//! Wraps one injected store handle and exposes expense creation, share reads,
//! settlements and balances. Every operation takes a `CallContext`;
//! [`LedgerEngine::context`] builds one with the configured default deadline.

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use splitledger_core::{ExpenseId, GroupId, UserId};
use splitledger_ledger::{
    Expense, LedgerShare, NewExpense, NewSettlement, SettlementTransaction, SplitInput,
};

use crate::config::EngineConfig;
use crate::context::CallContext;
use crate::coordinator::{CreatedExpense, ExpenseCoordinator};
use crate::error::LedgerError;
use crate::settlement::{BalanceReport, SettlementEngine};
use crate::store::LedgerStore;

/// Expense header with its stored shares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpenseWithShares {
    pub expense: Expense,
    pub shares: Vec<LedgerShare>,
}

pub struct LedgerEngine<S: ?Sized> {
    store: Arc<S>,
    coordinator: ExpenseCoordinator<Arc<S>>,
    settlement: SettlementEngine<Arc<S>>,
    config: EngineConfig,
}

impl<S> LedgerEngine<S>
where
    S: LedgerStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            coordinator: ExpenseCoordinator::new(store.clone()),
            settlement: SettlementEngine::new(store.clone()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Fresh context carrying the default deadline, if one is configured.
    pub fn context(&self) -> CallContext {
        match self.config.op_timeout {
            Some(timeout) => CallContext::with_timeout(timeout),
            None => CallContext::new(),
        }
    }

    pub async fn create_expense(
        &self,
        ctx: &CallContext,
        header: NewExpense,
        inputs: &[SplitInput],
    ) -> Result<CreatedExpense, LedgerError> {
        self.coordinator.create_expense(ctx, header, inputs).await
    }

    /// Retry path for an expense left pending by a failed share upsert.
    pub async fn assign_shares(
        &self,
        ctx: &CallContext,
        expense_id: ExpenseId,
        inputs: &[SplitInput],
    ) -> Result<CreatedExpense, LedgerError> {
        self.coordinator.assign_shares(ctx, expense_id, inputs).await
    }

    /// Stored shares of one expense. Empty for a pending expense.
    #[instrument(skip(self, ctx), fields(expense_id = %expense_id), err)]
    pub async fn shares_for_expense(
        &self,
        ctx: &CallContext,
        expense_id: ExpenseId,
    ) -> Result<Vec<LedgerShare>, LedgerError> {
        let shares = ctx
            .run("shares_by_expense", self.store.shares_by_expense(expense_id))
            .await?;
        if !shares.is_empty() {
            return Ok(shares);
        }

        ctx.run("get_expense", self.store.get_expense(expense_id))
            .await?
            .ok_or(LedgerError::ExpenseNotFound(expense_id))?;
        Ok(shares)
    }

    /// Group expenses, newest first, each with its shares.
    #[instrument(skip(self, ctx), fields(group_id = %group_id), err)]
    pub async fn list_expenses(
        &self,
        ctx: &CallContext,
        group_id: GroupId,
    ) -> Result<Vec<ExpenseWithShares>, LedgerError> {
        let expenses = ctx
            .run("list_expenses", self.store.list_expenses(group_id))
            .await?;

        let mut out = Vec::with_capacity(expenses.len());
        for expense in expenses {
            let shares = ctx
                .run("shares_by_expense", self.store.shares_by_expense(expense.id))
                .await?;
            out.push(ExpenseWithShares { expense, shares });
        }
        Ok(out)
    }

    #[instrument(
        skip(self, ctx, tx),
        fields(group_id = %tx.group_id, debtor_id = %tx.debtor_id, creditor_id = %tx.creditor_id),
        err
    )]
    pub async fn record_settlement(
        &self,
        ctx: &CallContext,
        tx: NewSettlement,
    ) -> Result<SettlementTransaction, LedgerError> {
        tx.validate().map_err(LedgerError::settlement)?;

        let recorded = ctx
            .run("record_settlement", self.store.record_settlement(tx))
            .await?;
        tracing::info!(settlement_id = %recorded.id, amount = recorded.amount, "settlement recorded");
        Ok(recorded)
    }

    /// Group settlements, newest first.
    pub async fn list_settlements(
        &self,
        ctx: &CallContext,
        group_id: GroupId,
    ) -> Result<Vec<SettlementTransaction>, LedgerError> {
        ctx.run("list_settlements", self.store.list_settlements(group_id))
            .await
    }

    pub async fn net_balance(
        &self,
        ctx: &CallContext,
        group_id: GroupId,
        user_id: UserId,
        other_user_id: UserId,
    ) -> Result<i64, LedgerError> {
        self.settlement
            .net_balance(ctx, group_id, user_id, other_user_id)
            .await
    }

    pub async fn net_balances(
        &self,
        ctx: &CallContext,
        group_id: GroupId,
        user_id: UserId,
        others: &[UserId],
    ) -> Result<BalanceReport, LedgerError> {
        self.settlement
            .net_balances(ctx, group_id, user_id, others)
            .await
    }

    pub async fn group_balances(
        &self,
        ctx: &CallContext,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<BalanceReport, LedgerError> {
        self.settlement.group_balances(ctx, group_id, user_id).await
    }

    /// End the engine's lifecycle and release the store.
    pub async fn close(self) {
        self.store.close().await;
        tracing::info!("ledger engine closed");
    }
}
