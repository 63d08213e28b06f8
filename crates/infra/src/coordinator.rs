//! Expense lifecycle coordinator.
//!
//! Creating an expense is a three-step saga with no spanning transaction:
//!
//! ```text
//! insert header ──▶ compute shares ──▶ upsert shares
//!                        │
//!                        └─ on failure: delete header (compensation)
//! ```
//!
//! - A calculator failure deletes the header and returns the calculator error.
//! - If that delete fails as well, both errors are returned together
//!   (`CompensationFailed`) and the header may remain without shares.
//! - A storage failure on the share upsert leaves the header in place with
//!   zero shares ("pending"). `assign_shares` completes a pending expense.
//!   Repeating it with the same inputs is a no-op; any other share set on an
//!   expense that already has shares is rejected with `SharesAlreadyAssigned`.

use serde::Serialize;
use tracing::instrument;

use splitledger_core::ExpenseId;
use splitledger_ledger::{
    Expense, LedgerShare, NewExpense, SplitInput, compute_for, validate_amount,
    validate_participants,
};

use crate::context::CallContext;
use crate::error::LedgerError;
use crate::store::LedgerStore;

/// A header together with the shares persisted for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedExpense {
    pub expense: Expense,
    /// Calculation order (payer last); sums to zero. Store reads of the same
    /// shares come back ordered by user id instead.
    pub shares: Vec<LedgerShare>,
    /// What the payer consumed themself, rounding remainder included.
    pub payer_portion: i64,
}

#[derive(Debug, Clone)]
pub struct ExpenseCoordinator<S> {
    store: S,
}

impl<S> ExpenseCoordinator<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist a header, split it with `header.strategy` and persist the shares.
    #[instrument(
        skip(self, ctx, header, inputs),
        fields(
            group_id = %header.group_id,
            payer_id = %header.payer_id,
            strategy = %header.strategy,
            participants = inputs.len()
        ),
        err
    )]
    pub async fn create_expense(
        &self,
        ctx: &CallContext,
        header: NewExpense,
        inputs: &[SplitInput],
    ) -> Result<CreatedExpense, LedgerError> {
        validate_amount(header.amount)?;
        validate_participants(inputs)?;

        let expense = ctx
            .run("insert_expense", self.store.insert_expense(header))
            .await?;

        let shares = match compute_for(&expense, inputs) {
            Ok(shares) => shares,
            Err(err) => return Err(self.compensate(&expense, err.into()).await),
        };

        let rows = shares.to_ledger_shares(expense.id);
        if let Err(err) = ctx
            .run("upsert_shares", self.store.upsert_shares(expense.id, &rows))
            .await
        {
            tracing::warn!(
                expense_id = %expense.id,
                error = %err,
                "share upsert failed; expense left pending"
            );
            return Err(err);
        }

        tracing::info!(expense_id = %expense.id, shares = rows.len(), "expense created");
        Ok(CreatedExpense {
            payer_portion: shares.payer_portion(),
            expense,
            shares: rows,
        })
    }

    /// Compute and persist the shares of a pending expense.
    ///
    /// An expense whose stored shares equal the computed set is returned as
    /// is. Stored shares that differ are never touched.
    #[instrument(skip(self, ctx, inputs), fields(expense_id = %expense_id), err)]
    pub async fn assign_shares(
        &self,
        ctx: &CallContext,
        expense_id: ExpenseId,
        inputs: &[SplitInput],
    ) -> Result<CreatedExpense, LedgerError> {
        let expense = ctx
            .run("get_expense", self.store.get_expense(expense_id))
            .await?
            .ok_or(LedgerError::ExpenseNotFound(expense_id))?;

        let shares = compute_for(&expense, inputs)?;
        let rows = shares.to_ledger_shares(expense.id);

        let stored = ctx
            .run("shares_by_expense", self.store.shares_by_expense(expense.id))
            .await?;
        if stored.is_empty() {
            ctx.run("upsert_shares", self.store.upsert_shares(expense.id, &rows))
                .await?;
            tracing::info!(
                expense_id = %expense.id,
                shares = rows.len(),
                "pending expense completed"
            );
        } else if !same_share_set(&stored, &rows) {
            return Err(LedgerError::SharesAlreadyAssigned(expense_id));
        }

        Ok(CreatedExpense {
            payer_portion: shares.payer_portion(),
            expense,
            shares: rows,
        })
    }

    /// Undo a header insert after a calculator failure.
    ///
    /// Not raced against the caller's context: a cancelled caller must not
    /// strand a header without shares.
    async fn compensate(&self, expense: &Expense, original: LedgerError) -> LedgerError {
        tracing::warn!(
            expense_id = %expense.id,
            error = %original,
            "share calculation failed; deleting expense header"
        );

        match self.store.delete_expense(expense.id).await {
            Ok(()) => original,
            Err(compensation) => {
                tracing::warn!(
                    expense_id = %expense.id,
                    error = %compensation,
                    "compensating delete failed"
                );
                LedgerError::CompensationFailed {
                    original: Box::new(original),
                    compensation,
                }
            }
        }
    }
}

fn same_share_set(a: &[LedgerShare], b: &[LedgerShare]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_by_key(|s| s.user_id);
    b.sort_by_key(|s| s.user_id);
    a == b
}
