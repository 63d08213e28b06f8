//! Settlement engine: pairwise net balances over stored shares and settlements.
//!
//! Nothing is cached. Every call recomputes from the store, so a group of `N`
//! users costs `O(N²)` pair reads for a full view.

use std::collections::HashSet;

use serde::Serialize;
use tracing::instrument;

use splitledger_core::{GroupId, UserId};
use splitledger_ledger::{PairBalance, PairLedger};

use crate::context::CallContext;
use crate::error::LedgerError;
use crate::store::LedgerStore;

/// One pair that could not be computed in a batch read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairFailure {
    pub other_user_id: UserId,
    #[serde(serialize_with = "serialize_error")]
    pub error: LedgerError,
}

fn serialize_error<S: serde::Serializer>(err: &LedgerError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&err.to_string())
}

/// Result of a batch balance read.
///
/// `balances` holds the non-zero pairs in request order; `failures` the pairs
/// whose reads failed. A failure never hides the other pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalanceReport {
    pub requested: usize,
    pub balances: Vec<PairBalance>,
    pub failures: Vec<PairFailure>,
}

impl BalanceReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Balances if every pair succeeded, otherwise `PartialReadFailure`.
    pub fn into_complete(self) -> Result<Vec<PairBalance>, LedgerError> {
        if self.failures.is_empty() {
            return Ok(self.balances);
        }
        Err(LedgerError::PartialReadFailure {
            requested: self.requested,
            failures: self
                .failures
                .into_iter()
                .map(|f| (f.other_user_id, f.error))
                .collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SettlementEngine<S> {
    store: S,
}

impl<S> SettlementEngine<S>
where
    S: LedgerStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Net balance of `user_id` against `other_user_id` in the group.
    ///
    /// Positive: `other_user_id` owes `user_id`. Negative: `user_id` owes
    /// `other_user_id`. Zero: settled up.
    #[instrument(
        skip(self, ctx),
        fields(group_id = %group_id, user_id = %user_id, other_user_id = %other_user_id),
        err
    )]
    pub async fn net_balance(
        &self,
        ctx: &CallContext,
        group_id: GroupId,
        user_id: UserId,
        other_user_id: UserId,
    ) -> Result<i64, LedgerError> {
        if user_id == other_user_id {
            return Ok(0);
        }

        let user_shares = ctx
            .run(
                "shares_for_user_across_expenses",
                self.store
                    .shares_for_user_across_expenses(group_id, other_user_id, user_id),
            )
            .await?;
        let other_shares = ctx
            .run(
                "shares_for_user_across_expenses",
                self.store
                    .shares_for_user_across_expenses(group_id, user_id, other_user_id),
            )
            .await?;
        let settled = ctx
            .run(
                "settlements_between",
                self.store.settlements_between(group_id, user_id, other_user_id),
            )
            .await?;

        let mut pair = PairLedger::new();
        pair.add_user_shares(user_shares.iter().map(|s| s.amount))
            .add_other_shares(other_shares.iter().map(|s| s.amount))
            .add_settlements(settled);

        pair.net()
            .map_err(|err| LedgerError::Invariant(err.to_string()))
    }

    /// Net balances of `user_id` against each of `others`.
    ///
    /// `user_id` itself and repeated ids are skipped, and `requested` counts
    /// the pairs actually computed. Pairs are computed independently. A failing
    /// pair lands in `failures`; only cancellation or an elapsed deadline
    /// aborts the batch.
    #[instrument(
        skip(self, ctx, others),
        fields(group_id = %group_id, user_id = %user_id, others = others.len()),
        err
    )]
    pub async fn net_balances(
        &self,
        ctx: &CallContext,
        group_id: GroupId,
        user_id: UserId,
        others: &[UserId],
    ) -> Result<BalanceReport, LedgerError> {
        let mut report = BalanceReport::default();
        let mut seen = HashSet::with_capacity(others.len());

        for &other_user_id in others {
            if other_user_id == user_id || !seen.insert(other_user_id) {
                continue;
            }
            report.requested += 1;

            match self.net_balance(ctx, group_id, user_id, other_user_id).await {
                Ok(0) => {}
                Ok(amount) => report.balances.push(PairBalance {
                    other_user_id,
                    amount,
                }),
                Err(err @ (LedgerError::Cancelled(_) | LedgerError::DeadlineExceeded(_))) => {
                    return Err(err);
                }
                Err(error) => {
                    tracing::warn!(
                        group_id = %group_id,
                        user_id = %user_id,
                        other_user_id = %other_user_id,
                        error = %error,
                        "pair balance read failed"
                    );
                    report.failures.push(PairFailure {
                        other_user_id,
                        error,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Net balances of `user_id` against every other participant of the group.
    #[instrument(skip(self, ctx), fields(group_id = %group_id, user_id = %user_id), err)]
    pub async fn group_balances(
        &self,
        ctx: &CallContext,
        group_id: GroupId,
        user_id: UserId,
    ) -> Result<BalanceReport, LedgerError> {
        let participants = ctx
            .run("participants", self.store.participants(group_id))
            .await?;
        let others: Vec<UserId> = participants
            .into_iter()
            .filter(|u| *u != user_id)
            .collect();

        self.net_balances(ctx, group_id, user_id, &others).await
    }
}
