use serde::{Deserialize, Serialize};

use splitledger_core::{ExpenseId, UserId};

/// One persisted ledger row, keyed by `(expense_id, user_id)`.
///
/// Positive: this user is owed `amount` on this expense.
/// Negative: this user owes `-amount` on this expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerShare {
    pub expense_id: ExpenseId,
    pub user_id: UserId,
    pub amount: i64,
}

impl LedgerShare {
    pub fn new(expense_id: ExpenseId, user_id: UserId, amount: i64) -> Self {
        Self {
            expense_id,
            user_id,
            amount,
        }
    }
}

/// Output of the share calculator: one signed entry per participant, payer included.
///
/// Invariant: entries sum to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareSet {
    payer_id: UserId,
    amount: i64,
    entries: Vec<(UserId, i64)>,
}

impl ShareSet {
    /// Built only by the calculator, which has already enforced conservation.
    pub(crate) fn new(payer_id: UserId, amount: i64, entries: Vec<(UserId, i64)>) -> Self {
        Self {
            payer_id,
            amount,
            entries,
        }
    }

    pub fn payer_id(&self) -> UserId {
        self.payer_id
    }

    /// Expense total the set was computed for.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn entries(&self) -> &[(UserId, i64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn share_of(&self, user_id: UserId) -> Option<i64> {
        self.entries
            .iter()
            .find(|(u, _)| *u == user_id)
            .map(|(_, amount)| *amount)
    }

    /// The payer's ledger entry: what the other participants owe them.
    pub fn payer_credit(&self) -> i64 {
        self.share_of(self.payer_id).unwrap_or(0)
    }

    /// What the payer consumed themself, including any rounding remainder.
    pub fn payer_portion(&self) -> i64 {
        self.amount - self.payer_credit()
    }

    pub fn total(&self) -> i128 {
        self.entries.iter().map(|(_, a)| *a as i128).sum()
    }

    /// Bind the set to a persisted expense.
    pub fn to_ledger_shares(&self, expense_id: ExpenseId) -> Vec<LedgerShare> {
        self.entries
            .iter()
            .map(|(user_id, amount)| LedgerShare::new(expense_id, *user_id, *amount))
            .collect()
    }
}

/// Sum of a slice of persisted shares (used to check conservation on reads).
pub fn shares_total(shares: &[LedgerShare]) -> i128 {
    shares.iter().map(|s| s.amount as i128).sum()
}
