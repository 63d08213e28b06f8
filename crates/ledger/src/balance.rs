//! Net balance between two users, folded from shares and settlements.
//!
//! From `user`'s point of view against `other`:
//!
//! ```text
//! net = owed_by_other - owed_by_user + settled
//! ```
//!
//! - `owed_by_user`:  -(shares `user` holds on expenses `other` paid)
//! - `owed_by_other`: -(shares `other` holds on expenses `user` paid)
//! - `settled`:       settlement amounts oriented user→other (+ when `user` paid)
//!
//! Positive: `other` owes `user`. Negative: `user` owes `other`.

use serde::{Deserialize, Serialize};

use splitledger_core::{DomainError, UserId};

/// Non-zero balance of `other_user_id` relative to the base user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairBalance {
    pub other_user_id: UserId,
    pub amount: i64,
}

/// Running totals for one (user, other) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairLedger {
    owed_by_user: i128,
    owed_by_other: i128,
    settled: i128,
}

impl PairLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares the base user holds on expenses the other user paid.
    pub fn add_user_shares<I>(&mut self, shares: I) -> &mut Self
    where
        I: IntoIterator<Item = i64>,
    {
        self.owed_by_user -= shares.into_iter().map(i128::from).sum::<i128>();
        self
    }

    /// Shares the other user holds on expenses the base user paid.
    pub fn add_other_shares<I>(&mut self, shares: I) -> &mut Self
    where
        I: IntoIterator<Item = i64>,
    {
        self.owed_by_other -= shares.into_iter().map(i128::from).sum::<i128>();
        self
    }

    /// Settlement amounts oriented user→other.
    pub fn add_settlements<I>(&mut self, signed: I) -> &mut Self
    where
        I: IntoIterator<Item = i64>,
    {
        self.settled += signed.into_iter().map(i128::from).sum::<i128>();
        self
    }

    pub fn owed_by_user(&self) -> i128 {
        self.owed_by_user
    }

    pub fn owed_by_other(&self) -> i128 {
        self.owed_by_other
    }

    /// Same history seen from the other side.
    pub fn reversed(&self) -> Self {
        Self {
            owed_by_user: self.owed_by_other,
            owed_by_other: self.owed_by_user,
            settled: -self.settled,
        }
    }

    pub fn net_i128(&self) -> i128 {
        self.owed_by_other - self.owed_by_user + self.settled
    }

    pub fn net(&self) -> Result<i64, DomainError> {
        i64::try_from(self.net_i128())
            .map_err(|_| DomainError::invariant(format!("net balance {} overflows", self.net_i128())))
    }
}
