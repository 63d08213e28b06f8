use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitledger_core::{DomainError, GroupId, SettlementId, UserId};

/// A direct payment the caller wants recorded.
///
/// `debtor_id` is the user handing over money, `creditor_id` the user receiving
/// it. Recording it reduces what the debtor owes the creditor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSettlement {
    pub group_id: GroupId,
    pub debtor_id: UserId,
    pub creditor_id: UserId,
    pub amount: i64,
}

impl NewSettlement {
    pub fn new(group_id: GroupId, debtor_id: UserId, creditor_id: UserId, amount: i64) -> Self {
        Self {
            group_id,
            debtor_id,
            creditor_id,
            amount,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.amount <= 0 {
            return Err(DomainError::validation("settlement amount must be positive"));
        }
        if self.debtor_id == self.creditor_id {
            return Err(DomainError::validation(
                "settlement debtor and creditor must differ",
            ));
        }
        Ok(())
    }
}

/// Immutable record of a settlement payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementTransaction {
    pub id: SettlementId,
    pub group_id: GroupId,
    pub debtor_id: UserId,
    pub creditor_id: UserId,
    pub amount: i64,
    pub recorded_at: DateTime<Utc>,
}

impl SettlementTransaction {
    pub fn from_new(id: SettlementId, tx: NewSettlement, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id,
            group_id: tx.group_id,
            debtor_id: tx.debtor_id,
            creditor_id: tx.creditor_id,
            amount: tx.amount,
            recorded_at,
        }
    }

    /// Signed amount from `a`'s point of view: `+amount` if `a` paid `b`,
    /// `-amount` if `b` paid `a`, `None` if the transaction is between others.
    pub fn oriented(&self, a: UserId, b: UserId) -> Option<i64> {
        if self.debtor_id == a && self.creditor_id == b {
            Some(self.amount)
        } else if self.debtor_id == b && self.creditor_id == a {
            Some(-self.amount)
        } else {
            None
        }
    }
}
