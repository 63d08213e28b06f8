use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use splitledger_core::{ExpenseId, GroupId, UserId};

use crate::split::SplitError;

/// How an expense amount is apportioned among participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SplitStrategy {
    /// Everyone listed owes `amount / n` (floor); the payer absorbs the remainder.
    Equal,
    /// Each participant supplies a literal sub-amount; they must sum to `amount`.
    Exact,
    /// Each participant supplies percentage points; they must sum to 100.
    Percentage,
}

impl SplitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitStrategy::Equal => "EQUAL",
            SplitStrategy::Exact => "EXACT",
            SplitStrategy::Percentage => "PERCENTAGE",
        }
    }
}

impl core::fmt::Display for SplitStrategy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SplitStrategy {
    type Err = SplitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EQUAL" => Ok(SplitStrategy::Equal),
            "EXACT" => Ok(SplitStrategy::Exact),
            "PERCENTAGE" => Ok(SplitStrategy::Percentage),
            other => Err(SplitError::invalid(format!("unknown split strategy '{other}'"))),
        }
    }
}

/// One caller-supplied `(user, raw value)` pair.
///
/// `value` is ignored for EQUAL, a sub-amount for EXACT and percentage points
/// for PERCENTAGE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitInput {
    pub user_id: UserId,
    pub value: i64,
}

impl SplitInput {
    pub fn new(user_id: UserId, value: i64) -> Self {
        Self { user_id, value }
    }

    /// Participant for an EQUAL split (value unused).
    pub fn participant(user_id: UserId) -> Self {
        Self { user_id, value: 0 }
    }
}

/// Expense header as supplied by the caller, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub group_id: GroupId,
    pub payer_id: UserId,
    /// Total in minor units (e.g. cents).
    pub amount: i64,
    pub description: String,
    pub strategy: SplitStrategy,
}

/// Persisted expense header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub group_id: GroupId,
    pub payer_id: UserId,
    pub amount: i64,
    pub description: String,
    pub strategy: SplitStrategy,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// Attach store-assigned identity to a caller-supplied header.
    pub fn from_new(id: ExpenseId, header: NewExpense, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            group_id: header.group_id,
            payer_id: header.payer_id,
            amount: header.amount,
            description: header.description,
            strategy: header.strategy,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_tags_parse() {
        assert_eq!("EQUAL".parse::<SplitStrategy>().unwrap(), SplitStrategy::Equal);
        assert_eq!("EXACT".parse::<SplitStrategy>().unwrap(), SplitStrategy::Exact);
        assert_eq!(
            "PERCENTAGE".parse::<SplitStrategy>().unwrap(),
            SplitStrategy::Percentage
        );
    }

    #[test]
    fn unknown_strategy_tag_is_an_invalid_split() {
        let err = "SHARES".parse::<SplitStrategy>().unwrap_err();
        assert!(matches!(err, SplitError::InvalidSplit(_)));
    }

    #[test]
    fn strategy_serializes_as_upper_case_tag() {
        let json = serde_json::to_string(&SplitStrategy::Percentage).unwrap();
        assert_eq!(json, "\"PERCENTAGE\"");
        let parsed: SplitStrategy = serde_json::from_str("\"EXACT\"").unwrap();
        assert_eq!(parsed, SplitStrategy::Exact);
    }
}
