use thiserror::Error;

use splitledger_core::{DomainError, ExpenseId, UserId};
use splitledger_ledger::SplitError;

use crate::store::StoreError;

/// Error surfaced by every engine operation.
///
/// Validation failures (`InvalidSplit`, `ShareMismatch`, `PercentageMismatch`,
/// `InvalidSettlement`, `SharesAlreadyAssigned`) are deterministic and never
/// worth retrying. `Storage` is propagated verbatim from the store and may be
/// retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("invalid split: {0}")]
    InvalidSplit(String),

    #[error("sum of shares {actual} does not equal expense amount {expected}")]
    ShareMismatch { expected: i64, actual: i128 },

    #[error("percentages add up to {total}, expected 100")]
    PercentageMismatch { total: i128 },

    #[error("invalid settlement: {0}")]
    InvalidSettlement(String),

    #[error("ledger invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Share calculation failed and the compensating header delete failed too.
    /// The header may still exist without shares.
    #[error("compensation failed: {compensation} (original error: {original})")]
    CompensationFailed {
        original: Box<LedgerError>,
        compensation: StoreError,
    },

    /// A batch read where at least one pair could not be computed.
    #[error("{} of {} pair balances could not be read", .failures.len(), .requested)]
    PartialReadFailure {
        requested: usize,
        failures: Vec<(UserId, LedgerError)>,
    },

    #[error("operation {0} cancelled")]
    Cancelled(&'static str),

    #[error("operation {0} exceeded its deadline")]
    DeadlineExceeded(&'static str),

    #[error("expense {0} not found")]
    ExpenseNotFound(ExpenseId),

    /// The expense already holds a different share set; it is not pending.
    #[error("expense {0} already has shares assigned")]
    SharesAlreadyAssigned(ExpenseId),
}

impl LedgerError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSplit(_)
                | Self::ShareMismatch { .. }
                | Self::PercentageMismatch { .. }
                | Self::InvalidSettlement(_)
                | Self::SharesAlreadyAssigned(_)
        )
    }

    /// Whether the same call might succeed later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(_) | Self::DeadlineExceeded(_) => true,
            Self::PartialReadFailure { failures, .. } => {
                failures.iter().all(|(_, e)| e.is_retryable())
            }
            _ => false,
        }
    }

    /// Map a settlement validation failure from the domain layer.
    pub fn settlement(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => Self::InvalidSettlement(msg),
            other => Self::Invariant(other.to_string()),
        }
    }
}

impl From<SplitError> for LedgerError {
    fn from(err: SplitError) -> Self {
        match err {
            SplitError::InvalidSplit(msg) => Self::InvalidSplit(msg),
            SplitError::ShareMismatch { expected, actual } => {
                Self::ShareMismatch { expected, actual }
            }
            SplitError::PercentageMismatch { total } => Self::PercentageMismatch { total },
            SplitError::Invariant(msg) => Self::Invariant(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculator_errors_keep_their_kind() {
        let err: LedgerError = SplitError::ShareMismatch {
            expected: 100,
            actual: 90,
        }
        .into();
        assert_eq!(
            err,
            LedgerError::ShareMismatch {
                expected: 100,
                actual: 90
            }
        );
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn storage_errors_are_retryable_not_validation() {
        let err: LedgerError = StoreError::backend("insert_expense", "connection reset").into();
        assert!(err.is_retryable());
        assert!(!err.is_validation());
        assert_eq!(
            err.to_string(),
            "storage backend error in insert_expense: connection reset"
        );
    }

    #[test]
    fn settlement_validation_maps_to_invalid_settlement() {
        let err = LedgerError::settlement(DomainError::validation("amount must be positive"));
        assert!(matches!(err, LedgerError::InvalidSettlement(_)));
    }

    #[test]
    fn settlement_invariant_is_not_validation() {
        let err = LedgerError::settlement(DomainError::invariant("overflow"));
        assert!(matches!(err, LedgerError::Invariant(_)));
        assert!(!err.is_validation());
    }

    #[test]
    fn reassigning_shares_is_a_validation_error() {
        let err = LedgerError::SharesAlreadyAssigned(ExpenseId::new());
        assert!(err.is_validation());
        assert!(!err.is_retryable());
    }

    #[test]
    fn compensation_failure_carries_both_errors() {
        let err = LedgerError::CompensationFailed {
            original: Box::new(LedgerError::PercentageMismatch { total: 90 }),
            compensation: StoreError::PoolClosed,
        };
        let msg = err.to_string();
        assert!(msg.contains("connection pool closed"));
        assert!(msg.contains("percentages add up to 90"));
    }
}
