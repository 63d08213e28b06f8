//! Share calculator: expense amount + split strategy + raw inputs → signed shares.
//!
//! Conventions:
//! - every non-payer participant gets a non-positive share (what they owe)
//! - the payer's entry is whatever forces the set to sum to zero, i.e. the
//!   total owed to them; their own consumption (including any rounding
//!   remainder) is `amount - payer entry`

use std::collections::HashSet;

use thiserror::Error;

use splitledger_core::UserId;

use crate::expense::{Expense, SplitInput, SplitStrategy};
use crate::share::ShareSet;

/// Deterministic calculator failures. Never worth retrying with the same input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SplitError {
    /// Raw inputs are malformed (empty, duplicated, negative, unknown strategy).
    #[error("invalid split: {0}")]
    InvalidSplit(String),

    /// EXACT sub-amounts do not add up to the expense amount.
    #[error("sum of shares {actual} does not equal expense amount {expected}")]
    ShareMismatch { expected: i64, actual: i128 },

    /// PERCENTAGE points do not add up to 100.
    #[error("percentages add up to {total}, expected 100")]
    PercentageMismatch { total: i128 },

    /// Validated input produced an impossible share set (a defect, not user error).
    #[error("share invariant violated: {0}")]
    Invariant(String),
}

impl SplitError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidSplit(msg.into())
    }
}

/// Expense amounts are strictly positive minor units.
pub fn validate_amount(amount: i64) -> Result<(), SplitError> {
    if amount <= 0 {
        return Err(SplitError::invalid("expense amount must be positive"));
    }
    Ok(())
}

/// Checks that do not depend on the strategy: non-empty, no duplicate users.
///
/// Run before anything is persisted so malformed requests never create a header.
pub fn validate_participants(inputs: &[SplitInput]) -> Result<(), SplitError> {
    if inputs.is_empty() {
        return Err(SplitError::invalid("split must name at least one participant"));
    }

    let mut seen = HashSet::with_capacity(inputs.len());
    for input in inputs {
        if !seen.insert(input.user_id) {
            return Err(SplitError::invalid(format!(
                "participant {} listed more than once",
                input.user_id
            )));
        }
    }

    Ok(())
}

/// Compute shares for a persisted expense header.
pub fn compute_for(expense: &Expense, inputs: &[SplitInput]) -> Result<ShareSet, SplitError> {
    compute_shares(expense.payer_id, expense.amount, expense.strategy, inputs)
}

/// Compute the signed share set for one expense. Pure.
pub fn compute_shares(
    payer_id: UserId,
    amount: i64,
    strategy: SplitStrategy,
    inputs: &[SplitInput],
) -> Result<ShareSet, SplitError> {
    validate_amount(amount)?;
    validate_participants(inputs)?;

    let owed = match strategy {
        SplitStrategy::Equal => owed_equal(amount, inputs),
        SplitStrategy::Exact => owed_exact(amount, inputs)?,
        SplitStrategy::Percentage => owed_percentage(amount, inputs)?,
    };

    assemble(payer_id, amount, owed)
}

fn owed_equal(amount: i64, inputs: &[SplitInput]) -> Vec<(UserId, i64)> {
    let per_head = amount / inputs.len() as i64;
    inputs.iter().map(|i| (i.user_id, per_head)).collect()
}

fn owed_exact(amount: i64, inputs: &[SplitInput]) -> Result<Vec<(UserId, i64)>, SplitError> {
    ensure_non_negative(inputs, "sub-amount")?;

    let sum: i128 = inputs.iter().map(|i| i.value as i128).sum();
    if sum != amount as i128 {
        return Err(SplitError::ShareMismatch {
            expected: amount,
            actual: sum,
        });
    }

    Ok(inputs.iter().map(|i| (i.user_id, i.value)).collect())
}

fn owed_percentage(amount: i64, inputs: &[SplitInput]) -> Result<Vec<(UserId, i64)>, SplitError> {
    ensure_non_negative(inputs, "percentage")?;

    let total: i128 = inputs.iter().map(|i| i.value as i128).sum();
    if total != 100 {
        return Err(SplitError::PercentageMismatch { total });
    }

    // Each point is at most 100, so the quotient fits back into i64.
    Ok(inputs
        .iter()
        .map(|i| {
            let owed = (i.value as i128 * amount as i128) / 100;
            (i.user_id, owed as i64)
        })
        .collect())
}

fn ensure_non_negative(inputs: &[SplitInput], what: &str) -> Result<(), SplitError> {
    match inputs.iter().find(|i| i.value < 0) {
        Some(bad) => Err(SplitError::invalid(format!(
            "{what} for {} must not be negative (got {})",
            bad.user_id, bad.value
        ))),
        None => Ok(()),
    }
}

/// Turn per-participant "amount owed" into signed entries with the payer last.
fn assemble(
    payer_id: UserId,
    amount: i64,
    owed: Vec<(UserId, i64)>,
) -> Result<ShareSet, SplitError> {
    let mut entries = Vec::with_capacity(owed.len() + 1);
    let mut payer_credit: i128 = 0;

    for (user_id, owes) in owed {
        if user_id == payer_id {
            continue;
        }
        payer_credit += owes as i128;
        entries.push((user_id, -owes));
    }

    if payer_credit < 0 || payer_credit > amount as i128 {
        return Err(SplitError::Invariant(format!(
            "payer credit {payer_credit} outside [0, {amount}]"
        )));
    }
    entries.push((payer_id, payer_credit as i64));

    let set = ShareSet::new(payer_id, amount, entries);
    if set.total() != 0 {
        return Err(SplitError::Invariant(format!(
            "shares sum to {} instead of zero",
            set.total()
        )));
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn users(n: usize) -> Vec<UserId> {
        (0..n).map(|_| UserId::new()).collect()
    }

    fn equal_inputs(users: &[UserId]) -> Vec<SplitInput> {
        users.iter().map(|u| SplitInput::participant(*u)).collect()
    }

    #[test]
    fn equal_split_payer_absorbs_remainder() {
        let u = users(3);
        let payer = u[0];

        let set = compute_shares(payer, 100, SplitStrategy::Equal, &equal_inputs(&u)).unwrap();

        assert_eq!(set.share_of(u[1]), Some(-33));
        assert_eq!(set.share_of(u[2]), Some(-33));
        assert_eq!(set.payer_credit(), 66);
        assert_eq!(set.payer_portion(), 34);
        assert_eq!(set.total(), 0);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn equal_split_even_amount() {
        let u = users(3);
        let set = compute_shares(u[0], 90, SplitStrategy::Equal, &equal_inputs(&u)).unwrap();
        assert_eq!(set.share_of(u[1]), Some(-30));
        assert_eq!(set.share_of(u[2]), Some(-30));
        assert_eq!(set.payer_credit(), 60);
    }

    #[test]
    fn payer_outside_participants_still_gets_an_entry() {
        let u = users(3);
        let payer = u[0];
        let inputs = equal_inputs(&u[1..]);

        let set = compute_shares(payer, 101, SplitStrategy::Equal, &inputs).unwrap();

        assert_eq!(set.share_of(u[1]), Some(-50));
        assert_eq!(set.share_of(u[2]), Some(-50));
        assert_eq!(set.payer_credit(), 100);
        assert_eq!(set.payer_portion(), 1);
    }

    #[test]
    fn payer_alone_has_zero_entry() {
        let payer = UserId::new();
        let set = compute_shares(
            payer,
            50,
            SplitStrategy::Equal,
            &[SplitInput::participant(payer)],
        )
        .unwrap();
        assert_eq!(set.entries(), &[(payer, 0)]);
    }

    #[test]
    fn exact_split_matches_amount() {
        let u = users(3);
        let inputs = vec![
            SplitInput::new(u[0], 50),
            SplitInput::new(u[1], 30),
            SplitInput::new(u[2], 20),
        ];

        let set = compute_shares(u[0], 100, SplitStrategy::Exact, &inputs).unwrap();

        assert_eq!(set.share_of(u[1]), Some(-30));
        assert_eq!(set.share_of(u[2]), Some(-20));
        assert_eq!(set.payer_credit(), 50);
        assert_eq!(set.payer_portion(), 50);
    }

    #[test]
    fn exact_split_mismatch_is_rejected() {
        let u = users(2);
        let inputs = vec![SplitInput::new(u[0], 40), SplitInput::new(u[1], 40)];

        let err = compute_shares(u[0], 100, SplitStrategy::Exact, &inputs).unwrap_err();
        assert_eq!(
            err,
            SplitError::ShareMismatch {
                expected: 100,
                actual: 80
            }
        );
    }

    #[test]
    fn percentage_split_floors_non_payer_shares() {
        let u = users(3);
        let inputs = vec![
            SplitInput::new(u[0], 34),
            SplitInput::new(u[1], 33),
            SplitInput::new(u[2], 33),
        ];

        let set = compute_shares(u[0], 1_000, SplitStrategy::Percentage, &inputs).unwrap();

        assert_eq!(set.share_of(u[1]), Some(-330));
        assert_eq!(set.share_of(u[2]), Some(-330));
        assert_eq!(set.payer_credit(), 660);
        assert_eq!(set.payer_portion(), 340);
    }

    #[test]
    fn percentage_split_must_total_one_hundred() {
        let u = users(2);
        let inputs = vec![SplitInput::new(u[0], 50), SplitInput::new(u[1], 40)];

        let err = compute_shares(u[0], 100, SplitStrategy::Percentage, &inputs).unwrap_err();
        assert_eq!(err, SplitError::PercentageMismatch { total: 90 });
    }

    #[test]
    fn empty_participants_is_invalid() {
        let err = compute_shares(UserId::new(), 100, SplitStrategy::Equal, &[]).unwrap_err();
        assert!(matches!(err, SplitError::InvalidSplit(_)));
    }

    #[test]
    fn duplicate_participant_is_invalid() {
        let u = UserId::new();
        let inputs = vec![SplitInput::participant(u), SplitInput::participant(u)];
        let err = compute_shares(u, 100, SplitStrategy::Equal, &inputs).unwrap_err();
        assert!(matches!(err, SplitError::InvalidSplit(_)));
    }

    #[test]
    fn non_positive_amount_is_invalid() {
        let u = UserId::new();
        let inputs = vec![SplitInput::participant(u)];
        for amount in [0, -5] {
            let err = compute_shares(u, amount, SplitStrategy::Equal, &inputs).unwrap_err();
            assert!(matches!(err, SplitError::InvalidSplit(_)));
        }
    }

    #[test]
    fn negative_exact_value_is_invalid_even_when_sum_matches() {
        let u = users(3);
        let inputs = vec![
            SplitInput::new(u[0], 120),
            SplitInput::new(u[1], -20),
            SplitInput::new(u[2], 0),
        ];
        let err = compute_shares(u[0], 100, SplitStrategy::Exact, &inputs).unwrap_err();
        assert!(matches!(err, SplitError::InvalidSplit(_)));
    }

    fn arb_amount() -> impl Strategy<Value = i64> {
        1i64..10_000_000i64
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: EQUAL shares always sum to zero, and non-payers never hold credit.
        #[test]
        fn equal_shares_are_conserved(amount in arb_amount(), n in 1usize..12, payer_idx in 0usize..12) {
            let u = users(n);
            let payer = u[payer_idx % n];
            let set = compute_shares(payer, amount, SplitStrategy::Equal, &equal_inputs(&u)).unwrap();

            prop_assert_eq!(set.total(), 0);
            prop_assert!(set.payer_credit() >= 0);
            for (user, share) in set.entries() {
                if *user != payer {
                    prop_assert!(*share <= 0);
                }
            }
        }

        /// Property: any EXACT split that adds up is accepted and conserved.
        #[test]
        fn exact_shares_are_conserved(parts in prop::collection::vec(0i64..1_000_000i64, 1..10)) {
            let u = users(parts.len());
            let amount: i64 = parts.iter().sum();
            prop_assume!(amount > 0);
            let inputs: Vec<_> = u.iter().zip(&parts).map(|(u, p)| SplitInput::new(*u, *p)).collect();

            let set = compute_shares(u[0], amount, SplitStrategy::Exact, &inputs).unwrap();
            prop_assert_eq!(set.total(), 0);
            prop_assert_eq!(set.payer_portion(), parts[0]);
        }

        /// Property: PERCENTAGE splits totalling 100 are conserved and the payer
        /// portion never falls below the payer's own floor share.
        #[test]
        fn percentage_shares_are_conserved(amount in arb_amount(), cuts in prop::collection::vec(0i64..=100i64, 0..6)) {
            let mut points = Vec::new();
            let mut remaining = 100i64;
            for c in cuts {
                let take = c.min(remaining);
                points.push(take);
                remaining -= take;
            }
            points.push(remaining);

            let u = users(points.len());
            let inputs: Vec<_> = u.iter().zip(&points).map(|(u, p)| SplitInput::new(*u, *p)).collect();
            let set = compute_shares(u[0], amount, SplitStrategy::Percentage, &inputs).unwrap();

            prop_assert_eq!(set.total(), 0);
            prop_assert!(set.payer_portion() >= points[0] * amount / 100);
        }
    }
}
