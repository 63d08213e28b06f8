//! Shared-expense ledger domain (split calculation, shares, settlements, balances).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod balance;
pub mod expense;
pub mod settlement;
pub mod share;
pub mod split;

pub use balance::{PairBalance, PairLedger};
pub use expense::{Expense, NewExpense, SplitInput, SplitStrategy};
pub use settlement::{NewSettlement, SettlementTransaction};
pub use share::{LedgerShare, ShareSet, shares_total};
pub use split::{SplitError, compute_for, compute_shares, validate_amount, validate_participants};
