//! Ledger store boundary.
//!
//! Persists expense headers, per-user ledger shares and settlement
//! transactions. Implementations trust their input: all share validation
//! happens in the calculator before anything reaches a store.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LedgerStore, StoreError};
