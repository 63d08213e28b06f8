//! Infrastructure layer: ledger storage, settlement engine, expense coordination.

pub mod config;
pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod settlement;
pub mod store;

pub use config::{ConfigError, EngineConfig, StoreConfig};
pub use context::{CallContext, CancellationSignal};
pub use coordinator::{CreatedExpense, ExpenseCoordinator};
pub use engine::{ExpenseWithShares, LedgerEngine};
pub use error::LedgerError;
pub use settlement::{BalanceReport, PairFailure, SettlementEngine};
pub use store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, StoreError};

#[cfg(test)]
pub(crate) mod test_support;
