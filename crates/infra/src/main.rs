//! `splitledger-migrate`: create the ledger schema in the configured database.

use anyhow::Context;

use splitledger_infra::{LedgerStore, PostgresLedgerStore, StoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    splitledger_observability::init();

    let config = StoreConfig::from_env().context("failed to read store configuration")?;
    tracing::info!(
        max_connections = config.max_connections,
        acquire_timeout_ms = config.acquire_timeout.as_millis() as u64,
        "connecting to ledger database"
    );

    let store = PostgresLedgerStore::connect(&config)
        .await
        .context("failed to connect to ledger database")?;
    store
        .ensure_schema()
        .await
        .context("failed to create ledger schema")?;
    store.close().await;

    tracing::info!("ledger schema is up to date");
    Ok(())
}
