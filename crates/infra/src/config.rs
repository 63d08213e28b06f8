//! Environment-driven configuration.

use std::time::Duration;

use thiserror::Error;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS: &str = "SPLITLEDGER_DB_MAX_CONNECTIONS";
pub const DB_ACQUIRE_TIMEOUT_MS: &str = "SPLITLEDGER_DB_ACQUIRE_TIMEOUT_MS";
pub const OP_TIMEOUT_MS: &str = "SPLITLEDGER_OP_TIMEOUT_MS";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Postgres connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
    pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(5_000);

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Self::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(DATABASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(DATABASE_URL))?;

        let max_connections = match lookup(DB_MAX_CONNECTIONS) {
            Some(raw) => {
                let n: u32 = parse(DB_MAX_CONNECTIONS, &raw)?;
                if n == 0 {
                    return Err(ConfigError::Invalid {
                        key: DB_MAX_CONNECTIONS,
                        value: raw,
                        reason: "must be at least 1".to_string(),
                    });
                }
                n
            }
            None => Self::DEFAULT_MAX_CONNECTIONS,
        };

        let acquire_timeout = match lookup(DB_ACQUIRE_TIMEOUT_MS) {
            Some(raw) => Duration::from_millis(parse(DB_ACQUIRE_TIMEOUT_MS, &raw)?),
            None => Self::DEFAULT_ACQUIRE_TIMEOUT,
        };

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout,
        })
    }
}

/// Engine-level settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Default deadline applied to every engine operation. `None` = unbounded.
    pub op_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let op_timeout = lookup(OP_TIMEOUT_MS)
            .map(|raw| parse::<u64>(OP_TIMEOUT_MS, &raw).map(Duration::from_millis))
            .transpose()?;

        Ok(Self { op_timeout })
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = Some(timeout);
        self
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn store_config_requires_database_url() {
        assert_eq!(
            StoreConfig::from_lookup(env(&[])),
            Err(ConfigError::Missing(DATABASE_URL))
        );
    }

    #[test]
    fn store_config_applies_defaults() {
        let cfg = StoreConfig::from_lookup(env(&[(DATABASE_URL, "postgres://localhost/ledger")]))
            .unwrap();
        assert_eq!(cfg, StoreConfig::new("postgres://localhost/ledger"));
    }

    #[test]
    fn store_config_reads_overrides() {
        let cfg = StoreConfig::from_lookup(env(&[
            (DATABASE_URL, "postgres://db/ledger"),
            (DB_MAX_CONNECTIONS, "3"),
            (DB_ACQUIRE_TIMEOUT_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(cfg.max_connections, 3);
        assert_eq!(cfg.acquire_timeout, Duration::from_millis(250));
    }

    #[test]
    fn store_config_rejects_zero_connections() {
        let err = StoreConfig::from_lookup(env(&[
            (DATABASE_URL, "postgres://db/ledger"),
            (DB_MAX_CONNECTIONS, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: DB_MAX_CONNECTIONS, .. }));
    }

    #[test]
    fn engine_config_parses_timeout() {
        let cfg = EngineConfig::from_lookup(env(&[(OP_TIMEOUT_MS, "1500")])).unwrap();
        assert_eq!(cfg.op_timeout, Some(Duration::from_millis(1500)));

        let cfg = EngineConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(cfg.op_timeout, None);

        assert!(EngineConfig::from_lookup(env(&[(OP_TIMEOUT_MS, "soon")])).is_err());
    }
}
