//! Publisher configuration.

use std::time::Duration;

use replica_broker::StreamConfig;
use replica_core::config::{env_lookup, parse_or, DatabaseConfig};

/// Default source database port.
pub const DEFAULT_DB_PORT: u16 = 5432;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;
const DEFAULT_BATCH_SIZE: u32 = 10;

/// Everything the `outbox-publisher` binary reads from the environment.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub database: DatabaseConfig,
    pub stream: StreamConfig,

    /// Time between polling cycles
    pub poll_interval: Duration,

    /// Maximum outbox rows per cycle
    pub batch_size: u32,
}

impl PublisherConfig {
    /// Load publisher settings from the environment.
    ///
    /// On top of the database (`DB_*`, default port `5432`) and stream
    /// variables:
    ///
    /// | Env Var         | Default |
    /// |-----------------|---------|
    /// | `POLL_INTERVAL` | `1` (seconds) |
    /// | `BATCH_SIZE`    | `10`    |
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let poll_secs = match parse_or(lookup, "POLL_INTERVAL", DEFAULT_POLL_INTERVAL_SECS) {
            0 => {
                tracing::warn!("POLL_INTERVAL must be positive, using default");
                DEFAULT_POLL_INTERVAL_SECS
            }
            secs => secs,
        };

        Self {
            database: DatabaseConfig::from_lookup(lookup, DEFAULT_DB_PORT),
            stream: StreamConfig::from_lookup(lookup),
            poll_interval: Duration::from_secs(poll_secs),
            batch_size: parse_or(lookup, "BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
        }
    }
}
