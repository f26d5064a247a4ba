//! Processor configuration.

use std::time::Duration;

use replica_broker::{ConsumerConfig, StreamConfig};
use replica_core::config::{env_lookup, parse_or, DatabaseConfig};

/// Default target database port.
pub const DEFAULT_DB_PORT: u16 = 5433;

const DEFAULT_BATCH_SIZE: u32 = 10;
const DEFAULT_FETCH_MAX_WAIT_SECS: u64 = 5;

/// Everything the `inbox-processor` binary reads from the environment.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub database: DatabaseConfig,
    pub stream: StreamConfig,
    pub consumer: ConsumerConfig,

    /// Maximum deliveries per fetch
    pub batch_size: usize,

    /// How long a fetch waits for the first message
    pub fetch_max_wait: Duration,
}

impl ProcessorConfig {
    /// Load processor settings from the environment.
    ///
    /// On top of the database (`DB_*`, default port `5433`), stream and
    /// consumer-group variables:
    ///
    /// | Env Var               | Default |
    /// |-----------------------|---------|
    /// | `BATCH_SIZE`          | `10`    |
    /// | `FETCH_MAX_WAIT_SECS` | `5`     |
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let wait_secs = match parse_or(lookup, "FETCH_MAX_WAIT_SECS", DEFAULT_FETCH_MAX_WAIT_SECS) {
            0 => {
                tracing::warn!("FETCH_MAX_WAIT_SECS must be positive, using default");
                DEFAULT_FETCH_MAX_WAIT_SECS
            }
            secs => secs,
        };

        Self {
            database: DatabaseConfig::from_lookup(lookup, DEFAULT_DB_PORT),
            stream: StreamConfig::from_lookup(lookup),
            consumer: ConsumerConfig::from_lookup(lookup),
            batch_size: parse_or(lookup, "BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1) as usize,
            fetch_max_wait: Duration::from_secs(wait_secs),
        }
    }
}
