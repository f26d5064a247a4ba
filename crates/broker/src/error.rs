//! Error types for the broker channel.

use thiserror::Error;

/// Broker channel error type.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Unexpected reply shape from the broker
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The broker cannot be reached
    #[error("Broker unavailable")]
    Unavailable,
}

impl BrokerError {
    /// Whether the error means the connection itself is unusable and should
    /// be re-established before the next attempt.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Redis(e) => {
                e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            Self::Protocol(_) => false,
            Self::Unavailable => true,
        }
    }
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
