//! Error types for event application.

use replica_core::types::EventId;
use thiserror::Error;

/// Failure inside an apply function. Always rolls back the event's
/// transaction.
#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// `event_data` does not match the aggregate's payload shape
    #[error("Invalid {aggregate} payload: {source}")]
    InvalidPayload {
        aggregate: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unsupported {aggregate} event type: {event_type}")]
    UnsupportedEventType {
        aggregate: &'static str,
        event_type: String,
    },
}

/// Failure processing one replication message. The delivery is negatively
/// acknowledged so the broker redelivers it.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Apply failed: {0}")]
    Apply(#[from] ApplyError),

    #[error("Unknown aggregate type: {0}")]
    UnknownAggregate(String),

    #[error("Inbox row for event {0} was already marked processed")]
    InboxNotMarked(EventId),
}
