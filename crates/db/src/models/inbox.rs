//! Target-side inbox rows.

use replica_core::ReplicationMessage;
use replica_core::types::{EventId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `inbox` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct InboxEvent {
    pub id: EventId,
    pub event_id: EventId,
    pub aggregate_id: EventId,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub created_at: Timestamp,
    pub processed: bool,
    pub processed_at: Option<Timestamp>,
}

/// DTO for recording a received replication message.
#[derive(Debug, Clone)]
pub struct NewInboxEvent {
    pub id: EventId,
    pub event_id: EventId,
    pub aggregate_id: EventId,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
}

impl NewInboxEvent {
    /// Build an inbox row for `message` with a fresh local id.
    pub fn from_message(message: &ReplicationMessage) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            event_id: message.event_id,
            aggregate_id: message.aggregate_id,
            aggregate_type: message.aggregate_type.clone(),
            event_type: message.event_type.clone(),
            event_data: message.event_data.clone(),
        }
    }
}
