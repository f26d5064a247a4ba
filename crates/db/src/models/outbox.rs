//! Source-side outbox rows.

use replica_core::types::{EventId, Timestamp};
use replica_core::ReplicationMessage;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `outbox` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OutboxEvent {
    pub id: EventId,
    pub aggregate_id: EventId,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub created_at: Timestamp,
    pub processed: bool,
    pub processed_at: Option<Timestamp>,
}

impl OutboxEvent {
    /// Build the broker envelope for this row.
    pub fn to_message(&self, published_at: Timestamp) -> ReplicationMessage {
        ReplicationMessage {
            event_id: self.id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type.clone(),
            event_type: self.event_type.clone(),
            event_data: self.event_data.clone(),
            original_time: self.created_at,
            published_at,
        }
    }
}

/// DTO for appending a domain event to the outbox.
///
/// `id` is optional; the database assigns a random UUID when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct NewOutboxEvent {
    pub id: Option<EventId>,
    pub aggregate_id: EventId,
    pub aggregate_type: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
}
