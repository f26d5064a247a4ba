//! Replicated user aggregate.

use replica_core::types::{EventId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the target `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: EventId,
    pub name: String,
    pub email: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub last_event_id: EventId,
}

/// Payload of a `user` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEventData {
    pub id: EventId,
    pub name: String,
    pub email: String,
}
