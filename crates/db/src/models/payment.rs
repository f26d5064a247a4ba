//! Replicated payment aggregate.

use replica_core::types::{EventId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the target `payments` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Payment {
    pub id: EventId,
    pub user_id: EventId,
    pub amount: f64,
    pub currency: String,
    pub description: String,
    pub status: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub last_event_id: EventId,
}

/// Payload of a `payment` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEventData {
    pub id: EventId,
    pub user_id: EventId,
    pub amount: f64,
    pub currency: String,
    #[serde(default)]
    pub description: String,
    pub status: String,
}
