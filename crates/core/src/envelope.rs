//! The replication message envelope.
//!
//! A [`ReplicationMessage`] is the transient, broker-mediated copy of one
//! outbox row. It is built by the outbox publisher, serialized as JSON, and
//! decoded exactly once per delivery by the inbox processor.

use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateType;
use crate::error::CoreError;
use crate::types::{EventId, Timestamp};

/// Wire envelope for a single replicated domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationMessage {
    /// Id of the originating outbox row. Also the broker dedup key and the
    /// inbox idempotency key.
    pub event_id: EventId,

    pub aggregate_id: EventId,

    /// Wire name of the aggregate type, e.g. `"user"`.
    pub aggregate_type: String,

    /// Free-form state transition name, e.g. `"created"`.
    pub event_type: String,

    /// Opaque payload interpreted only by the target-side apply function.
    pub event_data: serde_json::Value,

    /// `created_at` of the outbox row on the source side.
    pub original_time: Timestamp,

    /// When the publisher handed the message to the broker.
    pub published_at: Timestamp,
}

impl ReplicationMessage {
    /// Decode an envelope from a broker payload.
    ///
    /// Any failure here marks the delivery as a poison message.
    pub fn decode(payload: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(payload).map_err(CoreError::MalformedMessage)
    }

    /// Encode the envelope as a JSON broker payload.
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        serde_json::to_vec(self).map_err(CoreError::Encode)
    }

    /// The parsed aggregate type, or `None` if this build does not know it.
    pub fn aggregate(&self) -> Option<AggregateType> {
        AggregateType::parse(&self.aggregate_type)
    }

    /// The broker deduplication key for this message.
    pub fn dedup_key(&self) -> String {
        self.event_id.to_string()
    }
}
