/// Event and row identifiers are UUIDs on both sides of the pipeline.
pub type EventId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
