#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Malformed replication message: {0}")]
    MalformedMessage(#[source] serde_json::Error),

    #[error("Failed to encode replication message: {0}")]
    Encode(#[source] serde_json::Error),
}
