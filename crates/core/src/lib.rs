//! Shared building blocks for the replication pipeline.
//!
//! - [`envelope::ReplicationMessage`]: the wire envelope carried by the broker.
//! - [`aggregate::AggregateType`]: the aggregate kinds the pipeline knows about.
//! - [`config`]: environment-driven configuration helpers.
//! - [`stats::ReplicationStats`]: injected pipeline counters.
//! - [`telemetry`]: tracing subscriber setup shared by the binaries.
//! - [`shutdown`]: signal-driven cancellation for the service loops.

pub mod aggregate;
pub mod config;
pub mod envelope;
pub mod error;
pub mod shutdown;
pub mod stats;
pub mod telemetry;
pub mod types;

pub use aggregate::AggregateType;
pub use envelope::ReplicationMessage;
pub use error::CoreError;
pub use stats::ReplicationStats;
