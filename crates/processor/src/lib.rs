//! Inbox processor.
//!
//! Pulls replication messages from the broker and applies each one to the
//! target database exactly once. Every event runs in its own transaction
//! that records it in the `inbox` table, applies it to the projection and
//! marks it processed; a redelivered event is recognised by the inbox and
//! acknowledged without being applied again.

pub mod apply;
pub mod backoff;
pub mod config;
pub mod error;
pub mod ordering;
pub mod processor;

pub use apply::{EventApplier, ProjectionApplier};
pub use config::ProcessorConfig;
pub use error::{ApplyError, ProcessError};
pub use processor::{BatchOutcome, BatchReport, DeliveryOutcome, InboxProcessor, ProcessOutcome};
