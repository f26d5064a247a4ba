//! Outbox publisher.
//!
//! Polls the source database's `outbox` table for unpublished rows, hands
//! each one to the broker keyed by its event id, and marks the rows that
//! the broker accepted. Delivery is at-least-once: a row is only marked
//! after a successful publish, and the broker's dedup window absorbs
//! re-publication after a crash between the two steps.

pub mod config;
pub mod publisher;

pub use config::PublisherConfig;
pub use publisher::{OutboxPublisher, PublishReport};
