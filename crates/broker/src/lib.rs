//! Broker channel between the outbox publisher and the inbox processor.
//!
//! - [`MessagePublisher`] / [`MessageConsumer`]: the delivery contract the
//!   pipeline is written against.
//! - [`redis_stream`]: Redis Streams implementation with a keyed
//!   deduplication window and bounded redelivery.
//! - [`in_memory::InMemoryBroker`]: same semantics in-process, for tests
//!   and single-process setups.

pub mod channel;
pub mod config;
pub mod error;
pub mod in_memory;
pub mod redis_stream;

pub use channel::{Delivery, MessageConsumer, MessagePublisher, PublishOutcome};
pub use config::{ConsumerConfig, StreamConfig};
pub use error::{BrokerError, BrokerResult};
pub use in_memory::InMemoryBroker;
pub use redis_stream::{RedisStreamConsumer, RedisStreamPublisher};
