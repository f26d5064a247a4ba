//! The broker delivery contract.
//!
//! Publishing carries an idempotency key that the broker uses to suppress
//! repeats within its dedup window. Consumption is pull-based with explicit
//! per-message acknowledgement; a negative acknowledgement (or an ack that
//! never arrives) makes the message eligible for redelivery until the
//! broker's delivery ceiling is reached.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BrokerResult;

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The message was appended to the channel.
    Stored {
        /// Broker-assigned position of the message.
        sequence: String,
    },
    /// A message with the same dedup key is already in the channel.
    Duplicate,
}

/// One delivery attempt of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned id, used for ack / nak.
    pub id: String,
    /// Dedup key supplied by the publisher.
    pub dedup_key: String,
    /// Raw message payload.
    pub payload: Vec<u8>,
    /// 1 for the first delivery, incremented on each redelivery.
    pub attempt: u32,
}

/// Producer side of the channel.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish `payload` under the idempotency key `dedup_key`.
    async fn publish(&self, dedup_key: &str, payload: &[u8]) -> BrokerResult<PublishOutcome>;

    /// Re-establish the underlying connection after a connection error.
    async fn reconnect(&self) -> BrokerResult<()> {
        Ok(())
    }
}

/// Consumer side of the channel.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Pull up to `batch_size` deliveries, waiting at most `max_wait`.
    ///
    /// An empty vector after the wait is a normal outcome.
    async fn fetch(&self, batch_size: usize, max_wait: Duration) -> BrokerResult<Vec<Delivery>>;

    /// Acknowledge a delivery; it will not be redelivered.
    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()>;

    /// Negatively acknowledge a delivery, requesting redelivery.
    async fn nak(&self, delivery: &Delivery) -> BrokerResult<()>;

    /// Re-establish the underlying connection after a connection error.
    async fn reconnect(&self) -> BrokerResult<()> {
        Ok(())
    }
}
