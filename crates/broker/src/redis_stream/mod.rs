//! Redis Streams implementation of the broker channel.
//!
//! One stream key (`{stream_name}:{subject}`) carries every message. Each
//! entry holds two fields: `msg_id` (the publisher's dedup key) and
//! `payload`. Deduplication uses a companion `SET NX PX` key per dedup key,
//! written atomically with the `XADD` by a Lua script. Consumers share one
//! consumer group; unacknowledged entries are reclaimed with `XAUTOCLAIM`
//! once idle for the ack wait.

mod consumer;
mod publisher;
mod reply;

use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::sync::RwLock;

use crate::error::BrokerResult;

pub use consumer::RedisStreamConsumer;
pub use publisher::RedisStreamPublisher;

/// A multiplexed connection that can be swapped out after a failure.
struct SharedConnection {
    client: Client,
    conn: RwLock<MultiplexedConnection>,
}

impl SharedConnection {
    async fn open(redis_url: &str) -> BrokerResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            client,
            conn: RwLock::new(conn),
        })
    }

    /// Get a handle on the current connection.
    async fn get(&self) -> MultiplexedConnection {
        self.conn.read().await.clone()
    }

    async fn reconnect(&self) -> BrokerResult<()> {
        tracing::info!("Reconnecting to Redis...");
        let conn = self.client.get_multiplexed_async_connection().await?;
        *self.conn.write().await = conn;
        Ok(())
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
