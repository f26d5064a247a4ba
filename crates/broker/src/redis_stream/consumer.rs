//! Consuming side of the Redis Streams channel.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Cmd, RedisResult, Value};

use super::reply::{parse_autoclaim_reply, parse_delivery_count, parse_read_reply, StreamEntry};
use super::{millis, SharedConnection};
use crate::channel::{Delivery, MessageConsumer};
use crate::config::{ConsumerConfig, StreamConfig};
use crate::error::BrokerResult;

/// Pulls messages from a Redis stream as a member of a consumer group.
pub struct RedisStreamConsumer {
    conn: SharedConnection,
    stream: StreamConfig,
    consumer: ConsumerConfig,
    cursor: ReclaimCursor,
}

/// Start of the next XAUTOCLAIM scan. Redis hands back `0-0` once the
/// pending list has been walked to the end, which restarts the scan.
#[derive(Debug)]
struct ReclaimCursor(Mutex<String>);

impl ReclaimCursor {
    const START: &'static str = "0-0";

    fn new() -> Self {
        Self(Mutex::new(Self::START.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> String {
        self.lock().clone()
    }

    fn advance(&self, next: String) {
        *self.lock() = next;
    }
}

/// What to do with a reclaimed entry given its delivery count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Redelivery {
    Deliver { attempt: u32 },
    Exhausted,
}

/// The delivery count already includes the reclaim that handed the entry
/// over, so it is the attempt number of this delivery.
fn redelivery(delivery_count: u32, max_deliver: u32) -> Redelivery {
    if delivery_count > max_deliver {
        Redelivery::Exhausted
    } else {
        Redelivery::Deliver {
            attempt: delivery_count,
        }
    }
}

fn autoclaim_command(
    stream_key: &str,
    group: &str,
    consumer: &str,
    min_idle: Duration,
    cursor: &str,
    count: usize,
) -> Cmd {
    let mut cmd = redis::cmd("XAUTOCLAIM");
    cmd.arg(stream_key)
        .arg(group)
        .arg(consumer)
        .arg(millis(min_idle))
        .arg(cursor)
        .arg("COUNT")
        .arg(count);
    cmd
}

/// Keep ownership but age the entry past the ack wait so the next
/// XAUTOCLAIM by any member picks it up. JUSTID leaves the delivery
/// count to that reclaim.
fn nak_command(stream_key: &str, group: &str, consumer: &str, id: &str, ack_wait: Duration) -> Cmd {
    let mut cmd = redis::cmd("XCLAIM");
    cmd.arg(stream_key)
        .arg(group)
        .arg(consumer)
        .arg(0)
        .arg(id)
        .arg("IDLE")
        .arg(millis(ack_wait))
        .arg("JUSTID");
    cmd
}

impl RedisStreamConsumer {
    /// Connect to Redis and make sure the consumer group exists.
    pub async fn connect(stream: StreamConfig, consumer: ConsumerConfig) -> BrokerResult<Self> {
        let conn = SharedConnection::open(&stream.redis_url).await?;
        let this = Self {
            conn,
            stream,
            consumer,
            cursor: ReclaimCursor::new(),
        };
        this.ensure_consumer_group().await?;
        Ok(this)
    }

    /// Create the consumer group, starting from the beginning of the stream.
    async fn ensure_consumer_group(&self) -> BrokerResult<()> {
        let stream_key = self.stream.stream_key();
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&stream_key)
            .arg(&self.consumer.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut self.conn.get().await)
            .await;

        match result {
            Ok(()) => {
                tracing::info!(
                    stream = %stream_key,
                    group = %self.consumer.group,
                    "Created consumer group"
                );
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                tracing::debug!(
                    stream = %stream_key,
                    group = %self.consumer.group,
                    "Consumer group already exists"
                );
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Take over entries whose ack wait has expired, including entries
    /// naked by any group member. Each call resumes where the last one
    /// stopped.
    async fn reclaim(&self, count: usize) -> BrokerResult<Vec<StreamEntry>> {
        let value: Value = autoclaim_command(
            &self.stream.stream_key(),
            &self.consumer.group,
            &self.consumer.name,
            self.consumer.ack_wait,
            &self.cursor.current(),
            count,
        )
        .query_async(&mut self.conn.get().await)
        .await?;
        let (next, entries) = parse_autoclaim_reply(&value)?;
        self.cursor.advance(next);
        Ok(entries)
    }

    /// Delivery counts of pending entries, keyed by entry id.
    async fn delivery_counts(&self, entries: &[StreamEntry]) -> BrokerResult<HashMap<String, u32>> {
        let stream_key = self.stream.stream_key();
        let mut pipe = redis::pipe();
        for entry in entries {
            pipe.cmd("XPENDING")
                .arg(&stream_key)
                .arg(&self.consumer.group)
                .arg(&entry.id)
                .arg(&entry.id)
                .arg(1);
        }
        let replies: Vec<Value> = pipe.query_async(&mut self.conn.get().await).await?;

        let mut counts = HashMap::with_capacity(entries.len());
        for (entry, reply) in entries.iter().zip(&replies) {
            if let Some(count) = parse_delivery_count(reply)? {
                counts.insert(entry.id.clone(), count);
            }
        }
        Ok(counts)
    }

    /// Read entries never delivered to the group.
    async fn read_new(&self, count: usize, block: Option<Duration>) -> BrokerResult<Vec<StreamEntry>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.consumer.group)
            .arg(&self.consumer.name)
            .arg("COUNT")
            .arg(count);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(millis(block).max(1));
        }
        cmd.arg("STREAMS").arg(self.stream.stream_key()).arg(">");

        let value: Value = cmd.query_async(&mut self.conn.get().await).await?;
        parse_read_reply(&value)
    }

    async fn xack(&self, id: &str) -> BrokerResult<i64> {
        let mut conn = self.conn.get().await;
        let acked: i64 = conn
            .xack(self.stream.stream_key(), &self.consumer.group, &[id])
            .await?;
        Ok(acked)
    }
}

fn into_delivery(entry: StreamEntry, attempt: u32) -> Delivery {
    Delivery {
        id: entry.id,
        dedup_key: entry.dedup_key,
        payload: entry.payload,
        attempt,
    }
}

#[async_trait]
impl MessageConsumer for RedisStreamConsumer {
    async fn fetch(&self, batch_size: usize, max_wait: Duration) -> BrokerResult<Vec<Delivery>> {
        let mut batch = Vec::with_capacity(batch_size);

        let reclaimed = self.reclaim(batch_size).await?;
        if !reclaimed.is_empty() {
            let counts = self.delivery_counts(&reclaimed).await?;
            for entry in reclaimed {
                // Not pending any more: acked by another member meanwhile
                let Some(&count) = counts.get(&entry.id) else {
                    continue;
                };
                match redelivery(count, self.consumer.max_deliver) {
                    Redelivery::Deliver { attempt } => batch.push(into_delivery(entry, attempt)),
                    Redelivery::Exhausted => {
                        tracing::warn!(
                            message_id = %entry.id,
                            dedup_key = %entry.dedup_key,
                            attempts = count - 1,
                            "Redelivery exhausted, dropping message"
                        );
                        self.xack(&entry.id).await?;
                    }
                }
            }
        }

        let remaining = batch_size.saturating_sub(batch.len());
        if remaining > 0 {
            let block = (batch.is_empty() && !max_wait.is_zero()).then_some(max_wait);
            let fresh = self.read_new(remaining, block).await?;
            batch.extend(fresh.into_iter().map(|entry| into_delivery(entry, 1)));
        }

        if !batch.is_empty() {
            tracing::debug!(count = batch.len(), "Fetched messages");
        }
        Ok(batch)
    }

    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()> {
        let acked = self.xack(&delivery.id).await?;
        if acked == 0 {
            tracing::warn!(
                message_id = %delivery.id,
                "XACK returned 0, message may have been reclaimed"
            );
        }
        Ok(())
    }

    async fn nak(&self, delivery: &Delivery) -> BrokerResult<()> {
        let _: Value = nak_command(
            &self.stream.stream_key(),
            &self.consumer.group,
            &self.consumer.name,
            &delivery.id,
            self.consumer.ack_wait,
        )
        .query_async(&mut self.conn.get().await)
        .await?;
        Ok(())
    }

    async fn reconnect(&self) -> BrokerResult<()> {
        self.conn.reconnect().await?;
        self.ensure_consumer_group().await
    }
}
