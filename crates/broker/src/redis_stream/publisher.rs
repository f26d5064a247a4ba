//! Publishing side of the Redis Streams channel.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::Script;

use super::reply::{FIELD_MSG_ID, FIELD_PAYLOAD};
use super::{millis, SharedConnection};
use crate::channel::{MessagePublisher, PublishOutcome};
use crate::config::StreamConfig;
use crate::error::BrokerResult;

/// KEYS[1] dedup key, KEYS[2] stream key.
/// ARGV: dedup window ms, max entries, minimum retained id, msg_id, payload.
/// Returns the new entry id, or nil when the dedup key is already held.
///
/// The dedup key is written only after the append succeeds, so a failed
/// XADD leaves nothing that would suppress the retry.
const PUBLISH_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return false
end
local id = redis.call('XADD', KEYS[2], 'MAXLEN', '~', ARGV[2], '*',
    'msg_id', ARGV[4], 'payload', ARGV[5])
redis.call('XTRIM', KEYS[2], 'MINID', '~', ARGV[3])
redis.call('SET', KEYS[1], '1', 'PX', ARGV[1])
return id
";

/// Publishes messages to a Redis stream with keyed deduplication.
pub struct RedisStreamPublisher {
    conn: SharedConnection,
    config: StreamConfig,
    script: Script,
}

impl RedisStreamPublisher {
    /// Connect to Redis.
    pub async fn connect(config: StreamConfig) -> BrokerResult<Self> {
        let conn = SharedConnection::open(&config.redis_url).await?;
        tracing::info!(stream = %config.stream_key(), "Connected stream publisher");
        Ok(Self {
            conn,
            config,
            script: Script::new(PUBLISH_SCRIPT),
        })
    }

    /// Oldest entry id still inside the retention window.
    fn min_retained_id(&self) -> String {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(millis)
            .unwrap_or_default();
        format!("{}-0", now_ms.saturating_sub(millis(self.config.max_age)))
    }
}

#[async_trait]
impl MessagePublisher for RedisStreamPublisher {
    async fn publish(&self, dedup_key: &str, payload: &[u8]) -> BrokerResult<PublishOutcome> {
        let mut conn = self.conn.get().await;
        let stored: Option<String> = self
            .script
            .key(self.config.dedup_key(dedup_key))
            .key(self.config.stream_key())
            .arg(millis(self.config.dedup_window).max(1))
            .arg(self.config.max_messages)
            .arg(self.min_retained_id())
            .arg(dedup_key)
            .arg(payload)
            .invoke_async(&mut conn)
            .await?;

        Ok(match stored {
            Some(sequence) => {
                tracing::debug!(dedup_key, sequence = %sequence, "Appended to stream");
                PublishOutcome::Stored { sequence }
            }
            None => PublishOutcome::Duplicate,
        })
    }

    async fn reconnect(&self) -> BrokerResult<()> {
        self.conn.reconnect().await
    }
}
