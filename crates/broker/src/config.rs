//! Channel configuration.

use std::time::Duration;

use replica_core::config::{env_lookup, parse_or, secs_or, var_or};

/// Settings shared by both ends of a Redis Streams channel.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Logical stream name, e.g. `REPLICATION`
    pub stream_name: String,

    /// Subject within the stream, e.g. `replication.events`
    pub subject: String,

    /// Entries older than this are trimmed on publish
    pub max_age: Duration,

    /// Approximate cap on the number of retained entries
    pub max_messages: u64,

    /// How long a dedup key suppresses re-publication
    pub dedup_window: Duration,
}

/// Settings for a consumer-group member.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Consumer group name; all processor instances share it
    pub group: String,

    /// Consumer name (unique per instance)
    pub name: String,

    /// Deliveries beyond this count are dropped by the broker
    pub max_deliver: u32,

    /// Unacknowledged deliveries become eligible for redelivery after this
    pub ack_wait: Duration,
}

impl StreamConfig {
    /// Load stream settings from the environment.
    ///
    /// | Env Var               | Default                  |
    /// |-----------------------|--------------------------|
    /// | `REDIS_URL`           | `redis://127.0.0.1:6379` |
    /// | `STREAM_NAME`         | `REPLICATION`            |
    /// | `SUBJECT`             | `replication.events`     |
    /// | `STREAM_MAX_AGE_SECS` | `86400`                  |
    /// | `STREAM_MAX_MESSAGES` | `100000`                 |
    /// | `DEDUP_WINDOW_SECS`   | `300`                    |
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            redis_url: var_or(lookup, "REDIS_URL", "redis://127.0.0.1:6379"),
            stream_name: var_or(lookup, "STREAM_NAME", "REPLICATION"),
            subject: var_or(lookup, "SUBJECT", "replication.events"),
            max_age: secs_or(lookup, "STREAM_MAX_AGE_SECS", 24 * 60 * 60),
            max_messages: parse_or(lookup, "STREAM_MAX_MESSAGES", 100_000),
            dedup_window: secs_or(lookup, "DEDUP_WINDOW_SECS", 5 * 60),
        }
    }

    /// Get the Redis stream key.
    pub fn stream_key(&self) -> String {
        format!("{}:{}", self.stream_name, self.subject)
    }

    /// Get the Redis key that records a publisher dedup key.
    pub fn dedup_key(&self, key: &str) -> String {
        format!("{}:dedup:{}", self.stream_key(), key)
    }
}

impl ConsumerConfig {
    /// Load consumer settings from the environment.
    ///
    /// | Env Var          | Default                   |
    /// |------------------|---------------------------|
    /// | `CONSUMER_GROUP` | `inbox-processor`         |
    /// | `CONSUMER_NAME`  | `inbox-processor-<uuid>`  |
    /// | `MAX_DELIVER`    | `3`                       |
    /// | `ACK_WAIT_SECS`  | `30`                      |
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    pub fn from_lookup<F>(lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let group = var_or(lookup, "CONSUMER_GROUP", "inbox-processor");
        let default_name = format!("{group}-{}", uuid::Uuid::new_v4());
        Self {
            name: var_or(lookup, "CONSUMER_NAME", &default_name),
            group,
            max_deliver: parse_or(lookup, "MAX_DELIVER", 3u32).max(1),
            ack_wait: secs_or(lookup, "ACK_WAIT_SECS", 30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn stream_defaults_match_retention_policy() {
        let config = StreamConfig::from_lookup(&empty);
        assert_eq!(config.redis_url, "redis://127.0.0.1:6379");
        assert_eq!(config.max_age, Duration::from_secs(86_400));
        assert_eq!(config.max_messages, 100_000);
        assert_eq!(config.dedup_window, Duration::from_secs(300));
    }

    #[test]
    fn stream_and_dedup_keys() {
        let config = StreamConfig::from_lookup(&empty);
        assert_eq!(config.stream_key(), "REPLICATION:replication.events");
        assert_eq!(
            config.dedup_key("abc"),
            "REPLICATION:replication.events:dedup:abc"
        );
    }

    #[test]
    fn consumer_defaults() {
        let config = ConsumerConfig::from_lookup(&empty);
        assert_eq!(config.group, "inbox-processor");
        assert!(config.name.starts_with("inbox-processor-"));
        assert_eq!(config.max_deliver, 3);
        assert_eq!(config.ack_wait, Duration::from_secs(30));
    }

    #[test]
    fn max_deliver_is_at_least_one() {
        let lookup = |key: &str| (key == "MAX_DELIVER").then(|| "0".to_string());
        assert_eq!(ConsumerConfig::from_lookup(&lookup).max_deliver, 1);
    }
}
