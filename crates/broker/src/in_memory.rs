//! In-process broker channel.
//!
//! [`InMemoryBroker`] implements both [`MessagePublisher`] and
//! [`MessageConsumer`] with the same delivery semantics as the Redis
//! Streams channel:
//! - publishes sharing a dedup key within the dedup window are suppressed
//! - deliveries must be acked; a nak or an expired ack wait redelivers
//! - a message delivered `max_deliver` times is dropped on its next
//!   redelivery and counted as exhausted
//! - retention is capped at `max_messages` entries, oldest evicted first
//!
//! Clones share the same channel, so one clone can be handed to a
//! publisher and another to a consumer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::channel::{Delivery, MessageConsumer, MessagePublisher, PublishOutcome};
use crate::error::{BrokerError, BrokerResult};

/// Delivery policy of an [`InMemoryBroker`].
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    pub dedup_window: Duration,
    pub max_deliver: u32,
    pub ack_wait: Duration,
    pub max_messages: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(5 * 60),
            max_deliver: 3,
            ack_wait: Duration::from_secs(30),
            max_messages: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Ready,
    InFlight { since: Instant },
    Acked,
    Dead,
}

#[derive(Debug)]
struct Slot {
    id: String,
    dedup_key: String,
    payload: Vec<u8>,
    attempts: u32,
    state: SlotState,
}

#[derive(Debug, Default)]
struct State {
    next_seq: u64,
    slots: VecDeque<Slot>,
    dedup: HashMap<String, Instant>,
    published: Vec<(String, Vec<u8>)>,
    exhausted: u64,
    unavailable: bool,
}

/// Thread-safe in-process broker channel.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
    config: Arc<InMemoryConfig>,
}

impl InMemoryBroker {
    /// Create a broker with the default delivery policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a broker with a custom delivery policy.
    pub fn with_config(config: InMemoryConfig) -> Self {
        Self {
            config: Arc::new(config),
            ..Self::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock cannot leave the state torn: every
        // mutation is a single assignment or push.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Simulate the broker becoming unreachable (or reachable again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Append a raw payload without dedup, e.g. a malformed message.
    pub fn inject_raw(&self, payload: &[u8]) -> String {
        let id = {
            let mut state = self.lock();
            let key = format!("raw-{}", state.next_seq);
            self.append(&mut state, key, payload.to_vec())
        };
        self.notify.notify_waiters();
        id
    }

    /// Every message stored by a publish, in publish order, as
    /// `(dedup_key, payload)` pairs. Suppressed duplicates are not included.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.lock().published.clone()
    }

    /// Number of messages that are neither acknowledged nor dropped.
    pub fn outstanding(&self) -> usize {
        self.lock()
            .slots
            .iter()
            .filter(|s| matches!(s.state, SlotState::Ready | SlotState::InFlight { .. }))
            .count()
    }

    /// Number of messages dropped after exceeding the delivery ceiling.
    pub fn exhausted(&self) -> u64 {
        self.lock().exhausted
    }

    fn append(&self, state: &mut State, dedup_key: String, payload: Vec<u8>) -> String {
        state.next_seq += 1;
        let id = format!("{}-0", state.next_seq);
        state.published.push((dedup_key.clone(), payload.clone()));
        state.slots.push_back(Slot {
            id: id.clone(),
            dedup_key,
            payload,
            attempts: 0,
            state: SlotState::Ready,
        });
        while state.slots.len() > self.config.max_messages {
            state.slots.pop_front();
        }
        id
    }

    fn take_ready(&self, batch_size: usize) -> BrokerResult<Vec<Delivery>> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(BrokerError::Unavailable);
        }

        let now = Instant::now();
        let mut batch = Vec::new();
        let mut exhausted = 0;

        for slot in state.slots.iter_mut() {
            if batch.len() >= batch_size {
                break;
            }
            let eligible = match slot.state {
                SlotState::Ready => true,
                SlotState::InFlight { since } => now.duration_since(since) >= self.config.ack_wait,
                SlotState::Acked | SlotState::Dead => false,
            };
            if !eligible {
                continue;
            }
            if slot.attempts >= self.config.max_deliver {
                slot.state = SlotState::Dead;
                exhausted += 1;
                tracing::warn!(
                    message_id = %slot.id,
                    dedup_key = %slot.dedup_key,
                    attempts = slot.attempts,
                    "Redelivery exhausted, dropping message"
                );
                continue;
            }
            slot.attempts += 1;
            slot.state = SlotState::InFlight { since: now };
            batch.push(Delivery {
                id: slot.id.clone(),
                dedup_key: slot.dedup_key.clone(),
                payload: slot.payload.clone(),
                attempt: slot.attempts,
            });
        }

        state.exhausted += exhausted;
        while matches!(
            state.slots.front().map(|s| s.state),
            Some(SlotState::Acked | SlotState::Dead)
        ) {
            state.slots.pop_front();
        }

        Ok(batch)
    }

    fn settle(&self, delivery: &Delivery, next: SlotState) -> BrokerResult<()> {
        let mut state = self.lock();
        if state.unavailable {
            return Err(BrokerError::Unavailable);
        }
        match state.slots.iter_mut().find(|s| s.id == delivery.id) {
            Some(slot) if matches!(slot.state, SlotState::InFlight { .. }) => {
                slot.state = next;
            }
            _ => {
                tracing::debug!(message_id = %delivery.id, "Settling unknown or settled message");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBroker {
    async fn publish(&self, dedup_key: &str, payload: &[u8]) -> BrokerResult<PublishOutcome> {
        let outcome = {
            let mut state = self.lock();
            if state.unavailable {
                return Err(BrokerError::Unavailable);
            }

            let now = Instant::now();
            let window = self.config.dedup_window;
            state
                .dedup
                .retain(|_, stored_at| now.duration_since(*stored_at) < window);

            if state.dedup.contains_key(dedup_key) {
                PublishOutcome::Duplicate
            } else {
                state.dedup.insert(dedup_key.to_string(), now);
                let sequence = self.append(&mut state, dedup_key.to_string(), payload.to_vec());
                PublishOutcome::Stored { sequence }
            }
        };
        self.notify.notify_waiters();
        Ok(outcome)
    }
}

#[async_trait]
impl MessageConsumer for InMemoryBroker {
    async fn fetch(&self, batch_size: usize, max_wait: Duration) -> BrokerResult<Vec<Delivery>> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            // Register interest before checking so a concurrent publish
            // between the check and the wait is not missed.
            let notified = self.notify.notified();
            let batch = self.take_ready(batch_size)?;
            if !batch.is_empty() || tokio::time::Instant::now() >= deadline {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.take_ready(batch_size);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()> {
        self.settle(delivery, SlotState::Acked)
    }

    async fn nak(&self, delivery: &Delivery) -> BrokerResult<()> {
        self.settle(delivery, SlotState::Ready)?;
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const NO_WAIT: Duration = Duration::ZERO;

    #[tokio::test]
    async fn duplicate_keys_are_suppressed_within_window() {
        let broker = InMemoryBroker::new();

        let first = broker.publish("evt-1", b"a").await.unwrap();
        let second = broker.publish("evt-1", b"a").await.unwrap();

        assert_matches!(first, PublishOutcome::Stored { .. });
        assert_eq!(second, PublishOutcome::Duplicate);
        assert_eq!(broker.published().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_keys_are_accepted_after_window() {
        let broker = InMemoryBroker::with_config(InMemoryConfig {
            dedup_window: Duration::ZERO,
            ..Default::default()
        });

        broker.publish("evt-1", b"a").await.unwrap();
        let again = broker.publish("evt-1", b"a").await.unwrap();

        assert_matches!(again, PublishOutcome::Stored { .. });
        assert_eq!(broker.published().len(), 2);
    }

    #[tokio::test]
    async fn fetch_preserves_publish_order_and_respects_batch_size() {
        let broker = InMemoryBroker::new();
        for key in ["a", "b", "c"] {
            broker.publish(key, key.as_bytes()).await.unwrap();
        }

        let batch = broker.fetch(2, NO_WAIT).await.unwrap();
        let keys: Vec<&str> = batch.iter().map(|d| d.dedup_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(batch.iter().all(|d| d.attempt == 1));

        let rest = broker.fetch(2, NO_WAIT).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].dedup_key, "c");
    }

    #[tokio::test]
    async fn empty_fetch_times_out_without_error() {
        let broker = InMemoryBroker::new();
        let batch = broker.fetch(10, Duration::from_millis(20)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn fetch_wakes_up_on_publish() {
        let broker = InMemoryBroker::new();
        let consumer = broker.clone();

        let handle = tokio::spawn(async move { consumer.fetch(1, Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.publish("late", b"x").await.unwrap();

        let batch = handle.await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].dedup_key, "late");
    }

    #[tokio::test]
    async fn acked_messages_are_not_redelivered() {
        let broker = InMemoryBroker::new();
        broker.publish("a", b"a").await.unwrap();

        let batch = broker.fetch(10, NO_WAIT).await.unwrap();
        broker.ack(&batch[0]).await.unwrap();

        assert!(broker.fetch(10, NO_WAIT).await.unwrap().is_empty());
        assert_eq!(broker.outstanding(), 0);
    }

    #[tokio::test]
    async fn nak_redelivers_until_ceiling_then_drops() {
        let broker = InMemoryBroker::with_config(InMemoryConfig {
            max_deliver: 3,
            ..Default::default()
        });
        broker.publish("a", b"a").await.unwrap();

        for expected_attempt in 1..=3 {
            let batch = broker.fetch(10, NO_WAIT).await.unwrap();
            assert_eq!(batch.len(), 1);
            assert_eq!(batch[0].attempt, expected_attempt);
            broker.nak(&batch[0]).await.unwrap();
        }

        assert!(broker.fetch(10, NO_WAIT).await.unwrap().is_empty());
        assert_eq!(broker.exhausted(), 1);
        assert_eq!(broker.outstanding(), 0);
    }

    #[tokio::test]
    async fn unacked_messages_are_redelivered_after_ack_wait() {
        let broker = InMemoryBroker::with_config(InMemoryConfig {
            ack_wait: Duration::ZERO,
            ..Default::default()
        });
        broker.publish("a", b"a").await.unwrap();

        let first = broker.fetch(10, NO_WAIT).await.unwrap();
        let second = broker.fetch(10, NO_WAIT).await.unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_eq!(second[0].attempt, 2);
    }

    #[tokio::test]
    async fn retention_evicts_oldest_messages() {
        let broker = InMemoryBroker::with_config(InMemoryConfig {
            max_messages: 2,
            ..Default::default()
        });
        for key in ["a", "b", "c"] {
            broker.publish(key, key.as_bytes()).await.unwrap();
        }

        let batch = broker.fetch(10, NO_WAIT).await.unwrap();
        let keys: Vec<&str> = batch.iter().map(|d| d.dedup_key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn unavailable_broker_fails_every_operation() {
        let broker = InMemoryBroker::new();
        broker.set_unavailable(true);

        assert_matches!(
            broker.publish("a", b"a").await,
            Err(BrokerError::Unavailable)
        );
        assert_matches!(broker.fetch(1, NO_WAIT).await, Err(BrokerError::Unavailable));

        broker.set_unavailable(false);
        assert_matches!(
            broker.publish("a", b"a").await,
            Ok(PublishOutcome::Stored { .. })
        );
    }

    #[tokio::test]
    async fn injected_raw_payloads_are_delivered_verbatim() {
        let broker = InMemoryBroker::new();
        broker.inject_raw(b"{not json");

        let batch = broker.fetch(1, NO_WAIT).await.unwrap();
        assert_eq!(batch[0].payload, b"{not json");
    }
}
