//! Integration tests for the outbox publishing cycle.
//!
//! Runs the publisher against a real source database and the in-memory
//! broker:
//! - Oldest-first batches and marking
//! - Publish failures leave rows pending
//! - Broker-side duplicates still mark the row
//! - Envelope contents

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use replica_broker::{
    BrokerError, BrokerResult, InMemoryBroker, MessagePublisher, PublishOutcome,
};
use replica_core::stats::ReplicationStats;
use replica_core::ReplicationMessage;
use replica_db::models::outbox::{NewOutboxEvent, OutboxEvent};
use replica_db::repositories::OutboxRepo;
use replica_publisher::OutboxPublisher;
use tokio_util::sync::CancellationToken;
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn insert_user_event(pool: &PgPool, name: &str) -> OutboxEvent {
    let id = Uuid::new_v4();
    let input = NewOutboxEvent {
        id: None,
        aggregate_id: id,
        aggregate_type: "user".to_string(),
        event_type: "created".to_string(),
        event_data: serde_json::json!({"id": id, "name": name, "email": format!("{name}@example.com")}),
    };
    OutboxRepo::insert(pool, &input).await.unwrap()
}

fn publisher_for<P: MessagePublisher>(pool: &PgPool, broker: P) -> OutboxPublisher<P> {
    OutboxPublisher::new(pool.clone(), broker, Arc::new(ReplicationStats::new()))
}

fn published_ids(broker: &InMemoryBroker) -> Vec<String> {
    broker.published().into_iter().map(|(key, _)| key).collect()
}

/// Fails publishes for chosen dedup keys, delegating the rest.
struct FlakyPublisher {
    inner: InMemoryBroker,
    fail_keys: Mutex<HashSet<String>>,
    reconnects: Arc<AtomicUsize>,
}

impl FlakyPublisher {
    fn new(inner: InMemoryBroker) -> Self {
        Self {
            inner,
            fail_keys: Mutex::new(HashSet::new()),
            reconnects: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn fail_on(&self, key: Uuid) {
        self.fail_keys.lock().unwrap().insert(key.to_string());
    }
}

#[async_trait]
impl MessagePublisher for FlakyPublisher {
    async fn publish(&self, dedup_key: &str, payload: &[u8]) -> BrokerResult<PublishOutcome> {
        if self.fail_keys.lock().unwrap().contains(dedup_key) {
            return Err(BrokerError::Protocol("rejected".to_string()));
        }
        if self.fail_keys.lock().unwrap().contains("*") {
            return Err(BrokerError::Unavailable);
        }
        self.inner.publish(dedup_key, payload).await
    }

    async fn reconnect(&self) -> BrokerResult<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Batching
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations/source")]
async fn publishes_oldest_first_in_batches(pool: PgPool) {
    let a = insert_user_event(&pool, "a").await;
    let b = insert_user_event(&pool, "b").await;
    let c = insert_user_event(&pool, "c").await;

    let broker = InMemoryBroker::new();
    let publisher = publisher_for(&pool, broker.clone());

    let first = publisher.publish_batch(2).await.unwrap();
    assert_eq!(first.fetched, 2);
    assert_eq!(first.published, 2);
    assert_eq!(first.marked, 2);
    assert_eq!(published_ids(&broker), vec![a.id.to_string(), b.id.to_string()]);

    let a_row = OutboxRepo::find_by_id(&pool, a.id).await.unwrap().unwrap();
    assert!(a_row.processed);
    assert!(a_row.processed_at.is_some());
    let c_row = OutboxRepo::find_by_id(&pool, c.id).await.unwrap().unwrap();
    assert!(!c_row.processed);

    let second = publisher.publish_batch(2).await.unwrap();
    assert_eq!(second.fetched, 1);
    assert_eq!(second.marked, 1);
    assert_eq!(published_ids(&broker).last(), Some(&c.id.to_string()));
    assert_eq!(OutboxRepo::pending_count(&pool).await.unwrap(), 0);

    let third = publisher.publish_batch(2).await.unwrap();
    assert!(third.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations/source")]
async fn empty_outbox_is_a_no_op(pool: PgPool) {
    let broker = InMemoryBroker::new();
    let report = publisher_for(&pool, broker.clone())
        .publish_batch(10)
        .await
        .unwrap();

    assert!(report.is_empty());
    assert!(broker.published().is_empty());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations/source")]
async fn failed_publish_leaves_row_pending_and_continues(pool: PgPool) {
    let a = insert_user_event(&pool, "a").await;
    let b = insert_user_event(&pool, "b").await;
    let c = insert_user_event(&pool, "c").await;

    let broker = InMemoryBroker::new();
    let flaky = FlakyPublisher::new(broker.clone());
    flaky.fail_on(b.id);
    let publisher = publisher_for(&pool, flaky);

    let report = publisher.publish_batch(10).await.unwrap();
    assert_eq!(report.fetched, 3);
    assert_eq!(report.published, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.marked, 2);
    assert_eq!(report.connection_errors, 0);
    assert_eq!(published_ids(&broker), vec![a.id.to_string(), c.id.to_string()]);

    let pending = OutboxRepo::list_pending(&pool, 10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, b.id);
}

#[sqlx::test(migrations = "../../db/migrations/source")]
async fn unavailable_broker_marks_nothing_and_reconnects(pool: PgPool) {
    insert_user_event(&pool, "a").await;
    insert_user_event(&pool, "b").await;

    let broker = InMemoryBroker::new();
    broker.set_unavailable(true);
    let stats = Arc::new(ReplicationStats::new());
    let publisher = OutboxPublisher::new(pool.clone(), broker.clone(), Arc::clone(&stats));

    let report = publisher.publish_batch(10).await.unwrap();
    assert_eq!(report.failed, 2);
    assert_eq!(report.connection_errors, 2);
    assert_eq!(report.marked, 0);
    assert_eq!(OutboxRepo::pending_count(&pool).await.unwrap(), 2);
    assert_eq!(stats.snapshot().publish_failures, 2);

    broker.set_unavailable(false);
    let report = publisher.publish_batch(10).await.unwrap();
    assert_eq!(report.marked, 2);
    assert_eq!(stats.snapshot().marked, 2);
}

#[sqlx::test(migrations = "../../db/migrations/source")]
async fn run_loop_reconnects_after_connection_errors(pool: PgPool) {
    insert_user_event(&pool, "a").await;

    let flaky = FlakyPublisher::new(InMemoryBroker::new());
    flaky.fail_keys.lock().unwrap().insert("*".to_string());
    let reconnects = Arc::clone(&flaky.reconnects);
    let publisher = publisher_for(&pool, flaky);

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        stopper.cancel();
    });
    publisher
        .run(Duration::from_millis(50), 10, cancel)
        .await;

    assert!(reconnects.load(Ordering::SeqCst) >= 1);
    assert_eq!(OutboxRepo::pending_count(&pool).await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations/source")]
async fn broker_duplicate_still_marks_row(pool: PgPool) {
    let a = insert_user_event(&pool, "a").await;

    // A previous run published the row but crashed before marking it.
    let broker = InMemoryBroker::new();
    broker.publish(&a.id.to_string(), b"earlier").await.unwrap();

    let report = publisher_for(&pool, broker.clone())
        .publish_batch(10)
        .await
        .unwrap();

    assert_eq!(report.published, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.marked, 1);
    assert_eq!(broker.published().len(), 1);
    assert_eq!(OutboxRepo::pending_count(&pool).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations/source")]
async fn concurrent_publishers_mark_each_row_once(pool: PgPool) {
    for name in ["a", "b", "c"] {
        insert_user_event(&pool, name).await;
    }

    let broker = InMemoryBroker::new();
    let first = publisher_for(&pool, broker.clone());
    let second = publisher_for(&pool, broker.clone());

    let (r1, r2) = tokio::join!(first.publish_batch(10), second.publish_batch(10));
    let (r1, r2) = (r1.unwrap(), r2.unwrap());

    assert_eq!(r1.marked + r2.marked, 3);
    assert_eq!(broker.published().len(), 3);
    assert_eq!(OutboxRepo::pending_count(&pool).await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations/source")]
async fn envelope_carries_outbox_row(pool: PgPool) {
    let a = insert_user_event(&pool, "alice").await;

    let broker = InMemoryBroker::new();
    publisher_for(&pool, broker.clone())
        .publish_batch(10)
        .await
        .unwrap();

    let (key, payload) = broker.published().remove(0);
    assert_eq!(key, a.id.to_string());

    let message = ReplicationMessage::decode(&payload).unwrap();
    assert_eq!(message.event_id, a.id);
    assert_eq!(message.aggregate_id, a.aggregate_id);
    assert_eq!(message.aggregate_type, "user");
    assert_eq!(message.event_type, "created");
    assert_eq!(message.event_data, a.event_data);
    assert_eq!(message.original_time, a.created_at);
    assert!(message.published_at >= message.original_time);

    let duplicate = broker.publish(&key, &payload).await;
    assert_matches!(duplicate, Ok(PublishOutcome::Duplicate));
}
