//! Outbox polling and publishing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use replica_broker::{MessagePublisher, PublishOutcome};
use replica_core::stats::ReplicationStats;
use replica_core::types::EventId;
use replica_db::models::outbox::OutboxEvent;
use replica_db::repositories::OutboxRepo;
use replica_db::DbPool;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Summary of one publishing cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Pending rows read from the outbox.
    pub fetched: usize,
    /// Rows appended to the broker.
    pub published: usize,
    /// Rows the broker already held under the same event id.
    pub duplicates: usize,
    /// Rows that could not be published; they stay pending.
    pub failed: usize,
    /// Rows this cycle transitioned to processed.
    pub marked: usize,
    /// Failures that indicate the broker connection is unusable.
    pub connection_errors: usize,
}

impl PublishReport {
    pub fn is_empty(&self) -> bool {
        self.fetched == 0
    }
}

/// Moves pending outbox rows onto the broker.
pub struct OutboxPublisher<P> {
    pool: DbPool,
    publisher: P,
    stats: Arc<ReplicationStats>,
}

impl<P: MessagePublisher> OutboxPublisher<P> {
    pub fn new(pool: DbPool, publisher: P, stats: Arc<ReplicationStats>) -> Self {
        Self {
            pool,
            publisher,
            stats,
        }
    }

    /// Publish up to `limit` pending rows, oldest first, then mark the ones
    /// the broker accepted.
    ///
    /// A failure to read the outbox aborts the cycle. A failure to publish
    /// or mark one row is logged and the row is left for the next cycle.
    pub async fn publish_batch(&self, limit: u32) -> Result<PublishReport, sqlx::Error> {
        let events = OutboxRepo::list_pending(&self.pool, i64::from(limit)).await?;
        let mut report = PublishReport {
            fetched: events.len(),
            ..Default::default()
        };
        if events.is_empty() {
            return Ok(report);
        }

        let mut accepted: Vec<EventId> = Vec::with_capacity(events.len());
        for event in &events {
            match self.publish_one(event).await {
                Ok(PublishOutcome::Stored { .. }) => {
                    report.published += 1;
                    accepted.push(event.id);
                }
                Ok(PublishOutcome::Duplicate) => {
                    tracing::debug!(event_id = %event.id, "Broker already holds event");
                    report.duplicates += 1;
                    accepted.push(event.id);
                }
                Err(PublishFailure::Encode(e)) => {
                    tracing::error!(event_id = %event.id, error = %e, "Failed to encode event");
                    report.failed += 1;
                }
                Err(PublishFailure::Broker(e)) => {
                    tracing::error!(event_id = %event.id, error = %e, "Failed to publish event");
                    report.failed += 1;
                    if e.is_connection_error() {
                        report.connection_errors += 1;
                    }
                }
            }
        }

        for id in accepted {
            match OutboxRepo::mark_processed(&self.pool, id).await {
                Ok(true) => report.marked += 1,
                Ok(false) => {
                    tracing::debug!(event_id = %id, "Event already marked by another publisher");
                }
                Err(e) => {
                    tracing::error!(event_id = %id, error = %e, "Failed to mark event processed");
                }
            }
        }

        self.stats.record_published(report.published as u64);
        self.stats.record_publish_failures(report.failed as u64);
        self.stats.record_marked(report.marked as u64);

        Ok(report)
    }

    async fn publish_one(&self, event: &OutboxEvent) -> Result<PublishOutcome, PublishFailure> {
        let message = event.to_message(Utc::now());
        let payload = message.encode().map_err(PublishFailure::Encode)?;
        self.publisher
            .publish(&message.dedup_key(), &payload)
            .await
            .map_err(PublishFailure::Broker)
    }

    /// Run one cycle and handle its outcome.
    async fn run_cycle(&self, batch_size: u32) {
        match self.publish_batch(batch_size).await {
            Ok(report) => {
                if !report.is_empty() {
                    tracing::info!(
                        fetched = report.fetched,
                        published = report.published,
                        duplicates = report.duplicates,
                        failed = report.failed,
                        marked = report.marked,
                        "Outbox cycle complete"
                    );
                }
                if report.connection_errors > 0 {
                    if let Err(e) = self.publisher.reconnect().await {
                        tracing::warn!(error = %e, "Broker reconnect failed");
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Outbox cycle failed");
            }
        }
    }

    /// Poll the outbox every `poll_interval` until `cancel` is triggered.
    ///
    /// Cycles never overlap; a slow cycle delays the next tick. Cancellation
    /// is observed between cycles.
    pub async fn run(&self, poll_interval: Duration, batch_size: u32, cancel: CancellationToken) {
        tracing::info!(
            poll_interval_secs = poll_interval.as_secs(),
            batch_size,
            "Outbox publisher started"
        );

        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Outbox publisher stopping");
                    break;
                }
                _ = interval.tick() => self.run_cycle(batch_size).await,
            }
        }
    }
}

enum PublishFailure {
    Encode(replica_core::CoreError),
    Broker(replica_broker::BrokerError),
}
