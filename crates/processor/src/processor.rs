//! Batch consumption and per-event transactional processing.

use std::sync::Arc;
use std::time::Duration;

use replica_broker::{BrokerError, Delivery, MessageConsumer};
use replica_core::aggregate::AggregateType;
use replica_core::stats::ReplicationStats;
use replica_core::types::EventId;
use replica_core::ReplicationMessage;
use replica_db::models::inbox::NewInboxEvent;
use replica_db::repositories::InboxRepo;
use replica_db::DbPool;
use tokio_util::sync::CancellationToken;

use crate::apply::EventApplier;
use crate::backoff::{next_delay, BackoffConfig};
use crate::error::ProcessError;
use crate::ordering::order_for_apply;

/// Successful result of processing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The event was recorded and handed to the apply function.
    /// `state_changed` is what the apply function reported.
    Applied { state_changed: bool },
    /// The event had already been processed.
    Duplicate,
}

/// What happened to one delivery of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Applied { state_changed: bool },
    Duplicate,
    /// Undecodable payload; acked and dropped.
    Poisoned,
    /// Processing failed; naked for redelivery.
    Failed { reason: String },
}

/// Per-delivery record, in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub delivery_id: String,
    /// `None` for poisoned deliveries.
    pub event_id: Option<EventId>,
    pub outcome: DeliveryOutcome,
}

/// Counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub applied: usize,
    pub duplicates: usize,
    pub poisoned: usize,
    pub failed: usize,
}

/// Report plus per-delivery outcomes for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub report: BatchReport,
    pub results: Vec<DeliveryResult>,
}

impl BatchOutcome {
    fn record(&mut self, delivery: &Delivery, event_id: Option<EventId>, outcome: DeliveryOutcome) {
        match &outcome {
            DeliveryOutcome::Applied { .. } => self.report.applied += 1,
            DeliveryOutcome::Duplicate => self.report.duplicates += 1,
            DeliveryOutcome::Poisoned => self.report.poisoned += 1,
            DeliveryOutcome::Failed { .. } => self.report.failed += 1,
        }
        self.results.push(DeliveryResult {
            delivery_id: delivery.id.clone(),
            event_id,
            outcome,
        });
    }
}

/// Consumes replication messages and applies them to the target database.
pub struct InboxProcessor<C> {
    pool: DbPool,
    consumer: C,
    applier: Arc<dyn EventApplier>,
    stats: Arc<ReplicationStats>,
}

impl<C: MessageConsumer> InboxProcessor<C> {
    pub fn new(
        pool: DbPool,
        consumer: C,
        applier: Arc<dyn EventApplier>,
        stats: Arc<ReplicationStats>,
    ) -> Self {
        Self {
            pool,
            consumer,
            applier,
            stats,
        }
    }

    /// Pull one batch from the broker and process it.
    ///
    /// Only a failed fetch is an error; per-message failures are reported in
    /// the returned outcome.
    pub async fn fetch_and_process(
        &self,
        batch_size: usize,
        max_wait: Duration,
    ) -> Result<BatchOutcome, BrokerError> {
        let deliveries = self.consumer.fetch(batch_size, max_wait).await?;
        Ok(self.process_batch(deliveries).await)
    }

    /// Decode, reorder and process a batch of deliveries sequentially.
    ///
    /// Every delivery is either acked (applied, duplicate, poisoned) or
    /// naked (failed). Ack and nak errors are logged and do not stop the
    /// batch.
    pub async fn process_batch(&self, deliveries: Vec<Delivery>) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            report: BatchReport {
                received: deliveries.len(),
                ..Default::default()
            },
            results: Vec::with_capacity(deliveries.len()),
        };

        let mut decoded = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            match ReplicationMessage::decode(&delivery.payload) {
                Ok(message) => decoded.push((delivery, message)),
                Err(e) => {
                    tracing::warn!(
                        message_id = %delivery.id,
                        dedup_key = %delivery.dedup_key,
                        error = %e,
                        "Dropping malformed message"
                    );
                    self.stats.record_poisoned();
                    self.settle(&delivery, true).await;
                    outcome.record(&delivery, None, DeliveryOutcome::Poisoned);
                }
            }
        }

        for (delivery, message) in order_for_apply(decoded, |(_, message)| message) {
            let result = match self.process_one(&message).await {
                Ok(ProcessOutcome::Applied { state_changed }) => {
                    self.stats.record_applied();
                    DeliveryOutcome::Applied { state_changed }
                }
                Ok(ProcessOutcome::Duplicate) => {
                    tracing::debug!(event_id = %message.event_id, "Event already processed");
                    self.stats.record_duplicate();
                    DeliveryOutcome::Duplicate
                }
                Err(e) => {
                    tracing::error!(
                        event_id = %message.event_id,
                        aggregate_type = %message.aggregate_type,
                        event_type = %message.event_type,
                        attempt = delivery.attempt,
                        error = %e,
                        "Failed to process event"
                    );
                    self.stats.record_failed();
                    DeliveryOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };

            let ack = !matches!(result, DeliveryOutcome::Failed { .. });
            self.settle(&delivery, ack).await;
            outcome.record(&delivery, Some(message.event_id), result);
        }

        outcome
    }

    async fn settle(&self, delivery: &Delivery, ack: bool) {
        let result = if ack {
            self.consumer.ack(delivery).await
        } else {
            self.consumer.nak(delivery).await
        };
        if let Err(e) = result {
            tracing::error!(
                message_id = %delivery.id,
                ack,
                error = %e,
                "Failed to settle delivery"
            );
        }
    }

    /// Process one message in its own transaction.
    ///
    /// The inbox check, inbox insert, apply call and processed mark either
    /// all commit or all roll back.
    pub async fn process_one(
        &self,
        message: &ReplicationMessage,
    ) -> Result<ProcessOutcome, ProcessError> {
        let aggregate = message
            .aggregate()
            .ok_or_else(|| ProcessError::UnknownAggregate(message.aggregate_type.clone()))?;

        let mut tx = self.pool.begin().await?;

        if InboxRepo::is_event_processed(&mut *tx, message.event_id).await? {
            tx.rollback().await?;
            return Ok(ProcessOutcome::Duplicate);
        }

        let inbox = match InboxRepo::insert(&mut *tx, &NewInboxEvent::from_message(message)).await {
            Ok(row) => row,
            // Another processor committed the same event first.
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Ok(ProcessOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        };

        let state_changed = match aggregate {
            AggregateType::User => {
                self.applier
                    .apply_user_event(
                        &mut *tx,
                        message.event_id,
                        &message.event_type,
                        &message.event_data,
                    )
                    .await?
            }
            AggregateType::Payment => {
                self.applier
                    .apply_payment_event(
                        &mut *tx,
                        message.event_id,
                        &message.event_type,
                        &message.event_data,
                    )
                    .await?
            }
        };
        if !state_changed {
            tracing::info!(event_id = %message.event_id, "Event was already applied to the projection");
        }

        if !InboxRepo::mark_processed(&mut *tx, inbox.id).await? {
            // Dropping the transaction rolls back the insert and the apply
            return Err(ProcessError::InboxNotMarked(message.event_id));
        }
        tx.commit().await?;

        tracing::debug!(
            event_id = %message.event_id,
            aggregate_type = %aggregate,
            event_type = %message.event_type,
            "Event applied"
        );
        Ok(ProcessOutcome::Applied { state_changed })
    }

    /// Consume batches until `cancel` is triggered.
    ///
    /// Fetch failures back off exponentially and trigger a reconnect when
    /// the connection itself is at fault. Cancellation is observed between
    /// batches; a batch in progress always completes.
    pub async fn run(&self, batch_size: usize, max_wait: Duration, cancel: CancellationToken) {
        tracing::info!(batch_size, max_wait_secs = max_wait.as_secs(), "Inbox processor started");

        let backoff = BackoffConfig::default();
        let mut delay = backoff.initial_delay;

        loop {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.consumer.fetch(batch_size, max_wait) => result,
            };

            match fetched {
                Ok(deliveries) => {
                    delay = backoff.initial_delay;
                    if deliveries.is_empty() {
                        continue;
                    }
                    let BatchOutcome { report, .. } = self.process_batch(deliveries).await;
                    tracing::info!(
                        received = report.received,
                        applied = report.applied,
                        duplicates = report.duplicates,
                        poisoned = report.poisoned,
                        failed = report.failed,
                        "Batch processed"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, delay_ms = delay.as_millis() as u64, "Fetch failed");

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = next_delay(delay, &backoff);

                    if e.is_connection_error() {
                        if let Err(e) = self.consumer.reconnect().await {
                            tracing::warn!(error = %e, "Broker reconnect failed");
                        }
                    }
                }
            }
        }

        tracing::info!("Inbox processor stopping");
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|e| e.is_unique_violation())
}
