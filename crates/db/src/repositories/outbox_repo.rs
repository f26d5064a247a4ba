//! Repository for the source-side `outbox` table.

use replica_core::types::EventId;
use sqlx::{PgExecutor, PgPool};

use crate::models::outbox::{NewOutboxEvent, OutboxEvent};

/// Column list for `outbox` queries.
const COLUMNS: &str = "id, aggregate_id, aggregate_type, event_type, event_data, \
    created_at, processed, processed_at";

/// Provides append, poll and mark operations for the outbox.
pub struct OutboxRepo;

impl OutboxRepo {
    /// Append a domain event to the outbox.
    ///
    /// Pass the open transaction of the business mutation so the event is
    /// committed atomically with it.
    pub async fn insert(
        executor: impl PgExecutor<'_>,
        input: &NewOutboxEvent,
    ) -> Result<OutboxEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO outbox (id, aggregate_id, aggregate_type, event_type, event_data) \
             VALUES (COALESCE($1, gen_random_uuid()), $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OutboxEvent>(&query)
            .bind(input.id)
            .bind(input.aggregate_id)
            .bind(&input.aggregate_type)
            .bind(&input.event_type)
            .bind(&input.event_data)
            .fetch_one(executor)
            .await
    }

    /// List up to `limit` unpublished events, oldest first.
    pub async fn list_pending(pool: &PgPool, limit: i64) -> Result<Vec<OutboxEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM outbox \
             WHERE processed = false \
             ORDER BY created_at ASC, id ASC \
             LIMIT $1"
        );
        sqlx::query_as::<_, OutboxEvent>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Mark a single event as published.
    ///
    /// The update is conditional on `processed = false`, so concurrent
    /// publishers can race on the same row and exactly one of them wins.
    /// Returns `true` if this call performed the transition.
    pub async fn mark_processed(pool: &PgPool, id: EventId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE outbox SET processed = true, processed_at = NOW() \
             WHERE id = $1 AND processed = false",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Find an outbox event by id.
    pub async fn find_by_id(pool: &PgPool, id: EventId) -> Result<Option<OutboxEvent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM outbox WHERE id = $1");
        sqlx::query_as::<_, OutboxEvent>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Number of events still waiting to be published.
    pub async fn pending_count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM outbox WHERE processed = false")
            .fetch_one(pool)
            .await
    }
}
