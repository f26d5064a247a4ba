//! Repository for the target-side `inbox` table.

use replica_core::types::EventId;
use sqlx::{PgConnection, PgExecutor, PgPool};

use crate::models::inbox::{InboxEvent, NewInboxEvent};

/// Column list for `inbox` queries.
const COLUMNS: &str = "id, event_id, aggregate_id, aggregate_type, event_type, event_data, \
    created_at, processed, processed_at";

/// Provides the idempotency predicate and per-event ledger writes.
pub struct InboxRepo;

impl InboxRepo {
    /// Whether an event with this source id has already been processed.
    ///
    /// Reads committed state only (plus the caller's own transaction when
    /// called on one), so it stays correct across consumer restarts and
    /// long after the broker's dedup window has expired.
    pub async fn is_event_processed(
        executor: impl PgExecutor<'_>,
        event_id: EventId,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM inbox WHERE event_id = $1 AND processed = true)",
        )
        .bind(event_id)
        .fetch_one(executor)
        .await
    }

    /// Record a received event inside the caller's transaction.
    ///
    /// A second insert for the same `event_id` fails with a unique
    /// violation once the first one has committed.
    pub async fn insert(
        conn: &mut PgConnection,
        input: &NewInboxEvent,
    ) -> Result<InboxEvent, sqlx::Error> {
        let query = format!(
            "INSERT INTO inbox \
                (id, event_id, aggregate_id, aggregate_type, event_type, event_data) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, InboxEvent>(&query)
            .bind(input.id)
            .bind(input.event_id)
            .bind(input.aggregate_id)
            .bind(&input.aggregate_type)
            .bind(&input.event_type)
            .bind(&input.event_data)
            .fetch_one(conn)
            .await
    }

    /// Mark an inbox row processed inside the caller's transaction.
    ///
    /// Returns `true` if the row transitioned.
    pub async fn mark_processed(conn: &mut PgConnection, id: EventId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE inbox SET processed = true, processed_at = NOW() \
             WHERE id = $1 AND processed = false",
        )
        .bind(id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Find the inbox row recorded for a source event id.
    pub async fn find_by_event_id(
        pool: &PgPool,
        event_id: EventId,
    ) -> Result<Option<InboxEvent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM inbox WHERE event_id = $1");
        sqlx::query_as::<_, InboxEvent>(&query)
            .bind(event_id)
            .fetch_optional(pool)
            .await
    }

    /// Total number of inbox rows.
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM inbox")
            .fetch_one(pool)
            .await
    }
}
