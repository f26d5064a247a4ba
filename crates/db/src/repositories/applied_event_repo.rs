//! Repository for the `applied_events` idempotency ledger.

use replica_core::types::EventId;
use sqlx::{PgConnection, PgPool};

/// Ledger consulted by the apply functions before mutating an aggregate.
pub struct AppliedEventRepo;

impl AppliedEventRepo {
    /// Claim `event_id` for application.
    ///
    /// Returns `false` if the event was already claimed, in which case the
    /// caller must not mutate the aggregate again.
    pub async fn claim(
        conn: &mut PgConnection,
        event_id: EventId,
        aggregate_type: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO applied_events (event_id, aggregate_type) VALUES ($1, $2) \
             ON CONFLICT (event_id) DO NOTHING",
        )
        .bind(event_id)
        .bind(aggregate_type)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn exists(pool: &PgPool, event_id: EventId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM applied_events WHERE event_id = $1)")
            .bind(event_id)
            .fetch_one(pool)
            .await
    }
}
