//! Repository for the replicated `payments` table.

use replica_core::types::EventId;
use sqlx::{PgConnection, PgPool};

use crate::models::payment::{Payment, PaymentEventData};

/// Column list for `payments` queries.
const COLUMNS: &str = "id, user_id, amount, currency, description, status, \
    created_at, updated_at, last_event_id";

/// Provides writes used by the payment apply function and reads for callers.
pub struct PaymentRepo;

impl PaymentRepo {
    /// Insert or overwrite a payment from an event payload.
    pub async fn upsert(
        conn: &mut PgConnection,
        data: &PaymentEventData,
        event_id: EventId,
    ) -> Result<Payment, sqlx::Error> {
        let query = format!(
            "INSERT INTO payments \
                (id, user_id, amount, currency, description, status, last_event_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
                user_id = EXCLUDED.user_id, \
                amount = EXCLUDED.amount, \
                currency = EXCLUDED.currency, \
                description = EXCLUDED.description, \
                status = EXCLUDED.status, \
                last_event_id = EXCLUDED.last_event_id, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Payment>(&query)
            .bind(data.id)
            .bind(data.user_id)
            .bind(data.amount)
            .bind(&data.currency)
            .bind(&data.description)
            .bind(&data.status)
            .bind(event_id)
            .fetch_one(conn)
            .await
    }

    /// Delete a payment. Returns `true` if a row was removed.
    pub async fn delete(conn: &mut PgConnection, id: EventId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM payments WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn find_by_id(pool: &PgPool, id: EventId) -> Result<Option<Payment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM payments WHERE id = $1");
        sqlx::query_as::<_, Payment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's payments, oldest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: EventId,
    ) -> Result<Vec<Payment>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM payments WHERE user_id = $1 ORDER BY created_at, id");
        sqlx::query_as::<_, Payment>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM payments")
            .fetch_one(pool)
            .await
    }
}
