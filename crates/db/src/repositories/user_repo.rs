//! Repository for the replicated `users` table.

use replica_core::types::EventId;
use sqlx::{PgConnection, PgExecutor, PgPool};

use crate::models::user::{User, UserEventData};

/// Column list for `users` queries.
const COLUMNS: &str = "id, name, email, created_at, updated_at, last_event_id";

/// Provides writes used by the user apply function and reads for callers.
pub struct UserRepo;

impl UserRepo {
    /// Insert or overwrite a user from an event payload.
    pub async fn upsert(
        conn: &mut PgConnection,
        data: &UserEventData,
        event_id: EventId,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (id, name, email, last_event_id) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET \
                name = EXCLUDED.name, \
                email = EXCLUDED.email, \
                last_event_id = EXCLUDED.last_event_id, \
                updated_at = NOW() \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(data.id)
            .bind(&data.name)
            .bind(&data.email)
            .bind(event_id)
            .fetch_one(conn)
            .await
    }

    /// Delete a user. Returns `true` if a row was removed.
    pub async fn delete(conn: &mut PgConnection, id: EventId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Whether a user row exists.
    pub async fn exists(executor: impl PgExecutor<'_>, id: EventId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(id)
            .fetch_one(executor)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: EventId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
    }
}
