//! Persistence layer for both sides of the pipeline.
//!
//! The source database owns the `outbox` table; the target database owns
//! `inbox`, `applied_events`, `users` and `payments`. Both are PostgreSQL and
//! share the same pool type.

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod repositories;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
///
/// Fails fast if the database is unreachable; callers treat that as a fatal
/// startup error.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to verify the pool can reach the database.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
