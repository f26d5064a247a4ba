//! `outbox-publisher`: moves committed outbox rows onto the broker.
//!
//! # Environment variables
//!
//! | Variable              | Default                  | Description                  |
//! |-----------------------|--------------------------|------------------------------|
//! | `DATABASE_URL`        | composed from `DB_*`     | Source database              |
//! | `DB_HOST` / `DB_PORT` | `localhost` / `5432`     |                              |
//! | `DB_USER` / `DB_PASSWORD` / `DB_NAME` | `postgres` / `password` / `transactions` | |
//! | `DB_MAX_CONNECTIONS`  | `5`                      | Pool size                    |
//! | `REDIS_URL`           | `redis://127.0.0.1:6379` | Broker                       |
//! | `STREAM_NAME` / `SUBJECT` | `REPLICATION` / `replication.events` | Stream key  |
//! | `STREAM_MAX_AGE_SECS` | `86400`                  | Retention by age             |
//! | `STREAM_MAX_MESSAGES` | `100000`                 | Retention by count           |
//! | `DEDUP_WINDOW_SECS`   | `300`                    | Broker dedup window          |
//! | `POLL_INTERVAL`       | `1`                      | Seconds between cycles       |
//! | `BATCH_SIZE`          | `10`                     | Rows per cycle               |
//! | `LOG_FORMAT`          | `text`                   | `json` for JSON lines        |

use std::sync::Arc;

use replica_broker::RedisStreamPublisher;
use replica_core::shutdown::cancel_on_signal;
use replica_core::stats::ReplicationStats;
use replica_core::telemetry::init_tracing;
use replica_publisher::{OutboxPublisher, PublisherConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing("replica_publisher=info,outbox_publisher=info,replica_broker=info");

    let config = PublisherConfig::from_env();
    tracing::info!(
        database = %config.database.redacted(),
        stream = %config.stream.stream_key(),
        "Starting outbox publisher"
    );

    let pool = replica_db::create_pool(
        &config.database.connection_url(),
        config.database.max_connections,
    )
    .await
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to connect to source database");
        std::process::exit(1);
    });

    if let Err(e) = replica_db::health_check(&pool).await {
        tracing::error!(error = %e, "Source database health check failed");
        std::process::exit(1);
    }
    tracing::info!("Source database health check passed");

    let broker = RedisStreamPublisher::connect(config.stream.clone())
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to connect to broker");
            std::process::exit(1);
        });

    let stats = Arc::new(ReplicationStats::new());
    let publisher = OutboxPublisher::new(pool.clone(), broker, Arc::clone(&stats));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    publisher
        .run(config.poll_interval, config.batch_size, cancel)
        .await;

    pool.close().await;
    tracing::info!(stats = ?stats.snapshot(), "Outbox publisher stopped");
}
