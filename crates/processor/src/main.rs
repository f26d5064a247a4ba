//! `inbox-processor`: applies replicated events to the target database.
//!
//! # Environment variables
//!
//! | Variable              | Default                  | Description                  |
//! |-----------------------|--------------------------|------------------------------|
//! | `DATABASE_URL`        | composed from `DB_*`     | Target database              |
//! | `DB_HOST` / `DB_PORT` | `localhost` / `5433`     |                              |
//! | `DB_USER` / `DB_PASSWORD` / `DB_NAME` | `postgres` / `password` / `transactions` | |
//! | `DB_MAX_CONNECTIONS`  | `5`                      | Pool size                    |
//! | `REDIS_URL`           | `redis://127.0.0.1:6379` | Broker                       |
//! | `STREAM_NAME` / `SUBJECT` | `REPLICATION` / `replication.events` | Stream key  |
//! | `CONSUMER_GROUP`      | `inbox-processor`        | Shared by all instances      |
//! | `CONSUMER_NAME`       | `inbox-processor-<uuid>` | Unique per instance          |
//! | `MAX_DELIVER`         | `3`                      | Delivery ceiling             |
//! | `ACK_WAIT_SECS`       | `30`                     | Redelivery after no ack      |
//! | `BATCH_SIZE`          | `10`                     | Deliveries per fetch         |
//! | `FETCH_MAX_WAIT_SECS` | `5`                      | Fetch wait                   |
//! | `LOG_FORMAT`          | `text`                   | `json` for JSON lines        |

use std::sync::Arc;

use replica_broker::RedisStreamConsumer;
use replica_core::shutdown::cancel_on_signal;
use replica_core::stats::ReplicationStats;
use replica_core::telemetry::init_tracing;
use replica_processor::{InboxProcessor, ProcessorConfig, ProjectionApplier};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing("replica_processor=info,inbox_processor=info,replica_broker=info");

    let config = ProcessorConfig::from_env();
    tracing::info!(
        database = %config.database.redacted(),
        stream = %config.stream.stream_key(),
        group = %config.consumer.group,
        consumer = %config.consumer.name,
        "Starting inbox processor"
    );

    let pool = replica_db::create_pool(
        &config.database.connection_url(),
        config.database.max_connections,
    )
    .await
    .unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to connect to target database");
        std::process::exit(1);
    });

    if let Err(e) = replica_db::health_check(&pool).await {
        tracing::error!(error = %e, "Target database health check failed");
        std::process::exit(1);
    }
    tracing::info!("Target database health check passed");

    let consumer = RedisStreamConsumer::connect(config.stream.clone(), config.consumer.clone())
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to connect to broker");
            std::process::exit(1);
        });

    let stats = Arc::new(ReplicationStats::new());
    let processor = InboxProcessor::new(
        pool.clone(),
        consumer,
        Arc::new(ProjectionApplier),
        Arc::clone(&stats),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    processor
        .run(config.batch_size, config.fetch_max_wait, cancel)
        .await;

    pool.close().await;
    tracing::info!(stats = ?stats.snapshot(), "Inbox processor stopped");
}
