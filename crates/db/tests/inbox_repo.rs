//! Integration tests for the target-side inbox and projection repositories.

use chrono::Utc;
use replica_core::ReplicationMessage;
use replica_db::models::inbox::NewInboxEvent;
use replica_db::models::payment::PaymentEventData;
use replica_db::models::user::UserEventData;
use replica_db::repositories::{AppliedEventRepo, InboxRepo, PaymentRepo, UserRepo};
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn message(aggregate_type: &str) -> ReplicationMessage {
    ReplicationMessage {
        event_id: Uuid::new_v4(),
        aggregate_id: Uuid::new_v4(),
        aggregate_type: aggregate_type.to_string(),
        event_type: "created".to_string(),
        event_data: serde_json::json!({}),
        original_time: Utc::now(),
        published_at: Utc::now(),
    }
}

fn user_data(name: &str) -> UserEventData {
    UserEventData {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{name}@example.com"),
    }
}

// ---------------------------------------------------------------------------
// Inbox
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations/target")]
async fn predicate_ignores_uncommitted_and_unprocessed_rows(pool: PgPool) {
    let msg = message("user");
    let input = NewInboxEvent::from_message(&msg);

    let mut tx = pool.begin().await.unwrap();
    let row = InboxRepo::insert(&mut tx, &input).await.unwrap();
    assert!(!row.processed);
    assert!(!InboxRepo::is_event_processed(&mut *tx, msg.event_id).await.unwrap());

    assert!(InboxRepo::mark_processed(&mut tx, row.id).await.unwrap());
    assert!(InboxRepo::is_event_processed(&mut *tx, msg.event_id).await.unwrap());
    // Not yet visible outside the transaction.
    assert!(!InboxRepo::is_event_processed(&pool, msg.event_id).await.unwrap());

    tx.commit().await.unwrap();
    assert!(InboxRepo::is_event_processed(&pool, msg.event_id).await.unwrap());

    let stored = InboxRepo::find_by_event_id(&pool, msg.event_id).await.unwrap().unwrap();
    assert_eq!(stored.id, row.id);
    assert!(stored.processed_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations/target")]
async fn rolled_back_insert_leaves_no_trace(pool: PgPool) {
    let msg = message("payment");

    let mut tx = pool.begin().await.unwrap();
    InboxRepo::insert(&mut tx, &NewInboxEvent::from_message(&msg))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(InboxRepo::count(&pool).await.unwrap(), 0);
    assert!(!InboxRepo::is_event_processed(&pool, msg.event_id).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations/target")]
async fn second_row_for_same_event_id_is_a_unique_violation(pool: PgPool) {
    let msg = message("user");

    let mut conn = pool.acquire().await.unwrap();
    InboxRepo::insert(&mut conn, &NewInboxEvent::from_message(&msg))
        .await
        .unwrap();
    let err = InboxRepo::insert(&mut conn, &NewInboxEvent::from_message(&msg))
        .await
        .unwrap_err();

    let db_err = err.as_database_error().expect("should be a database error");
    assert!(db_err.is_unique_violation());
}

// ---------------------------------------------------------------------------
// Applied-event ledger and aggregates
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations/target")]
async fn applied_event_claim_is_one_shot(pool: PgPool) {
    let event_id = Uuid::new_v4();
    let mut conn = pool.acquire().await.unwrap();

    assert!(AppliedEventRepo::claim(&mut conn, event_id, "user").await.unwrap());
    assert!(!AppliedEventRepo::claim(&mut conn, event_id, "user").await.unwrap());
    assert!(AppliedEventRepo::exists(&pool, event_id).await.unwrap());
}

#[sqlx::test(migrations = "../../db/migrations/target")]
async fn user_upsert_overwrites_and_tracks_last_event(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let mut data = user_data("maria");
    let first_event = Uuid::new_v4();
    let second_event = Uuid::new_v4();

    UserRepo::upsert(&mut conn, &data, first_event).await.unwrap();
    data.email = "maria@demo.net".to_string();
    let updated = UserRepo::upsert(&mut conn, &data, second_event).await.unwrap();

    assert_eq!(updated.email, "maria@demo.net");
    assert_eq!(updated.last_event_id, second_event);
    assert_eq!(UserRepo::count(&pool).await.unwrap(), 1);

    assert!(UserRepo::delete(&mut conn, data.id).await.unwrap());
    assert!(UserRepo::find_by_id(&pool, data.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations/target")]
async fn payment_may_precede_its_user(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let user_id = Uuid::new_v4();
    let data = PaymentEventData {
        id: Uuid::new_v4(),
        user_id,
        amount: 250.0,
        currency: "EUR".to_string(),
        description: "Taxi".to_string(),
        status: "pending".to_string(),
    };

    assert!(!UserRepo::exists(&mut *conn, user_id).await.unwrap());
    let payment = PaymentRepo::upsert(&mut conn, &data, Uuid::new_v4()).await.unwrap();
    assert_eq!(payment.user_id, user_id);

    let listed = PaymentRepo::list_for_user(&pool, user_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].amount, 250.0);
}
