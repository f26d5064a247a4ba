//! Application of replicated events to the target projection.
//!
//! [`EventApplier`] is the seam between the inbox processor and the target
//! domain. The processor calls it inside the event's transaction, after the
//! inbox row is written and before it is marked processed, so any error
//! rolls back the whole event.

use async_trait::async_trait;
use replica_core::aggregate::{AGGREGATE_PAYMENT, AGGREGATE_USER};
use replica_core::types::EventId;
use replica_db::models::payment::PaymentEventData;
use replica_db::models::user::UserEventData;
use replica_db::repositories::{AppliedEventRepo, PaymentRepo, UserRepo};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgConnection;

use crate::error::ApplyError;

/// Applies one event of a known aggregate type.
///
/// Implementations must be idempotent per `event_id`. `Ok(false)` means the
/// event had already been applied and nothing changed.
#[async_trait]
pub trait EventApplier: Send + Sync {
    async fn apply_user_event(
        &self,
        conn: &mut PgConnection,
        event_id: EventId,
        event_type: &str,
        event_data: &Value,
    ) -> Result<bool, ApplyError>;

    async fn apply_payment_event(
        &self,
        conn: &mut PgConnection,
        event_id: EventId,
        event_type: &str,
        event_data: &Value,
    ) -> Result<bool, ApplyError>;
}

/// Payload of a `deleted` event; only the aggregate id is required.
#[derive(Debug, Deserialize)]
struct AggregateRef {
    id: EventId,
}

fn parse<T: DeserializeOwned>(aggregate: &'static str, data: &Value) -> Result<T, ApplyError> {
    T::deserialize(data).map_err(|source| ApplyError::InvalidPayload { aggregate, source })
}

/// Maintains the `users` and `payments` projection tables.
///
/// Idempotency comes from the `applied_events` ledger: an event is claimed
/// before the aggregate is touched, and a second claim is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionApplier;

#[async_trait]
impl EventApplier for ProjectionApplier {
    async fn apply_user_event(
        &self,
        conn: &mut PgConnection,
        event_id: EventId,
        event_type: &str,
        event_data: &Value,
    ) -> Result<bool, ApplyError> {
        if !AppliedEventRepo::claim(&mut *conn, event_id, AGGREGATE_USER).await? {
            return Ok(false);
        }

        match event_type {
            "created" | "updated" => {
                let data: UserEventData = parse(AGGREGATE_USER, event_data)?;
                let user = UserRepo::upsert(&mut *conn, &data, event_id).await?;
                tracing::debug!(user_id = %user.id, %event_id, event_type, "User upserted");
            }
            "deleted" => {
                let data: AggregateRef = parse(AGGREGATE_USER, event_data)?;
                let removed = UserRepo::delete(&mut *conn, data.id).await?;
                tracing::debug!(user_id = %data.id, %event_id, removed, "User deleted");
            }
            other => {
                return Err(ApplyError::UnsupportedEventType {
                    aggregate: AGGREGATE_USER,
                    event_type: other.to_string(),
                })
            }
        }
        Ok(true)
    }

    async fn apply_payment_event(
        &self,
        conn: &mut PgConnection,
        event_id: EventId,
        event_type: &str,
        event_data: &Value,
    ) -> Result<bool, ApplyError> {
        if !AppliedEventRepo::claim(&mut *conn, event_id, AGGREGATE_PAYMENT).await? {
            return Ok(false);
        }

        match event_type {
            "created" | "updated" => {
                let data: PaymentEventData = parse(AGGREGATE_PAYMENT, event_data)?;
                if !UserRepo::exists(&mut *conn, data.user_id).await? {
                    tracing::warn!(
                        payment_id = %data.id,
                        user_id = %data.user_id,
                        %event_id,
                        "Payment references a user not yet replicated"
                    );
                }
                let payment = PaymentRepo::upsert(&mut *conn, &data, event_id).await?;
                tracing::debug!(payment_id = %payment.id, %event_id, event_type, "Payment upserted");
            }
            "deleted" => {
                let data: AggregateRef = parse(AGGREGATE_PAYMENT, event_data)?;
                let removed = PaymentRepo::delete(&mut *conn, data.id).await?;
                tracing::debug!(payment_id = %data.id, %event_id, removed, "Payment deleted");
            }
            other => {
                return Err(ApplyError::UnsupportedEventType {
                    aggregate: AGGREGATE_PAYMENT,
                    event_type: other.to_string(),
                })
            }
        }
        Ok(true)
    }
}
