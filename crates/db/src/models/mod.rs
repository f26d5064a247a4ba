//! Row models and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A create DTO for inserts
//! - For replicated aggregates, the `Deserialize` event payload shape

pub mod inbox;
pub mod outbox;
pub mod payment;
pub mod user;
