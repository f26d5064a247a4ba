//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool`, a `&mut PgConnection` borrowed from an open
//! transaction, or any `PgExecutor` when both are meaningful.

pub mod applied_event_repo;
pub mod inbox_repo;
pub mod outbox_repo;
pub mod payment_repo;
pub mod user_repo;

pub use applied_event_repo::AppliedEventRepo;
pub use inbox_repo::InboxRepo;
pub use outbox_repo::OutboxRepo;
pub use payment_repo::PaymentRepo;
pub use user_repo::UserRepo;
