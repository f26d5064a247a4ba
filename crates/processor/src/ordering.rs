//! Apply order within a fetched batch.
//!
//! Payments reference users, so a batch applies every `user` event before
//! any `payment` event. Events of unknown aggregate types go last. The sort
//! is stable: receipt order is kept within each aggregate type.

use replica_core::aggregate::apply_rank_of;
use replica_core::ReplicationMessage;

/// Reorder `items` for application, keyed by each item's message.
pub fn order_for_apply<T, F>(mut items: Vec<T>, message: F) -> Vec<T>
where
    F: Fn(&T) -> &ReplicationMessage,
{
    items.sort_by_key(|item| apply_rank_of(&message(item).aggregate_type));
    items
}
