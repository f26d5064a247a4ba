//! Pipeline counters.
//!
//! [`ReplicationStats`] is created by each binary and handed to the
//! publisher or processor behind an `Arc`. Nothing in the pipeline reaches
//! for a process-wide global, so tests can assert on a private instance.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Monotonic counters for one publisher or processor instance.
#[derive(Debug, Default)]
pub struct ReplicationStats {
    published: AtomicU64,
    publish_failures: AtomicU64,
    marked: AtomicU64,
    applied: AtomicU64,
    duplicates: AtomicU64,
    poisoned: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`ReplicationStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub published: u64,
    pub publish_failures: u64,
    pub marked: u64,
    pub applied: u64,
    pub duplicates: u64,
    pub poisoned: u64,
    pub failed: u64,
}

impl ReplicationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_published(&self, n: u64) {
        self.published.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_publish_failures(&self, n: u64) {
        self.publish_failures.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_marked(&self, n: u64) {
        self.marked.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poisoned(&self) {
        self.poisoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            marked: self.marked.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            poisoned: self.poisoned.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
