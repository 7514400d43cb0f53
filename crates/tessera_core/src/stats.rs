//! Database statistics.
//!
//! Counters are atomic and can be read while operations are in progress.
//!
//! ```rust,ignore
//! let stats = db.stats().snapshot();
//! println!("created: {}", stats.objects_created);
//! println!("evaluations: {}", stats.query_evaluations);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Database statistics and metrics.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    objects_created: AtomicU64,
    objects_updated: AtomicU64,
    objects_deleted: AtomicU64,
    queries_compiled: AtomicU64,
    query_evaluations: AtomicU64,
    transactions_started: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,
    notifications_delivered: AtomicU64,
    errors: AtomicU64,
}

impl DatabaseStats {
    /// Creates a new stats instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_create(&self) {
        self.objects_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self) {
        self.objects_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.objects_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_query_compile(&self) {
        self.queries_compiled.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a full re-evaluation of a live collection.
    pub(crate) fn record_evaluation(&self) {
        self.query_evaluations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_commit(&self) {
        self.transactions_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_abort(&self) {
        self.transactions_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification(&self) {
        self.notifications_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the number of objects created.
    pub fn objects_created(&self) -> u64 {
        self.objects_created.load(Ordering::Relaxed)
    }

    /// Returns the number of property updates applied.
    pub fn objects_updated(&self) -> u64 {
        self.objects_updated.load(Ordering::Relaxed)
    }

    /// Returns the number of objects deleted.
    pub fn objects_deleted(&self) -> u64 {
        self.objects_deleted.load(Ordering::Relaxed)
    }

    /// Returns the number of predicates and sorts compiled.
    pub fn queries_compiled(&self) -> u64 {
        self.queries_compiled.load(Ordering::Relaxed)
    }

    /// Returns the number of live collection evaluations.
    ///
    /// Reads against an unchanged snapshot are served from cache and do
    /// not count.
    pub fn query_evaluations(&self) -> u64 {
        self.query_evaluations.load(Ordering::Relaxed)
    }

    /// Returns the number of write transactions started.
    pub fn transactions_started(&self) -> u64 {
        self.transactions_started.load(Ordering::Relaxed)
    }

    /// Returns the number of write transactions committed.
    pub fn transactions_committed(&self) -> u64 {
        self.transactions_committed.load(Ordering::Relaxed)
    }

    /// Returns the number of write transactions rolled back.
    pub fn transactions_aborted(&self) -> u64 {
        self.transactions_aborted.load(Ordering::Relaxed)
    }

    /// Returns the number of observer callbacks invoked.
    pub fn notifications_delivered(&self) -> u64 {
        self.notifications_delivered.load(Ordering::Relaxed)
    }

    /// Returns the number of failed write operations.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns a snapshot of all stats.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            objects_created: self.objects_created(),
            objects_updated: self.objects_updated(),
            objects_deleted: self.objects_deleted(),
            queries_compiled: self.queries_compiled(),
            query_evaluations: self.query_evaluations(),
            transactions_started: self.transactions_started(),
            transactions_committed: self.transactions_committed(),
            transactions_aborted: self.transactions_aborted(),
            notifications_delivered: self.notifications_delivered(),
            errors: self.errors(),
        }
    }
}

/// A point-in-time copy of database statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    /// Objects created.
    pub objects_created: u64,
    /// Property updates applied.
    pub objects_updated: u64,
    /// Objects deleted.
    pub objects_deleted: u64,
    /// Predicates and sorts compiled.
    pub queries_compiled: u64,
    /// Live collection evaluations.
    pub query_evaluations: u64,
    /// Write transactions started.
    pub transactions_started: u64,
    /// Write transactions committed.
    pub transactions_committed: u64,
    /// Write transactions rolled back.
    pub transactions_aborted: u64,
    /// Observer callbacks invoked.
    pub notifications_delivered: u64,
    /// Failed write operations.
    pub errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_zero() {
        let stats = DatabaseStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn record_transactions() {
        let stats = DatabaseStats::new();
        stats.record_transaction_start();
        stats.record_transaction_start();
        stats.record_transaction_commit();
        stats.record_transaction_abort();

        assert_eq!(stats.transactions_started(), 2);
        assert_eq!(stats.transactions_committed(), 1);
        assert_eq!(stats.transactions_aborted(), 1);
    }

    #[test]
    fn snapshot_copies_counters() {
        let stats = DatabaseStats::new();
        stats.record_create();
        stats.record_update();
        stats.record_delete();
        stats.record_query_compile();
        stats.record_evaluation();
        stats.record_notification();
        stats.record_error();

        let snap = stats.snapshot();
        assert_eq!(snap.objects_created, 1);
        assert_eq!(snap.objects_updated, 1);
        assert_eq!(snap.objects_deleted, 1);
        assert_eq!(snap.queries_compiled, 1);
        assert_eq!(snap.query_evaluations, 1);
        assert_eq!(snap.notifications_delivered, 1);
        assert_eq!(snap.errors, 1);
    }

    #[test]
    fn concurrent_updates() {
        use std::sync::Arc;
        use std::thread;

        let stats = Arc::new(DatabaseStats::new());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let s = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        s.record_create();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.objects_created(), 1000);
    }
}
