//! Database statistics.
//!
//! Counters are updated by the worker and can be read from any thread
//! without queueing behind pending operations.
//!
//! ```rust,ignore
//! let stats = db.stats();
//! println!("documents: {}", stats.documents);
//! println!("log lines since open: {}", stats.lines_appended);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one open database.
#[derive(Debug, Default)]
pub struct DatabaseStats {
    /// Documents currently in the collection.
    documents: AtomicU64,
    /// Records appended to the log since open.
    lines_appended: AtomicU64,
    /// Compactions run since open, including those run by open itself.
    compactions: AtomicU64,
    /// Documents inserted since open.
    inserts: AtomicU64,
    /// Documents removed since open.
    removals: AtomicU64,
    /// Documents rewritten by updates since open.
    updates: AtomicU64,
}

impl DatabaseStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_documents(&self, count: usize) {
        self.documents.store(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_append(&self) {
        self.lines_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compaction(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_inserts(&self, count: usize) {
        self.inserts.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_removals(&self, count: usize) {
        self.removals.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_updates(&self, count: usize) {
        self.updates.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            documents: self.documents.load(Ordering::Relaxed),
            lines_appended: self.lines_appended.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            removals: self.removals.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`DatabaseStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Documents currently in the collection.
    pub documents: u64,
    /// Records appended to the log since open.
    pub lines_appended: u64,
    /// Compactions run since open.
    pub compactions: u64,
    /// Documents inserted since open.
    pub inserts: u64,
    /// Documents removed since open.
    pub removals: u64,
    /// Documents rewritten by updates since open.
    pub updates: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = DatabaseStats::new();
        stats.record_append();
        stats.record_append();
        stats.record_compaction();
        stats.record_inserts(3);
        stats.record_removals(1);
        stats.record_updates(2);
        stats.set_documents(2);

        let snap = stats.snapshot();
        assert_eq!(snap.lines_appended, 2);
        assert_eq!(snap.compactions, 1);
        assert_eq!(snap.inserts, 3);
        assert_eq!(snap.removals, 1);
        assert_eq!(snap.updates, 2);
        assert_eq!(snap.documents, 2);
    }

    #[test]
    fn gauge_overwrites() {
        let stats = DatabaseStats::new();
        stats.set_documents(10);
        stats.set_documents(4);
        assert_eq!(stats.snapshot().documents, 4);
    }
}
