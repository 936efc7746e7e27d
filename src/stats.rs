use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::model::Placement;

/// Counters for a session's fetch and merge decisions.
#[derive(Debug, Default)]
pub struct SyncStats {
    backward_batches: AtomicU64,
    forward_batches: AtomicU64,
    records_delivered: AtomicU64,
    stale: AtomicU64,
    empty: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

/// Point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Accepted history pages, seed load included.
    pub backward_batches: u64,
    /// Accepted forward polls.
    pub forward_batches: u64,
    pub records_delivered: u64,
    /// Responses discarded because they did not extend the window.
    pub stale: u64,
    pub empty: u64,
    /// Fetches that returned an error.
    pub failed: u64,
    /// Requests never issued: guard hit, nothing to poll, or poll in flight.
    pub skipped: u64,
}

impl SyncStats {
    pub(crate) fn record_accepted(&self, placement: Placement, records: usize) {
        match placement {
            Placement::Prepend => self.backward_batches.fetch_add(1, Ordering::Relaxed),
            Placement::Append => self.forward_batches.fetch_add(1, Ordering::Relaxed),
        };
        self.records_delivered
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_empty(&self) {
        self.empty.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skip(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            backward_batches: self.backward_batches.load(Ordering::Relaxed),
            forward_batches: self.forward_batches.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_batches_split_by_placement() {
        let stats = SyncStats::default();
        stats.record_accepted(Placement::Prepend, 1000);
        stats.record_accepted(Placement::Append, 51);
        stats.record_stale();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.backward_batches, 1);
        assert_eq!(snapshot.forward_batches, 1);
        assert_eq!(snapshot.records_delivered, 1051);
        assert_eq!(snapshot.stale, 1);
        assert_eq!(snapshot.failed, 0);
    }
}
