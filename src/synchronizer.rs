//! The log window synchronizer.
//!
//! Both fetch flows feed one [`Window`]. Each flow only ever extends the
//! window in its own direction, and a response that does not extend it is
//! stale:
//!
//! - a history page is stale when its first id is not below `window.min`;
//! - a poll page is stale when its last id is not above `window.max`.
//!
//! Because each test only looks at its own edge, the two merges commute: any
//! interleaving of the same responses ends in the same window and delivers
//! the same set of records.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::model::{LogRecord, Placement, Window};
use crate::stats::SyncStats;
use crate::viewer::LogViewer;

/// What a merge decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The batch extended the window and went to the viewer.
    Accepted {
        records: usize,
        placement: Placement,
        window: Window,
    },
    /// Nothing to merge.
    Empty,
    /// Every id was already covered in this batch's direction.
    Stale,
}

impl MergeOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MergeOutcome::Accepted { .. })
    }
}

/// Owns the window and the viewer it feeds.
pub struct Synchronizer<V> {
    window: Mutex<Window>,
    viewer: V,
    stats: SyncStats,
}

impl<V: LogViewer> Synchronizer<V> {
    pub fn new(viewer: V) -> Self {
        Synchronizer {
            window: Mutex::new(Window::default()),
            viewer,
            stats: SyncStats::default(),
        }
    }

    pub fn window(&self) -> Window {
        *self.lock()
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Merges a history page (or the seed load), delivered as a prepend.
    pub fn merge_backward(&self, records: Vec<LogRecord>) -> MergeOutcome {
        self.merge(records, Placement::Prepend)
    }

    /// Merges a poll page, delivered as an append.
    pub fn merge_forward(&self, records: Vec<LogRecord>) -> MergeOutcome {
        self.merge(records, Placement::Append)
    }

    fn merge(&self, mut records: Vec<LogRecord>, placement: Placement) -> MergeOutcome {
        if records.is_empty() {
            self.stats.record_empty();
            debug!(?placement, "empty response");
            return MergeOutcome::Empty;
        }
        if !records.is_sorted_by_key(|r| r.id) {
            warn!(?placement, count = records.len(), "source returned unsorted records");
            records.sort_by_key(|r| r.id);
        }
        let new_min = records[0].id;
        let new_max = records[records.len() - 1].id;

        // read, decide, write and deliver under one lock
        let mut window = self.lock();
        let stale = match placement {
            Placement::Prepend => new_min >= window.min,
            Placement::Append => new_max <= window.max,
        };
        if stale {
            self.stats.record_stale();
            debug!(?placement, new_min, new_max, window = %*window, "discarding stale response");
            return MergeOutcome::Stale;
        }

        window.extend(new_min, new_max);
        let merged = *window;
        let count = records.len();
        self.viewer.add_logs(records, placement);
        drop(window);

        self.stats.record_accepted(placement, count);
        debug!(?placement, count, window = %merged, "merged response");
        MergeOutcome::Accepted {
            records: count,
            placement,
            window: merged,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogId, Severity};
    use crate::viewer::BufferedViewer;
    use std::sync::Arc;

    fn batch(ids: std::ops::RangeInclusive<LogId>) -> Vec<LogRecord> {
        ids.map(|id| LogRecord::new(id, Severity::Info, format!("line {}", id)))
            .collect()
    }

    fn synchronizer() -> Synchronizer<BufferedViewer> {
        Synchronizer::new(BufferedViewer::new())
    }

    #[test]
    fn seed_then_poll() {
        let sync = synchronizer();

        let outcome = sync.merge_backward(batch(0..=999));
        assert_eq!(
            outcome,
            MergeOutcome::Accepted {
                records: 1000,
                placement: Placement::Prepend,
                window: Window { min: 0, max: 999 },
            }
        );

        let outcome = sync.merge_forward(batch(1000..=1050));
        assert!(outcome.is_accepted());
        assert_eq!(sync.window(), Window { min: 0, max: 1050 });

        let deliveries = sync.viewer().deliveries();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[1].placement, Placement::Append);
        assert_eq!(deliveries[1].ids.len(), 51);
    }

    #[test]
    fn delayed_poll_is_discarded() {
        let sync = synchronizer();
        sync.merge_backward(batch(0..=999));
        sync.merge_forward(batch(1000..=1050));

        assert_eq!(sync.merge_forward(batch(1000..=1020)), MergeOutcome::Stale);
        assert_eq!(sync.window(), Window { min: 0, max: 1050 });
        assert_eq!(sync.viewer().deliveries().len(), 2);
    }

    #[test]
    fn slow_history_page_is_discarded() {
        let sync = synchronizer();
        sync.merge_backward(batch(2000..=2999));
        sync.merge_backward(batch(1000..=1999));

        // an older request for 1500.. resolves after the floor already dropped to 1000
        assert_eq!(sync.merge_backward(batch(1500..=1999)), MergeOutcome::Stale);
        assert_eq!(sync.window(), Window { min: 1000, max: 2999 });
    }

    #[test]
    fn empty_responses_change_nothing() {
        let sync = synchronizer();
        assert_eq!(sync.merge_backward(Vec::new()), MergeOutcome::Empty);
        assert_eq!(sync.merge_forward(Vec::new()), MergeOutcome::Empty);
        assert_eq!(sync.window(), Window::default());
        assert!(sync.viewer().deliveries().is_empty());
        assert_eq!(sync.stats().snapshot().empty, 2);
    }

    #[test]
    fn forward_merge_seeds_an_empty_window() {
        let sync = synchronizer();
        assert!(sync.merge_forward(batch(5..=9)).is_accepted());
        assert_eq!(sync.window(), Window { min: 5, max: 9 });
    }

    #[test]
    fn poll_overlapping_history_still_extends_max() {
        let sync = synchronizer();
        sync.merge_backward(batch(100..=199));
        // starts inside the window but reaches past it
        assert!(sync.merge_forward(batch(150..=210)).is_accepted());
        assert_eq!(sync.window(), Window { min: 100, max: 210 });
    }

    #[test]
    fn history_page_reaching_above_floor_only_counts_its_first_id() {
        let sync = synchronizer();
        sync.merge_forward(batch(500..=600));
        assert!(sync.merge_backward(batch(400..=550)).is_accepted());
        assert_eq!(sync.window(), Window { min: 400, max: 600 });
    }

    #[test]
    fn unsorted_batch_is_sorted_before_merging() {
        let sync = synchronizer();
        let mut records = batch(10..=20);
        records.reverse();
        assert!(sync.merge_forward(records).is_accepted());
        assert_eq!(sync.window(), Window { min: 10, max: 20 });
        assert_eq!(sync.viewer().deliveries()[0].ids[0], 10);
    }

    #[test]
    fn concurrent_merges_keep_the_window_consistent() {
        const THREADS: i64 = 8;
        const PAGES: i64 = 50;
        const PAGE: i64 = 10;

        for _ in 0..20 {
            let sync = Arc::new(synchronizer());
            sync.merge_backward(batch(5000..=5099));

            let handles: Vec<_> = (0..THREADS)
                .map(|thread| {
                    let sync = sync.clone();
                    std::thread::spawn(move || {
                        let mut accepted = 0usize;
                        for i in 0..PAGES {
                            let k = thread + THREADS * i;
                            let lo = 5100 + k * PAGE;
                            if sync.merge_forward(batch(lo..=lo + PAGE - 1)).is_accepted() {
                                accepted += 1;
                            }
                            let hi = 4999 - k * PAGE;
                            if sync.merge_backward(batch(hi - PAGE + 1..=hi)).is_accepted() {
                                accepted += 1;
                            }
                        }
                        accepted
                    })
                })
                .collect();
            let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

            let pages = THREADS * PAGES * PAGE;
            assert_eq!(
                sync.window(),
                Window {
                    min: 5000 - pages,
                    max: 5099 + pages,
                }
            );
            let viewer = sync.viewer();
            assert_eq!(viewer.duplicates(), 0);
            assert_eq!(viewer.deliveries().len(), accepted + 1);
            let stats = sync.stats().snapshot();
            assert_eq!(stats.backward_batches + stats.forward_batches, accepted as u64 + 1);
        }
    }

    #[test]
    fn stats_track_decisions() {
        let sync = synchronizer();
        sync.merge_backward(batch(0..=9));
        sync.merge_forward(batch(10..=14));
        sync.merge_forward(batch(10..=12));
        sync.merge_forward(Vec::new());

        let stats = sync.stats().snapshot();
        assert_eq!(stats.backward_batches, 1);
        assert_eq!(stats.forward_batches, 1);
        assert_eq!(stats.records_delivered, 15);
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.empty, 1);
    }
}
