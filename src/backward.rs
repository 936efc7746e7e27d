//! History paging, driven by scroll-to-top signals.
//!
//! The fetcher owns one piece of state, the oldest start id it has already
//! asked for. It is a *requested* watermark, lowered before the request goes
//! out, so a burst of scroll-to-top events for the same position produces a
//! single fetch even while that fetch is still in flight.

use std::sync::atomic::{AtomicI64, Ordering};
use tracing::trace;

use crate::model::{FetchRequest, LogId, LogScope};

const NOT_REQUESTED: LogId = LogId::MAX;

#[derive(Debug)]
pub struct BackwardFetcher {
    scope: LogScope,
    page_size: usize,
    oldest_requested: AtomicI64,
}

impl BackwardFetcher {
    pub fn new(scope: LogScope, page_size: usize) -> Self {
        BackwardFetcher {
            scope,
            page_size,
            oldest_requested: AtomicI64::new(NOT_REQUESTED),
        }
    }

    /// The seed request: the most recent page. Leaves the watermark alone.
    pub fn initial_request(&self) -> FetchRequest {
        FetchRequest::tail(self.scope, self.page_size)
    }

    /// Decides whether to fetch the page preceding `oldest_known_id`.
    ///
    /// Returns `None` when that page (or an older one) was already requested.
    /// The watermark check and update are a single atomic step, so two
    /// concurrent callers can never both get a request for the same page.
    pub fn request_older_than(&self, oldest_known_id: LogId) -> Option<FetchRequest> {
        let start_id = self.start_id(oldest_known_id);

        match self.oldest_requested.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
            (start_id < current).then_some(start_id)
        }) {
            Ok(previous) => {
                trace!(oldest_known_id, start_id, previous, "requesting older page");
                Some(FetchRequest::older_than(
                    self.scope,
                    oldest_known_id,
                    self.page_size,
                ))
            }
            Err(current) => {
                trace!(oldest_known_id, start_id, current, "older page already requested");
                None
            }
        }
    }

    /// First id of the page preceding `oldest_known_id`, clamped to 0.
    pub fn start_id(&self, oldest_known_id: LogId) -> LogId {
        oldest_known_id
            .saturating_sub(self.page_size as LogId)
            .max(0)
    }

    /// Hands back the claim on `start_id` after its fetch failed.
    ///
    /// The watermark falls back to `window_min`, i.e. to what was actually
    /// received. Does nothing if another request has lowered it since.
    pub fn release(&self, start_id: LogId, window_min: LogId) -> bool {
        let released = self
            .oldest_requested
            .compare_exchange(start_id, window_min, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if released {
            trace!(start_id, window_min, "released failed page");
        }
        released
    }

    /// Lowers the watermark to `window_min` after an accepted history merge.
    ///
    /// This covers the seed load, which fills the window without going
    /// through [`request_older_than`](Self::request_older_than). Never raises
    /// the watermark.
    pub fn settle(&self, window_min: LogId) {
        self.oldest_requested.fetch_min(window_min, Ordering::AcqRel);
    }

    /// Oldest start id requested so far, `None` before the first request.
    pub fn oldest_requested(&self) -> Option<LogId> {
        match self.oldest_requested.load(Ordering::Acquire) {
            NOT_REQUESTED => None,
            id => Some(id),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
