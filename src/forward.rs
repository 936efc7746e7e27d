//! Forward polling for newly appended records.

use tracing::trace;

use crate::model::{FetchRequest, LogScope, Window};

/// Builds the request for one poll tick.
///
/// The poller has no high-water mark of its own: it always asks relative to
/// the merged window, so ids found by the seed load or by history paging are
/// picked up without any hand-off.
#[derive(Debug, Clone)]
pub struct ForwardPoller {
    scope: LogScope,
    page_size: usize,
}

impl ForwardPoller {
    pub fn new(scope: LogScope, page_size: usize) -> Self {
        ForwardPoller { scope, page_size }
    }

    /// `None` while nothing has been loaded, there is nothing to poll after.
    pub fn tick(&self, window: Window) -> Option<FetchRequest> {
        if window.max < 0 {
            trace!("window uninitialized, skipping poll");
            return None;
        }
        Some(FetchRequest::newer_than(self.scope, window.max, self.page_size))
    }
}
