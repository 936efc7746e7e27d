use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Result;
use crate::model::{Direction, FetchRequest, LogId, LogRecord, LogScope, Severity};
use crate::source::LogSource;

/// In-process append-only log store.
///
/// Ids come from one counter shared by every scope, so they are unique and
/// increasing across the whole store but not contiguous within a scope once
/// several scopes are written to. Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogSource {
    inner: Arc<RwLock<MemoryLog>>,
}

#[derive(Debug, Default)]
struct MemoryLog {
    next_id: LogId,
    streams: HashMap<LogScope, Vec<LogRecord>>,
}

impl MemoryLogSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line and returns the id it was assigned.
    pub fn append(&self, scope: LogScope, level: Severity, text: impl Into<String>) -> LogId {
        let mut log = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = log.next_id;
        log.next_id += 1;
        log.streams
            .entry(scope)
            .or_default()
            .push(LogRecord::new(id, level, text));
        id
    }

    /// Appends `count` info lines numbered from the current id.
    pub fn append_many(&self, scope: LogScope, count: usize) -> Vec<LogId> {
        (0..count)
            .map(|_| {
                let next = self.next_id();
                self.append(scope, Severity::Info, format!("line {}", next))
            })
            .collect()
    }

    pub fn next_id(&self) -> LogId {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).next_id
    }

    pub fn len(&self, scope: LogScope) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .streams
            .get(&scope)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, scope: LogScope) -> bool {
        self.len(scope) == 0
    }

    /// Answers a request synchronously. [`LogSource::fetch`] wraps this.
    pub fn page(&self, request: &FetchRequest) -> Vec<LogRecord> {
        let log = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let Some(records) = log.streams.get(&request.scope) else {
            return Vec::new();
        };

        let (start, end) = match (request.direction, request.anchor) {
            (Direction::Older, None) => {
                (records.len().saturating_sub(request.page_size), records.len())
            }
            (Direction::Older, Some(anchor)) => {
                let end = records.partition_point(|r| r.id < anchor);
                (end.saturating_sub(request.page_size), end)
            }
            (Direction::Newer, None) => (0, request.page_size.min(records.len())),
            (Direction::Newer, Some(anchor)) => {
                let start = records.partition_point(|r| r.id <= anchor);
                (start, start.saturating_add(request.page_size).min(records.len()))
            }
        };
        records[start..end].to_vec()
    }
}

impl LogSource for MemoryLogSource {
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<LogRecord>> {
        Ok(self.page(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(records: &[LogRecord]) -> Vec<LogId> {
        records.iter().map(|r| r.id).collect()
    }

    fn seeded(count: usize) -> MemoryLogSource {
        let source = MemoryLogSource::new();
        source.append_many(LogScope::Master, count);
        source
    }

    #[test]
    fn tail_returns_most_recent_page() {
        let source = seeded(25);
        let page = source.page(&FetchRequest::tail(LogScope::Master, 10));
        assert_eq!(ids(&page), (15..25).collect::<Vec<_>>());
    }

    #[test]
    fn older_page_ends_just_before_anchor() {
        let source = seeded(25);
        let page = source.page(&FetchRequest::older_than(LogScope::Master, 15, 10));
        assert_eq!(ids(&page), (5..15).collect::<Vec<_>>());

        let page = source.page(&FetchRequest::older_than(LogScope::Master, 3, 10));
        assert_eq!(ids(&page), vec![0, 1, 2]);

        assert!(source.page(&FetchRequest::older_than(LogScope::Master, 0, 10)).is_empty());
    }

    #[test]
    fn newer_page_starts_just_after_anchor() {
        let source = seeded(25);
        let page = source.page(&FetchRequest::newer_than(LogScope::Master, 9, 5));
        assert_eq!(ids(&page), (10..15).collect::<Vec<_>>());

        let page = source.page(&FetchRequest::newer_than(LogScope::Master, 21, 5));
        assert_eq!(ids(&page), vec![22, 23, 24]);

        assert!(source.page(&FetchRequest::newer_than(LogScope::Master, 24, 5)).is_empty());
    }

    #[test]
    fn scopes_share_the_id_counter() {
        let source = MemoryLogSource::new();
        let a = source.append(LogScope::Master, Severity::Info, "master");
        let b = source.append(LogScope::Trial(1), Severity::Info, "trial");
        let c = source.append(LogScope::Master, Severity::Warn, "master again");
        assert_eq!((a, b, c), (0, 1, 2));

        let page = source.page(&FetchRequest::tail(LogScope::Master, 10));
        assert_eq!(ids(&page), vec![0, 2]);
        assert_eq!(source.len(LogScope::Trial(1)), 1);
        assert!(source.is_empty(LogScope::Trial(2)));
    }

    #[tokio::test]
    async fn fetch_matches_page() {
        let source = seeded(5);
        let request = FetchRequest::tail(LogScope::Master, 3);
        let fetched = source.fetch(request).await.unwrap();
        assert_eq!(fetched, source.page(&request));
    }
}
