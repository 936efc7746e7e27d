//! Log sources: whoever answers paginated range queries over a log stream.
//!
//! The synchronizer only ever asks two things of a source, both expressed as
//! a [`FetchRequest`]:
//!
//! - **Older** pages: up to `page_size` records with `id < anchor`, the
//!   newest ones, ascending. No anchor means "the most recent page".
//! - **Newer** pages: up to `page_size` records with `id > anchor`, oldest
//!   first.
//!
//! An empty answer is normal (nothing older, nothing new yet). Any retry
//! policy belongs to the source, not to the synchronizer.

use std::future::Future;
use std::sync::Arc;

use crate::error::Result;
use crate::model::{FetchRequest, LogRecord};

pub mod http;
pub mod memory;

pub use http::HttpLogSource;
pub use memory::MemoryLogSource;

/// Trait for anything that can answer a [`FetchRequest`].
///
/// Implementations must return records sorted ascending by id and at most
/// `request.page_size` of them.
pub trait LogSource: Send + Sync + 'static {
    fn fetch(&self, request: FetchRequest) -> impl Future<Output = Result<Vec<LogRecord>>> + Send;
}

impl<T: LogSource> LogSource for Arc<T> {
    fn fetch(&self, request: FetchRequest) -> impl Future<Output = Result<Vec<LogRecord>>> + Send {
        (**self).fetch(request)
    }
}
