//! Keeps a viewer's view of a growing log consistent while it is filled from
//! two directions at once: history pages fetched on scroll-to-top, and
//! periodic polls for new records.
pub mod backward;
pub mod config;
pub mod error;
pub mod forward;
pub mod model;
pub mod session;
pub mod source;
pub mod stats;
pub mod synchronizer;
pub mod viewer;

pub use config::{Config, ConfigLoader, SourceConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use model::{Direction, FetchRequest, LogId, LogRecord, LogScope, Placement, Severity, Window};
pub use session::{FetchOutcome, LogSession, SkipReason};
pub use source::{HttpLogSource, LogSource, MemoryLogSource};
pub use stats::StatsSnapshot;
pub use synchronizer::{MergeOutcome, Synchronizer};
pub use viewer::{BufferedViewer, LogViewer, StdoutViewer};
