//! Core data types shared by the fetchers, the synchronizer and the viewers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Server-assigned record id. Strictly increasing in insertion order.
pub type LogId = i64;

/// Represents the severity level of a log record.
///
/// Sources spell levels differently (`WARNING` vs `WARN`, `CRITICAL` vs
/// `FATAL`); both spellings deserialize to the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Very fine-grained tracing output.
    Trace,
    /// Detailed messages useful for debugging.
    Debug,
    /// Informational messages about the process' progress.
    Info,
    /// A potential issue or unexpected situation.
    #[serde(alias = "WARNING")]
    Warn,
    /// A significant error that affects functionality.
    Error,
    /// A critical error the process cannot continue from.
    #[serde(alias = "CRITICAL")]
    Fatal,
}

impl Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Trace => write!(f, "[TRACE]"),
            Severity::Debug => write!(f, "[DEBUG]"),
            Severity::Info => write!(f, "[INFO]"),
            Severity::Warn => write!(f, "[WARN]"),
            Severity::Error => write!(f, "[ERROR]"),
            Severity::Fatal => write!(f, "[FATAL]"),
        }
    }
}

/// A single log line as returned by a [`LogSource`](crate::source::LogSource).
///
/// Records are immutable once fetched. The synchronizer never rewrites them,
/// it only decides whether a whole batch is forwarded to the viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Unique id, strictly increasing in insertion order.
    pub id: LogId,
    /// When the line was emitted, if the source reports it.
    #[serde(default, rename = "time", alias = "timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Severity, if the source reports it.
    #[serde(default)]
    pub level: Option<Severity>,
    /// The log line itself.
    #[serde(rename = "message", alias = "text")]
    pub text: String,
}

impl LogRecord {
    pub fn new(id: LogId, level: Severity, text: impl Into<String>) -> Self {
        LogRecord {
            id,
            timestamp: Some(Utc::now()),
            level: Some(level),
            text: text.into(),
        }
    }
}

impl Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>8}", self.id)?;
        if let Some(ts) = &self.timestamp {
            write!(f, " {}", ts.format("%Y-%m-%d %H:%M:%S%.3f"))?;
        }
        if let Some(level) = &self.level {
            write!(f, " {}", level)?;
        }
        write!(f, " {}", self.text)
    }
}

/// The `[min, max]` id range the client currently holds.
///
/// A fresh window uses the sentinel `min = i64::MAX, max = i64::MIN`, so
/// `max < 0` answers "has anything been loaded yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub min: LogId,
    pub max: LogId,
}

impl Default for Window {
    fn default() -> Self {
        Window::UNINITIALIZED
    }
}

impl Window {
    pub const UNINITIALIZED: Window = Window {
        min: LogId::MAX,
        max: LogId::MIN,
    };

    pub fn is_initialized(&self) -> bool {
        self.max >= 0
    }

    /// Widens the window to cover `[lo, hi]`. Never narrows it.
    pub fn extend(&mut self, lo: LogId, hi: LogId) {
        self.min = self.min.min(lo);
        self.max = self.max.max(hi);
    }
}

impl Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_initialized() {
            write!(f, "[{}, {}]", self.min, self.max)
        } else {
            write!(f, "[empty]")
        }
    }
}

/// Which entity's log stream a session reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogScope {
    /// The master service's own log.
    Master,
    /// The log of one training trial.
    Trial(u64),
}

impl LogScope {
    /// REST path of this scope's log endpoint, relative to the API root.
    pub fn path(&self) -> String {
        match self {
            LogScope::Master => "/logs".to_string(),
            LogScope::Trial(id) => format!("/trials/{}/logs", id),
        }
    }
}

impl Display for LogScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogScope::Master => write!(f, "master"),
            LogScope::Trial(id) => write!(f, "trial {}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Records before the anchor: history paging and the initial tail load.
    Older,
    /// Records after the anchor: forward polling.
    Newer,
}

/// A page request sent to a log source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchRequest {
    pub scope: LogScope,
    /// Exclusive bound: records before it for `Older`, after it for `Newer`.
    /// `None` on an `Older` request asks for the most recent page.
    pub anchor: Option<LogId>,
    pub direction: Direction,
    pub page_size: usize,
}

impl FetchRequest {
    pub fn tail(scope: LogScope, page_size: usize) -> Self {
        FetchRequest {
            scope,
            anchor: None,
            direction: Direction::Older,
            page_size,
        }
    }

    pub fn older_than(scope: LogScope, anchor: LogId, page_size: usize) -> Self {
        FetchRequest {
            scope,
            anchor: Some(anchor),
            direction: Direction::Older,
            page_size,
        }
    }

    pub fn newer_than(scope: LogScope, anchor: LogId, page_size: usize) -> Self {
        FetchRequest {
            scope,
            anchor: Some(anchor),
            direction: Direction::Newer,
            page_size,
        }
    }
}

/// Tells the viewer where an accepted batch goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Older history, shown above existing content.
    Prepend,
    /// Newly appended lines, shown below existing content.
    Append,
}
