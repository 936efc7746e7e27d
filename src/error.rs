//! Error types for log synchronization.
//!
//! Nothing in the synchronization core is fatal. A failed fetch leaves the
//! window untouched and the next successful poll or scroll recovers, so these
//! errors only ever travel back to whoever asked for the fetch.

/// Error type for fetches, configuration and I/O.
#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Log source answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out after {millis} ms")]
    Timeout { millis: u64 },

    #[error("Failed to decode log records: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<hyper_util::client::legacy::Error> for SyncError {
    fn from(e: hyper_util::client::legacy::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

impl From<hyper::Error> for SyncError {
    fn from(e: hyper::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

/// Result type alias for log synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
