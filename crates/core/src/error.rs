//! Error types for replog
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::types::{LifecycleState, LogPosition};
use std::io;
use thiserror::Error;

/// Result type alias for replog operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the log storage engine
#[derive(Debug, Error)]
pub enum Error {
    /// A frame run failed integrity checks: digest mismatch, missing or
    /// out-of-order frames, or an unparseable frame header.
    ///
    /// Fatal to the replay or read that hit it.
    #[error("Log corruption: {0}")]
    Corruption(String),

    /// A deduplicated snapshot contains a back-reference that points forward
    /// or outside the snapshot.
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// A storage call was made in a lifecycle state that does not allow it.
    ///
    /// Nothing was persisted; the caller may retry once preconditions hold.
    #[error("Illegal call to {call}() in state {state}")]
    IllegalState {
        /// Name of the rejected call
        call: &'static str,
        /// Lifecycle state at the time of the call
        state: LifecycleState,
    },

    /// The log stream rejected an append. The mutation was not applied.
    #[error("Log append failed: {0}")]
    AppendFailed(String),

    /// The stream manager has been closed by shutdown.
    #[error("Log stream is closed")]
    StreamClosed,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Log stream error outside the append path (read, truncate)
    #[error("Log stream error: {0}")]
    Stream(#[from] LogStreamError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a corruption error
    pub fn corruption(detail: impl Into<String>) -> Self {
        Error::Corruption(detail.into())
    }

    /// Create a malformed snapshot error
    pub fn malformed_snapshot(detail: impl Into<String>) -> Self {
        Error::MalformedSnapshot(detail.into())
    }

    /// Check whether this error indicates damaged persisted data.
    ///
    /// Such errors are never repaired or skipped.
    pub fn is_data_error(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::MalformedSnapshot(_))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Errors reported by a [`LogStream`](crate::traits::LogStream) implementation.
#[derive(Debug, Error)]
pub enum LogStreamError {
    /// I/O error from a file-backed stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The stream's own framing is damaged
    #[error("Stream corrupted: {0}")]
    Corrupted(String),

    /// The stream refused a write
    #[error("Append rejected: {0}")]
    Rejected(String),

    /// A position past the end of the stream was requested
    #[error("Position {0} is beyond the end of the log")]
    InvalidPosition(LogPosition),
}
