//! Error types for metadata index operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during index operations.
///
/// Outcomes of a publish (accepted, duplicate, conflict) are not errors; see
/// [`PutOutcome`](crate::PutOutcome).
#[derive(Debug, Error)]
pub enum IndexError {
    /// A persisted family document violates an index invariant.
    #[error("corrupt index entry for {filename}: {reason}")]
    Corrupt { filename: String, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error in a disk-backed index.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Another process holds the writer lease of this index directory.
    #[error("index is held by writer {holder} (pid {pid}) until {expires_at}")]
    WriterLocked {
        holder: String,
        pid: u32,
        expires_at: DateTime<Utc>,
    },

    /// A write was attempted through an index opened for reading only.
    #[error("index opened read-only")]
    ReadOnly,

    /// Lock poisoned by a panicking thread.
    #[error("index lock poisoned")]
    LockPoisoned,
}

/// Convenience type alias for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;
