//! Error types for spillstore
//!
//! A closed error enum, one variant per failure class, so callers
//! pattern-match instead of inspecting message strings.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::storage::StreamId;

/// Result type alias using SpillError
pub type Result<T> = std::result::Result<T, SpillError>;

/// Unified error type for spillstore operations
#[derive(Debug, Error)]
pub enum SpillError {
    // -------------------------------------------------------------------------
    // Configuration Errors (fatal at initialization)
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Content Policy Errors
    // -------------------------------------------------------------------------
    /// Large-object column content is backed by live external resources and
    /// cannot be persisted; this restriction is permanent, not a gap.
    #[error("Unsupported content: {0}")]
    UnsupportedContent(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    /// The stream is unknown or was removed. Callers should treat this as
    /// "no data available", not as a bug.
    #[error("Stream {0} not found")]
    StreamNotFound(StreamId),

    /// The caller requested a begin-row key it never successfully added.
    /// Unlike `StreamNotFound`, this indicates a usage bug upstream.
    #[error("Batch at row {begin_row} was never added to stream {stream}")]
    BatchNotPersisted { stream: StreamId, begin_row: u64 },

    // -------------------------------------------------------------------------
    // File Allocation Errors
    // -------------------------------------------------------------------------
    /// A backing file with this exact name already exists, which indicates
    /// a stream-id reuse bug upstream. Fatal.
    #[error("Backing file already exists: {}", path.display())]
    FileConflict { path: PathBuf },

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error ({context}) on {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // -------------------------------------------------------------------------
    // Codec Errors
    // -------------------------------------------------------------------------
    #[error("Batch codec error: {0}")]
    Codec(String),
}

impl SpillError {
    /// Wrap an `io::Error` with the operation and the offending path
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        SpillError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}
