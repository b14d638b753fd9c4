//! Per-stream spill state
//!
//! A stream is one logical sequence of batches, typically one query's
//! intermediate result set. Its state is the ordered list of backing files,
//! the begin-row → pointer map, and a removed flag. All of it lives behind
//! one mutex so operations on the same stream serialize while different
//! streams proceed in parallel.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use parking_lot::Mutex;

/// Identifier for one logical sequence of batches spilled to disk.
/// Supplied by the caller; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One physical file holding a contiguous run of a stream's encoded batches
#[derive(Debug)]
pub(crate) struct BackingFile {
    /// Absolute path under the configured spill directory
    pub path: PathBuf,

    /// Per-stream sequence number, starting at 0
    pub sequence: u32,

    /// Bytes written so far; also the append offset for the next batch
    pub size: u64,
}

/// Where one batch lives: which backing file, and the byte range inside it
#[derive(Debug, Clone, Copy)]
pub(crate) struct Pointer {
    /// Index into the stream's ordered backing-file list
    pub file_index: usize,

    pub offset: u64,
    pub length: u64,
}

/// All mutable state for one stream, behind the stream's lock
#[derive(Debug, Default)]
pub(crate) struct StreamInner {
    /// Ordered backing files; the last one is the only write candidate
    pub files: Vec<BackingFile>,

    /// Begin-row key → pointer. At most one entry per key: a repeated
    /// add for the same key is a no-op, never an update.
    pub pointers: HashMap<u64, Pointer>,

    /// Set by stream removal; a removed stream is never resurrected
    pub removed: bool,
}

/// A stream registry entry: id plus locked state
#[derive(Debug)]
pub(crate) struct StreamState {
    pub id: StreamId,
    pub inner: Mutex<StreamInner>,
}

impl StreamState {
    pub fn new(id: StreamId) -> Self {
        Self {
            id,
            inner: Mutex::new(StreamInner::default()),
        }
    }
}
