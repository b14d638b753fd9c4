//! File Allocator
//!
//! Creates uniquely named backing files for a stream. Naming is
//! deterministic from `(stream, sequence)` so the same pair can never map
//! to two different files; creation uses `create_new` so a name collision
//! is detected atomically at the OS level.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Result, SpillError};

use super::stream::{BackingFile, StreamId};

/// Allocates backing files under the configured spill directory
#[derive(Debug)]
pub(crate) struct FileAllocator {
    directory: PathBuf,
}

impl FileAllocator {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    /// Path for a `(stream, sequence)` pair.
    /// "stream_000007_002.spill" = stream 7, third backing file.
    pub fn path_for(&self, stream: StreamId, sequence: u32) -> PathBuf {
        self.directory
            .join(format!("stream_{:06}_{:03}.spill", stream.0, sequence))
    }

    /// Create a new, empty backing file
    ///
    /// Fails with `FileConflict` if the file already exists — that means a
    /// stream id was reused and the caller has a bug; overwriting would
    /// corrupt the other stream's data.
    pub fn allocate(&self, stream: StreamId, sequence: u32) -> Result<BackingFile> {
        let path = self.path_for(stream, sequence);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                // Only existence matters here; the handle for writing is
                // acquired through the handle cache.
                drop(file);
                debug!(stream = %stream, sequence, path = %path.display(), "Allocated backing file");
                Ok(BackingFile {
                    path,
                    sequence,
                    size: 0,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(SpillError::FileConflict { path })
            }
            Err(e) => Err(SpillError::io("create backing file", path, e)),
        }
    }
}
