//! Storage Manager
//!
//! The façade the buffer manager talks to. Coordinates the codec, the file
//! allocator, the handle cache, and the per-stream index.
//!
//! ## Responsibilities
//! - Validate configuration and create the spill directory
//! - Lazily register streams on first write
//! - Encode, append, and index batches; rotate backing files at the cap
//! - Read batches back byte-exact by begin-row key
//! - Delete a stream's files and index when its working set is discarded
//!
//! ## Concurrency
//! - `streams`: registry mutex, held only to look up or insert an entry,
//!   never across I/O
//! - Each stream's state has its own mutex; operations on different
//!   streams run fully in parallel
//! - The handle cache locks independently (see `handle_cache`)
//!
//! Every operation is a blocking call that may do synchronous disk I/O.
//! Nothing is retried internally; I/O failures surface to the caller.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::batch::{codec, Batch, ColumnType};
use crate::config::Config;
use crate::error::{Result, SpillError};

use super::stream::StreamId;
use super::{FileAllocator, HandleCache, Pointer, StreamState};

/// Spill-to-disk store for intermediate result batches
pub struct StorageManager {
    config: Config,

    /// Creates and names backing files
    allocator: FileAllocator,

    /// Bounded pool of open file handles, shared across all streams
    handles: HandleCache,

    /// Stream registry. Lazily populated on first add; entries leave only
    /// through `remove_batches`/`shutdown` and are never resurrected.
    streams: Mutex<Registry>,
}

/// Active streams plus tombstones for removed ids, behind one mutex.
/// The tombstone set is what keeps a removed StreamId from being lazily
/// re-created by a later `add_batch`.
#[derive(Default)]
struct Registry {
    active: HashMap<StreamId, Arc<StreamState>>,
    removed: HashSet<StreamId>,
}

impl StorageManager {
    /// Validate config and create the spill directory
    ///
    /// Fails fast with `SpillError::Config` if the directory path exists
    /// and is not a directory, cannot be created, or a limit is zero.
    pub fn open(config: Config) -> Result<Self> {
        if config.max_open_handles == 0 {
            return Err(SpillError::Config(
                "max_open_handles must be at least 1".to_string(),
            ));
        }
        if config.max_file_size == 0 {
            return Err(SpillError::Config(
                "max_file_size must be at least 1 byte".to_string(),
            ));
        }

        let directory = &config.directory;
        if directory.exists() && !directory.is_dir() {
            return Err(SpillError::Config(format!(
                "Spill path exists and is not a directory: {}",
                directory.display()
            )));
        }
        fs::create_dir_all(directory).map_err(|e| {
            SpillError::Config(format!(
                "Cannot create spill directory {}: {}",
                directory.display(),
                e
            ))
        })?;

        debug!(
            directory = %directory.display(),
            max_open_handles = config.max_open_handles,
            max_file_size = config.max_file_size,
            "Opened spill store"
        );

        let allocator = FileAllocator::new(config.directory.clone());
        let handles = HandleCache::new(config.max_open_handles);

        Ok(Self {
            allocator,
            handles,
            streams: Mutex::new(Registry::default()),
            config,
        })
    }

    /// Persist a batch under its begin-row key
    ///
    /// The stream is created implicitly on first write. A second add for a
    /// begin-row key that already has a pointer is a silent no-op, so
    /// callers may re-submit a batch they are unsure was persisted.
    ///
    /// On successful return the bytes have been handed to the OS (not
    /// necessarily to stable media) before the pointer became visible to
    /// `get_batch`.
    pub fn add_batch(&self, stream: StreamId, batch: &Batch) -> Result<()> {
        if batch.has_lob_columns() {
            return Err(SpillError::UnsupportedContent(format!(
                "Stream {}: batches with large object columns cannot be spilled; \
                 their content is backed by live connector resources",
                stream
            )));
        }

        let blob = codec::encode(batch)?;
        let length = blob.len() as u64;
        let begin_row = batch.begin_row();

        let state = self.lookup_or_create(stream)?;
        let mut inner = state.inner.lock();

        if inner.removed {
            return Err(SpillError::StreamNotFound(stream));
        }
        if inner.pointers.contains_key(&begin_row) {
            debug!(stream = %stream, begin_row, "Batch already persisted, skipping");
            return Ok(());
        }

        // Rotate when appending would push the current file past the cap.
        // A batch bigger than the cap itself still gets written, alone in
        // a fresh file, under a policy warning.
        let needs_new_file = match inner.files.last() {
            Some(file) => file.size + length > self.config.max_file_size,
            None => true,
        };
        if needs_new_file {
            if length > self.config.max_file_size {
                warn!(
                    stream = %stream,
                    begin_row,
                    batch_bytes = length,
                    max_file_size = self.config.max_file_size,
                    "Batch exceeds max backing file size; writing it to a dedicated file"
                );
            }
            let sequence = inner.files.len() as u32;
            let file = self.allocator.allocate(stream, sequence)?;
            debug!(stream = %stream, sequence, "Rotated to new backing file");
            inner.files.push(file);
        }

        let file_index = inner.files.len() - 1;
        let (path, offset) = {
            let file = &inner.files[file_index];
            (file.path.clone(), file.size)
        };

        let mut handle = self.handles.acquire(&path)?;
        let write_result = handle
            .seek(SeekFrom::Start(offset))
            .and_then(|_| handle.write_all(&blob));
        match write_result {
            Ok(()) => self.handles.release(path, handle),
            Err(e) => {
                // A handle in unknown state does not go back in the pool
                drop(handle);
                return Err(SpillError::io("write batch", path, e));
            }
        }

        inner.files[file_index].size = offset + length;
        inner.pointers.insert(
            begin_row,
            Pointer {
                file_index,
                offset,
                length,
            },
        );
        debug!(
            stream = %stream,
            begin_row,
            file_index,
            offset,
            length,
            "Persisted batch"
        );

        Ok(())
    }

    /// Read back the batch stored under `begin_row`
    ///
    /// `columns` is the batch's column descriptor; backing files are not
    /// self-describing, so the caller supplies it at read time.
    ///
    /// Returns `StreamNotFound` for an unknown or removed stream and
    /// `BatchNotPersisted` for a key that was never added to it — the
    /// latter is a usage bug upstream, not legitimate absence of data.
    pub fn get_batch(
        &self,
        stream: StreamId,
        begin_row: u64,
        columns: &[ColumnType],
    ) -> Result<Batch> {
        let state = self
            .lookup(stream)
            .ok_or(SpillError::StreamNotFound(stream))?;
        let inner = state.inner.lock();

        if inner.removed {
            return Err(SpillError::StreamNotFound(stream));
        }
        let pointer = *inner
            .pointers
            .get(&begin_row)
            .ok_or(SpillError::BatchNotPersisted { stream, begin_row })?;
        let path = inner.files[pointer.file_index].path.clone();

        let mut handle = self.handles.acquire(&path)?;
        let mut blob = vec![0u8; pointer.length as usize];
        let read_result = handle
            .seek(SeekFrom::Start(pointer.offset))
            .and_then(|_| handle.read_exact(&mut blob));
        match read_result {
            Ok(()) => self.handles.release(path, handle),
            Err(e) => {
                drop(handle);
                return Err(SpillError::io("read batch", path, e));
            }
        }

        codec::decode(&blob, columns)
    }

    /// Remove a single batch — intentionally a no-op.
    ///
    /// Deleting a byte range from the middle of a backing file would need a
    /// hole-punch or a rewrite of everything after it; neither is worth it
    /// for scratch data, so space is reclaimed only by `remove_batches`.
    pub fn remove_batch(&self, _stream: StreamId, _begin_row: u64) {}

    /// Delete every backing file of a stream and drop its index
    ///
    /// Idempotent: removing an unknown (or already removed) stream succeeds.
    /// Racing `add_batch` calls on the same stream fail with
    /// `StreamNotFound` once the removed flag is set.
    pub fn remove_batches(&self, stream: StreamId) -> Result<()> {
        let state = {
            let mut registry = self.streams.lock();
            match registry.active.remove(&stream) {
                Some(state) => {
                    registry.removed.insert(stream);
                    state
                }
                None => return Ok(()), // already absent
            }
        };

        let mut inner = state.inner.lock();
        inner.removed = true;
        inner.pointers.clear();

        let mut first_err = None;
        for file in inner.files.drain(..) {
            // Make sure this process is not holding the file open, then
            // delete it. Keep going on failure so one bad file does not
            // strand the rest.
            self.handles.evict_and_close(&file.path);
            if let Err(e) = fs::remove_file(&file.path) {
                warn!(
                    stream = %stream,
                    sequence = file.sequence,
                    path = %file.path.display(),
                    error = %e,
                    "Failed to delete backing file"
                );
                if first_err.is_none() {
                    first_err = Some(SpillError::io("delete backing file", file.path, e));
                }
            }
        }

        debug!(stream = %state.id, "Removed stream");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Tear down every stream, deleting all backing files
    ///
    /// Total-effort: a failure on one stream is logged and the loop moves
    /// on, so a single bad file never strands the others' disk space.
    /// Consuming `self` makes the manager unusable afterwards by
    /// construction. Callers should stop issuing requests before invoking
    /// this; in-flight operations are not serialized against it.
    pub fn shutdown(self) {
        let ids: Vec<StreamId> = self.streams.lock().active.keys().copied().collect();
        for id in ids {
            if let Err(e) = self.remove_batches(id) {
                error!(stream = %id, error = %e, "Stream cleanup failed during shutdown");
            }
        }
        debug!("Spill store shut down");
    }

    // =========================================================================
    // Accessors (for tests and introspection)
    // =========================================================================

    /// Number of registered (non-removed) streams
    pub fn stream_count(&self) -> usize {
        self.streams.lock().active.len()
    }

    /// Number of backing files currently owned by a stream
    pub fn backing_file_count(&self, stream: StreamId) -> Result<usize> {
        let state = self
            .lookup(stream)
            .ok_or(SpillError::StreamNotFound(stream))?;
        let count = state.inner.lock().files.len();
        Ok(count)
    }

    /// Number of checked-in handles in the cache
    pub fn cached_handle_count(&self) -> usize {
        self.handles.cached_handle_count()
    }

    /// The spill directory
    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    /// The configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Look up a stream, inserting fresh state on first contact.
    /// A removed id is never re-created.
    fn lookup_or_create(&self, stream: StreamId) -> Result<Arc<StreamState>> {
        let mut registry = self.streams.lock();
        if registry.removed.contains(&stream) {
            return Err(SpillError::StreamNotFound(stream));
        }
        Ok(Arc::clone(
            registry
                .active
                .entry(stream)
                .or_insert_with(|| Arc::new(StreamState::new(stream))),
        ))
    }

    /// Look up a stream without creating it
    fn lookup(&self, stream: StreamId) -> Option<Arc<StreamState>> {
        self.streams.lock().active.get(&stream).cloned()
    }
}
