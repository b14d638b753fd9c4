//! Open-Handle Cache
//!
//! A bounded, shared pool of open backing-file handles, keyed by path and
//! ordered by recency of release. Streams do not own handles: a handle is
//! checked out for the duration of one read or write and checked back in
//! afterwards. Only checked-in handles count against the bound and only
//! they are eviction candidates, so eviction never closes a handle that an
//! in-flight operation is using.
//!
//! ## Concurrency
//! One mutex guards the whole cache, independent of any stream lock.
//! Acquiring a handle for stream A may evict (close) a handle belonging to
//! stream B. The lock is never held across `open()`.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, SpillError};

/// Bounded LRU pool of open file handles
#[derive(Debug)]
pub struct HandleCache {
    /// Max checked-in handles; exceeding this on release evicts the
    /// least-recently-released entry
    capacity: usize,

    inner: Mutex<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    /// Checked-in handles by path
    handles: HashMap<PathBuf, File>,

    /// Paths ordered by release recency; front is evicted first
    recency: VecDeque<PathBuf>,
}

impl HandleCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Check out a handle for `path`, opening one if none is cached.
    ///
    /// The returned handle is exclusively the caller's until it is passed
    /// back to `release`; it is not in the cache and cannot be evicted.
    pub fn acquire(&self, path: &Path) -> Result<File> {
        {
            let mut inner = self.inner.lock();
            if let Some(file) = inner.handles.remove(path) {
                inner.recency.retain(|p| p != path);
                return Ok(file);
            }
        }

        // Cache miss: open outside the lock so a slow open does not stall
        // unrelated acquisitions.
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| SpillError::io("open backing file", path, e))
    }

    /// Check a handle back in, evicting the least-recently-released entry
    /// if the cache is now over capacity. Closing the evicted handle is a
    /// plain drop; the OS flushes nothing extra because every write went
    /// straight through.
    pub fn release(&self, path: PathBuf, file: File) {
        let mut inner = self.inner.lock();

        // Same-path operations are serialized by the stream lock, so a
        // checked-in entry for this path cannot exist here.
        inner.recency.push_back(path.clone());
        inner.handles.insert(path, file);

        while inner.handles.len() > self.capacity {
            let Some(victim) = inner.recency.pop_front() else {
                break;
            };
            if let Some(file) = inner.handles.remove(&victim) {
                debug!(path = %victim.display(), "Evicting cached file handle");
                drop(file);
            }
        }
    }

    /// Drop the cached handle for `path`, if any, so this process holds the
    /// file open nowhere when the caller goes on to delete it. A path that
    /// is neither cached nor checked out is not held by this process at
    /// all, so there is nothing to close.
    pub fn evict_and_close(&self, path: &Path) {
        let mut inner = self.inner.lock();
        if inner.handles.remove(path).is_some() {
            inner.recency.retain(|p| p != path);
            debug!(path = %path.display(), "Closed cached handle ahead of file deletion");
        }
    }

    /// Number of checked-in handles (for tests and introspection)
    pub fn cached_handle_count(&self) -> usize {
        self.inner.lock().handles.len()
    }

    /// Configured bound
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
