//! # spillstore
//!
//! Spill-to-disk storage backend for a query engine's buffer manager:
//! - Persists intermediate result batches that no longer fit in memory
//! - Indexes them in memory for random-access retrieval by begin-row key
//! - Rotates across multiple backing files per logical stream
//! - Bounds the number of open OS file handles with an LRU cache
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Buffer Manager                           │
//! │              (add / get / remove batches)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   StorageManager                             │
//! │          (stream registry, per-stream locking)               │
//! └──────┬──────────────┬──────────────┬───────────────────────┘
//!        │              │              │
//!        ▼              ▼              ▼
//! ┌────────────┐ ┌─────────────┐ ┌─────────────┐
//! │BatchCodec  │ │FileAllocator│ │ HandleCache │
//! │ (encode/   │ │ (rotation,  │ │ (bounded    │
//! │  decode)   │ │  naming)    │ │  LRU pool)  │
//! └────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! This is a transient scratch store: the batch index lives only in memory
//! for the lifetime of one process. There is no write-ahead log and no
//! crash recovery; surviving backing files from a dead process are not
//! interpretable and should simply be deleted.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod batch;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, SpillError};
pub use config::{Config, ConfigBuilder};
pub use batch::{Batch, ColumnType, Value};
pub use storage::{StorageManager, StreamId};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of spillstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
