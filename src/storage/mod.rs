//! Storage Module
//!
//! Disk persistence for spilled batches.
//!
//! ## Responsibilities
//! - Append encoded batches to per-stream backing files
//! - Rotate to a new backing file when the size cap is reached
//! - Keep the number of open OS handles bounded (LRU cache)
//! - Track, in memory only, where each batch lives
//!
//! ## File Format
//! A backing file is raw encoded batch blobs concatenated in write order.
//! There is no header, footer, or on-disk index; the only index is the
//! in-memory pointer map, which dies with the process. That is deliberate:
//! this store is scratch space scoped to one query session.
//!
//! ```text
//! stream_000007_000.spill
//! ┌──────────────┬──────────────┬──────────────┐
//! │ batch blob   │ batch blob   │ batch blob   │ ...
//! │ (rows 1..)   │ (rows 101..) │ (rows 201..) │
//! └──────────────┴──────────────┴──────────────┘
//!   ▲ offset/length known only to the pointer map
//! ```

mod allocator;
mod handle_cache;
mod manager;
mod stream;

pub use handle_cache::HandleCache;
pub use manager::StorageManager;
pub use stream::StreamId;

pub(crate) use allocator::FileAllocator;
pub(crate) use stream::{Pointer, StreamState};
