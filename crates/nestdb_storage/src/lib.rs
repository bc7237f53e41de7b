//! # NestDB Storage
//!
//! Ordered key-value engine abstraction for NestDB.
//!
//! This crate provides the lowest-level storage seam for NestDB. Engines are
//! **opaque ordered byte stores** - they do not interpret the keys or values
//! they hold.
//!
//! ## Design Principles
//!
//! - Engines expose snapshots, atomic batches and forward cursors only
//! - No knowledge of tables, maps, instance ids or value tags
//! - Must be `Send + Sync` for concurrent access
//! - NestDB owns all key layout and value interpretation
//!
//! ## Available Engines
//!
//! - [`MemoryEngine`] - For testing and ephemeral storage
//! - [`LogEngine`] - For persistent storage using an append-only batch log
//!
//! ## Example
//!
//! ```rust
//! use nestdb_storage::{KvEngine, MemoryEngine, WriteBatch};
//!
//! let engine = MemoryEngine::new();
//! let mut batch = WriteBatch::new();
//! batch.put(b"a".to_vec(), b"1".to_vec());
//! batch.put(b"b".to_vec(), b"2".to_vec());
//! engine.write(batch).unwrap();
//!
//! let snapshot = engine.snapshot();
//! let mut cursor = snapshot.iter();
//! cursor.seek(b"a");
//! assert_eq!(cursor.key(), b"a");
//! cursor.next();
//! assert_eq!(cursor.value(), b"2");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod engine;
mod error;
mod log;
mod memory;
mod snapshot;

pub use batch::{BatchOp, WriteBatch};
pub use engine::KvEngine;
pub use error::{StorageError, StorageResult};
pub use log::{
    encode_record, replay, LogEngine, LogOptions, Replay, LOCK_FILE, LOG_FILE, LOG_HEADER_SIZE,
    LOG_MAGIC,
};
pub use memory::MemoryEngine;
pub use snapshot::{Cursor, Snapshot, SnapshotView};
