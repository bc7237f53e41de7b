//! In-memory engine for testing.

use crate::batch::WriteBatch;
use crate::engine::KvEngine;
use crate::error::StorageResult;
use crate::snapshot::{MemTable, Snapshot};
use parking_lot::RwLock;

/// An in-memory ordered key-value engine.
///
/// This engine keeps everything in a copy-on-write `BTreeMap` and is
/// suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// # Thread Safety
///
/// This engine is thread-safe and can be shared across threads. Writers are
/// serialized by an internal lock; snapshots never block writers.
///
/// # Example
///
/// ```rust
/// use nestdb_storage::{KvEngine, MemoryEngine};
///
/// let engine = MemoryEngine::new();
/// engine.put(b"key", b"value").unwrap();
/// assert_eq!(engine.get(b"key").unwrap(), Some(b"value".to_vec()));
/// ```
#[derive(Debug, Default)]
pub struct MemoryEngine {
    table: RwLock<MemTable>,
}

impl MemoryEngine {
    /// Creates a new empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns `true` if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the sequence number of the last applied batch.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.table.read().sequence()
    }
}

impl KvEngine for MemoryEngine {
    fn snapshot(&self) -> Snapshot {
        self.table.read().snapshot()
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.table.write().apply(batch);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.table.read().get(key))
    }

    fn flush(&self) -> StorageResult<()> {
        // Nothing is buffered
        Ok(())
    }
}
