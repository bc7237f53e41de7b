//! Key-value engine trait definition.

use crate::batch::WriteBatch;
use crate::error::StorageResult;
use crate::snapshot::Snapshot;

/// An ordered byte-key → byte-value engine.
///
/// Engines are **opaque byte stores**. They know nothing about tables, maps
/// or value tags; NestDB owns all key and value interpretation.
///
/// # Invariants
///
/// - `write` applies a whole batch or nothing
/// - a [`Snapshot`] never observes writes made after it was taken
/// - cursors visit keys in ascending byte-lexicographic order
/// - engines must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::MemoryEngine`] - For testing and ephemeral data
/// - [`super::LogEngine`] - For persistent storage
pub trait KvEngine: Send + Sync {
    /// Takes a point-in-time snapshot of the whole key space.
    fn snapshot(&self) -> Snapshot;

    /// Applies every operation in `batch` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be made durable. In that case
    /// none of its operations are visible.
    fn write(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Reads the latest committed value at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to read.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.snapshot().get(key)
    }

    /// Writes a single key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(batch)
    }

    /// Removes a single key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(batch)
    }

    /// Forces buffered data to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()>;
}
