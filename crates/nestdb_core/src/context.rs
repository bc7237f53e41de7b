//! Read/write surfaces shared by the direct and batched mutation paths.

use crate::batch::BatchOutcome;
use crate::error::CoreResult;
use nestdb_storage::KvEngine;
use parking_lot::MutexGuard;

/// Where a mutation reads its current state from and sends its writes to.
///
/// The map, table and allocator logic is written once against this trait and
/// runs unchanged against the engine directly or against a
/// [`BatchContext`](crate::BatchContext).
pub(crate) trait WriteContext {
    /// Reads the current value at `key`, including this context's own writes.
    fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>>;

    /// Writes `value` at `key`.
    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> CoreResult<()>;

    /// Removes `key`.
    fn delete(&mut self, key: Vec<u8>) -> CoreResult<()>;

    /// The pending outcome of the batch behind this context, if any.
    ///
    /// `None` means writes are durable as soon as they return.
    fn outcome(&self) -> Option<BatchOutcome> {
        None
    }
}

/// Issues every read and write straight to the engine.
///
/// Each call is its own engine operation; there is no atomicity across calls.
/// The writer lock is held for the lifetime of the context, which keeps the
/// read-modify-write sequences of one database handle serialized.
pub(crate) struct DirectContext<'a> {
    engine: &'a dyn KvEngine,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> DirectContext<'a> {
    pub(crate) fn new(engine: &'a dyn KvEngine, guard: MutexGuard<'a, ()>) -> Self {
        Self {
            engine,
            _guard: guard,
        }
    }
}

impl WriteContext for DirectContext<'_> {
    fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.engine.get(key)?)
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> CoreResult<()> {
        Ok(self.engine.put(&key, &value)?)
    }

    fn delete(&mut self, key: Vec<u8>) -> CoreResult<()> {
        Ok(self.engine.delete(&key)?)
    }
}
