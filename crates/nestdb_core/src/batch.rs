//! Client-side atomic batches with read-your-own-writes.

use crate::context::WriteContext;
use crate::database::Database;
use crate::error::CoreResult;
use nestdb_storage::{Snapshot, WriteBatch};
use parking_lot::MutexGuard;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Whether a batch ended up applied, shared with the map handles it bound.
#[derive(Debug, Clone, Default)]
pub(crate) struct BatchOutcome(Arc<AtomicU8>);

impl BatchOutcome {
    const OPEN: u8 = 0;
    const APPLIED: u8 = 1;
    const DISCARDED: u8 = 2;

    /// Records the final outcome. Only the first call has any effect.
    fn finish(&self, applied: bool) {
        let outcome = if applied {
            Self::APPLIED
        } else {
            Self::DISCARDED
        };
        let _ = self
            .0
            .compare_exchange(Self::OPEN, outcome, Ordering::AcqRel, Ordering::Acquire);
    }

    pub(crate) fn is_applied(&self) -> bool {
        self.0.load(Ordering::Acquire) == Self::APPLIED
    }

    pub(crate) fn is_discarded(&self) -> bool {
        self.0.load(Ordering::Acquire) == Self::DISCARDED
    }
}

/// A unit of atomicity: buffers writes destined for one engine batch.
///
/// A batch context pins the snapshot taken when it was created. Reads through
/// [`BatchContext::get`] see the context's own pending writes first and fall
/// back to that snapshot. Nothing becomes visible to any other reader until
/// [`BatchContext::apply`] succeeds.
///
/// ## Single Writer
///
/// The context holds the database writer lock from creation until it is
/// applied or dropped, so it never interleaves with other mutations issued
/// through the same [`Database`]. Do not call non-batch mutating operations
/// on the same thread while a context is alive; the lock is not re-entrant.
///
/// Dropping a context without applying it discards every buffered write.
/// Maps first bound inside a discarded or failed context become unbound again
/// and get their staged entries back.
pub struct BatchContext<'a> {
    db: &'a Database,
    snapshot: Snapshot,
    batch: WriteBatch,
    /// Pending writes: key -> `Some(value)` for puts, `None` for deletes.
    overlay: HashMap<Vec<u8>, Option<Vec<u8>>>,
    outcome: BatchOutcome,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> BatchContext<'a> {
    pub(crate) fn new(db: &'a Database, guard: MutexGuard<'a, ()>) -> Self {
        // Snapshot after taking the lock so it includes every earlier write
        // made through this database.
        let snapshot = db.engine().snapshot();
        Self {
            db,
            snapshot,
            batch: WriteBatch::new(),
            overlay: HashMap::new(),
            outcome: BatchOutcome::default(),
            _guard: guard,
        }
    }

    /// Returns the database this context writes to.
    #[must_use]
    pub fn database(&self) -> &Database {
        self.db
    }

    /// Returns the snapshot this context reads through.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Reads `key`, preferring this context's pending writes.
    ///
    /// A key deleted within this context reads as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot read fails.
    pub fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        if let Some(pending) = self.overlay.get(key) {
            return Ok(pending.clone());
        }
        Ok(self.snapshot.get(key)?)
    }

    /// Queues a put.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.batch.put(key.clone(), value.clone());
        self.overlay.insert(key, Some(value));
    }

    /// Queues a delete.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.batch.delete(key.clone());
        self.overlay.insert(key, None);
    }

    /// Returns the number of queued engine operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Returns `true` if nothing has been queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Submits every buffered write as one atomic engine batch.
    ///
    /// The context is consumed whether or not the write succeeds.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the batch could not be written; in that
    /// case none of its writes are visible.
    pub fn apply(mut self) -> CoreResult<()> {
        let batch = mem::take(&mut self.batch);
        let ops = batch.len();
        let written = self.db.engine().write(batch);
        self.outcome.finish(written.is_ok());
        written?;
        debug!(ops, "applied batch");
        Ok(())
    }
}

impl Drop for BatchContext<'_> {
    fn drop(&mut self) {
        self.outcome.finish(false);
    }
}

impl WriteContext for BatchContext<'_> {
    fn get(&self, key: &[u8]) -> CoreResult<Option<Vec<u8>>> {
        BatchContext::get(self, key)
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> CoreResult<()> {
        BatchContext::put(self, key, value);
        Ok(())
    }

    fn delete(&mut self, key: Vec<u8>) -> CoreResult<()> {
        BatchContext::delete(self, key);
        Ok(())
    }

    fn outcome(&self) -> Option<BatchOutcome> {
        Some(self.outcome.clone())
    }
}

impl fmt::Debug for BatchContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchContext")
            .field("snapshot", &self.snapshot)
            .field("ops", &self.batch.len())
            .finish()
    }
}
