//! Point-in-time views and ordered cursors.

use crate::batch::{BatchOp, WriteBatch};
use crate::error::StorageResult;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

/// A read-only point-in-time view exposed by an engine.
///
/// Implementations must be immutable: every read through the same view
/// observes the same data regardless of later writes to the engine.
pub trait SnapshotView: Send + Sync {
    /// Reads the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to read.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Opens an unpositioned cursor over this view.
    ///
    /// The cursor keeps the view alive for as long as it exists.
    fn cursor(self: Arc<Self>) -> Box<dyn Cursor>;

    /// Returns the engine sequence number this view was taken at.
    fn sequence(&self) -> u64;
}

/// A forward cursor over a snapshot's keys in byte-lexicographic order.
///
/// A fresh cursor is not positioned; call [`Cursor::seek`] first.
pub trait Cursor: Send {
    /// Positions the cursor at the first key `>= target`.
    fn seek(&mut self, target: &[u8]);

    /// Advances to the next key. No-op when not valid.
    fn next(&mut self);

    /// Returns `true` while positioned on an entry.
    fn valid(&self) -> bool;

    /// Returns the current key, or an empty slice when not valid.
    fn key(&self) -> &[u8];

    /// Returns the current value, or an empty slice when not valid.
    fn value(&self) -> &[u8];

    /// Returns the first error the cursor ran into, if any.
    ///
    /// A cursor that hit an error reports `valid() == false`.
    fn status(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// A cheaply clonable handle to a [`SnapshotView`].
#[derive(Clone)]
pub struct Snapshot {
    view: Arc<dyn SnapshotView>,
}

impl Snapshot {
    /// Wraps an engine-specific view.
    pub fn new(view: Arc<dyn SnapshotView>) -> Self {
        Self { view }
    }

    /// Reads the value stored at `key` as of this snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to read.
    pub fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.view.get(key)
    }

    /// Opens a cursor over this snapshot.
    #[must_use]
    pub fn iter(&self) -> Box<dyn Cursor> {
        Arc::clone(&self.view).cursor()
    }

    /// Returns the engine sequence number of this snapshot.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.view.sequence()
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("sequence", &self.sequence())
            .finish()
    }
}

/// Sorted in-memory key space shared by the reference engines.
///
/// Snapshots share the underlying map through an [`Arc`]; a write after a
/// snapshot was taken clones the map once (copy-on-write).
#[derive(Debug, Clone, Default)]
pub(crate) struct MemTable {
    entries: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
    sequence: u64,
}

impl MemTable {
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    /// Applies every op of `batch` and bumps the sequence number.
    pub(crate) fn apply(&mut self, batch: WriteBatch) {
        let entries = Arc::make_mut(&mut self.entries);
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        self.sequence += 1;
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot::new(Arc::new(MemView {
            entries: Arc::clone(&self.entries),
            sequence: self.sequence,
        }))
    }
}

struct MemView {
    entries: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
    sequence: u64,
}

impl SnapshotView for MemView {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn cursor(self: Arc<Self>) -> Box<dyn Cursor> {
        Box::new(MemCursor {
            entries: Arc::clone(&self.entries),
            current: None,
        })
    }

    fn sequence(&self) -> u64 {
        self.sequence
    }
}

struct MemCursor {
    entries: Arc<BTreeMap<Vec<u8>, Vec<u8>>>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl MemCursor {
    fn position(&mut self, lower: Bound<&[u8]>) {
        self.current = self
            .entries
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .map(|(k, v)| (k.clone(), v.clone()));
    }
}

impl Cursor for MemCursor {
    fn seek(&mut self, target: &[u8]) {
        self.position(Bound::Included(target));
    }

    fn next(&mut self) {
        if let Some((key, _)) = self.current.take() {
            self.position(Bound::Excluded(key.as_slice()));
        }
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(k, _)| k.as_slice())
    }

    fn value(&self) -> &[u8] {
        self.current.as_ref().map_or(&[][..], |(_, v)| v.as_slice())
    }
}
