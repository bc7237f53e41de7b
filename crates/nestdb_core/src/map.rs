//! Countable, iterable nested maps.
//!
//! A map is addressed by its [`InstanceId`] and occupies two physical key
//! ranges: a count cell holding the number of live entries, and a value range
//! holding one encoded [`Value`] per entry key.
//!
//! ## Lifecycle
//!
//! A map starts **unbound**: it has no instance ID and may buffer staged
//! entries in memory. The first time it is persisted (set as a table item, as
//! another map's entry, or mutated with [`Map::set_item`]) it is allocated an
//! ID, its count cell is initialised to zero, and any staged entries are
//! written. From then on it is **bound** and every mutation goes to storage.
//! Binding is idempotent.
//!
//! A map first bound inside a [`BatchContext`] only keeps its ID if that batch
//! is applied. If the batch is dropped or its apply fails, the handle is
//! unbound again with its staged entries restored.

use crate::allocator;
use crate::batch::{BatchContext, BatchOutcome};
use crate::context::WriteContext;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::keys;
use crate::types::InstanceId;
use crate::value::{decode_counter, encode_counter, Value};
use nestdb_storage::{Cursor, Snapshot};
use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use tracing::{debug, error};

#[derive(Debug, Clone)]
enum MapState {
    Unbound {
        pending: BTreeMap<Vec<u8>, Value>,
    },
    Bound {
        id: InstanceId,
    },
    /// Bound inside a batch that may still be discarded.
    Binding {
        id: InstanceId,
        outcome: BatchOutcome,
        staged: BTreeMap<Vec<u8>, Value>,
    },
}

/// A handle to a nested, countable dictionary of typed values.
///
/// Handles are plain values. Two handles decoded from the same stored
/// reference are independent views of the same collection; writes through
/// either are visible to later snapshots taken through the other.
///
/// # Example
///
/// ```rust
/// use nestdb_core::{Database, Value};
///
/// let db = Database::open_in_memory();
/// let mut map = db.new_map();
/// map.set_item(&[0x0a], &mut Value::bytes(vec![1, 2, 3])).unwrap();
///
/// let snapshot = db.snapshot();
/// assert_eq!(map.count(&snapshot).unwrap(), 1);
/// ```
#[derive(Clone)]
pub struct Map {
    db: Database,
    state: MapState,
}

impl Map {
    pub(crate) fn new(db: Database) -> Self {
        Self {
            db,
            state: MapState::Unbound {
                pending: BTreeMap::new(),
            },
        }
    }

    pub(crate) fn bound(db: Database, id: InstanceId) -> Self {
        Self {
            db,
            state: MapState::Bound { id },
        }
    }

    /// Returns the instance ID, or `None` if the map was never persisted.
    #[must_use]
    pub fn instance_id(&self) -> Option<InstanceId> {
        match &self.state {
            MapState::Bound { id } => Some(*id),
            MapState::Binding { id, outcome, .. } if !outcome.is_discarded() => Some(*id),
            _ => None,
        }
    }

    /// Returns `true` once the map has an instance ID.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.instance_id().is_some()
    }

    /// Returns the database this map belongs to.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Buffers an entry in an unbound map, to be written on first persist.
    ///
    /// Staging the same key twice keeps the later value.
    ///
    /// # Errors
    ///
    /// Returns an invalid operation error if the map is already bound; use
    /// [`Map::set_item`] instead.
    pub fn stage_item(&mut self, key: impl Into<Vec<u8>>, value: Value) -> CoreResult<()> {
        self.settle();
        match &mut self.state {
            MapState::Unbound { pending } => {
                pending.insert(key.into(), value);
                Ok(())
            }
            MapState::Bound { id } | MapState::Binding { id, .. } => Err(
                CoreError::invalid_operation(format!("cannot stage entries on persisted {id}")),
            ),
        }
    }

    /// Returns the number of staged entries of an unbound map.
    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staged().map_or(0, BTreeMap::len)
    }

    fn staged(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match &self.state {
            MapState::Unbound { pending } => Some(pending),
            MapState::Binding {
                outcome, staged, ..
            } if outcome.is_discarded() => Some(staged),
            _ => None,
        }
    }

    /// Reads the number of live entries as of `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns a consistency error if the map was never persisted or its
    /// count cell is missing, and a decode error if the cell is malformed.
    pub fn count(&self, snapshot: &Snapshot) -> CoreResult<u64> {
        let id = self.require_bound("count")?;
        match snapshot.get(&keys::map_count_key(id))? {
            Some(bytes) => decode_counter(&bytes, "map count cell"),
            None => Err(missing_count_cell(id)),
        }
    }

    /// Reads the entry at `key` as of `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns a consistency error if the map was never persisted, or a
    /// decode error if the stored value is malformed.
    pub fn get_item(&self, snapshot: &Snapshot, key: &[u8]) -> CoreResult<Option<Value>> {
        let id = self.require_bound("get_item")?;
        match snapshot.get(&keys::map_entry_key(id, key))? {
            Some(bytes) => Value::decode(&self.db, &bytes),
            None => Ok(None),
        }
    }

    /// Writes `value` at `key`, straight to the engine.
    ///
    /// Binds this map first if needed, and binds `value` too if it is an
    /// unpersisted map. Each step is a separate engine write, so a failure
    /// part-way can leave the entry written without its count update; use
    /// [`Map::batch_set_item`] when that matters.
    ///
    /// # Errors
    ///
    /// Returns a consistency error if the count cell is missing, or any
    /// engine error.
    pub fn set_item(&mut self, key: &[u8], value: &mut Value) -> CoreResult<()> {
        let db = self.db.clone();
        let mut ctx = db.direct();
        let id = self.bind(&mut ctx)?;
        set_entry(&mut ctx, id, key, value)
    }

    /// Queues a write of `value` at `key` into `batch`.
    ///
    /// The count read, the existence check, the entry write and the count
    /// update all go through `batch` and land in one atomic engine write.
    ///
    /// # Errors
    ///
    /// Returns an invalid operation error if `batch` belongs to another
    /// database, a consistency error if the count cell is missing, or a
    /// snapshot read error.
    pub fn batch_set_item(
        &mut self,
        batch: &mut BatchContext<'_>,
        key: &[u8],
        value: &mut Value,
    ) -> CoreResult<()> {
        self.db.ensure_same(batch.database())?;
        let id = self.bind(batch)?;
        set_entry(batch, id, key, value)
    }

    /// Opens an iterator over this map's entries as of `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns a consistency error if the map was never persisted.
    pub fn get_iterator(&self, snapshot: &Snapshot) -> CoreResult<MapIterator> {
        let id = self.require_bound("get_iterator")?;
        Ok(MapIterator::new(
            self.db.clone(),
            snapshot.clone(),
            keys::map_values_prefix(id),
        ))
    }

    /// Returns the raw seek key of this map's value range.
    ///
    /// Every entry's physical key starts with these bytes.
    ///
    /// # Errors
    ///
    /// Returns a consistency error if the map was never persisted.
    pub fn get_begin_seek(&self) -> CoreResult<Vec<u8>> {
        let id = self.require_bound("get_begin_seek")?;
        Ok(keys::map_values_prefix(id))
    }

    /// Binds the map to an instance ID, writing staged entries.
    ///
    /// Returns the existing ID without touching storage if already bound.
    /// The handle stays unbound, with every staged entry, until all of them
    /// have been written.
    pub(crate) fn bind(&mut self, ctx: &mut dyn WriteContext) -> CoreResult<InstanceId> {
        self.settle();
        let pending = match &mut self.state {
            MapState::Bound { id } | MapState::Binding { id, .. } => return Ok(*id),
            MapState::Unbound { pending } => pending,
        };

        let id = allocator::allocate(ctx)?;
        ctx.put(keys::map_count_key(id), encode_counter(0))?;
        for (key, value) in pending.iter_mut() {
            set_entry(ctx, id, key, value)?;
        }

        let staged = mem::take(pending);
        let staged_len = staged.len();
        self.state = match ctx.outcome() {
            Some(outcome) => MapState::Binding {
                id,
                outcome,
                staged,
            },
            None => MapState::Bound { id },
        };

        debug!(instance = %id, staged = staged_len, "bound map");
        Ok(id)
    }

    /// Resolves a binding made inside a batch that has since finished.
    fn settle(&mut self) {
        let MapState::Binding { id, outcome, .. } = &self.state else {
            return;
        };
        let id = *id;
        if outcome.is_applied() {
            self.state = MapState::Bound { id };
        } else if outcome.is_discarded() {
            let state = mem::replace(&mut self.state, MapState::Bound { id });
            if let MapState::Binding { staged, .. } = state {
                debug!(instance = %id, "batch discarded, map unbound again");
                self.state = MapState::Unbound { pending: staged };
            }
        }
    }

    fn require_bound(&self, op: &str) -> CoreResult<InstanceId> {
        self.instance_id().ok_or_else(|| {
            let err = CoreError::consistency(format!("{op} on a map that was never persisted"));
            error!(%err, "map used before first persist");
            err
        })
    }
}

impl PartialEq for Map {
    fn eq(&self, other: &Self) -> bool {
        match (self.instance_id(), other.instance_id()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.staged() == other.staged(),
            _ => false,
        }
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance_id() {
            Some(id) => write!(f, "Map({id})"),
            None => f
                .debug_struct("Map")
                .field("staged", &self.staged_len())
                .finish(),
        }
    }
}

/// Read count, check existence, write, bump count.
fn set_entry(
    ctx: &mut dyn WriteContext,
    id: InstanceId,
    key: &[u8],
    value: &mut Value,
) -> CoreResult<()> {
    let count_key = keys::map_count_key(id);
    let count = match ctx.get(&count_key)? {
        Some(bytes) => decode_counter(&bytes, "map count cell")?,
        None => return Err(missing_count_cell(id)),
    };

    let entry_key = keys::map_entry_key(id, key);
    let existed = ctx.get(&entry_key)?.is_some_and(|b| !b.is_empty());
    let bumped = if existed {
        None
    } else {
        let next = count.checked_add(1).ok_or_else(|| {
            let err = CoreError::consistency(format!("count cell of {id} is saturated"));
            error!(instance = %id, count, "map count cell overflow");
            err
        })?;
        Some(next)
    };

    value.bind(ctx)?;
    ctx.put(entry_key, value.encode()?)?;

    if let Some(next) = bumped {
        ctx.put(count_key, encode_counter(next))?;
    }
    Ok(())
}

fn missing_count_cell(id: InstanceId) -> CoreError {
    let err = CoreError::consistency(format!("count cell of {id} is missing"));
    error!(instance = %id, "map count cell missing");
    err
}

/// Where a [`MapIterator`] is in its walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    /// Created, cursor not yet positioned.
    Seeking,
    /// On an entry of this map.
    Positioned,
    /// Past the last entry of this map.
    Exhausted,
}

/// A forward cursor over one map's entries, bounded by its key prefix.
///
/// Entries are visited in ascending byte order of their entry keys. The
/// iterator holds the snapshot it was opened with and never sees later
/// writes.
///
/// ```rust
/// use nestdb_core::{Database, Value};
///
/// let db = Database::open_in_memory();
/// let mut map = db.new_map();
/// map.set_item(b"b", &mut Value::bytes(b"2".to_vec())).unwrap();
/// map.set_item(b"a", &mut Value::bytes(b"1".to_vec())).unwrap();
///
/// let mut iter = map.get_iterator(&db.snapshot()).unwrap();
/// let mut keys = Vec::new();
/// while iter.is_valid() {
///     keys.push(iter.key().to_vec());
///     iter.next();
/// }
/// assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
/// ```
pub struct MapIterator {
    db: Database,
    snapshot: Snapshot,
    cursor: Box<dyn Cursor>,
    prefix: Vec<u8>,
    state: IterState,
}

impl MapIterator {
    fn new(db: Database, snapshot: Snapshot, prefix: Vec<u8>) -> Self {
        let cursor = snapshot.iter();
        let mut iter = Self {
            db,
            snapshot,
            cursor,
            prefix,
            state: IterState::Seeking,
        };
        iter.cursor.seek(&iter.prefix);
        iter.settle();
        iter
    }

    fn settle(&mut self) {
        self.state = if self.cursor.valid() && self.cursor.key().starts_with(&self.prefix) {
            IterState::Positioned
        } else {
            IterState::Exhausted
        };
    }

    /// Returns the iterator's state.
    #[must_use]
    pub fn state(&self) -> IterState {
        self.state
    }

    /// Returns `true` while positioned on an entry of this map.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state == IterState::Positioned
    }

    /// Returns the current entry key, or an empty slice when not valid.
    #[must_use]
    pub fn key(&self) -> &[u8] {
        if self.is_valid() {
            &self.cursor.key()[self.prefix.len()..]
        } else {
            &[]
        }
    }

    /// Decodes the current entry's value.
    ///
    /// # Errors
    ///
    /// Returns an invalid operation error when not valid, or a decode error
    /// if the stored value is malformed or empty.
    pub fn value(&self) -> CoreResult<Value> {
        if !self.is_valid() {
            return Err(CoreError::invalid_operation("map iterator is not positioned"));
        }
        Value::decode(&self.db, self.cursor.value())?
            .ok_or_else(|| CoreError::decode("empty value in map entry"))
    }

    /// Advances to the next entry. No-op once exhausted.
    pub fn next(&mut self) {
        if self.is_valid() {
            self.cursor.next();
            self.settle();
        }
    }

    /// Returns the engine cursor's error status.
    ///
    /// # Errors
    ///
    /// Returns the engine error that ended iteration early, if any.
    pub fn status(&self) -> CoreResult<()> {
        Ok(self.cursor.status()?)
    }

    /// Returns the snapshot this iterator reads.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Converts the cursor into a standard iterator of decoded entries.
    ///
    /// A decode or engine error is yielded once and ends the iteration.
    #[must_use]
    pub fn entries(self) -> Entries {
        Entries {
            inner: self,
            failed: false,
        }
    }
}

impl fmt::Debug for MapIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapIterator")
            .field("prefix", &self.prefix)
            .field("state", &self.state)
            .finish()
    }
}

/// Standard iterator over a map's `(entry key, value)` pairs.
///
/// Created by [`MapIterator::entries`].
#[derive(Debug)]
pub struct Entries {
    inner: MapIterator,
    failed: bool,
}

impl Iterator for Entries {
    type Item = CoreResult<(Vec<u8>, Value)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if !self.inner.is_valid() {
            if let Err(err) = self.inner.status() {
                self.failed = true;
                return Some(Err(err));
            }
            return None;
        }
        let key = self.inner.key().to_vec();
        match self.inner.value() {
            Ok(value) => {
                self.inner.next();
                Some(Ok((key, value)))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
