//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use nestdb_core::Database;
use nestdb_storage::{
    KvEngine, MemoryEngine, Snapshot, StorageError, StorageResult, WriteBatch,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory(),
            _temp_dir: None,
        }
    }

    /// Creates a new file-based test database in a fresh temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(temp_dir.path()).expect("Failed to open file database");
        Self {
            db,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Creates a database over a [`FaultyEngine`], returning both.
    pub fn faulty() -> (Self, Arc<FaultyEngine>) {
        let engine = Arc::new(FaultyEngine::new());
        let db = Database::with_engine(engine.clone());
        (
            Self {
                db,
                _temp_dir: None,
            },
            engine,
        )
    }

    /// Returns the database directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use nestdb_testkit::with_temp_db;
///
/// with_temp_db(|db| {
///     let table = db.table(b"test".to_vec()).unwrap();
///     assert_eq!(table.prefix(), b"test");
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database.
///
/// The closure receives the database directory so it can reopen it.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// A [`MemoryEngine`] that can be told to reject writes.
///
/// While failing, `write` returns [`StorageError::Io`] and leaves the inner
/// engine untouched, which models a batch that never became durable.
/// A write budget lets a fixed number of writes through before failures start.
#[derive(Debug)]
pub struct FaultyEngine {
    inner: MemoryEngine,
    fail_writes: AtomicBool,
    budget: AtomicUsize,
    rejected: AtomicUsize,
}

const UNLIMITED: usize = usize::MAX;

impl Default for FaultyEngine {
    fn default() -> Self {
        Self {
            inner: MemoryEngine::new(),
            fail_writes: AtomicBool::new(false),
            budget: AtomicUsize::new(UNLIMITED),
            rejected: AtomicUsize::new(0),
        }
    }
}

impl FaultyEngine {
    /// Creates a healthy engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Turns write failures on or off. Turning them off also clears any
    /// write budget.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
        if !fail {
            self.budget.store(UNLIMITED, Ordering::SeqCst);
        }
    }

    /// Lets the next `writes` writes succeed and rejects every one after.
    pub fn fail_after(&self, writes: usize) {
        self.budget.store(writes, Ordering::SeqCst);
    }

    fn take_budget(&self) -> bool {
        self.budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                UNLIMITED => Some(UNLIMITED),
                0 => None,
                n => Some(n - 1),
            })
            .is_ok()
    }

    /// Returns how many writes have been rejected.
    pub fn rejected_writes(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    /// Returns the wrapped engine.
    pub fn inner(&self) -> &MemoryEngine {
        &self.inner
    }
}

impl KvEngine for FaultyEngine {
    fn snapshot(&self) -> Snapshot {
        self.inner.snapshot()
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) || !self.take_budget() {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::Io(std::io::Error::other(
                "injected write failure",
            )));
        }
        self.inner.write(batch)
    }

    fn flush(&self) -> StorageResult<()> {
        self.inner.flush()
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use nestdb_core::{Map, Table, Value};

    /// Creates a database with one table holding `item_count` bytes items.
    ///
    /// Item `i` is stored at key `item-{i:04}` with payload `value-{i}`.
    pub fn populated_table(prefix: &[u8], item_count: usize) -> (TestDatabase, Table) {
        let test_db = TestDatabase::memory();
        let table = test_db
            .table(prefix.to_vec())
            .expect("Failed to create table");

        let mut batch = test_db.batch();
        for i in 0..item_count {
            let key = format!("item-{i:04}").into_bytes();
            let mut value = Value::bytes(format!("value-{i}").into_bytes());
            table
                .batch_put_item(&mut batch, &key, &mut value)
                .expect("Failed to stage item");
        }
        batch.apply().expect("Failed to apply batch");

        (test_db, table)
    }

    /// Stores a map with `entry_count` entries at `key` in `table` and
    /// returns the bound handle.
    ///
    /// Entry `i` is stored at key `entry-{i:04}` with payload `{i}`.
    pub fn stored_map(table: &Table, key: &[u8], entry_count: usize) -> Map {
        let mut value = Value::from(table.database().new_map());
        table.put_item(key, &mut value).expect("Failed to store map");

        let mut map = value.into_map().expect("Stored value should be a map");
        for i in 0..entry_count {
            let entry = format!("entry-{i:04}").into_bytes();
            map.set_item(&entry, &mut Value::bytes(i.to_string().into_bytes()))
                .expect("Failed to set entry");
        }
        map
    }
}
