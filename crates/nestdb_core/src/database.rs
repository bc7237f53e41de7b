//! Database facade.

use crate::batch::BatchContext;
use crate::config::Config;
use crate::context::DirectContext;
use crate::error::{CoreError, CoreResult};
use crate::map::Map;
use crate::table::Table;
use nestdb_storage::{KvEngine, LogEngine, MemoryEngine, Snapshot, LOG_FILE};
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// The main database handle.
///
/// `Database` wraps one engine and is the entry point for tables, maps and
/// batches. Handles are cheap to clone; clones share the engine and the
/// writer lock.
///
/// ## Single-Writer Guarantee
///
/// Map counts and the instance allocator are maintained with plain
/// read-modify-write sequences, which the engine does not make atomic. Every
/// mutating operation therefore holds this handle's writer lock for its whole
/// sequence, and a [`BatchContext`] holds it until applied or dropped.
///
/// The lock covers one `Database` and its clones. Opening two independent
/// handles over the same engine and writing through both is not supported;
/// [`LogEngine`] refuses a second open of the same directory.
///
/// # Opening a Database
///
/// ```rust,no_run
/// use nestdb_core::{Database, Value};
/// use std::path::Path;
///
/// let db = Database::open(Path::new("my_database"))?;
/// let table = db.table(b"accounts".to_vec())?;
/// table.put_item(b"alice", &mut Value::bytes(b"42".to_vec()))?;
/// # Ok::<(), nestdb_core::CoreError>(())
/// ```
///
/// # In-Memory Databases
///
/// For testing, use `Database::open_in_memory()`:
///
/// ```rust
/// let db = nestdb_core::Database::open_in_memory();
/// ```
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

struct DatabaseInner {
    config: Config,
    engine: Arc<dyn KvEngine>,
    /// Write lock - only one writer at a time.
    write_lock: Mutex<()>,
}

impl Database {
    /// Opens a persistent database in the directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another handle has the directory locked
    /// - The batch log cannot be read or repaired
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a persistent database with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory is missing and `create_if_missing` is false
    /// - The database exists and `error_if_exists` is true
    /// - Another handle has the directory locked
    /// - The batch log cannot be read or repaired
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use nestdb_core::{Config, Database};
    /// use std::path::Path;
    ///
    /// let config = Config::default()
    ///     .create_if_missing(true)
    ///     .sync_on_write(false);
    ///
    /// let db = Database::open_with_config(Path::new("my_database"), config)?;
    /// # Ok::<(), nestdb_core::CoreError>(())
    /// ```
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        if config.error_if_exists && path.join(LOG_FILE).exists() {
            return Err(CoreError::invalid_operation(format!(
                "database already exists at {}",
                path.display()
            )));
        }
        let engine = LogEngine::open(path, config.log_options())?;
        Ok(Self::with_engine_and_config(Arc::new(engine), config))
    }

    /// Opens an empty in-memory database.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::with_engine(Arc::new(MemoryEngine::new()))
    }

    /// Wraps an existing engine.
    #[must_use]
    pub fn with_engine(engine: Arc<dyn KvEngine>) -> Self {
        Self::with_engine_and_config(engine, Config::default())
    }

    /// Wraps an existing engine with custom configuration.
    #[must_use]
    pub fn with_engine_and_config(engine: Arc<dyn KvEngine>, config: Config) -> Self {
        Self {
            inner: Arc::new(DatabaseInner {
                config,
                engine,
                write_lock: Mutex::new(()),
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the underlying engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<dyn KvEngine> {
        &self.inner.engine
    }

    /// Takes a point-in-time snapshot for reads.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.inner.engine.snapshot()
    }

    /// Returns a table with the given prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTablePrefix`] if `prefix` contains `0x00`.
    pub fn table(&self, prefix: impl Into<Vec<u8>>) -> CoreResult<Table> {
        Table::new(self.clone(), prefix)
    }

    /// Creates an empty, not yet persisted map.
    #[must_use]
    pub fn new_map(&self) -> Map {
        Map::new(self.clone())
    }

    /// Starts a batch, blocking until the writer lock is free.
    #[must_use]
    pub fn batch(&self) -> BatchContext<'_> {
        BatchContext::new(self, self.inner.write_lock.lock())
    }

    /// Starts a batch if no other writer is active.
    #[must_use]
    pub fn try_batch(&self) -> Option<BatchContext<'_>> {
        let guard = self.inner.write_lock.try_lock()?;
        Some(BatchContext::new(self, guard))
    }

    /// Flushes the engine to durable storage.
    ///
    /// # Errors
    ///
    /// Returns any engine error.
    pub fn flush(&self) -> CoreResult<()> {
        Ok(self.inner.engine.flush()?)
    }

    /// Returns `true` if both handles share one engine and writer lock.
    #[must_use]
    pub fn same_database(&self, other: &Database) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn direct(&self) -> DirectContext<'_> {
        DirectContext::new(self.inner.engine.as_ref(), self.inner.write_lock.lock())
    }

    pub(crate) fn ensure_same(&self, other: &Database) -> CoreResult<()> {
        if self.same_database(other) {
            Ok(())
        } else {
            Err(CoreError::invalid_operation(
                "batch belongs to a different database",
            ))
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
