//! Cross-crate integration test helpers.
//!
//! Provides a model-checked harness that mirrors every write into plain
//! `BTreeMap`s and compares the database against them.

use nestdb_core::{Database, Map, Table, Value};
use std::collections::BTreeMap;

/// A test harness tracking one table and one map against in-memory models.
pub struct IntegrationHarness {
    /// The database instance.
    pub db: Database,
    table: Table,
    map: Map,
    items: BTreeMap<Vec<u8>, Vec<u8>>,
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl IntegrationHarness {
    /// Key the tracked map is stored under.
    pub const MAP_ITEM: &'static [u8] = b"__harness_map";

    /// Creates a new harness with an in-memory database.
    pub fn new() -> Self {
        Self::with_database(Database::open_in_memory(), b"harness")
    }

    /// Creates a harness over `db` using a table with `prefix`.
    ///
    /// An empty map is stored at [`Self::MAP_ITEM`] immediately.
    pub fn with_database(db: Database, prefix: &[u8]) -> Self {
        let table = db.table(prefix.to_vec()).expect("Failed to create table");
        let mut value = Value::from(db.new_map());
        table
            .put_item(Self::MAP_ITEM, &mut value)
            .expect("Failed to store harness map");
        let map = value.into_map().expect("Stored value should be a map");

        Self {
            db,
            table,
            map,
            items: BTreeMap::new(),
            entries: BTreeMap::new(),
        }
    }

    /// Returns the tracked table.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Returns the tracked map.
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Puts a bytes item and tracks it.
    pub fn put(&mut self, key: &[u8], payload: Vec<u8>) {
        assert_ne!(key, Self::MAP_ITEM, "Key is reserved by the harness");
        self.table
            .put_item(key, &mut Value::bytes(payload.clone()))
            .expect("Failed to put item");
        self.items.insert(key.to_vec(), payload);
    }

    /// Deletes an item and updates tracking.
    pub fn delete(&mut self, key: &[u8]) {
        assert_ne!(key, Self::MAP_ITEM, "Key is reserved by the harness");
        self.table.delete_item(key).expect("Failed to delete item");
        self.items.remove(key);
    }

    /// Sets a bytes entry in the tracked map.
    pub fn set_entry(&mut self, key: &[u8], payload: Vec<u8>) {
        self.map
            .set_item(key, &mut Value::bytes(payload.clone()))
            .expect("Failed to set entry");
        self.entries.insert(key.to_vec(), payload);
    }

    /// Verifies every tracked item, the map count and the full map contents.
    pub fn verify_all(&self) {
        let snapshot = self.db.snapshot();

        for (key, expected) in &self.items {
            let actual = self
                .table
                .get_item(&snapshot, key)
                .expect("Failed to get item");
            assert_eq!(
                actual,
                Some(Value::bytes(expected.clone())),
                "Item mismatch for {key:?}"
            );
        }

        let count = self.map.count(&snapshot).expect("Failed to read count");
        assert_eq!(count, self.entries.len() as u64, "Map count mismatch");

        let actual: Vec<(Vec<u8>, Value)> = self
            .map
            .get_iterator(&snapshot)
            .expect("Failed to open iterator")
            .entries()
            .collect::<Result<_, _>>()
            .expect("Iteration failed");
        let expected: Vec<(Vec<u8>, Value)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::bytes(v.clone())))
            .collect();
        assert_eq!(actual, expected, "Map contents mismatch");
    }

    /// Returns the number of tracked items.
    pub fn tracked_items(&self) -> usize {
        self.items.len()
    }

    /// Returns the number of tracked map entries.
    pub fn tracked_entries(&self) -> usize {
        self.entries.len()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch atomicity checks.
pub mod batch {
    use super::*;
    use crate::fixtures::TestDatabase;

    /// Verifies that a dropped batch leaves no trace.
    pub fn test_dropped_batch(db: &Database) {
        let table = db.table(b"drop".to_vec()).expect("Failed to create table");
        let before = db.snapshot().sequence();

        {
            let mut batch = db.batch();
            let mut value = Value::from(db.new_map());
            table
                .batch_put_item(&mut batch, b"m", &mut value)
                .expect("Failed to stage map");
            value
                .as_map_mut()
                .expect("Value should be a map")
                .batch_set_item(&mut batch, b"e", &mut Value::bytes(b"1".to_vec()))
                .expect("Failed to stage entry");
        }

        let snapshot = db.snapshot();
        assert_eq!(snapshot.sequence(), before, "Engine saw a write");
        assert!(table.get_item(&snapshot, b"m").expect("Failed to get").is_none());
    }

    /// Verifies that a batch rejected by the engine leaves no trace, and
    /// that the same work succeeds once the engine recovers.
    pub fn test_failed_apply() {
        let (test_db, engine) = TestDatabase::faulty();
        let table = test_db.table(b"fail".to_vec()).expect("Failed to create table");

        let stage = |db: &Database| {
            let mut batch = db.batch();
            let mut value = Value::from(db.new_map());
            table
                .batch_put_item(&mut batch, b"m", &mut value)
                .expect("Failed to stage map");
            let map = value.as_map_mut().expect("Value should be a map");
            for key in [b"a", b"b", b"c"] {
                map.batch_set_item(&mut batch, key, &mut Value::bytes(key.to_vec()))
                    .expect("Failed to stage entry");
            }
            batch.apply()
        };

        engine.set_fail_writes(true);
        assert!(stage(&test_db).is_err());
        assert!(engine.inner().is_empty(), "Failed batch left writes behind");

        engine.set_fail_writes(false);
        stage(&test_db).expect("Retry should succeed");

        let snapshot = test_db.snapshot();
        let value = table
            .get_item(&snapshot, b"m")
            .expect("Failed to get")
            .expect("Map item should exist");
        let map = value.as_map().expect("Value should be a map");
        assert_eq!(map.count(&snapshot).expect("Failed to count"), 3);
    }
}
