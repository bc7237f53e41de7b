//! Namespaced tables of typed items.

use crate::batch::BatchContext;
use crate::context::WriteContext;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::keys::{self, KeyTag, PREFIX_SEPARATOR};
use crate::value::Value;
use nestdb_storage::Snapshot;
use std::fmt;

/// A namespace over the engine's key space.
///
/// Every item key is `0x01 ++ prefix ++ 0x00 ++ key`. Because a prefix may
/// not contain `0x00`, items of two tables with distinct prefixes can never
/// collide, even when one prefix is a prefix of the other.
///
/// Deleting an item that references a map leaves the map's cells in place;
/// nothing reclaims orphaned map instances.
#[derive(Clone)]
pub struct Table {
    db: Database,
    prefix: Vec<u8>,
}

impl Table {
    /// Creates a table over `db` with the given prefix.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTablePrefix`] if `prefix` contains `0x00`.
    pub fn new(db: Database, prefix: impl Into<Vec<u8>>) -> CoreResult<Self> {
        let prefix = prefix.into();
        if prefix.contains(&PREFIX_SEPARATOR) {
            return Err(CoreError::InvalidTablePrefix { prefix });
        }
        Ok(Self { db, prefix })
    }

    /// Returns the table prefix.
    #[must_use]
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Returns the database this table belongs to.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Computes the physical key for `key` under this table's prefix.
    #[must_use]
    pub fn calc_key(&self, tag: KeyTag, key: &[u8]) -> Vec<u8> {
        keys::table_key(tag, &self.prefix, key)
    }

    /// Reads the item at `key` as of `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the stored value is malformed, or any
    /// engine read error.
    pub fn get_item(&self, snapshot: &Snapshot, key: &[u8]) -> CoreResult<Option<Value>> {
        match snapshot.get(&self.calc_key(KeyTag::Item, key))? {
            Some(bytes) => Value::decode(&self.db, &bytes),
            None => Ok(None),
        }
    }

    /// Writes `value` at `key`, binding it first if it is an unpersisted map.
    ///
    /// # Errors
    ///
    /// Returns any engine error.
    pub fn put_item(&self, key: &[u8], value: &mut Value) -> CoreResult<()> {
        let mut ctx = self.db.direct();
        self.put_with(&mut ctx, key, value)
    }

    /// Queues a write of `value` at `key` into `batch`.
    ///
    /// # Errors
    ///
    /// Returns an invalid operation error if `batch` belongs to another
    /// database, or a snapshot read error from allocation.
    pub fn batch_put_item(
        &self,
        batch: &mut BatchContext<'_>,
        key: &[u8],
        value: &mut Value,
    ) -> CoreResult<()> {
        self.db.ensure_same(batch.database())?;
        self.put_with(batch, key, value)
    }

    /// Removes the item at `key`.
    ///
    /// # Errors
    ///
    /// Returns any engine error.
    pub fn delete_item(&self, key: &[u8]) -> CoreResult<()> {
        let mut ctx = self.db.direct();
        ctx.delete(self.calc_key(KeyTag::Item, key))
    }

    /// Queues removal of the item at `key` into `batch`.
    ///
    /// # Errors
    ///
    /// Returns an invalid operation error if `batch` belongs to another
    /// database.
    pub fn batch_delete_item(&self, batch: &mut BatchContext<'_>, key: &[u8]) -> CoreResult<()> {
        self.db.ensure_same(batch.database())?;
        batch.delete(self.calc_key(KeyTag::Item, key));
        Ok(())
    }

    fn put_with(
        &self,
        ctx: &mut dyn WriteContext,
        key: &[u8],
        value: &mut Value,
    ) -> CoreResult<()> {
        value.bind(ctx)?;
        ctx.put(self.calc_key(KeyTag::Item, key), value.encode()?)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstanceId;

    #[test]
    fn prefix_with_separator_is_rejected() {
        let db = Database::open_in_memory();
        let result = Table::new(db, vec![0x03, 0x00, 0x04]);
        assert!(matches!(
            result,
            Err(CoreError::InvalidTablePrefix { .. })
        ));
    }

    #[test]
    fn put_then_get_bytes() {
        let db = Database::open_in_memory();
        let table = Table::new(db.clone(), vec![0x03]).unwrap();

        table
            .put_item(&[0x01, 0x02], &mut Value::bytes(vec![0xAA, 0xBB]))
            .unwrap();

        assert_eq!(
            table.get_item(&db.snapshot(), &[0x01, 0x02]).unwrap(),
            Some(Value::bytes(vec![0xAA, 0xBB]))
        );
        assert_eq!(
            db.engine().get(&[0x01, 0x03, 0x00, 0x01, 0x02]).unwrap(),
            Some(vec![0x01, 0xAA, 0xBB])
        );
    }

    #[test]
    fn tables_are_isolated() {
        let db = Database::open_in_memory();
        let a = Table::new(db.clone(), b"a".to_vec()).unwrap();
        let ab = Table::new(db.clone(), b"ab".to_vec()).unwrap();

        a.put_item(b"bk", &mut Value::bytes(b"from a".to_vec()))
            .unwrap();

        let snapshot = db.snapshot();
        assert_eq!(ab.get_item(&snapshot, b"k").unwrap(), None);
        assert_eq!(ab.get_item(&snapshot, b"bk").unwrap(), None);
    }

    #[test]
    fn delete_removes_item_but_not_map() {
        let db = Database::open_in_memory();
        let table = db.table(b"t".to_vec()).unwrap();

        let mut map = db.new_map();
        map.stage_item(b"e".to_vec(), Value::bytes(b"1".to_vec()))
            .unwrap();
        let mut value = Value::from(map);
        table.put_item(b"m", &mut value).unwrap();
        let map = value.into_map().unwrap();

        table.delete_item(b"m").unwrap();

        let snapshot = db.snapshot();
        assert_eq!(table.get_item(&snapshot, b"m").unwrap(), None);
        assert_eq!(map.count(&snapshot).unwrap(), 1);
    }

    #[test]
    fn map_item_roundtrips_as_reference() {
        let db = Database::open_in_memory();
        let table = db.table(b"t".to_vec()).unwrap();

        let mut value = Value::from(db.new_map());
        table.put_item(b"m", &mut value).unwrap();
        assert_eq!(
            value.as_map().unwrap().instance_id(),
            Some(InstanceId::new(1))
        );

        let loaded = table.get_item(&db.snapshot(), b"m").unwrap().unwrap();
        assert_eq!(loaded, value);
        assert_eq!(loaded.as_map().unwrap().count(&db.snapshot()).unwrap(), 0);
    }

    #[test]
    fn rebinding_a_map_does_not_allocate_again() {
        let db = Database::open_in_memory();
        let table = db.table(b"t".to_vec()).unwrap();

        let mut value = Value::from(db.new_map());
        table.put_item(b"one", &mut value).unwrap();
        table.put_item(b"two", &mut value).unwrap();

        let snapshot = db.snapshot();
        let one = table.get_item(&snapshot, b"one").unwrap().unwrap();
        let two = table.get_item(&snapshot, b"two").unwrap().unwrap();
        assert_eq!(one, two);
        assert_eq!(
            crate::allocator::next_instance_id(&snapshot).unwrap(),
            InstanceId::new(2)
        );
    }

    #[test]
    fn batch_put_and_delete_are_deferred() {
        let db = Database::open_in_memory();
        let table = db.table(b"t".to_vec()).unwrap();
        table
            .put_item(b"old", &mut Value::bytes(b"1".to_vec()))
            .unwrap();

        let mut batch = db.batch();
        table
            .batch_put_item(&mut batch, b"new", &mut Value::bytes(b"2".to_vec()))
            .unwrap();
        table.batch_delete_item(&mut batch, b"old").unwrap();

        let before = db.snapshot();
        assert!(table.get_item(&before, b"new").unwrap().is_none());
        assert!(table.get_item(&before, b"old").unwrap().is_some());

        batch.apply().unwrap();

        let after = db.snapshot();
        assert!(table.get_item(&after, b"new").unwrap().is_some());
        assert!(table.get_item(&after, b"old").unwrap().is_none());
    }

    #[test]
    fn calc_key_uses_prefix_and_separator() {
        let db = Database::open_in_memory();
        let table = db.table(vec![0x03]).unwrap();
        assert_eq!(
            table.calc_key(KeyTag::Item, &[0x01, 0x02]),
            vec![0x01, 0x03, 0x00, 0x01, 0x02]
        );
    }

    #[test]
    fn corrupt_item_is_decode_error() {
        let db = Database::open_in_memory();
        let table = db.table(b"t".to_vec()).unwrap();
        db.engine()
            .put(&table.calc_key(KeyTag::Item, b"bad"), &[0x09, 0x00])
            .unwrap();

        assert!(matches!(
            table.get_item(&db.snapshot(), b"bad"),
            Err(CoreError::Decode { .. })
        ));
        // Engine handle remains usable.
        assert!(table.get_item(&db.snapshot(), b"other").unwrap().is_none());
    }
}
