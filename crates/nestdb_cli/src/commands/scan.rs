//! Whole-keyspace walking shared by the reporting commands.

use nestdb_core::keys::{self, KeyTag, PREFIX_SEPARATOR};
use nestdb_core::InstanceId;
use nestdb_storage::{Snapshot, StorageResult};

/// What a physical key addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind<'a> {
    /// A table item.
    Item {
        /// Table prefix.
        prefix: &'a [u8],
        /// Logical item key.
        key: &'a [u8],
    },
    /// A map's count cell.
    CountCell(InstanceId),
    /// A map entry.
    Entry {
        /// Owning map.
        id: InstanceId,
        /// Logical entry key.
        key: &'a [u8],
    },
    /// The instance allocator.
    Allocator,
    /// Anything the layout does not describe.
    Unknown,
}

/// Classifies a physical key.
pub fn classify(key: &[u8]) -> KeyKind<'_> {
    let Some((&tag, rest)) = key.split_first() else {
        return KeyKind::Unknown;
    };
    match KeyTag::from_byte(tag) {
        Some(KeyTag::Item) => match rest.iter().position(|&b| b == PREFIX_SEPARATOR) {
            Some(at) => KeyKind::Item {
                prefix: &rest[..at],
                key: &rest[at + 1..],
            },
            None => KeyKind::Unknown,
        },
        Some(KeyTag::MapCount) => match keys::split_instance_key(key) {
            Some((_, id, suffix)) if suffix.is_empty() => KeyKind::CountCell(id),
            _ => KeyKind::Unknown,
        },
        Some(KeyTag::MapValues) => match keys::split_instance_key(key) {
            Some((_, id, suffix)) => KeyKind::Entry { id, key: suffix },
            None => KeyKind::Unknown,
        },
        Some(KeyTag::InstanceMax) if rest.is_empty() => KeyKind::Allocator,
        _ => KeyKind::Unknown,
    }
}

/// Visits every key/value pair of `snapshot` in key order.
///
/// # Errors
///
/// Returns the cursor's error if the walk ended early.
pub fn walk<F>(snapshot: &Snapshot, mut visit: F) -> StorageResult<()>
where
    F: FnMut(&[u8], &[u8]),
{
    let mut cursor = snapshot.iter();
    cursor.seek(&[]);
    while cursor.valid() {
        visit(cursor.key(), cursor.value());
        cursor.next();
    }
    cursor.status()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nestdb_core::{Database, Value};

    #[test]
    fn classify_layout() {
        let id = InstanceId::new(3);
        assert_eq!(
            classify(&keys::table_key(KeyTag::Item, b"ab", b"k")),
            KeyKind::Item {
                prefix: b"ab",
                key: b"k"
            }
        );
        assert_eq!(classify(&keys::map_count_key(id)), KeyKind::CountCell(id));
        assert_eq!(
            classify(&keys::map_entry_key(id, b"e")),
            KeyKind::Entry { id, key: b"e" }
        );
        assert_eq!(classify(&keys::instance_max_key()), KeyKind::Allocator);
        assert_eq!(classify(&[0x7F]), KeyKind::Unknown);
        assert_eq!(classify(&[0x10, 1, 2]), KeyKind::Unknown);
    }

    #[test]
    fn walk_visits_in_order() {
        let db = Database::open_in_memory();
        let table = db.table(b"t".to_vec()).unwrap();
        table
            .put_item(b"k", &mut Value::bytes(b"v".to_vec()))
            .unwrap();
        let mut map = db.new_map();
        map.set_item(b"e", &mut Value::bytes(b"1".to_vec())).unwrap();

        let mut seen = Vec::new();
        walk(&db.snapshot(), |key, _| seen.push(key.to_vec())).unwrap();

        assert_eq!(seen.len(), 4);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }
}
