//! Dump command implementation.

use super::{open_existing, to_hex, CliError, Format};
use nestdb_core::{Database, KeyTag, Value};
use serde::Serialize;
use std::path::Path;

/// One dumped table item.
#[derive(Debug, Serialize)]
pub struct DumpedItem {
    /// Item key as hex.
    pub key: String,
    /// Decoded value.
    pub value: DumpedValue,
}

/// A decoded item value.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DumpedValue {
    /// Raw bytes.
    Bytes {
        /// Payload as hex.
        hex: String,
        /// Payload as text, when it is valid UTF-8.
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    /// A map reference.
    Map {
        /// Referenced instance.
        instance: u64,
        /// Live entries, when the count cell is readable.
        #[serde(skip_serializing_if = "Option::is_none")]
        entries: Option<u64>,
    },
    /// A value that failed to decode.
    Invalid {
        /// Decoder message.
        message: String,
    },
}

/// Runs the dump command.
pub fn run(path: &Path, prefix: &[u8], format: Format) -> Result<(), CliError> {
    let db = open_existing(path)?;
    let items = dump(&db, prefix)?;

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        Format::Text => {
            println!("Table [{}]: {} items", to_hex(prefix), items.len());
            for item in &items {
                println!("  {} = {}", item.key, describe(&item.value));
            }
        }
    }
    Ok(())
}

/// Lists every item of the table with `prefix`, in key order.
pub fn dump(db: &Database, prefix: &[u8]) -> Result<Vec<DumpedItem>, CliError> {
    let table = db.table(prefix.to_vec())?;
    let snapshot = db.snapshot();
    let start = table.calc_key(KeyTag::Item, &[]);

    let mut items = Vec::new();
    let mut cursor = snapshot.iter();
    cursor.seek(&start);
    while cursor.valid() && cursor.key().starts_with(&start) {
        let key = &cursor.key()[start.len()..];
        let value = match Value::decode(db, cursor.value()) {
            Ok(Some(Value::Bytes(payload))) => DumpedValue::Bytes {
                hex: to_hex(&payload),
                text: String::from_utf8(payload).ok(),
            },
            Ok(Some(Value::Map(map))) => DumpedValue::Map {
                instance: map.instance_id().map_or(0, |id| id.as_u64()),
                entries: map.count(&snapshot).ok(),
            },
            Ok(None) => DumpedValue::Invalid {
                message: "empty value".to_string(),
            },
            Err(err) => DumpedValue::Invalid {
                message: err.to_string(),
            },
        };
        items.push(DumpedItem {
            key: to_hex(key),
            value,
        });
        cursor.next();
    }
    cursor.status()?;
    Ok(items)
}

fn describe(value: &DumpedValue) -> String {
    match value {
        DumpedValue::Bytes {
            text: Some(text), ..
        } => format!("{text:?}"),
        DumpedValue::Bytes { hex, text: None } => format!("0x{hex}"),
        DumpedValue::Map {
            instance,
            entries: Some(entries),
        } => format!("map#{instance} ({entries} entries)"),
        DumpedValue::Map {
            instance,
            entries: None,
        } => format!("map#{instance} (count unavailable)"),
        DumpedValue::Invalid { message } => format!("<invalid: {message}>"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dumps_only_the_requested_table() {
        let db = Database::open_in_memory();
        let a = db.table(b"a".to_vec()).unwrap();
        let ab = db.table(b"ab".to_vec()).unwrap();
        a.put_item(b"k1", &mut Value::bytes(b"one".to_vec())).unwrap();
        a.put_item(b"k2", &mut Value::bytes(vec![0xFF])).unwrap();
        ab.put_item(b"k3", &mut Value::bytes(b"other".to_vec()))
            .unwrap();

        let items = dump(&db, b"a").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, "6b31");
        assert_eq!(describe(&items[0].value), "\"one\"");
        assert_eq!(describe(&items[1].value), "0xff");
    }

    #[test]
    fn maps_show_their_entry_count() {
        let db = Database::open_in_memory();
        let table = db.table(vec![0x03]).unwrap();
        let mut value = Value::from(db.new_map());
        table.put_item(b"m", &mut value).unwrap();
        let map = value.as_map_mut().unwrap();
        map.set_item(b"x", &mut Value::bytes(b"1".to_vec())).unwrap();

        let items = dump(&db, &[0x03]).unwrap();
        assert_eq!(
            items[0].value,
            DumpedValue::Map {
                instance: 1,
                entries: Some(1)
            }
        );
        assert_eq!(describe(&items[0].value), "map#1 (1 entries)");
    }

    #[test]
    fn invalid_prefix_is_rejected() {
        let db = Database::open_in_memory();
        assert!(matches!(dump(&db, &[0x00]), Err(CliError::Core(_))));
    }
}
