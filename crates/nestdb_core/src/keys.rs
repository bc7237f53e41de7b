//! Physical key layout.
//!
//! | Element            | Key                                   |
//! |--------------------|---------------------------------------|
//! | Table item         | `0x01 ++ prefix ++ 0x00 ++ key`       |
//! | Map count cell     | `0x10 ++ instance_id (8 LE)`          |
//! | Map entry          | `0x11 ++ instance_id (8 LE) ++ entry` |
//! | Instance allocator | `0x20`                                |

use crate::types::InstanceId;

/// Separator written after a table prefix.
pub const PREFIX_SEPARATOR: u8 = 0x00;

/// Leading byte of every physical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum KeyTag {
    /// Table item.
    Item = 0x01,
    /// Map count cell.
    MapCount = 0x10,
    /// Map entry.
    MapValues = 0x11,
    /// Instance allocator counter.
    InstanceMax = 0x20,
}

impl KeyTag {
    /// Converts a byte to a key tag.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Item),
            0x10 => Some(Self::MapCount),
            0x11 => Some(Self::MapValues),
            0x20 => Some(Self::InstanceMax),
            _ => None,
        }
    }

    /// Converts the key tag to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Builds `tag ++ prefix ++ 0x00 ++ key`.
#[must_use]
pub fn table_key(tag: KeyTag, prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + prefix.len() + key.len());
    out.push(tag.as_byte());
    out.extend_from_slice(prefix);
    out.push(PREFIX_SEPARATOR);
    out.extend_from_slice(key);
    out
}

/// Builds `tag ++ instance_id ++ suffix`.
#[must_use]
pub fn instance_key(tag: KeyTag, id: InstanceId, suffix: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + InstanceId::ENCODED_LEN + suffix.len());
    out.push(tag.as_byte());
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(suffix);
    out
}

/// Key of a map's count cell.
#[must_use]
pub fn map_count_key(id: InstanceId) -> Vec<u8> {
    instance_key(KeyTag::MapCount, id, &[])
}

/// Lower bound of a map's value range; also the prefix shared by its entries.
#[must_use]
pub fn map_values_prefix(id: InstanceId) -> Vec<u8> {
    instance_key(KeyTag::MapValues, id, &[])
}

/// Key of one map entry.
#[must_use]
pub fn map_entry_key(id: InstanceId, entry: &[u8]) -> Vec<u8> {
    instance_key(KeyTag::MapValues, id, entry)
}

/// Key of the instance allocator counter.
#[must_use]
pub fn instance_max_key() -> Vec<u8> {
    vec![KeyTag::InstanceMax.as_byte()]
}

/// Splits an instance-addressed key into its ID and trailing bytes.
///
/// Returns `None` if the key is shorter than a tag plus an ID.
#[must_use]
pub fn split_instance_key(key: &[u8]) -> Option<(KeyTag, InstanceId, &[u8])> {
    let (&tag, rest) = key.split_first()?;
    let tag = KeyTag::from_byte(tag)?;
    if rest.len() < InstanceId::ENCODED_LEN {
        return None;
    }
    let (id, suffix) = rest.split_at(InstanceId::ENCODED_LEN);
    Some((tag, InstanceId::from_le_slice(id)?, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_key_layout() {
        let key = table_key(KeyTag::Item, &[0x03], &[0x01, 0x02]);
        assert_eq!(key, vec![0x01, 0x03, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn table_key_with_empty_parts() {
        assert_eq!(table_key(KeyTag::Item, &[], &[]), vec![0x01, 0x00]);
    }

    #[test]
    fn map_keys_layout() {
        let id = InstanceId::new(1);
        assert_eq!(map_count_key(id), vec![0x10, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(map_values_prefix(id), vec![0x11, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(
            map_entry_key(id, &[0x0a]),
            vec![0x11, 1, 0, 0, 0, 0, 0, 0, 0, 0x0a]
        );
    }

    #[test]
    fn entry_key_starts_with_values_prefix() {
        let id = InstanceId::new(300);
        assert!(map_entry_key(id, b"abc").starts_with(&map_values_prefix(id)));
    }

    #[test]
    fn instance_max_key_is_single_byte() {
        assert_eq!(instance_max_key(), vec![0x20]);
    }

    #[test]
    fn split_instance_key_roundtrip() {
        let id = InstanceId::new(7);
        let key = map_entry_key(id, b"xy");
        let (tag, parsed, suffix) = split_instance_key(&key).unwrap();
        assert_eq!(tag, KeyTag::MapValues);
        assert_eq!(parsed, id);
        assert_eq!(suffix, b"xy");
    }

    #[test]
    fn split_instance_key_rejects_short_keys() {
        assert!(split_instance_key(&[0x10, 1, 2]).is_none());
        assert!(split_instance_key(&[]).is_none());
        assert!(split_instance_key(&[0x7f; 9]).is_none());
    }

    #[test]
    fn key_tag_byte_roundtrip() {
        for tag in [
            KeyTag::Item,
            KeyTag::MapCount,
            KeyTag::MapValues,
            KeyTag::InstanceMax,
        ] {
            assert_eq!(KeyTag::from_byte(tag.as_byte()), Some(tag));
        }
        assert_eq!(KeyTag::from_byte(0x02), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn prefix() -> impl Strategy<Value = Vec<u8>> {
            prop::collection::vec(prop::sample::select(vec![b'a', b'b', 0x01]), 0..4)
        }

        proptest! {
            #[test]
            fn distinct_prefixes_give_distinct_ranges(
                a in prefix(),
                b in prefix(),
                ka in prop::collection::vec(any::<u8>(), 0..6),
                kb in prop::collection::vec(any::<u8>(), 0..6),
            ) {
                prop_assume!(a != b);
                let lower_a = table_key(KeyTag::Item, &a, &[]);
                let key_b = table_key(KeyTag::Item, &b, &kb);
                prop_assert!(!key_b.starts_with(&lower_a));
                prop_assert_ne!(table_key(KeyTag::Item, &a, &ka), key_b);
            }

            #[test]
            fn entries_stay_inside_their_map(
                id in 1u64..1_000,
                other in 1u64..1_000,
                entry in prop::collection::vec(any::<u8>(), 0..6),
            ) {
                prop_assume!(id != other);
                let key = map_entry_key(InstanceId::new(other), &entry);
                prop_assert!(!key.starts_with(&map_values_prefix(InstanceId::new(id))));
            }
        }
    }
}
