//! Typed values and their wire format.
//!
//! Every stored value is one tag byte followed by a payload:
//!
//! | Tag    | Variant      | Payload                         |
//! |--------|--------------|---------------------------------|
//! | `0x01` | [`Value::Bytes`] | raw bytes, verbatim         |
//! | `0x02` | [`Value::Map`]   | instance ID, 8 bytes LE     |

use crate::context::WriteContext;
use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::map::Map;
use crate::types::InstanceId;

/// Discriminator byte prefixing every stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueTag {
    /// Raw bytes follow.
    Bytes = 0x01,
    /// A map reference follows.
    MapRef = 0x02,
}

impl ValueTag {
    /// Converts a byte to a value tag.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Bytes),
            0x02 => Some(Self::MapRef),
            _ => None,
        }
    }

    /// Converts the value tag to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A value stored in a table item or a map entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An opaque byte payload.
    Bytes(Vec<u8>),
    /// A nested map, stored as a reference to its instance.
    Map(Map),
}

impl Value {
    /// Creates a bytes value.
    pub fn bytes(payload: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(payload.into())
    }

    /// Returns the value's tag.
    #[must_use]
    pub fn tag(&self) -> ValueTag {
        match self {
            Self::Bytes(_) => ValueTag::Bytes,
            Self::Map(_) => ValueTag::MapRef,
        }
    }

    /// Returns the payload if this is a bytes value.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Map(_) => None,
        }
    }

    /// Returns the map if this is a map value.
    #[must_use]
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(m) => Some(m),
            Self::Bytes(_) => None,
        }
    }

    /// Returns the map mutably if this is a map value.
    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match self {
            Self::Map(m) => Some(m),
            Self::Bytes(_) => None,
        }
    }

    /// Consumes the value, returning the map if it is one.
    #[must_use]
    pub fn into_map(self) -> Option<Map> {
        match self {
            Self::Map(m) => Some(m),
            Self::Bytes(_) => None,
        }
    }

    /// Encodes the value as `tag ++ payload`.
    ///
    /// # Errors
    ///
    /// Returns a consistency error for a map that has not been persisted yet,
    /// since it has no instance ID to reference.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        match self {
            Self::Bytes(payload) => {
                let mut out = Vec::with_capacity(1 + payload.len());
                out.push(ValueTag::Bytes.as_byte());
                out.extend_from_slice(payload);
                Ok(out)
            }
            Self::Map(map) => {
                let id = map.instance_id().ok_or_else(|| {
                    CoreError::consistency("cannot encode a map that was never persisted")
                })?;
                let mut out = Vec::with_capacity(1 + InstanceId::ENCODED_LEN);
                out.push(ValueTag::MapRef.as_byte());
                out.extend_from_slice(&id.to_le_bytes());
                Ok(out)
            }
        }
    }

    /// Decodes a stored value, binding map references to `db`.
    ///
    /// An empty buffer decodes to `None` so callers can tell a missing key
    /// from a present one.
    ///
    /// # Errors
    ///
    /// Returns a decode error for an unknown tag or a map reference whose
    /// payload is not exactly eight bytes.
    pub fn decode(db: &Database, bytes: &[u8]) -> CoreResult<Option<Self>> {
        let Some((&tag, payload)) = bytes.split_first() else {
            return Ok(None);
        };
        match ValueTag::from_byte(tag) {
            Some(ValueTag::Bytes) => Ok(Some(Self::Bytes(payload.to_vec()))),
            Some(ValueTag::MapRef) => {
                let id = InstanceId::from_le_slice(payload).ok_or_else(|| {
                    CoreError::decode(format!(
                        "map reference payload is {} bytes, expected {}",
                        payload.len(),
                        InstanceId::ENCODED_LEN
                    ))
                })?;
                Ok(Some(Self::Map(Map::bound(db.clone(), id))))
            }
            None => Err(CoreError::decode(format!("unknown value tag 0x{tag:02x}"))),
        }
    }

    /// Allocates instance IDs for any unpersisted map this value holds.
    pub(crate) fn bind(&mut self, ctx: &mut dyn WriteContext) -> CoreResult<()> {
        if let Self::Map(map) = self {
            map.bind(ctx)?;
        }
        Ok(())
    }
}

impl From<Vec<u8>> for Value {
    fn from(payload: Vec<u8>) -> Self {
        Self::Bytes(payload)
    }
}

impl From<&[u8]> for Value {
    fn from(payload: &[u8]) -> Self {
        Self::Bytes(payload.to_vec())
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Map(map)
    }
}

/// Encodes a count or allocator cell.
pub(crate) fn encode_counter(value: u64) -> Vec<u8> {
    value.to_le_bytes().to_vec()
}

/// Decodes a count or allocator cell; `what` names the cell in errors.
pub(crate) fn decode_counter(bytes: &[u8], what: &str) -> CoreResult<u64> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| {
        CoreError::decode(format!("{what} is {} bytes, expected 8", bytes.len()))
    })?;
    Ok(u64::from_le_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory()
    }

    #[test]
    fn bytes_roundtrip() {
        let value = Value::bytes(vec![0xAA, 0xBB]);
        let encoded = value.encode().unwrap();
        assert_eq!(encoded, vec![0x01, 0xAA, 0xBB]);
        assert_eq!(Value::decode(&db(), &encoded).unwrap(), Some(value));
    }

    #[test]
    fn empty_bytes_roundtrip() {
        let encoded = Value::bytes(Vec::new()).encode().unwrap();
        assert_eq!(encoded, vec![0x01]);
        assert_eq!(
            Value::decode(&db(), &encoded).unwrap(),
            Some(Value::Bytes(Vec::new()))
        );
    }

    #[test]
    fn map_ref_decodes_bound_map() {
        let bytes = [0x02, 5, 0, 0, 0, 0, 0, 0, 0];
        let value = Value::decode(&db(), &bytes).unwrap().unwrap();
        let map = value.as_map().unwrap();
        assert_eq!(map.instance_id(), Some(InstanceId::new(5)));
        assert_eq!(value.encode().unwrap(), bytes.to_vec());
    }

    #[test]
    fn empty_buffer_is_absent() {
        assert_eq!(Value::decode(&db(), &[]).unwrap(), None);
    }

    #[test]
    fn unknown_tag_is_decode_error() {
        let err = Value::decode(&db(), &[0x7f, 1, 2]).unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));
    }

    #[test]
    fn truncated_map_ref_is_decode_error() {
        let err = Value::decode(&db(), &[0x02, 1, 0, 0]).unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));
    }

    #[test]
    fn unpersisted_map_cannot_be_encoded() {
        let value = Value::from(db().new_map());
        assert!(matches!(
            value.encode(),
            Err(CoreError::Consistency { .. })
        ));
    }

    #[test]
    fn accessors_match_variant() {
        let bytes = Value::from(&b"x"[..]);
        assert_eq!(bytes.tag(), ValueTag::Bytes);
        assert_eq!(bytes.as_bytes(), Some(&b"x"[..]));
        assert!(bytes.as_map().is_none());

        let map = Value::from(db().new_map());
        assert_eq!(map.tag(), ValueTag::MapRef);
        assert!(map.as_bytes().is_none());
        assert!(map.into_map().is_some());
    }

    #[test]
    fn counter_cells_are_eight_bytes() {
        assert_eq!(decode_counter(&encode_counter(258), "count").unwrap(), 258);
        assert!(matches!(
            decode_counter(&[1, 2], "count"),
            Err(CoreError::Decode { .. })
        ));
    }
}
