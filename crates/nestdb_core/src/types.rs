//! Core type definitions for NestDB.

use std::fmt;

/// Identifier binding a map to its physical key range.
///
/// Instance IDs are handed out by the instance allocator, start at 1, and
/// are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u64);

impl InstanceId {
    /// Width of the on-disk encoding in bytes.
    pub const ENCODED_LEN: usize = 8;

    /// The first ID the allocator hands out.
    pub const FIRST: Self = Self(1);

    /// Creates a new instance ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the little-endian on-disk encoding.
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Decodes an ID from exactly eight little-endian bytes.
    ///
    /// Returns `None` if the slice has any other length.
    #[must_use]
    pub fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_le_bytes(array)))
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_id_is_little_endian() {
        let id = InstanceId::new(0x0102);
        assert_eq!(id.to_le_bytes(), [0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(InstanceId::from_le_slice(&id.to_le_bytes()), Some(id));
    }

    #[test]
    fn instance_id_rejects_wrong_width() {
        assert_eq!(InstanceId::from_le_slice(&[1, 2, 3]), None);
        assert_eq!(InstanceId::from_le_slice(&[0; 9]), None);
    }

    #[test]
    fn instance_id_display() {
        assert_eq!(format!("{}", InstanceId::new(42)), "map#42");
    }
}
