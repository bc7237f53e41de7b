//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;

/// Strategy for generating valid table prefixes.
///
/// Prefixes never contain the `0x00` separator and may be empty.
pub fn table_prefix_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(1u8..=255, 0..8)
}

/// Strategy for generating pairs of distinct table prefixes.
///
/// Short alphabets make it likely that one prefix is a prefix of the other.
pub fn distinct_prefix_pair_strategy() -> impl Strategy<Value = (Vec<u8>, Vec<u8>)> {
    let short = || prop::collection::vec(prop::sample::select(vec![b'a', b'b', 0xFF]), 0..4);
    (short(), short()).prop_filter("Prefixes must differ", |(a, b)| a != b)
}

/// Strategy for generating item and entry keys (arbitrary bytes).
pub fn entry_key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..16)
}

/// Strategy for generating bytes payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// A table mutation.
#[derive(Debug, Clone)]
pub enum TableOp {
    /// Store a bytes item.
    Put(Vec<u8>, Vec<u8>),
    /// Remove an item.
    Delete(Vec<u8>),
}

/// Strategy for generating table mutations over a small key space.
///
/// Keys are drawn from a handful of values so that puts, overwrites and
/// deletes of the same key interleave.
pub fn table_op_strategy() -> impl Strategy<Value = TableOp> {
    let key = || prop::collection::vec(0u8..4, 1..3);
    prop_oneof![
        3 => (key(), payload_strategy()).prop_map(|(k, v)| TableOp::Put(k, v)),
        1 => key().prop_map(TableOp::Delete),
    ]
}

/// Strategy for generating a sequence of map writes over a small key space.
pub fn map_writes_strategy(max_len: usize) -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    prop::collection::vec(
        (prop::collection::vec(0u8..6, 0..3), payload_strategy()),
        0..max_len,
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
