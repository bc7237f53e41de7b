//! Benchmark utilities.

use nestdb_core::{Database, Map, Value};
use rand::Rng;

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate `count` random keys of `len` bytes.
pub fn random_keys(count: usize, len: usize) -> Vec<Vec<u8>> {
    (0..count).map(|_| random_data(len)).collect()
}

/// Sequential big-endian key for index `i`, so keys sort in insertion order.
pub fn sequential_key(i: u64) -> [u8; 8] {
    i.to_be_bytes()
}

/// Creates a map in `db` holding `entries` entries with `payload_size`
/// byte payloads.
pub fn populated_map(db: &Database, entries: u64, payload_size: usize) -> Map {
    let mut map = db.new_map();
    let payload = random_data(payload_size);
    let mut batch = db.batch();
    for i in 0..entries {
        map.batch_set_item(
            &mut batch,
            &sequential_key(i),
            &mut Value::bytes(payload.clone()),
        )
        .expect("Failed to stage entry");
    }
    batch.apply().expect("Failed to apply batch");
    map
}
