//! Stress tests for NestDB.
//!
//! These tests verify behavior under heavy load and concurrent access.

use nestdb_core::{Database, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations to perform.
    pub operations: usize,
    /// Number of concurrent threads (for concurrent tests).
    pub threads: usize,
    /// Size of each payload in bytes.
    pub payload_size: usize,
    /// Number of distinct keys.
    pub key_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            payload_size: 256,
            key_count: 1_000,
        }
    }
}

/// Stores an empty map under `key` in a `stress` table and returns it.
pub fn stress_map(db: &Database, key: &[u8]) -> Map {
    let table = db.table(b"stress".to_vec()).expect("Failed to create table");
    let mut value = Value::from(db.new_map());
    table.put_item(key, &mut value).expect("Failed to store map");
    value.into_map().expect("Stored value should be a map")
}

fn entry_key(thread: usize, index: usize) -> Vec<u8> {
    format!("t{thread:02}-{index:08}").into_bytes()
}

/// Run a sequential map write stress test.
///
/// Keys cycle through `key_count` values, so later writes overwrite.
pub fn stress_sequential_map_writes(db: &Database, config: &StressConfig) -> StressTestResult {
    let mut map = stress_map(db, b"sequential");
    let payload = vec![0xABu8; config.payload_size];

    let start = Instant::now();
    let mut successful = 0usize;
    let mut failed = 0usize;

    for i in 0..config.operations {
        let key = entry_key(0, i % config.key_count);
        match map.set_item(&key, &mut Value::bytes(payload.clone())) {
            Ok(()) => successful += 1,
            Err(_) => failed += 1,
        }
    }

    StressTestResult::new(successful, failed, start.elapsed())
}

/// Run a concurrent map write stress test.
///
/// Every thread writes its own keys into one shared map through a clone of
/// the same handle. Returns the result together with the map.
pub fn stress_concurrent_map_writes(
    db: &Database,
    config: &StressConfig,
) -> (StressTestResult, Map) {
    let map = stress_map(db, b"concurrent");
    let payload = vec![0xCDu8; config.payload_size];

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let ops_per_thread = config.operations / config.threads;

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let mut map = map.clone();
            let payload = payload.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for i in 0..ops_per_thread {
                    match map.set_item(&entry_key(t, i), &mut Value::bytes(payload.clone())) {
                        Ok(()) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    (result, map)
}

/// Run a concurrent batch stress test.
///
/// Each thread applies batches of `batch_size` entries into one shared map.
pub fn stress_concurrent_batches(
    db: &Database,
    config: &StressConfig,
    batch_size: usize,
) -> (StressTestResult, Map) {
    let map = stress_map(db, b"batches");
    let batches_per_thread = config.operations / config.threads / batch_size;

    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let db = db.clone();
            let mut map = map.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);

            thread::spawn(move || {
                for b in 0..batches_per_thread {
                    let mut batch = db.batch();
                    let staged = (0..batch_size).try_for_each(|i| {
                        let key = entry_key(t, b * batch_size + i);
                        map.batch_set_item(&mut batch, &key, &mut Value::bytes(key.clone()))
                    });
                    let result = staged.and_then(|()| batch.apply());
                    let counter = if result.is_ok() { &successful } else { &failed };
                    counter.fetch_add(batch_size, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    let result = StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    );
    (result, map)
}
