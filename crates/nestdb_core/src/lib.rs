//! # NestDB Core
//!
//! Typed, nested values over an ordered key-value engine.
//!
//! This crate provides:
//! - Tables: collision-free namespaces of typed items
//! - Maps: nested dictionaries with an O(1) live-entry count and
//!   prefix-bounded iteration
//! - Batch contexts: atomic groups of mutations with read-your-own-writes
//! - A bit-exact key and value layout (see [`keys`] and [`value`])
//!
//! ## Usage
//!
//! ```
//! use nestdb_core::{Database, Value};
//!
//! let db = Database::open_in_memory();
//! let table = db.table(vec![0x03]).unwrap();
//!
//! // Bytes item
//! table.put_item(&[0x01, 0x02], &mut Value::bytes(vec![0xAA, 0xBB])).unwrap();
//!
//! // Map item, filled atomically
//! let mut value = Value::from(db.new_map());
//! let mut batch = db.batch();
//! table.batch_put_item(&mut batch, b"scores", &mut value).unwrap();
//! let scores = value.as_map_mut().unwrap();
//! scores.batch_set_item(&mut batch, b"alice", &mut Value::bytes(b"7".to_vec())).unwrap();
//! batch.apply().unwrap();
//!
//! let snapshot = db.snapshot();
//! assert_eq!(scores.count(&snapshot).unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod allocator;
mod batch;
mod config;
mod context;
mod database;
mod error;
pub mod keys;
mod map;
mod table;
mod types;
pub mod value;

pub use allocator::next_instance_id;
pub use batch::BatchContext;
pub use config::Config;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use keys::KeyTag;
pub use map::{Entries, IterState, Map, MapIterator};
pub use table::Table;
pub use types::InstanceId;
pub use value::{Value, ValueTag};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
