//! # NestDB Testkit
//!
//! Test utilities for NestDB.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - An engine wrapper that injects write failures
//! - Property-based test generators using proptest
//! - A model-checked harness for tables and maps
//! - Concurrent writer stress helpers
//!
//! ## Usage
//!
//! ```rust
//! use nestdb_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let table = db.table(b"test".to_vec()).unwrap();
//!     let _ = table;
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
