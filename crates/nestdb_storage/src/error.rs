//! Error types for engine operations.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur inside a key-value engine.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The engine's persistent state is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the engine's directory lock.
    #[error("storage locked: another process has exclusive access")]
    Locked,

    /// The engine has been closed.
    #[error("storage is closed")]
    Closed,
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted(message.into())
    }
}
