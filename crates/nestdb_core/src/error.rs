//! Error types for NestDB core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in NestDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Engine error, surfaced verbatim.
    #[error("storage error: {0}")]
    Storage(#[from] nestdb_storage::StorageError),

    /// Table prefix contains the reserved separator byte.
    #[error("invalid table prefix {prefix:02x?}: must not contain 0x00")]
    InvalidTablePrefix {
        /// The rejected prefix.
        prefix: Vec<u8>,
    },

    /// A stored value or cell could not be decoded.
    #[error("decode error: {message}")]
    Decode {
        /// Description of the malformed data.
        message: String,
    },

    /// Stored state violates an internal invariant.
    #[error("consistency error: {message}")]
    Consistency {
        /// Description of the violation.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a consistency error.
    pub fn consistency(message: impl Into<String>) -> Self {
        Self::Consistency {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Returns `true` for errors that leave the engine handle usable.
    ///
    /// Decode and consistency errors are fatal to one operation only; engine
    /// failures may indicate the handle itself is broken.
    #[must_use]
    pub fn is_operation_local(&self) -> bool {
        !matches!(self, Self::Storage(_))
    }
}
