//! CLI command implementations.

pub mod dump;
pub mod inspect;
pub mod scan;
pub mod verify;

use nestdb_core::{Config, CoreError, Database};
use nestdb_storage::{StorageError, LOG_FILE};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// No batch log exists in the given directory.
    #[error("no database found at {0}")]
    NoDatabase(PathBuf),

    /// A table prefix argument was not valid hex.
    #[error("invalid hex {0:?}: expected an even number of hex digits")]
    InvalidHex(String),

    /// The unsupported output format.
    #[error("unknown output format {0:?}: expected text or json")]
    UnknownFormat(String),

    /// Verification found problems.
    #[error("verification failed with {0} problem(s)")]
    VerificationFailed(usize),

    /// Error from the database layer.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error from the engine.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON serialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Output format shared by the reporting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl Format {
    /// Parses a `--format` argument.
    pub fn parse(value: &str) -> Result<Self, CliError> {
        match value {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::UnknownFormat(other.to_string())),
        }
    }
}

/// Opens an existing database without creating anything.
pub fn open_existing(path: &Path) -> Result<Database, CliError> {
    if !path.join(LOG_FILE).exists() {
        return Err(CliError::NoDatabase(path.to_path_buf()));
    }
    let config = Config::new().create_if_missing(false);
    Ok(Database::open_with_config(path, config)?)
}

/// Parses a hex string such as `"03"` or `"6163"` into bytes.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, CliError> {
    let invalid = || CliError::InvalidHex(text.to_string());
    if text.len() % 2 != 0 {
        return Err(invalid());
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(invalid)
        })
        .collect()
}

/// Formats bytes as lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
