//! Database configuration.

use nestdb_storage::LogOptions;

/// Configuration for opening a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the database already exists.
    pub error_if_exists: bool,

    /// Whether to fsync the engine log after every applied batch.
    pub sync_on_write: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
            sync_on_write: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if database exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    /// Sets whether to fsync after every applied batch.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Returns the engine options derived from this configuration.
    #[must_use]
    pub const fn log_options(&self) -> LogOptions {
        LogOptions {
            create_if_missing: self.create_if_missing,
            sync_on_write: self.sync_on_write,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.create_if_missing);
        assert!(!config.error_if_exists);
        assert!(config.sync_on_write);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .create_if_missing(false)
            .error_if_exists(true)
            .sync_on_write(false);

        assert!(!config.create_if_missing);
        assert!(config.error_if_exists);
        assert!(!config.sync_on_write);
    }

    #[test]
    fn log_options_follow_config() {
        let options = Config::new().sync_on_write(false).log_options();
        assert!(options.create_if_missing);
        assert!(!options.sync_on_write);
    }
}
