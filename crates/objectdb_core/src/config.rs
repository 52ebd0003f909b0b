//! Database configuration.

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to compact the log after replaying it on open.
    pub cleanup_on_open: bool,

    /// Schema version the caller expects. A different version in the log
    /// triggers the upgrade callback and a forced compaction.
    pub client_version: u32,

    /// Whether to fsync after every appended record (safer but slower).
    pub sync_on_append: bool,

    /// Whether to create the log file (and missing parent directories) if it
    /// doesn't exist.
    pub create_if_missing: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cleanup_on_open: true,
            client_version: 0,
            sync_on_append: true,
            create_if_missing: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to compact on open.
    #[must_use]
    pub const fn cleanup_on_open(mut self, value: bool) -> Self {
        self.cleanup_on_open = value;
        self
    }

    /// Sets the caller's schema version.
    #[must_use]
    pub const fn client_version(mut self, version: u32) -> Self {
        self.client_version = version;
        self
    }

    /// Sets whether to fsync after every appended record.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }

    /// Sets whether to create the log file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }
}
