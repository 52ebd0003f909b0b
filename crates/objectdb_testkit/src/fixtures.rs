//! Test fixtures and database helpers.
//!
//! Provides temporary databases and short constructors for documents,
//! queries and change specs written as JSON.

use objectdb_core::{ChangeSpec, Config, Database, Document, Query, Value};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tempfile::TempDir;

/// A file-backed test database in its own temporary directory.
///
/// The directory is removed when the fixture is dropped.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    config: Config,
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Creates a database with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a database with `config`.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("test.db");
        let db = Database::open(&path, config.clone()).expect("Failed to open test database");
        Self {
            db,
            config,
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Closes the database and opens the same file again.
    pub fn reopen(&mut self) {
        let config = self.config.clone();
        self.reopen_with(config);
    }

    /// Closes the database and opens the same file with `config`.
    pub fn reopen_with(&mut self, config: Config) {
        self.db.close().expect("Failed to close test database");
        self.db = Database::open(&self.path, config.clone()).expect("Failed to reopen test database");
        self.config = config;
    }

    /// Returns the log file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current contents of the log file.
    pub fn log_text(&self) -> String {
        std::fs::read_to_string(&self.path).expect("Failed to read log file")
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let db = Database::open_in_memory().expect("Failed to open in-memory database");
    f(&db)
}

/// Builds a document from a JSON object.
///
/// # Panics
///
/// Panics if `json` is not an object.
pub fn doc(json: JsonValue) -> Document {
    match Value::from(json) {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other:?}"),
    }
}

/// Parses a query from JSON.
///
/// # Panics
///
/// Panics if the query is malformed.
pub fn query(json: JsonValue) -> Query {
    Query::from_json(&json).expect("Invalid query")
}

/// Parses a change spec from JSON.
///
/// # Panics
///
/// Panics if the change spec is malformed.
pub fn change(json: JsonValue) -> ChangeSpec {
    ChangeSpec::from_json(&json).expect("Invalid change spec")
}

/// Installs a `tracing` subscriber for the current test binary.
///
/// Reads the filter from `RUST_LOG`, defaulting to `warn`. Safe to call
/// from every test.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reopen_keeps_documents() {
        init_tracing();
        let mut test = TestDatabase::new();
        test.insert(doc(json!({"n": 1}))).unwrap();
        test.reopen();
        assert_eq!(test.count(&Query::all()).unwrap(), 1);
        assert!(test.log_text().lines().count() >= 1);
    }

    #[test]
    fn memory_helper() {
        let count = with_temp_db(|db| {
            db.insert(doc(json!({"a": true}))).unwrap();
            db.count(&query(json!({"a": true}))).unwrap()
        });
        assert_eq!(count, 1);
    }
}
