//! Database facade.

use crate::config::Config;
use crate::error::{BoxError, CoreResult};
use crate::id::{DocumentId, ID_FIELD};
use crate::notifier::{ChangeEvent, ListenerId, Sink};
use crate::queue::Queue;
use crate::stats::{DatabaseStats, StatsSnapshot};
use crate::store::Store;
use crate::upgrade::{UpgradeFn, UpgradeSession};
use objectdb_codec::{ChangeSpec, Document, Query};
use objectdb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;

/// The main database handle.
///
/// A `Database` owns one log file and the documents replayed from it. All
/// operations, reads included, go through a single worker thread and run
/// strictly in the order they were submitted; the handle itself is
/// `Send + Sync` and can be shared behind an `Arc`.
///
/// # Opening a Database
///
/// ```rust,ignore
/// use objectdb_core::{Config, Database};
/// use objectdb_codec::{ChangeSpec, Query};
///
/// let db = Database::open("app.db", Config::default())?;
///
/// let id = db.insert(doc)?;
/// let open = Query::parse(r#"{"status": "open"}"#)?;
/// let change = ChangeSpec::parse(r#"{"$set": {"status": "closed"}}"#)?;
/// db.update(&open, &change, false)?;
///
/// db.close()?;
/// ```
///
/// Returned documents are copies; changing them never changes the
/// database.
pub struct Database {
    queue: Queue,
    path: PathBuf,
    stats: Arc<DatabaseStats>,
}

impl Database {
    /// Opens or creates the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be restored, read or compacted.
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let backend = file_backend(&config);
        Self::open_with_backend(backend, path, config, None)
    }

    /// Opens the database at `path`, running `upgrade` if the log was last
    /// written by a different [`Config::client_version`].
    ///
    /// # Errors
    ///
    /// As [`Database::open`], plus `UpgradeFailed` if `upgrade` fails.
    pub fn open_with_upgrade<F>(path: impl AsRef<Path>, config: Config, upgrade: F) -> CoreResult<Self>
    where
        F: FnOnce(&mut UpgradeSession<'_>, u32) -> Result<(), BoxError> + Send + 'static,
    {
        let backend = file_backend(&config);
        Self::open_with_backend(backend, path, config, Some(Box::new(upgrade)))
    }

    /// Opens a database over any storage backend.
    ///
    /// # Errors
    ///
    /// As [`Database::open_with_upgrade`].
    pub fn open_with_backend(
        backend: Arc<dyn StorageBackend>,
        path: impl AsRef<Path>,
        config: Config,
        upgrade: Option<UpgradeFn>,
    ) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let stats = Arc::new(DatabaseStats::new());

        let worker_stats = Arc::clone(&stats);
        let worker_path = path.clone();
        let queue = Queue::start(worker_name(&path), move || {
            Store::open(backend, &worker_path, &config, upgrade, worker_stats)
        })?;

        Ok(Self { queue, path, stats })
    }

    /// Opens a fresh database that lives only in memory.
    ///
    /// # Errors
    ///
    /// Returns an error only if the worker thread cannot be started.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(
            Arc::new(InMemoryBackend::new()),
            "memory.db",
            Config::default(),
            None,
        )
    }

    /// Returns the documents matching `query`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`Database::close`].
    pub fn find(&self, query: &Query) -> CoreResult<Vec<Document>> {
        let query = query.clone();
        self.queue.run(move |store| store.find(&query))
    }

    /// Returns the first document matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`Database::close`].
    pub fn first(&self, query: &Query) -> CoreResult<Option<Document>> {
        let query = query.clone();
        self.queue.run(move |store| store.first(&query))
    }

    /// Returns the last document matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`Database::close`].
    pub fn last(&self, query: &Query) -> CoreResult<Option<Document>> {
        let query = query.clone();
        self.queue.run(move |store| store.last(&query))
    }

    /// Counts the documents matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`Database::close`].
    pub fn count(&self, query: &Query) -> CoreResult<usize> {
        let query = query.clone();
        self.queue.run(move |store| store.count(&query))
    }

    /// Returns the document with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`Database::close`].
    pub fn get(&self, id: &DocumentId) -> CoreResult<Option<Document>> {
        let id = id.clone();
        self.queue.run(move |store| store.get(&id))
    }

    /// Inserts a document and returns its identifier.
    ///
    /// A missing `_id` is generated. A string `_id` is kept if no other
    /// document has it.
    ///
    /// # Errors
    ///
    /// - `InvalidDataType` if `_id` is not a string or a value cannot be stored
    /// - `DuplicateId` if `_id` is taken
    /// - I/O errors from the log append
    pub fn insert(&self, doc: Document) -> CoreResult<DocumentId> {
        self.queue.run(move |store| store.insert(doc))?
    }

    /// Inserts documents in order and returns their identifiers.
    ///
    /// Nothing is written unless every document is valid.
    ///
    /// # Errors
    ///
    /// As [`Database::insert`]. If the log fails after some documents were
    /// written, `PartialInsert` carries their identifiers; the rest were not
    /// inserted.
    pub fn insert_many(&self, docs: Vec<Document>) -> CoreResult<Vec<DocumentId>> {
        self.queue.run(move |store| store.insert_many(docs))?
    }

    /// Removes the documents matching `query` and returns how many went.
    ///
    /// # Errors
    ///
    /// I/O errors from the log append.
    pub fn remove(&self, query: &Query) -> CoreResult<usize> {
        let query = query.clone();
        self.queue.run(move |store| store.remove(&query))?
    }

    /// Applies `change` to every document matching `query` and returns how
    /// many were changed.
    ///
    /// With `replace` set each document is rebuilt from `change` alone.
    /// `_id` is never changed.
    ///
    /// # Errors
    ///
    /// - `InvalidDataType` if a path runs through a non-document or an
    ///   arithmetic operator meets a non-number
    /// - I/O errors from the log append
    ///
    /// On error no document is changed.
    pub fn update(&self, query: &Query, change: &ChangeSpec, replace: bool) -> CoreResult<usize> {
        let query = query.clone();
        let change = change.clone();
        self.queue
            .run(move |store| store.update(&query, &change, replace))?
    }

    /// Rewrites the log to hold only the current documents.
    ///
    /// # Errors
    ///
    /// I/O errors. After a failure past the backup rename, writes fail with
    /// `LogUnavailable` until the database is reopened.
    pub fn cleanup(&self) -> CoreResult<&Self> {
        self.queue.run(Store::compact)??;
        Ok(self)
    }

    /// Calls `callback` with every change relevant to `query`.
    ///
    /// The callback runs on the database worker before the mutating call
    /// returns. It must not call back into this database; such calls fail
    /// with `ReentrantCall`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`Database::close`].
    pub fn register_listener<F>(&self, query: &Query, callback: F) -> CoreResult<ListenerId>
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let query = query.clone();
        let sink = Sink::Callback(Box::new(callback));
        self.queue.run(move |store| store.register(query, sink))
    }

    /// Returns a channel receiving every change relevant to `query`.
    ///
    /// The listener is dropped when the receiver is.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`Database::close`].
    pub fn subscribe(&self, query: &Query) -> CoreResult<(ListenerId, Receiver<ChangeEvent>)> {
        let (tx, rx) = mpsc::channel();
        let query = query.clone();
        let id = self
            .queue
            .run(move |store| store.register(query, Sink::Channel(tx)))?;
        Ok((id, rx))
    }

    /// Removes a listener. Returns false if it was not registered.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` after [`Database::close`].
    pub fn unregister_listener(&self, id: ListenerId) -> CoreResult<bool> {
        self.queue.run(move |store| store.unregister(id))
    }

    /// Returns a snapshot of the database counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.queue.is_closed()
    }

    /// Waits for queued operations, syncs the log and stops the worker.
    ///
    /// Closing twice is not an error. Every other call fails with
    /// `DatabaseClosed` afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> CoreResult<()> {
        if self.queue.is_closed() {
            return Ok(());
        }
        let synced = self.queue.run(Store::close);
        self.queue.shutdown();
        tracing::debug!(path = %self.path.display(), "database closed");
        synced?
    }
}

/// Returns the query selecting the document with identifier `id`.
#[must_use]
pub fn id_query(id: &DocumentId) -> Query {
    Query::field_eq_str(ID_FIELD, id.as_str())
}

fn file_backend(config: &Config) -> Arc<dyn StorageBackend> {
    if config.create_if_missing {
        Arc::new(FileBackend::with_create_dirs())
    } else {
        Arc::new(FileBackend::new())
    }
}

fn worker_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => format!("objectdb:{}", name.to_string_lossy()),
        None => "objectdb".to_string(),
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("is_open", &self.is_open())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use objectdb_codec::Value;
    use serde_json::{json, Value as JsonValue};
    use std::sync::Mutex;
    use std::time::Duration;

    fn doc(json: JsonValue) -> Document {
        match Value::from(json) {
            Value::Object(map) => map,
            other => panic!("not a document: {other:?}"),
        }
    }

    fn query(json: JsonValue) -> Query {
        Query::from_json(&json).unwrap()
    }

    fn change(json: JsonValue) -> ChangeSpec {
        ChangeSpec::from_json(&json).unwrap()
    }

    fn create_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn insert_then_find_by_id() {
        let db = create_db();
        let input = doc(json!({"name": "a", "tags": ["x", "y"], "n": {"deep": 1.5}}));
        let id = db.insert(input.clone()).unwrap();

        let found = db.find(&id_query(&id)).unwrap();
        assert_eq!(found.len(), 1);
        let mut expected = input;
        expected.insert(ID_FIELD.into(), Value::from(&id));
        assert_eq!(found[0], expected);
        assert_eq!(db.get(&id).unwrap(), Some(expected));
    }

    #[test]
    fn update_scenario() {
        let db = create_db();
        db.insert(doc(json!({"name": "a", "n": 1}))).unwrap();
        db.insert(doc(json!({"name": "b", "n": 2}))).unwrap();

        let updated = db
            .update(&query(json!({"n": {"$gt": 0}})), &change(json!({"$set": {"tag": "x"}})), false)
            .unwrap();
        assert_eq!(updated, 2);
        assert_eq!(db.count(&query(json!({"tag": "x"}))).unwrap(), 2);
    }

    #[test]
    fn remove_count_matches_find() {
        let db = create_db();
        for n in 0..10 {
            db.insert(doc(json!({"n": n}))).unwrap();
        }
        let q = query(json!({"$or": {"n": 3, "$gt": {"n": 6}}}));
        let expected = db.find(&q).unwrap().len();
        assert_eq!(db.remove(&q).unwrap(), expected);
        assert_eq!(db.count(&Query::all()).unwrap(), 10 - expected);
    }

    #[test]
    fn returned_documents_are_copies() {
        let db = create_db();
        let id = db.insert(doc(json!({"n": 1}))).unwrap();
        let mut copy = db.get(&id).unwrap().unwrap();
        copy.insert("n".into(), Value::Int(99));
        assert_eq!(db.get(&id).unwrap().unwrap()["n"], Value::Int(1));
    }

    #[test]
    fn listener_sees_transition() {
        let db = create_db();
        let id = db.insert(doc(json!({"status": "open"}))).unwrap();
        let (_, events) = db.subscribe(&query(json!({"status": "open"}))).unwrap();

        db.update(&id_query(&id), &change(json!({"$set": {"status": "closed"}})), false)
            .unwrap();
        assert_eq!(
            events.recv_timeout(Duration::from_secs(1)).unwrap(),
            ChangeEvent::Removed(vec![id])
        );
    }

    #[test]
    fn callback_listener_and_unregister() {
        let db = create_db();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = db
            .register_listener(&query(json!({"k": 1})), move |event| {
                sink.lock().unwrap().push(event);
            })
            .unwrap();

        db.insert(doc(json!({"k": 1}))).unwrap();
        db.insert(doc(json!({"k": 2}))).unwrap();
        assert!(db.unregister_listener(id).unwrap());
        db.insert(doc(json!({"k": 1}))).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(&seen[0], ChangeEvent::Added(d) if d["k"] == Value::Int(1)));
    }

    #[test]
    fn listener_cannot_reenter() {
        let db = Arc::new(create_db());
        let inner = Arc::clone(&db);
        let result = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&result);
        let id = db
            .register_listener(&Query::all(), move |_| {
                *slot.lock().unwrap() = Some(inner.count(&Query::all()));
            })
            .unwrap();

        db.insert(doc(json!({}))).unwrap();
        let outcome = result.lock().unwrap().take().unwrap();
        assert!(matches!(outcome, Err(CoreError::ReentrantCall)));
        // Drops the listener's handle on the database.
        assert!(db.unregister_listener(id).unwrap());
    }

    #[test]
    fn invalid_input_errors() {
        let db = create_db();
        assert!(db.insert(doc(json!({"_id": 1}))).unwrap_err().is_invalid_data_type());

        let id = db.insert(doc(json!({"_id": "same"}))).unwrap();
        assert!(matches!(
            db.insert(doc(json!({"_id": "same"}))),
            Err(CoreError::DuplicateId { .. })
        ));
        assert_eq!(id.as_str(), "same");
    }

    #[test]
    fn stats_track_activity() {
        let db = create_db();
        let before = db.stats();
        db.insert_many(vec![doc(json!({"n": 1})), doc(json!({"n": 2}))])
            .unwrap();
        db.remove(&query(json!({"n": 1}))).unwrap();
        db.cleanup().unwrap();

        let after = db.stats();
        assert_eq!(after.documents, 1);
        assert_eq!(after.lines_appended, 3);
        assert_eq!(after.compactions, before.compactions + 1);
        assert_eq!(after.inserts, 2);
        assert_eq!(after.removals, 1);
    }

    #[test]
    fn closed_database_rejects_calls() {
        let db = create_db();
        db.close().unwrap();
        db.close().unwrap();
        assert!(!db.is_open());
        assert!(matches!(
            db.find(&Query::all()),
            Err(CoreError::DatabaseClosed)
        ));
    }

    #[test]
    fn first_and_last() {
        let db = create_db();
        assert_eq!(db.first(&Query::all()).unwrap(), None);
        for n in 1..=3 {
            db.insert(doc(json!({"n": n}))).unwrap();
        }
        assert_eq!(db.first(&Query::all()).unwrap().unwrap()["n"], Value::Int(1));
        assert_eq!(db.last(&Query::all()).unwrap().unwrap()["n"], Value::Int(3));
    }
}
