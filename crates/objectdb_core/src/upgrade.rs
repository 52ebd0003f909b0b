//! Schema upgrades run while opening.
//!
//! The log header records the client version that last compacted it. When
//! a database is opened with a different [`Config::client_version`], the
//! upgrade callback runs against an [`UpgradeSession`] before anything else
//! can reach the database, and a compaction then stamps the new version.
//!
//! ## Usage
//!
//! ```ignore
//! let config = Config::new().client_version(2);
//! let db = Database::open_with_upgrade("app.db", config, |session, from| {
//!     if from < 2 {
//!         let change = ChangeSpec::parse(r#"{"$rename": {"mail": "email"}}"#)?;
//!         session.update(&Query::all(), &change, false)?;
//!     }
//!     Ok(())
//! })?;
//! ```
//!
//! Every write made through the session is appended to the log before the
//! compaction starts. If the callback fails, the open fails with
//! [`CoreError::UpgradeFailed`] and the header keeps the old version.
//!
//! [`Config::client_version`]: crate::Config::client_version
//! [`CoreError::UpgradeFailed`]: crate::CoreError::UpgradeFailed

use crate::error::{BoxError, CoreResult};
use crate::id::DocumentId;
use crate::store::Store;
use objectdb_codec::{ChangeSpec, Document, Query};

/// Upgrade callback: receives the session and the version found in the log.
pub type UpgradeFn = Box<dyn FnOnce(&mut UpgradeSession<'_>, u32) -> Result<(), BoxError> + Send>;

/// Access to the database while an upgrade runs.
///
/// Operations behave as their [`Database`](crate::Database) counterparts,
/// including log appends and listener notification.
pub struct UpgradeSession<'a> {
    store: &'a mut Store,
    from: u32,
    writes: usize,
}

impl<'a> UpgradeSession<'a> {
    pub(crate) fn new(store: &'a mut Store, from: u32) -> Self {
        Self {
            store,
            from,
            writes: 0,
        }
    }

    /// Returns the client version found in the log.
    #[must_use]
    pub fn from_version(&self) -> u32 {
        self.from
    }

    /// Returns the number of documents written through this session.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Returns the documents matching `query`.
    #[must_use]
    pub fn find(&self, query: &Query) -> Vec<Document> {
        self.store.find(query)
    }

    /// Returns the first document matching `query`.
    #[must_use]
    pub fn first(&self, query: &Query) -> Option<Document> {
        self.store.first(query)
    }

    /// Returns the last document matching `query`.
    #[must_use]
    pub fn last(&self, query: &Query) -> Option<Document> {
        self.store.last(query)
    }

    /// Counts the documents matching `query`.
    #[must_use]
    pub fn count(&self, query: &Query) -> usize {
        self.store.count(query)
    }

    /// Inserts a document.
    ///
    /// # Errors
    ///
    /// See [`Database::insert`](crate::Database::insert).
    pub fn insert(&mut self, doc: Document) -> CoreResult<DocumentId> {
        let id = self.store.insert(doc)?;
        self.writes += 1;
        Ok(id)
    }

    /// Inserts several documents.
    ///
    /// # Errors
    ///
    /// See [`Database::insert_many`](crate::Database::insert_many).
    pub fn insert_many(&mut self, docs: Vec<Document>) -> CoreResult<Vec<DocumentId>> {
        let ids = self.store.insert_many(docs)?;
        self.writes += ids.len();
        Ok(ids)
    }

    /// Removes the documents matching `query`.
    ///
    /// # Errors
    ///
    /// See [`Database::remove`](crate::Database::remove).
    pub fn remove(&mut self, query: &Query) -> CoreResult<usize> {
        let count = self.store.remove(query)?;
        self.writes += count;
        Ok(count)
    }

    /// Updates the documents matching `query`.
    ///
    /// # Errors
    ///
    /// See [`Database::update`](crate::Database::update).
    pub fn update(&mut self, query: &Query, change: &ChangeSpec, replace: bool) -> CoreResult<usize> {
        let count = self.store.update(query, change, replace)?;
        self.writes += count;
        Ok(count)
    }
}

impl std::fmt::Debug for UpgradeSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeSession")
            .field("from", &self.from)
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}
