//! The worker-owned database state.
//!
//! Every public operation ends up as a method call on [`Store`] from the
//! worker thread. Mutations follow the same order:
//!
//! 1. validate and compute the new state (nothing is touched)
//! 2. append the record to the log
//! 3. install the new state in memory
//! 4. notify listeners

use crate::collection::Collection;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::id::DocumentId;
use crate::log::{LogFile, LogRecord, Meta};
use crate::notifier::{ListenerId, Notifier, Sink};
use crate::stats::DatabaseStats;
use crate::upgrade::{UpgradeFn, UpgradeSession};
use objectdb_codec::{ChangeSpec, Document, Query};
use objectdb_storage::StorageBackend;
use std::path::Path;
use std::sync::Arc;

/// Documents, log and listeners of one open database.
#[derive(Debug)]
pub struct Store {
    collection: Collection,
    log: LogFile,
    notifier: Notifier,
    client_version: u32,
    stats: Arc<DatabaseStats>,
}

impl Store {
    /// Runs the open sequence: restore, replay, upgrade, compact.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, an unreadable log, or a failing upgrade
    /// callback. A failed upgrade skips the compaction, so the next open
    /// sees the old client version and runs the upgrade again.
    pub fn open(
        backend: Arc<dyn StorageBackend>,
        path: &Path,
        config: &Config,
        upgrade: Option<UpgradeFn>,
        stats: Arc<DatabaseStats>,
    ) -> CoreResult<Self> {
        let (log, created) =
            LogFile::recover(backend, path, config.create_if_missing, config.sync_on_append)?;
        let mut store = Self {
            collection: Collection::new(),
            log,
            notifier: Notifier::new(),
            client_version: config.client_version,
            stats,
        };

        let collection = &mut store.collection;
        let mut assigned_ids = false;
        let summary = store.log.replay(|record| {
            assigned_ids |= collection.apply_replayed(record)?;
            Ok(())
        })?;
        store.stats.set_documents(store.collection.len());

        let declared = summary.meta.client_version;
        if summary.torn || assigned_ids {
            if assigned_ids {
                tracing::info!("persisting identifiers assigned to legacy documents");
            }
            store.compact_as(declared)?;
        } else {
            store.log.open_append()?;
        }

        if declared != config.client_version {
            match upgrade {
                Some(upgrade) if !created => {
                    tracing::info!(from = declared, to = config.client_version, "upgrading");
                    let mut session = UpgradeSession::new(&mut store, declared);
                    upgrade(&mut session, declared).map_err(|e| CoreError::UpgradeFailed {
                        from: declared,
                        to: config.client_version,
                        message: e.to_string(),
                    })?;
                    tracing::info!(to = config.client_version, "upgrade finished");
                }
                _ => {}
            }
            store.compact()?;
        } else if config.cleanup_on_open {
            store.compact()?;
        }

        tracing::info!(
            path = %store.log.path().display(),
            documents = store.collection.len(),
            "database opened"
        );
        Ok(store)
    }

    /// Returns copies of the documents matching `query`.
    #[must_use]
    pub fn find(&self, query: &Query) -> Vec<Document> {
        self.collection.find(query).cloned().collect()
    }

    /// Returns a copy of the first document matching `query`.
    #[must_use]
    pub fn first(&self, query: &Query) -> Option<Document> {
        self.collection.find(query).next().cloned()
    }

    /// Returns a copy of the last document matching `query`.
    #[must_use]
    pub fn last(&self, query: &Query) -> Option<Document> {
        self.collection.find(query).next_back().cloned()
    }

    /// Counts the documents matching `query`.
    #[must_use]
    pub fn count(&self, query: &Query) -> usize {
        self.collection.find(query).count()
    }

    /// Returns a copy of the document with identifier `id`.
    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        self.collection.get(id).cloned()
    }

    /// Inserts one document.
    pub fn insert(&mut self, doc: Document) -> CoreResult<DocumentId> {
        let (id, doc) = self.collection.prepare_insert(doc, &[])?;
        self.commit_insert(doc)?;
        Ok(id)
    }

    /// Inserts documents in order. All are validated before any is written.
    ///
    /// A write failure part way returns `PartialInsert` naming the
    /// documents committed before it.
    pub fn insert_many(&mut self, docs: Vec<Document>) -> CoreResult<Vec<DocumentId>> {
        let mut ids = Vec::with_capacity(docs.len());
        let mut accepted = Vec::with_capacity(docs.len());
        for doc in docs {
            let (id, doc) = self.collection.prepare_insert(doc, &accepted)?;
            ids.push(id);
            accepted.push(doc);
        }
        for (committed, doc) in accepted.into_iter().enumerate() {
            if let Err(e) = self.commit_insert(doc) {
                if committed == 0 {
                    return Err(e);
                }
                ids.truncate(committed);
                tracing::error!(committed, error = %e, "batch insert failed part way");
                return Err(CoreError::PartialInsert {
                    inserted: ids,
                    source: Box::new(e),
                });
            }
        }
        Ok(ids)
    }

    fn commit_insert(&mut self, doc: Document) -> CoreResult<()> {
        self.append(LogRecord::Insert(doc.clone()))?;
        self.notifier.added(&doc);
        self.collection.push(doc);
        self.stats.record_inserts(1);
        self.stats.set_documents(self.collection.len());
        Ok(())
    }

    /// Removes the documents matching `query`. Returns how many went.
    ///
    /// Listeners fire even when nothing matched. No record is written in
    /// that case.
    pub fn remove(&mut self, query: &Query) -> CoreResult<usize> {
        let ids = self.collection.matching_ids(query);
        if !ids.is_empty() {
            self.append(LogRecord::Remove(query.clone()))?;
            self.collection.remove(query);
            self.stats.record_removals(ids.len());
            self.stats.set_documents(self.collection.len());
        }
        self.notifier.removed(&ids);
        Ok(ids.len())
    }

    /// Updates the documents matching `query`. Returns how many changed.
    pub fn update(&mut self, query: &Query, change: &ChangeSpec, replace: bool) -> CoreResult<usize> {
        let plan = self.collection.plan_update(query, change, replace)?;
        if plan.is_empty() {
            return Ok(0);
        }
        self.append(LogRecord::Update {
            query: query.clone(),
            change: change.clone(),
            replace,
        })?;

        let count = plan.len();
        for position in self.collection.commit_update(plan) {
            if let Some(doc) = self.collection.at(position) {
                self.notifier.updated(doc);
            }
        }
        self.stats.record_updates(count);
        Ok(count)
    }

    /// Rewrites the log to hold only the current documents.
    pub fn compact(&mut self) -> CoreResult<()> {
        self.compact_as(self.client_version)
    }

    fn compact_as(&mut self, client_version: u32) -> CoreResult<()> {
        self.log
            .compact(Meta::for_client(client_version), self.collection.iter())?;
        self.stats.record_compaction();
        Ok(())
    }

    /// Adds a listener.
    pub fn register(&mut self, query: Query, sink: Sink) -> ListenerId {
        let id = self.notifier.register(query, sink);
        tracing::debug!(%id, listeners = self.notifier.len(), "listener registered");
        id
    }

    /// Removes a listener.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        self.notifier.unregister(id)
    }

    /// Syncs and releases the log.
    pub fn close(&mut self) -> CoreResult<()> {
        self.log.close()
    }

    fn append(&mut self, record: LogRecord) -> CoreResult<()> {
        self.log.append(&record)?;
        self.stats.record_append();
        Ok(())
    }
}

impl Collection {
    /// Applies a record read back from the log. Returns true if an
    /// identifier had to be generated.
    fn apply_replayed(&mut self, record: LogRecord) -> CoreResult<bool> {
        match record {
            LogRecord::Insert(doc) => return Ok(self.replay_insert(doc)),
            LogRecord::Remove(query) => {
                self.remove(&query);
            }
            LogRecord::Update {
                query,
                change,
                replace,
            } => {
                let plan = self.plan_update(&query, &change, replace)?;
                self.commit_update(plan);
            }
        }
        Ok(false)
    }
}
