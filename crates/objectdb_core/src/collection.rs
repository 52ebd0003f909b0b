//! The in-memory document collection.
//!
//! Documents are kept in insertion order. Mutations are split into a
//! fallible planning step that only reads, and an infallible commit step, so
//! a caller can make the log durable in between without ever leaving memory
//! and log out of step.

use crate::error::{CoreError, CoreResult};
use crate::id::{DocumentId, ID_FIELD};
use crate::matcher::matches;
use crate::update;
use objectdb_codec::{ChangeSpec, Document, Query, Value};

/// Documents in insertion order.
#[derive(Debug, Default)]
pub struct Collection {
    docs: Vec<Document>,
}

/// Replacement documents computed by [`Collection::plan_update`].
#[derive(Debug)]
pub struct UpdatePlan {
    rewrites: Vec<(usize, Document)>,
}

impl UpdatePlan {
    /// Returns the number of documents the plan rewrites.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rewrites.len()
    }

    /// Returns true if the plan rewrites nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty()
    }
}

impl Collection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Iterates over all documents in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    /// Iterates over the documents matching `query`.
    pub fn find<'a>(&'a self, query: &'a Query) -> impl DoubleEndedIterator<Item = &'a Document> {
        self.docs.iter().filter(move |doc| matches(query, doc))
    }

    /// Looks a document up by identifier.
    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<&Document> {
        self.position(id).map(|i| &self.docs[i])
    }

    fn position(&self, id: &DocumentId) -> Option<usize> {
        self.docs
            .iter()
            .position(|doc| doc.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str()))
    }

    /// Checks a new document and assigns its identifier.
    ///
    /// `pending` holds documents accepted earlier in the same batch, which
    /// count as taken identifiers.
    ///
    /// # Errors
    ///
    /// - `InvalidDataType` if `_id` is present but not a string, or a value
    ///   cannot be stored
    /// - `DuplicateId` if the identifier is already taken
    pub fn prepare_insert(
        &self,
        mut doc: Document,
        pending: &[Document],
    ) -> CoreResult<(DocumentId, Document)> {
        validate(&doc)?;
        let id = match doc.get(ID_FIELD) {
            None => {
                let id = DocumentId::generate();
                doc.insert(ID_FIELD.to_string(), Value::from(&id));
                id
            }
            Some(Value::String(s)) => DocumentId::from_string(s.as_str()),
            Some(other) => {
                return Err(CoreError::invalid_data_type(format!(
                    "{ID_FIELD} must be a string, found {}",
                    other.shape()
                )))
            }
        };

        let taken = self.position(&id).is_some()
            || pending.iter().any(|p| DocumentId::of(p).as_ref() == Some(&id));
        if taken {
            return Err(CoreError::DuplicateId { id: id.into() });
        }
        Ok((id, doc))
    }

    /// Appends a document accepted by [`Collection::prepare_insert`].
    pub fn push(&mut self, doc: Document) {
        self.docs.push(doc);
    }

    /// Applies an insert read back from the log.
    ///
    /// Older logs may hold documents without an identifier; one is
    /// generated and `true` is returned, since the log must be rewritten
    /// before that identifier can be relied on. An insert whose identifier
    /// is already present replaces the earlier document.
    pub fn replay_insert(&mut self, mut doc: Document) -> bool {
        let (id, generated) = match DocumentId::of(&doc) {
            Some(id) => (id, false),
            None => {
                let id = DocumentId::generate();
                doc.insert(ID_FIELD.to_string(), Value::from(&id));
                (id, true)
            }
        };
        match self.position(&id) {
            Some(i) => {
                tracing::warn!(%id, "log inserts an existing id, keeping the later document");
                self.docs[i] = doc;
            }
            None => self.docs.push(doc),
        }
        generated
    }

    /// Returns the identifiers of the documents matching `query`.
    #[must_use]
    pub fn matching_ids(&self, query: &Query) -> Vec<DocumentId> {
        self.find(query).filter_map(DocumentId::of).collect()
    }

    /// Removes every document matching `query`. Returns how many went.
    pub fn remove(&mut self, query: &Query) -> usize {
        let before = self.docs.len();
        self.docs.retain(|doc| !matches(query, doc));
        before - self.docs.len()
    }

    /// Computes the result of updating every document matching `query`.
    ///
    /// The identifier of each document is carried over, even in replace
    /// mode.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the update engine, or
    /// `InvalidDataType` if a result cannot be stored.
    pub fn plan_update(
        &self,
        query: &Query,
        change: &ChangeSpec,
        replace: bool,
    ) -> CoreResult<UpdatePlan> {
        let mut rewrites = Vec::new();
        for (i, doc) in self.docs.iter().enumerate() {
            if !matches(query, doc) {
                continue;
            }
            let mut next = update::apply(doc, change, replace)?;
            match doc.get(ID_FIELD) {
                Some(id) => {
                    next.insert(ID_FIELD.to_string(), id.clone());
                }
                None => {
                    next.remove(ID_FIELD);
                }
            }
            validate(&next)?;
            rewrites.push((i, next));
        }
        Ok(UpdatePlan { rewrites })
    }

    /// Installs the documents of a plan. Returns the positions written.
    pub fn commit_update(&mut self, plan: UpdatePlan) -> Vec<usize> {
        plan.rewrites
            .into_iter()
            .map(|(i, doc)| {
                self.docs[i] = doc;
                i
            })
            .collect()
    }

    /// Returns the document at `position`.
    #[must_use]
    pub fn at(&self, position: usize) -> Option<&Document> {
        self.docs.get(position)
    }
}

fn validate(doc: &Document) -> CoreResult<()> {
    doc.values().try_for_each(Value::validate)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value as JsonValue};

    fn doc(json: JsonValue) -> Document {
        match Value::from(json) {
            Value::Object(map) => map,
            other => panic!("not a document: {other:?}"),
        }
    }

    fn query(json: JsonValue) -> Query {
        Query::from_json(&json).unwrap()
    }

    fn insert(coll: &mut Collection, json: JsonValue) -> DocumentId {
        let (id, doc) = coll.prepare_insert(doc(json), &[]).unwrap();
        coll.push(doc);
        id
    }

    #[test]
    fn insert_assigns_id() {
        let mut coll = Collection::new();
        let id = insert(&mut coll, json!({"a": 1}));
        let stored = coll.get(&id).unwrap();
        assert_eq!(stored["a"], Value::Int(1));
        assert_eq!(DocumentId::of(stored), Some(id));
    }

    #[test]
    fn caller_id_is_kept() {
        let mut coll = Collection::new();
        let id = insert(&mut coll, json!({"_id": "mine"}));
        assert_eq!(id.as_str(), "mine");

        let err = coll
            .prepare_insert(doc(json!({"_id": "mine"})), &[])
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { .. }));
    }

    #[test]
    fn batch_duplicates_rejected() {
        let coll = Collection::new();
        let pending = vec![doc(json!({"_id": "x"}))];
        let err = coll
            .prepare_insert(doc(json!({"_id": "x"})), &pending)
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateId { .. }));
    }

    #[test]
    fn non_string_id_rejected() {
        let coll = Collection::new();
        let err = coll.prepare_insert(doc(json!({"_id": 7})), &[]).unwrap_err();
        assert!(err.is_invalid_data_type());
    }

    #[test]
    fn non_finite_value_rejected() {
        let coll = Collection::new();
        let mut bad = Document::new();
        bad.insert("x".into(), Value::Float(f64::INFINITY));
        assert!(coll.prepare_insert(bad, &[]).unwrap_err().is_invalid_data_type());
    }

    #[test]
    fn find_keeps_insertion_order() {
        let mut coll = Collection::new();
        for n in [3, 1, 2] {
            insert(&mut coll, json!({"n": n}));
        }
        let all = query(json!({}));
        let ns: Vec<_> = coll.find(&all).map(|d| d["n"].clone()).collect();
        assert_eq!(ns, vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(coll.find(&all).next_back().unwrap()["n"], Value::Int(2));
    }

    #[test]
    fn remove_returns_count() {
        let mut coll = Collection::new();
        for n in 0..5 {
            insert(&mut coll, json!({"n": n}));
        }
        let q = query(json!({"$gte": {"n": 3}}));
        assert_eq!(coll.matching_ids(&q).len(), 2);
        assert_eq!(coll.remove(&q), 2);
        assert_eq!(coll.len(), 3);
        assert_eq!(coll.remove(&q), 0);
    }

    #[test]
    fn update_preserves_id() {
        let mut coll = Collection::new();
        let id = insert(&mut coll, json!({"name": "a", "n": 1}));

        let change = ChangeSpec::from_json(&json!({"_id": "hijack", "name": "b"})).unwrap();
        let plan = coll.plan_update(&query(json!({})), &change, true).unwrap();
        assert_eq!(plan.len(), 1);
        let written = coll.commit_update(plan);

        let stored = coll.at(written[0]).unwrap();
        assert_eq!(DocumentId::of(stored), Some(id));
        assert_eq!(stored["name"], Value::from("b"));
        assert!(!stored.contains_key("n"));
    }

    #[test]
    fn failed_plan_changes_nothing() {
        let mut coll = Collection::new();
        insert(&mut coll, json!({"a": {"b": 1}}));
        insert(&mut coll, json!({"a": 5}));

        let change = ChangeSpec::from_json(&json!({"$set": {"a.c": 2}})).unwrap();
        assert!(coll.plan_update(&query(json!({})), &change, false).is_err());
        assert!(coll.iter().all(|d| !matches!(&d["a"], Value::Object(m) if m.contains_key("c"))));
    }

    #[test]
    fn replay_insert_replaces_same_id() {
        let mut coll = Collection::new();
        assert!(!coll.replay_insert(doc(json!({"_id": "a", "v": 1}))));
        assert!(!coll.replay_insert(doc(json!({"_id": "a", "v": 2}))));
        assert!(coll.replay_insert(doc(json!({"legacy": true}))));
        assert_eq!(coll.len(), 2);
        assert_eq!(
            coll.get(&DocumentId::from_string("a")).unwrap()["v"],
            Value::Int(2)
        );
        assert!(coll.iter().all(|d| DocumentId::of(d).is_some()));
    }
}
