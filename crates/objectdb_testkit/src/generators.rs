//! Property-based test generators using proptest.
//!
//! Documents are kept small and float-free so that equality after a trip
//! through the log is exact.

use objectdb_core::{ChangeSpec, CoreResult, Database, Document, Query, Value};
use proptest::prelude::*;
use serde_json::json;

/// Strategy for field names. A small alphabet makes queries hit often.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["a", "b", "c", "tag"]).prop_map(str::to_string)
}

/// Strategy for leaf values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-5i64..5).prop_map(Value::Int),
        prop::sample::select(vec!["x", "y", "z"]).prop_map(Value::from),
    ]
}

/// Strategy for values nested up to two levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..3)
                .prop_map(Value::Object),
        ]
    })
}

/// Strategy for documents without an `_id`.
pub fn document_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..4)
}

/// One mutation against a database.
#[derive(Debug, Clone)]
pub enum Op {
    /// Insert the document.
    Insert(Document),
    /// Remove documents whose `field` equals `value`.
    Remove {
        /// Compared field.
        field: String,
        /// Compared value.
        value: i64,
    },
    /// Increment `a` on documents whose `field` equals `value`.
    Increment {
        /// Compared field.
        field: String,
        /// Compared value.
        value: i64,
    },
    /// Set `tag` on every document.
    Tag(String),
}

impl Op {
    /// Applies the operation.
    ///
    /// # Errors
    ///
    /// Returns the database error. Increments fail on documents whose `a`
    /// is not a number; the caller decides whether that matters.
    pub fn apply(&self, db: &Database) -> CoreResult<()> {
        match self {
            Self::Insert(doc) => db.insert(doc.clone()).map(drop),
            Self::Remove { field, value } => db.remove(&eq_query(field, *value)?).map(drop),
            Self::Increment { field, value } => {
                let change = ChangeSpec::from_json(&json!({"$inc": {"a": 1}}))?;
                db.update(&eq_query(field, *value)?, &change, false).map(drop)
            }
            Self::Tag(tag) => {
                let change = ChangeSpec::from_json(&json!({"$set": {"tag": tag}}))?;
                db.update(&Query::all(), &change, false).map(drop)
            }
        }
    }
}

fn eq_query(field: &str, value: i64) -> CoreResult<Query> {
    let mut json = serde_json::Map::new();
    json.insert(field.to_string(), json!(value));
    Ok(Query::from_json(&serde_json::Value::Object(json))?)
}

/// Strategy for single operations, inserts weighted up.
pub fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => document_strategy().prop_map(Op::Insert),
        1 => (field_name_strategy(), -5i64..5).prop_map(|(field, value)| Op::Remove { field, value }),
        1 => (field_name_strategy(), -5i64..5)
            .prop_map(|(field, value)| Op::Increment { field, value }),
        1 => prop::sample::select(vec!["red", "blue"]).prop_map(|t| Op::Tag(t.to_string())),
    ]
}

/// Strategy for operation sequences.
pub fn ops_strategy(max: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 0..max)
}

/// Applies `ops` in order, ignoring operations the database rejects.
///
/// Rejected operations change nothing, so the database stays a valid
/// model of the accepted prefix.
pub fn apply_ops(db: &Database, ops: &[Op]) {
    for op in ops {
        let _ = op.apply(db);
    }
}
