//! Applying change specs to documents.
//!
//! Operator paths are dotted (`a.b.c`) and address nested documents only.
//! Intermediate documents are created on write; walking through a value that
//! is not a document is an `InvalidDataType` error.

use crate::error::{CoreError, CoreResult};
use objectdb_codec::{Change, ChangeSpec, Document, UpdateOperator, Value};
use std::cmp::Ordering;

/// Applies `spec` to `doc`, returning the new document.
///
/// With `replace` set the result starts from an empty document, so only the
/// fields written by `spec` survive. The input is never modified; a failing
/// change leaves nothing half-applied for the caller to observe.
///
/// # Errors
///
/// Returns `InvalidDataType` when a path runs through a non-document value
/// or an arithmetic operator meets a non-numeric field.
pub fn apply(doc: &Document, spec: &ChangeSpec, replace: bool) -> CoreResult<Document> {
    let mut out = if replace { Document::new() } else { doc.clone() };

    for change in spec.changes() {
        match change {
            Change::Overwrite { field, value } => {
                out.insert(field.clone(), value.clone());
            }
            Change::Operator { op, targets } => {
                for (path, operand) in targets {
                    apply_operator(&mut out, *op, path, operand)?;
                }
            }
        }
    }
    Ok(out)
}

fn apply_operator(
    doc: &mut Document,
    op: UpdateOperator,
    path: &str,
    operand: &Value,
) -> CoreResult<()> {
    match op {
        UpdateOperator::Set => set_path(doc, path, operand.clone()),
        UpdateOperator::Unset => {
            if operand.as_bool() == Some(true) {
                take_path(doc, path);
            }
            Ok(())
        }
        UpdateOperator::Increment | UpdateOperator::Multiply => {
            let current = numeric_at(doc, path)?;
            let next = arithmetic(op, &current, operand);
            set_path(doc, path, next)
        }
        UpdateOperator::Min | UpdateOperator::Max => {
            let current = numeric_at(doc, path)?;
            let wanted = if op == UpdateOperator::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            if operand.compare(&current) == Some(wanted) {
                set_path(doc, path, operand.clone())
            } else {
                set_path(doc, path, current)
            }
        }
        UpdateOperator::Rename => {
            let Some(target) = operand.as_str() else {
                return Err(CoreError::invalid_data_type(format!(
                    "{op} on {path:?} needs a target path string"
                )));
            };
            match take_path(doc, path) {
                Some(value) => set_path(doc, target, value),
                None => Ok(()),
            }
        }
    }
}

/// Reads the number at `path`, treating a missing field as zero.
fn numeric_at(doc: &Document, path: &str) -> CoreResult<Value> {
    match get_path(doc, path) {
        None | Some(Value::Null) => Ok(Value::Int(0)),
        Some(value) if value.as_f64().is_some() => Ok(value.clone()),
        Some(other) => Err(CoreError::invalid_data_type(format!(
            "field {path:?} holds {}, not a number",
            other.shape()
        ))),
    }
}

fn arithmetic(op: UpdateOperator, current: &Value, operand: &Value) -> Value {
    if let (Value::Int(a), Value::Int(b)) = (current, operand) {
        let exact = if op == UpdateOperator::Increment {
            a.checked_add(*b)
        } else {
            a.checked_mul(*b)
        };
        if let Some(n) = exact {
            return Value::Int(n);
        }
    }
    let a = current.as_f64().unwrap_or(0.0);
    let b = operand.as_f64().unwrap_or(0.0);
    Value::Float(if op == UpdateOperator::Increment {
        a + b
    } else {
        a * b
    })
}

fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn set_path(doc: &mut Document, path: &str, value: Value) -> CoreResult<()> {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };

    let mut target = doc;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        let slot = target
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Document::new()));
        let shape = slot.shape();
        target = slot.as_object_mut().ok_or_else(|| {
            CoreError::invalid_data_type(format!(
                "cannot write {path:?} through {shape} at {segment:?}"
            ))
        })?;
    }
    target.insert(leaf.to_string(), value);
    Ok(())
}

fn take_path(doc: &mut Document, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => take_path(doc.get_mut(head)?.as_object_mut()?, rest),
    }
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

    fn run(input: JsonValue, spec: JsonValue) -> Document {
        apply(&doc(input), &ChangeSpec::from_json(&spec).unwrap(), false).unwrap()
    }

    #[test]
    fn increment_and_min() {
        assert_eq!(run(json!({"x": 5}), json!({"$inc": {"x": 3}})), doc(json!({"x": 8})));
        assert_eq!(run(json!({"x": 5}), json!({"$min": {"x": 3}})), doc(json!({"x": 3})));
        assert_eq!(run(json!({"x": 5}), json!({"$min": {"x": 9}})), doc(json!({"x": 5})));
        assert_eq!(run(json!({"x": 5}), json!({"$max": {"x": 9}})), doc(json!({"x": 9})));
    }

    #[test]
    fn arithmetic_defaults_to_zero() {
        assert_eq!(run(json!({}), json!({"$inc": {"n": 2}})), doc(json!({"n": 2})));
        assert_eq!(run(json!({}), json!({"$mul": {"n": 2}})), doc(json!({"n": 0})));
        assert_eq!(run(json!({}), json!({"$min": {"n": 4}})), doc(json!({"n": 0})));
        assert_eq!(run(json!({}), json!({"$max": {"n": 4}})), doc(json!({"n": 4})));
    }

    #[test]
    fn integers_stay_integers() {
        let out = run(json!({"n": 3}), json!({"$mul": {"n": 4}}));
        assert!(matches!(out["n"], Value::Int(12)));
        let out = run(json!({"n": 3}), json!({"$inc": {"n": 0.5}}));
        assert!(matches!(out["n"], Value::Float(f) if f == 3.5));
        let out = run(json!({"n": i64::MAX}), json!({"$inc": {"n": 1}}));
        assert!(matches!(out["n"], Value::Float(_)));
    }

    #[test]
    fn arithmetic_on_text_fails() {
        let spec = ChangeSpec::from_json(&json!({"$inc": {"s": 1}})).unwrap();
        let err = apply(&doc(json!({"s": "a"})), &spec, false).unwrap_err();
        assert!(err.is_invalid_data_type());
    }

    #[test]
    fn set_creates_intermediates() {
        assert_eq!(
            run(json!({"a": 1}), json!({"$set": {"b.c.d": true}})),
            doc(json!({"a": 1, "b": {"c": {"d": true}}}))
        );
        assert_eq!(
            run(json!({"b": {"keep": 1}}), json!({"$set": {"b.c": 2}})),
            doc(json!({"b": {"keep": 1, "c": 2}}))
        );
    }

    #[test]
    fn set_through_scalar_fails() {
        let spec = ChangeSpec::from_json(&json!({"$set": {"a.b": 1}})).unwrap();
        let input = doc(json!({"a": 5}));
        let err = apply(&input, &spec, false).unwrap_err();
        assert!(err.is_invalid_data_type());
        assert_eq!(input, doc(json!({"a": 5})));
    }

    #[test]
    fn unset_requires_true() {
        assert_eq!(
            run(json!({"a": 1, "b": {"c": 2, "d": 3}}), json!({"$unset": {"a": true, "b.c": true}})),
            doc(json!({"b": {"d": 3}}))
        );
        assert_eq!(
            run(json!({"a": 1}), json!({"$unset": {"a": false}})),
            doc(json!({"a": 1}))
        );
        assert_eq!(
            run(json!({"a": 1}), json!({"$unset": {"x.y": true}})),
            doc(json!({"a": 1}))
        );
    }

    #[test]
    fn rename_moves_value() {
        assert_eq!(
            run(json!({"a": {"b": 1}, "k": 0}), json!({"$rename": {"a.b": "z.y"}})),
            doc(json!({"a": {}, "k": 0, "z": {"y": 1}}))
        );
        assert_eq!(
            run(json!({"k": 0}), json!({"$rename": {"missing": "z"}})),
            doc(json!({"k": 0}))
        );
    }

    #[test]
    fn literal_overwrite_is_shallow() {
        assert_eq!(
            run(json!({"a": {"b": 1, "c": 2}}), json!({"a": {"b": 9}, "a.c": 3})),
            doc(json!({"a": {"b": 9}, "a.c": 3}))
        );
    }

    #[test]
    fn replace_starts_empty() {
        let spec = ChangeSpec::from_json(&json!({"name": "new", "$inc": {"n": 1}})).unwrap();
        let out = apply(&doc(json!({"name": "old", "n": 5, "x": 1})), &spec, true).unwrap();
        assert_eq!(out, doc(json!({"name": "new", "n": 1})));
    }
}
