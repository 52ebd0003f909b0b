//! Change spec AST and its JSON form.
//!
//! ```text
//! {"$set": {"a.b": 1}, "$inc": {"n": 2}, "title": "literal overwrite"}
//! ```

use crate::error::{CodecError, CodecResult};
use crate::operator::{is_operator_key, UpdateOperator};
use crate::value::Value;
use serde_json::{Map as JsonMap, Value as JsonValue};

/// One key of a change spec.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Shallow overwrite of a top-level field.
    Overwrite {
        /// Field name, used verbatim (no path traversal).
        field: String,
        /// New value.
        value: Value,
    },
    /// Deep mutations through an update operator.
    Operator {
        /// The operator.
        op: UpdateOperator,
        /// `(dotted path, operand)` pairs.
        targets: Vec<(String, Value)>,
    },
}

/// A parsed change spec.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSpec {
    changes: Vec<Change>,
}

impl ChangeSpec {
    /// Returns the changes in application order.
    #[must_use]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Parses a change spec from its JSON form.
    ///
    /// # Errors
    ///
    /// - `InvalidUpdateOperator` for an unknown `$` token
    /// - `InvalidDataType` when the spec or an operator body is not a
    ///   mapping, or an operand has the wrong shape for its operator
    pub fn from_json(json: &JsonValue) -> CodecResult<Self> {
        let JsonValue::Object(map) = json else {
            return Err(CodecError::invalid_data_type("change spec must be a mapping"));
        };

        let mut changes = Vec::with_capacity(map.len());
        for (key, value) in map {
            if !is_operator_key(key) {
                changes.push(Change::Overwrite {
                    field: key.clone(),
                    value: Value::from(value.clone()),
                });
                continue;
            }

            let op = UpdateOperator::from_token(key)
                .ok_or_else(|| CodecError::invalid_update_operator(key.as_str()))?;
            let JsonValue::Object(body) = value else {
                return Err(CodecError::invalid_data_type(format!(
                    "{op} needs a mapping of paths to operands"
                )));
            };

            let mut targets = Vec::with_capacity(body.len());
            for (path, operand) in body {
                validate_path(path)?;
                let operand = Value::from(operand.clone());
                validate_operand(op, path, &operand)?;
                targets.push((path.clone(), operand));
            }
            changes.push(Change::Operator { op, targets });
        }
        Ok(Self { changes })
    }

    /// Parses a change spec from JSON text.
    ///
    /// # Errors
    ///
    /// As [`ChangeSpec::from_json`], plus `Json` for malformed text.
    pub fn parse(text: &str) -> CodecResult<Self> {
        Self::from_json(&serde_json::from_str(text)?)
    }

    /// Encodes the change spec back to its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDataType` if a value holds a non-finite float.
    pub fn to_json(&self) -> CodecResult<JsonValue> {
        let mut map = JsonMap::new();
        for change in &self.changes {
            match change {
                Change::Overwrite { field, value } => {
                    map.insert(field.clone(), value.to_json()?);
                }
                Change::Operator { op, targets } => {
                    let mut body = JsonMap::new();
                    for (path, operand) in targets {
                        body.insert(path.clone(), operand.to_json()?);
                    }
                    map.insert(op.token().to_string(), JsonValue::Object(body));
                }
            }
        }
        Ok(JsonValue::Object(map))
    }
}

fn validate_path(path: &str) -> CodecResult<()> {
    if path.split('.').any(str::is_empty) {
        return Err(CodecError::invalid_data_type(format!(
            "empty segment in update path {path:?}"
        )));
    }
    Ok(())
}

fn validate_operand(op: UpdateOperator, path: &str, operand: &Value) -> CodecResult<()> {
    if op.is_arithmetic() && operand.as_f64().is_none() {
        return Err(CodecError::invalid_data_type(format!(
            "{op} on {path:?} needs a number, found {}",
            operand.shape()
        )));
    }
    match (op, operand.as_str()) {
        (UpdateOperator::Rename, Some(target)) => validate_path(target),
        (UpdateOperator::Rename, None) => Err(CodecError::invalid_data_type(format!(
            "{op} on {path:?} needs a target path string"
        ))),
        _ => operand.validate(),
    }
}

impl TryFrom<JsonValue> for ChangeSpec {
    type Error = CodecError;

    fn try_from(json: JsonValue) -> CodecResult<Self> {
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn literal_and_operator_keys() {
        let spec = ChangeSpec::from_json(&json!({"title": "x", "$inc": {"n": 1}})).unwrap();
        assert_eq!(spec.changes().len(), 2);
        assert!(spec.changes().iter().any(|c| matches!(
            c,
            Change::Operator {
                op: UpdateOperator::Increment,
                ..
            }
        )));
    }

    #[test]
    fn unknown_operator_rejected() {
        let err = ChangeSpec::from_json(&json!({"$push": {"a": 1}})).unwrap_err();
        assert_eq!(err, CodecError::invalid_update_operator("$push"));
    }

    #[test]
    fn operand_shapes_checked() {
        assert!(matches!(
            ChangeSpec::from_json(&json!({"$inc": {"n": "one"}})),
            Err(CodecError::InvalidDataType { .. })
        ));
        assert!(matches!(
            ChangeSpec::from_json(&json!({"$rename": {"a": 3}})),
            Err(CodecError::InvalidDataType { .. })
        ));
        assert!(matches!(
            ChangeSpec::from_json(&json!({"$set": 5})),
            Err(CodecError::InvalidDataType { .. })
        ));
        assert!(matches!(
            ChangeSpec::from_json(&json!(["nope"])),
            Err(CodecError::InvalidDataType { .. })
        ));
    }

    #[test]
    fn encoding_reproduces_json() {
        let source = json!({
            "$set": {"a.b": [1, 2]},
            "$unset": {"c": true},
            "$rename": {"d": "e.f"},
            "plain": {"nested": "value"}
        });
        let spec = ChangeSpec::from_json(&source).unwrap();
        assert_eq!(spec.to_json().unwrap(), source);
    }
}
