//! Dynamic document value type.

use crate::error::{CodecError, CodecResult};
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A document: string keys to values. Key order carries no meaning.
pub type Document = BTreeMap<String, Value>;

/// A dynamic document value.
///
/// Numbers keep the integer/float distinction of their source so that
/// integers round-trip through the log unchanged, but both variants share
/// the [`Shape::Number`] shape and compare numerically with each other.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer number.
    Int(i64),
    /// Floating point number. Must be finite to be stored.
    Float(f64),
    /// Text string (UTF-8).
    String(String),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Nested document.
    Object(Document),
}

/// The runtime shape of a [`Value`], used by the matcher's shape guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// `null`
    Null,
    /// `true` / `false`
    Bool,
    /// Integer or float.
    Number,
    /// Text.
    String,
    /// Sequence.
    Array,
    /// Mapping.
    Object,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Shape::Null => "null",
            Shape::Bool => "boolean",
            Shape::Number => "number",
            Shape::String => "string",
            Shape::Array => "array",
            Shape::Object => "object",
        };
        f.write_str(name)
    }
}

impl Value {
    /// Returns the shape of this value.
    #[must_use]
    pub fn shape(&self) -> Shape {
        match self {
            Value::Null => Shape::Null,
            Value::Bool(_) => Shape::Bool,
            Value::Int(_) | Value::Float(_) => Shape::Number,
            Value::String(_) => Shape::String,
            Value::Array(_) => Shape::Array,
            Value::Object(_) => Shape::Object,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as an `f64`, if it is a number.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get this value as a string slice, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an array slice, if it is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Get this value as a document, if it is one.
    pub fn as_object(&self) -> Option<&Document> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Get this value as a mutable document, if it is one.
    pub fn as_object_mut(&mut self) -> Option<&mut Document> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Orders two values of the same comparable shape.
    ///
    /// Strings compare lexicographically and numbers numerically. Any other
    /// pairing, including mixed shapes, has no order.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Checks that this value can be persisted.
    ///
    /// Every float, at any depth, must be finite.
    pub fn validate(&self) -> CodecResult<()> {
        match self {
            Value::Float(f) if !f.is_finite() => Err(CodecError::invalid_data_type(format!(
                "non-finite number {f} cannot be stored"
            ))),
            Value::Array(items) => items.iter().try_for_each(Value::validate),
            Value::Object(map) => map.values().try_for_each(Value::validate),
            _ => Ok(()),
        }
    }

    /// Converts to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDataType` for non-finite floats, which JSON cannot
    /// represent.
    pub fn to_json(&self) -> CodecResult<JsonValue> {
        Ok(match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(n) => JsonValue::Number((*n).into()),
            Value::Float(f) => JsonNumber::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or_else(|| {
                    CodecError::invalid_data_type(format!("non-finite number {f} cannot be stored"))
                })?,
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Array(items) => {
                JsonValue::Array(items.iter().map(Value::to_json).collect::<CodecResult<_>>()?)
            }
            Value::Object(map) => JsonValue::Object(document_to_json(map)?),
        })
    }
}

/// Converts a document to a JSON object.
pub fn document_to_json(doc: &Document) -> CodecResult<JsonMap<String, JsonValue>> {
    doc.iter()
        .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
        .collect()
}

fn number_from_json(n: &JsonNumber) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Int(i)
    } else if let Some(u) = n.as_u64() {
        Value::Float(u as f64)
    } else {
        // Neither integer form applies, so the number was parsed as a float.
        n.as_f64().map_or(Value::Null, Value::Float)
    }
}

/// Converts a JSON object to a document.
pub fn document_from_json(map: JsonMap<String, JsonValue>) -> Document {
    map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
}

/// Encodes a document as a single line of JSON text.
pub fn encode_document(doc: &Document) -> CodecResult<String> {
    Ok(serde_json::to_string(&JsonValue::Object(document_to_json(doc)?))?)
}

/// Decodes JSON text that must hold a mapping.
///
/// # Errors
///
/// Returns `Json` for malformed text and `InvalidDataType` when the text is
/// valid JSON but not a mapping.
pub fn decode_document(text: &str) -> CodecResult<Document> {
    match serde_json::from_str::<JsonValue>(text)? {
        JsonValue::Object(map) => Ok(document_from_json(map)),
        other => Err(CodecError::invalid_data_type(format!(
            "expected a document, found {}",
            Value::from(other).shape()
        ))),
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

/// Converts parsed JSON.
///
/// Integers that fit in an `i64` become [`Value::Int`]. Larger unsigned
/// integers have no exact representation and are stored as the nearest
/// [`Value::Float`], so they lose precision above 2^53.
impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => number_from_json(&n),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => Value::Object(document_from_json(map)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc)
    }
}
