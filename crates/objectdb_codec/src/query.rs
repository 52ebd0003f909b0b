//! Query AST and its JSON form.
//!
//! A query is a mapping whose keys are field paths or operator tokens:
//!
//! ```text
//! {"status": "open", "$or": {"owner": "ann", "size": 3}}
//! {"items.[].qty": 2}
//! {"$gt": {"n": 0}}           field `n` greater than 0
//! {"n": {"$gt": 0}}           same, written at the field
//! {"name": {"type": "regex", "pattern": "^a", "flags": "i"}}
//! ```
//!
//! Parsing validates operator tokens and operand shapes once, so the matcher
//! works on enum variants only. Encoding reproduces the same JSON shape,
//! which is what the log persists.

use crate::error::{CodecError, CodecResult};
use crate::operator::{is_operator_key, Operator};
use crate::value::Value;
use regex::{Regex, RegexBuilder};
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::fmt;

/// Marker value of the `type` key in a regex envelope.
pub const REGEX_TYPE: &str = "regex";

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Descend into a mapping key.
    Key(String),
    /// Fan out over every element of a sequence.
    Each,
}

/// A dotted field path such as `a.b` or `items.[].qty`.
///
/// `[]` may stand alone between dots or trail a key (`items[].qty`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl FieldPath {
    /// Parses a field path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` for empty segments.
    pub fn parse(raw: &str) -> CodecResult<Self> {
        let mut segments = Vec::new();
        for part in raw.split('.') {
            if part == "[]" {
                segments.push(PathSegment::Each);
            } else if let Some(key) = part.strip_suffix("[]") {
                if key.is_empty() {
                    return Err(CodecError::invalid_query(format!("bad path segment in {raw:?}")));
                }
                segments.push(PathSegment::Key(key.to_string()));
                segments.push(PathSegment::Each);
            } else if part.is_empty() {
                return Err(CodecError::invalid_query(format!("empty path segment in {raw:?}")));
            } else {
                segments.push(PathSegment::Key(part.to_string()));
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Returns the path as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A compiled regular expression operand.
///
/// Persisted as `{"type": "regex", "pattern": ..., "flags": ...}`.
/// Recognised flags are `i`, `m` and `s`; others are kept but ignored.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    flags: String,
    regex: Regex,
}

impl Pattern {
    /// Compiles a pattern.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if the pattern does not compile.
    pub fn new(source: &str, flags: &str) -> CodecResult<Self> {
        let regex = RegexBuilder::new(source)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .build()
            .map_err(|e| CodecError::invalid_query(format!("bad regex {source:?}: {e}")))?;
        Ok(Self {
            source: source.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }

    /// Returns true if the pattern matches somewhere in `text`.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    /// Returns the pattern source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    fn from_envelope(map: &JsonMap<String, JsonValue>) -> Option<CodecResult<Self>> {
        if map.get("type").and_then(JsonValue::as_str) != Some(REGEX_TYPE) {
            return None;
        }
        if map
            .keys()
            .any(|k| !matches!(k.as_str(), "type" | "pattern" | "flags"))
        {
            return None;
        }
        let pattern = map.get("pattern").and_then(JsonValue::as_str)?;
        let flags = match map.get("flags") {
            None => "",
            Some(JsonValue::String(flags)) => flags.as_str(),
            Some(_) => return None,
        };
        Some(Self::new(pattern, flags))
    }

    fn to_envelope(&self) -> JsonValue {
        let mut map = JsonMap::new();
        map.insert("type".into(), JsonValue::String(REGEX_TYPE.into()));
        map.insert("pattern".into(), JsonValue::String(self.source.clone()));
        if !self.flags.is_empty() {
            map.insert("flags".into(), JsonValue::String(self.flags.clone()));
        }
        JsonValue::Object(map)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

/// The right-hand side of a field condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A literal scalar or sequence.
    Value(Value),
    /// A regular expression tested against string fields.
    Regex(Pattern),
    /// A sub-query applied to the sub-document found at the path.
    Nested(Query),
    /// Operators written at the field, e.g. `{"n": {"$gt": 0, "$lt": 9}}`.
    /// Each pair behaves like `{op: {path: operand}}`.
    Operators(Vec<(Operator, Operand)>),
}

/// One key of a query mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// An operator key whose value is a sub-query.
    Operator {
        /// The operator.
        op: Operator,
        /// Conditions evaluated under `op`.
        sub: Query,
    },
    /// A field path key.
    Field {
        /// Where to look in the document.
        path: FieldPath,
        /// What to compare against.
        operand: Operand,
    },
}

/// A parsed query.
///
/// The empty query matches every document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    conditions: Vec<Condition>,
}

impl Query {
    /// Returns the query matching every document.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Returns a query matching the field `field` equal to the string `value`.
    #[must_use]
    pub fn field_eq_str(field: &str, value: &str) -> Self {
        let segments = vec![PathSegment::Key(field.to_string())];
        Self {
            conditions: vec![Condition::Field {
                path: FieldPath {
                    raw: field.to_string(),
                    segments,
                },
                operand: Operand::Value(Value::String(value.to_string())),
            }],
        }
    }

    /// Returns the top-level conditions.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns true if the query has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Parses a query from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` if the value is not a mapping, uses an unknown
    /// operator token, or gives an operator a value of the wrong shape.
    pub fn from_json(json: &JsonValue) -> CodecResult<Self> {
        match json {
            JsonValue::Object(map) => Self::parse_map(map, Operator::And),
            other => Err(CodecError::invalid_query(format!(
                "query must be a mapping, found {}",
                Value::from(other.clone()).shape()
            ))),
        }
    }

    /// Parses a query from JSON text.
    ///
    /// # Errors
    ///
    /// As [`Query::from_json`], plus `Json` for malformed text.
    pub fn parse(text: &str) -> CodecResult<Self> {
        Self::from_json(&serde_json::from_str(text)?)
    }

    /// Encodes the query back to its JSON form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDataType` if an operand holds a non-finite float.
    pub fn to_json(&self) -> CodecResult<JsonValue> {
        let mut map = JsonMap::new();
        for condition in &self.conditions {
            match condition {
                Condition::Operator { op, sub } => {
                    map.insert(op.token().to_string(), sub.to_json()?);
                }
                Condition::Field { path, operand } => {
                    map.insert(path.as_str().to_string(), operand.to_json()?);
                }
            }
        }
        Ok(JsonValue::Object(map))
    }

    fn parse_map(map: &JsonMap<String, JsonValue>, ctx: Operator) -> CodecResult<Self> {
        let mut conditions = Vec::with_capacity(map.len());
        for (key, value) in map {
            if is_operator_key(key) {
                let op = Operator::from_token(key)
                    .ok_or_else(|| CodecError::invalid_query(format!("unknown operator {key}")))?;
                let JsonValue::Object(inner) = value else {
                    return Err(CodecError::invalid_query(format!(
                        "operator {key} needs a mapping of conditions"
                    )));
                };
                conditions.push(Condition::Operator {
                    op,
                    sub: Self::parse_map(inner, op)?,
                });
            } else {
                conditions.push(Condition::Field {
                    path: FieldPath::parse(key)?,
                    operand: Operand::parse(value, ctx)?,
                });
            }
        }
        Ok(Self { conditions })
    }
}

impl Operand {
    fn parse(json: &JsonValue, ctx: Operator) -> CodecResult<Self> {
        let JsonValue::Object(map) = json else {
            if ctx.takes_sequence() && !json.is_array() {
                return Err(CodecError::invalid_query(format!(
                    "operand of {ctx} must be a sequence"
                )));
            }
            return Ok(Operand::Value(Value::from(json.clone())));
        };

        if let Some(pattern) = Pattern::from_envelope(map) {
            if ctx.takes_sequence() {
                return Err(CodecError::invalid_query(format!(
                    "operand of {ctx} must be a sequence"
                )));
            }
            return pattern.map(Operand::Regex);
        }

        let operator_keys = map.keys().filter(|k| is_operator_key(k)).count();
        if operator_keys == 0 {
            return Ok(Operand::Nested(Query::parse_map(map, ctx)?));
        }
        if operator_keys != map.len() {
            return Err(CodecError::invalid_query(
                "field operand mixes operators and field names",
            ));
        }

        map.iter()
            .map(|(key, inner)| {
                let op = Operator::from_token(key)
                    .ok_or_else(|| CodecError::invalid_query(format!("unknown operator {key}")))?;
                Ok((op, Operand::parse(inner, op)?))
            })
            .collect::<CodecResult<Vec<_>>>()
            .map(Operand::Operators)
    }

    fn to_json(&self) -> CodecResult<JsonValue> {
        match self {
            Operand::Value(value) => value.to_json(),
            Operand::Regex(pattern) => Ok(pattern.to_envelope()),
            Operand::Nested(query) => query.to_json(),
            Operand::Operators(ops) => {
                let mut map = JsonMap::new();
                for (op, operand) in ops {
                    map.insert(op.token().to_string(), operand.to_json()?);
                }
                Ok(JsonValue::Object(map))
            }
        }
    }
}

impl TryFrom<JsonValue> for Query {
    type Error = CodecError;

    fn try_from(json: JsonValue) -> CodecResult<Self> {
        Self::from_json(&json)
    }
}
