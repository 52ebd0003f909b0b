//! # ObjectDB Codec
//!
//! Values, queries and change specs, and their JSON encoding.
//!
//! This crate provides:
//! - [`Value`] - the tagged union every document is built from
//! - [`Query`] - parsed predicate AST with field paths, operators and regex
//!   operands
//! - [`ChangeSpec`] - parsed update AST
//! - [`Operator`] / [`UpdateOperator`] - the token tables mapping `$`-tokens
//!   to operator tags
//!
//! Parsing happens once at the boundary; the engine only sees enum variants.
//!
//! ## Example
//!
//! ```rust
//! use objectdb_codec::{Query, ChangeSpec};
//! use serde_json::json;
//!
//! let query = Query::from_json(&json!({"n": {"$gt": 0}})).unwrap();
//! let change = ChangeSpec::from_json(&json!({"$set": {"tag": "x"}})).unwrap();
//! assert_eq!(query.to_json().unwrap(), json!({"n": {"$gt": 0}}));
//! assert_eq!(change.to_json().unwrap(), json!({"$set": {"tag": "x"}}));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod error;
mod operator;
mod query;
mod value;

pub use change::{Change, ChangeSpec};
pub use error::{CodecError, CodecResult};
pub use operator::{is_operator_key, Operator, UpdateOperator, OPERATOR_PREFIX};
pub use query::{Condition, FieldPath, Operand, PathSegment, Pattern, Query, REGEX_TYPE};
pub use value::{
    decode_document, document_from_json, document_to_json, encode_document, Document, Shape,
    Value,
};
