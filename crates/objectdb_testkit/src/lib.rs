//! # ObjectDB Testkit
//!
//! Test utilities for ObjectDB.
//!
//! This crate provides:
//! - Test fixtures: temporary databases that can be reopened in place
//! - Property-based generators for documents and mutation sequences
//! - A storage backend that fails on demand, for crash recovery tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use objectdb_testkit::prelude::*;
//!
//! #[test]
//! fn survives_restart() {
//!     let mut test = TestDatabase::new();
//!     test.insert(doc(json!({"n": 1}))).unwrap();
//!     test.reopen();
//!     assert_eq!(test.count(&Query::all()).unwrap(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use objectdb_core::{ChangeSpec, Config, Database, Document, Query, Value};
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
