//! # ObjectDB Storage
//!
//! The filesystem boundary for ObjectDB.
//!
//! Backends are **opaque byte stores** addressed by path. They know nothing
//! about log records, meta headers or compaction; they only offer the five
//! primitives the log protocol is built from:
//!
//! - test whether a file exists
//! - stream a file's bytes
//! - open a file for appending (creating it if absent)
//! - rename a file
//! - remove a file
//!
//! ## Available Backends
//!
//! - [`FileBackend`] - OS files
//! - [`InMemoryBackend`] - shared in-process map, for tests and ephemeral stores
//!
//! ## Example
//!
//! ```rust
//! use objectdb_storage::{InMemoryBackend, StorageBackend};
//! use std::io::Read;
//! use std::path::Path;
//!
//! let backend = InMemoryBackend::new();
//! let path = Path::new("db.log");
//! let mut handle = backend.open_append(path).unwrap();
//! handle.append(b"hello\n").unwrap();
//! drop(handle);
//!
//! let mut text = String::new();
//! backend.open_read(path).unwrap().read_to_string(&mut text).unwrap();
//! assert_eq!(text, "hello\n");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{AppendHandle, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
