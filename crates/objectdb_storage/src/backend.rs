//! Storage backend trait definitions.

use crate::error::StorageResult;
use std::io::Read;
use std::path::Path;

/// A byte-oriented file store.
///
/// The log protocol needs nothing beyond these primitives. Everything about
/// line framing, record tags and crash recovery lives above this trait.
///
/// # Invariants
///
/// - `open_append` creates the file if absent and never truncates it
/// - bytes passed to [`AppendHandle::append`] become visible to a later
///   `open_read` of the same path, in order
/// - `rename` replaces `to` if it already exists
/// - `remove` of a missing file succeeds
///
/// # Implementors
///
/// - [`super::FileBackend`] - For persistent storage
/// - [`super::InMemoryBackend`] - For testing
pub trait StorageBackend: Send + Sync {
    /// Returns whether a file exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check itself fails.
    fn exists(&self, path: &Path) -> StorageResult<bool>;

    /// Opens `path` for sequential reading.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::NotFound`] if the file does not exist.
    fn open_read(&self, path: &Path) -> StorageResult<Box<dyn Read + Send>>;

    /// Opens `path` for appending, creating an empty file if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or opened.
    fn open_append(&self, path: &Path) -> StorageResult<Box<dyn AppendHandle>>;

    /// Atomically renames `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` does not exist or the rename fails.
    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()>;

    /// Removes the file at `path`. Removing a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    fn remove(&self, path: &Path) -> StorageResult<()>;
}

/// An open append-only handle on a single file.
///
/// Dropping the handle closes it.
pub trait AppendHandle: Send {
    /// Appends `data` at the end of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<()>;

    /// Pushes buffered bytes to the operating system.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Flushes and waits until the bytes are durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;
}
