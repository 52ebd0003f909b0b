//! In-memory storage backend for testing.

use crate::backend::{AppendHandle, StorageBackend};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Files = Arc<RwLock<BTreeMap<PathBuf, Vec<u8>>>>;

/// An in-memory storage backend.
///
/// Files live in a map shared by every clone of the backend, so a test can
/// keep one clone, hand another to a database, and inspect or tamper with
/// the files after the database is dropped. This is how crash scenarios are
/// staged without touching the disk.
///
/// # Example
///
/// ```rust
/// use objectdb_storage::{InMemoryBackend, StorageBackend};
/// use std::path::Path;
///
/// let backend = InMemoryBackend::new();
/// backend.put_file("db.log", b"+{\"_id\":\"a\"}\n".to_vec());
/// assert!(backend.exists(Path::new("db.log")).unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    files: Files,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the file at `path`, if present.
    #[must_use]
    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.read().get(path.as_ref()).cloned()
    }

    /// Creates or replaces the file at `path`.
    ///
    /// Useful for staging recovery scenarios.
    pub fn put_file(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        self.files.write().insert(path.into(), data);
    }

    /// Returns the paths of all files, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.read().keys().cloned().collect()
    }
}

impl StorageBackend for InMemoryBackend {
    fn exists(&self, path: &Path) -> StorageResult<bool> {
        Ok(self.files.read().contains_key(path))
    }

    fn open_read(&self, path: &Path) -> StorageResult<Box<dyn Read + Send>> {
        let data = self
            .file(path)
            .ok_or_else(|| StorageError::not_found(path))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn open_append(&self, path: &Path) -> StorageResult<Box<dyn AppendHandle>> {
        self.files.write().entry(path.to_path_buf()).or_default();
        Ok(Box::new(MemoryAppendHandle {
            files: Arc::clone(&self.files),
            path: path.to_path_buf(),
        }))
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        let mut files = self.files.write();
        let data = files
            .remove(from)
            .ok_or_else(|| StorageError::not_found(from))?;
        files.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        self.files.write().remove(path);
        Ok(())
    }
}

/// Append handle writing into the shared file map.
///
/// Like an OS handle it keeps writing to its own path; callers close it
/// before renaming the file underneath.
struct MemoryAppendHandle {
    files: Files,
    path: PathBuf,
}

impl AppendHandle for MemoryAppendHandle {
    fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        self.files
            .write()
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_read_back() {
        let backend = InMemoryBackend::new();
        let path = Path::new("a.log");

        let mut handle = backend.open_append(path).unwrap();
        handle.append(b"one\n").unwrap();
        handle.append(b"two\n").unwrap();

        let mut text = String::new();
        backend
            .open_read(path)
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "one\ntwo\n");
    }

    #[test]
    fn clones_share_files() {
        let backend = InMemoryBackend::new();
        let other = backend.clone();

        other.put_file("shared.log", b"x".to_vec());
        assert_eq!(backend.file("shared.log"), Some(b"x".to_vec()));
    }

    #[test]
    fn rename_moves_contents() {
        let backend = InMemoryBackend::new();
        backend.put_file("a", b"data".to_vec());

        backend.rename(Path::new("a"), Path::new("b")).unwrap();
        assert!(backend.file("a").is_none());
        assert_eq!(backend.file("b"), Some(b"data".to_vec()));
    }

    #[test]
    fn rename_missing_fails() {
        let backend = InMemoryBackend::new();
        let err = backend
            .rename(Path::new("a"), Path::new("b"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn read_missing_fails() {
        let backend = InMemoryBackend::new();
        assert!(backend.open_read(Path::new("missing")).is_err());
    }

    #[test]
    fn remove_missing_is_ok() {
        let backend = InMemoryBackend::new();
        backend.remove(Path::new("missing")).unwrap();
        backend.put_file("x", Vec::new());
        backend.remove(Path::new("x")).unwrap();
        assert!(backend.paths().is_empty());
    }
}
