//! File-based storage backend for persistent storage.

use crate::backend::{AppendHandle, StorageBackend};
use crate::error::{StorageError, StorageResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

/// A backend over the OS filesystem.
///
/// # Durability
///
/// - [`AppendHandle::flush`] calls `File::flush()` to push data to the OS
/// - [`AppendHandle::sync`] calls `File::sync_data()` to ensure data is on disk
/// - `rename` and `remove` fsync the parent directory on Unix so the
///   directory entry change survives a crash
///
/// # Example
///
/// ```no_run
/// use objectdb_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::new();
/// let mut log = backend.open_append(Path::new("data.log")).unwrap();
/// log.append(b"+{}\n").unwrap();
/// log.sync().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileBackend {
    create_dirs: bool,
}

impl FileBackend {
    /// Creates a backend that expects parent directories to exist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that creates missing parent directories on
    /// `open_append`.
    #[must_use]
    pub fn with_create_dirs() -> Self {
        Self { create_dirs: true }
    }

    fn sync_parent(path: &Path) -> io::Result<()> {
        #[cfg(unix)]
        {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                File::open(parent)?.sync_all()?;
            }
        }
        #[cfg(not(unix))]
        let _ = path;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn exists(&self, path: &Path) -> StorageResult<bool> {
        Ok(path.try_exists()?)
    }

    fn open_read(&self, path: &Path) -> StorageResult<Box<dyn Read + Send>> {
        match File::open(path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::not_found(path)),
            Err(e) => Err(e.into()),
        }
    }

    fn open_append(&self, path: &Path) -> StorageResult<Box<dyn AppendHandle>> {
        if self.create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(FileAppendHandle {
            path: path.to_path_buf(),
            file,
        }))
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        match fs::rename(from, to) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(from))
            }
            Err(e) => return Err(e.into()),
        }
        Self::sync_parent(to)?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Self::sync_parent(path).map_err(Into::into),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Append handle over an OS file opened in append mode.
#[derive(Debug)]
struct FileAppendHandle {
    path: PathBuf,
    file: File,
}

impl AppendHandle for FileAppendHandle {
    fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.file.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.file.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.flush()?;
        self.file.sync_data().map_err(|e| {
            StorageError::Io(io::Error::new(
                e.kind(),
                format!("sync of {} failed: {e}", self.path.display()),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn read_string(backend: &FileBackend, path: &Path) -> String {
        let mut text = String::new();
        backend
            .open_read(path)
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        text
    }

    #[test]
    fn open_append_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");
        let backend = FileBackend::new();

        assert!(!backend.exists(&path).unwrap());
        let _handle = backend.open_append(&path).unwrap();
        assert!(backend.exists(&path).unwrap());
        assert_eq!(read_string(&backend, &path), "");
    }

    #[test]
    fn append_preserves_existing_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");
        let backend = FileBackend::new();

        {
            let mut handle = backend.open_append(&path).unwrap();
            handle.append(b"hello").unwrap();
            handle.sync().unwrap();
        }
        {
            let mut handle = backend.open_append(&path).unwrap();
            handle.append(b" world").unwrap();
            handle.flush().unwrap();
        }

        assert_eq!(read_string(&backend, &path), "hello world");
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new();

        let err = backend.open_read(&dir.path().join("missing")).err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn rename_replaces_target() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.log");
        let b = dir.path().join("b.log");
        let backend = FileBackend::new();

        backend.open_append(&a).unwrap().append(b"from a").unwrap();
        backend.open_append(&b).unwrap().append(b"from b").unwrap();

        backend.rename(&a, &b).unwrap();
        assert!(!backend.exists(&a).unwrap());
        assert_eq!(read_string(&backend, &b), "from a");
    }

    #[test]
    fn rename_missing_source_fails() {
        let dir = tempdir().unwrap();
        let backend = FileBackend::new();

        let err = backend
            .rename(&dir.path().join("nope"), &dir.path().join("other"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.log");
        let backend = FileBackend::new();

        backend.open_append(&path).unwrap();
        backend.remove(&path).unwrap();
        assert!(!path.exists());
        backend.remove(&path).unwrap();
    }

    #[test]
    fn create_dirs_on_append() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("path").join("test.log");

        assert!(FileBackend::new().open_append(&path).is_err());
        FileBackend::with_create_dirs().open_append(&path).unwrap();
        assert!(path.exists());
    }
}
