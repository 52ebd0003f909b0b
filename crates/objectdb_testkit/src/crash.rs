//! Crash recovery testing for ObjectDB.
//!
//! [`CrashableBackend`] wraps an [`InMemoryBackend`] and fails chosen
//! operations on demand. Because the in-memory files are shared between
//! clones, a test can stage a failure, drop the database as if the process
//! died, and reopen over the very same bytes.
//!
//! ## Crash Points
//!
//! 1. **Torn append** - an append writes only part of its bytes
//! 2. **Rename** - compaction cannot move the log to its backup
//! 3. **Backup removal** - compaction wrote the new log but died before
//!    deleting the backup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use objectdb_testkit::crash::{CrashPoint, CrashableBackend};
//!
//! let backend = CrashableBackend::new();
//! let db = backend.open("crash.db", Config::default())?;
//! backend.arm(CrashPoint::RemoveBackup);
//! assert!(db.cleanup().is_err());
//! ```

use objectdb_core::{Config, CoreResult, Database};
use objectdb_storage::{
    AppendHandle, InMemoryBackend, StorageBackend, StorageError, StorageResult,
};
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// The next append writes this many bytes, then fails.
    TornAppend(usize),
    /// Like `TornAppend`, after `appends` further appends succeed.
    TornAppendAfter {
        /// Appends that complete first.
        appends: usize,
        /// Bytes the failing append writes.
        bytes: usize,
    },
    /// Every rename fails.
    Rename,
    /// Removing a `.bak` file fails.
    RemoveBackup,
}

#[derive(Debug)]
struct CrashState {
    torn_after: AtomicUsize,
    appends_before_tear: AtomicUsize,
    fail_rename: AtomicBool,
    fail_remove_backup: AtomicBool,
    crashed: AtomicBool,
}

impl Default for CrashState {
    fn default() -> Self {
        Self {
            torn_after: AtomicUsize::new(usize::MAX),
            appends_before_tear: AtomicUsize::new(0),
            fail_rename: AtomicBool::new(false),
            fail_remove_backup: AtomicBool::new(false),
            crashed: AtomicBool::new(false),
        }
    }
}

impl CrashState {
    fn crash(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(io::Error::new(
            io::ErrorKind::Other,
            format!("simulated crash during {what}"),
        ))
    }
}

/// A storage backend wrapper that can simulate crashes.
///
/// Clones share both the files and the crash state.
#[derive(Debug, Clone, Default)]
pub struct CrashableBackend {
    inner: InMemoryBackend,
    state: Arc<CrashState>,
}

impl CrashableBackend {
    /// Creates a backend over fresh in-memory files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the in-memory files underneath.
    pub fn files(&self) -> &InMemoryBackend {
        &self.inner
    }

    /// Opens a database on a clone of this backend.
    ///
    /// # Errors
    ///
    /// Returns the error of [`Database::open_with_backend`].
    pub fn open(&self, path: impl AsRef<Path>, config: Config) -> CoreResult<Database> {
        Database::open_with_backend(Arc::new(self.clone()), path, config, None)
    }

    /// Makes the operation named by `point` fail from now on.
    pub fn arm(&self, point: CrashPoint) {
        match point {
            CrashPoint::TornAppend(bytes) => self.state.torn_after.store(bytes, Ordering::SeqCst),
            CrashPoint::TornAppendAfter { appends, bytes } => {
                self.state.appends_before_tear.store(appends, Ordering::SeqCst);
                self.state.torn_after.store(bytes, Ordering::SeqCst);
            }
            CrashPoint::Rename => self.state.fail_rename.store(true, Ordering::SeqCst),
            CrashPoint::RemoveBackup => {
                self.state.fail_remove_backup.store(true, Ordering::SeqCst);
            }
        }
    }

    /// Clears every armed crash point and the crashed flag.
    pub fn reset(&self) {
        self.state.torn_after.store(usize::MAX, Ordering::SeqCst);
        self.state.appends_before_tear.store(0, Ordering::SeqCst);
        self.state.fail_rename.store(false, Ordering::SeqCst);
        self.state.fail_remove_backup.store(false, Ordering::SeqCst);
        self.state.crashed.store(false, Ordering::SeqCst);
    }

    /// Returns whether a simulated crash has happened.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }
}

impl StorageBackend for CrashableBackend {
    fn exists(&self, path: &Path) -> StorageResult<bool> {
        self.inner.exists(path)
    }

    fn open_read(&self, path: &Path) -> StorageResult<Box<dyn Read + Send>> {
        self.inner.open_read(path)
    }

    fn open_append(&self, path: &Path) -> StorageResult<Box<dyn AppendHandle>> {
        Ok(Box::new(CrashableHandle {
            inner: self.inner.open_append(path)?,
            state: Arc::clone(&self.state),
        }))
    }

    fn rename(&self, from: &Path, to: &Path) -> StorageResult<()> {
        if self.state.fail_rename.load(Ordering::SeqCst) {
            return Err(self.state.crash("rename"));
        }
        self.inner.rename(from, to)
    }

    fn remove(&self, path: &Path) -> StorageResult<()> {
        let is_backup = path
            .extension()
            .is_some_and(|ext| ext == "bak");
        if is_backup && self.state.fail_remove_backup.load(Ordering::SeqCst) {
            return Err(self.state.crash("backup removal"));
        }
        self.inner.remove(path)
    }
}

struct CrashableHandle {
    inner: Box<dyn AppendHandle>,
    state: Arc<CrashState>,
}

impl AppendHandle for CrashableHandle {
    fn append(&mut self, data: &[u8]) -> StorageResult<()> {
        let skipped = self
            .state
            .appends_before_tear
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if skipped {
            return self.inner.append(data);
        }
        let limit = self.state.torn_after.swap(usize::MAX, Ordering::SeqCst);
        if limit < data.len() {
            self.inner.append(&data[..limit])?;
            return Err(self.state.crash("append"));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torn_append_writes_prefix_once() {
        let backend = CrashableBackend::new();
        let path = Path::new("t.log");
        let mut handle = backend.open_append(path).unwrap();

        backend.arm(CrashPoint::TornAppend(3));
        assert!(handle.append(b"abcdef").is_err());
        assert!(backend.has_crashed());
        handle.append(b"\n").unwrap();

        assert_eq!(backend.files().file(path).unwrap(), b"abc\n".to_vec());
    }

    #[test]
    fn only_backups_fail_removal() {
        let backend = CrashableBackend::new();
        backend.files().put_file("a.log", Vec::new());
        backend.files().put_file("a.log.bak", Vec::new());
        backend.arm(CrashPoint::RemoveBackup);

        backend.remove(Path::new("a.log")).unwrap();
        assert!(backend.remove(Path::new("a.log.bak")).is_err());

        backend.reset();
        backend.remove(Path::new("a.log.bak")).unwrap();
        assert!(backend.files().paths().is_empty());
    }
}
