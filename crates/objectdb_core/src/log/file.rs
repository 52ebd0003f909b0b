//! The log file: recovery, replay, append and compaction.

use crate::error::{CoreError, CoreResult};
use crate::log::record::{LogRecord, Meta};
use objectdb_codec::Document;
use objectdb_storage::{AppendHandle, StorageBackend};
use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Suffix appended to the log path while a compaction is in progress.
pub const BACKUP_SUFFIX: &str = ".bak";

/// Returns the backup path for the log at `path`.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Outcome of reading a log from start to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Header found on line 1, or the default when absent.
    pub meta: Meta,
    /// Data records dispatched.
    pub records: usize,
    /// Lines skipped because their tag was unknown.
    pub skipped: usize,
    /// Whether the log ended in a partial line. Such a log must be
    /// compacted before anything is appended to it.
    pub torn: bool,
}

/// An append-only log of records over a [`StorageBackend`].
///
/// The handle is opened by [`LogFile::open_append`] once replay is done. A
/// failed append or compaction leaves the log without a handle, and every
/// later append fails with [`CoreError::LogUnavailable`].
pub struct LogFile {
    backend: Arc<dyn StorageBackend>,
    path: PathBuf,
    backup: PathBuf,
    handle: Option<Box<dyn AppendHandle>>,
    sync_on_append: bool,
}

impl LogFile {
    /// Prepares the log at `path` for replay.
    ///
    /// A leftover backup means a compaction was interrupted: the partial
    /// main file is discarded and the backup takes its place. Returns the
    /// log and whether the file was created by this call.
    ///
    /// # Errors
    ///
    /// Fails if the backup cannot be restored, or if the file is missing and
    /// `create_if_missing` is false.
    pub fn recover(
        backend: Arc<dyn StorageBackend>,
        path: &Path,
        create_if_missing: bool,
        sync_on_append: bool,
    ) -> CoreResult<(Self, bool)> {
        let backup = backup_path(path);

        if backend.exists(&backup)? {
            tracing::warn!(
                path = %path.display(),
                "found backup from an interrupted compaction, restoring it"
            );
            backend.remove(path)?;
            backend.rename(&backup, path)?;
        }

        let created = !backend.exists(path)?;
        if created {
            if !create_if_missing {
                return Err(CoreError::invalid_format(format!(
                    "log file does not exist: {}",
                    path.display()
                )));
            }
            // Creating the handle creates the file.
            drop(backend.open_append(path)?);
            tracing::debug!(path = %path.display(), "created empty log");
        }

        Ok((
            Self {
                backend,
                path: path.to_path_buf(),
                backup,
                handle: None,
                sync_on_append,
            },
            created,
        ))
    }

    /// Streams every record of the log into `apply`, in file order.
    ///
    /// An unterminated last line that does not decode is a torn write and
    /// ends the log. Any other line that fails to decode is fatal.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` for an undecodable line, or the first error
    /// returned by `apply`.
    pub fn replay<F>(&self, mut apply: F) -> CoreResult<ReplaySummary>
    where
        F: FnMut(LogRecord) -> CoreResult<()>,
    {
        let mut reader = BufReader::new(self.backend.open_read(&self.path)?);
        let mut summary = ReplaySummary {
            meta: Meta::default(),
            records: 0,
            skipped: 0,
            torn: false,
        };
        let mut buf = String::new();
        let mut line_no = 0usize;

        loop {
            buf.clear();
            if reader.read_line(&mut buf)? == 0 {
                break;
            }
            line_no += 1;
            let terminated = buf.ends_with('\n');
            if !terminated {
                summary.torn = true;
            }
            let line = buf.trim_end_matches(['\n', '\r']);

            if line_no == 1 {
                if let Some(meta) = Meta::decode(line)? {
                    summary.meta = meta;
                    continue;
                }
            }
            if line.is_empty() {
                continue;
            }

            match LogRecord::decode(line) {
                Ok(Some(record)) => {
                    apply(record)?;
                    summary.records += 1;
                }
                Ok(None) => {
                    tracing::warn!(line = line_no, "skipping log line with unknown tag");
                    summary.skipped += 1;
                }
                Err(e) if !terminated => {
                    tracing::warn!(line = line_no, error = %e, "discarding torn last line");
                    break;
                }
                Err(e) => {
                    return Err(CoreError::invalid_format(format!(
                        "line {line_no} of {}: {e}",
                        self.path.display()
                    )));
                }
            }
        }

        tracing::debug!(
            path = %self.path.display(),
            records = summary.records,
            skipped = summary.skipped,
            client_version = summary.meta.client_version,
            "replayed log"
        );
        Ok(summary)
    }

    /// Opens the append handle. Further records go to the end of the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open_append(&mut self) -> CoreResult<()> {
        self.handle = Some(self.backend.open_append(&self.path)?);
        Ok(())
    }

    /// Appends one record and, if configured, waits for it to be durable.
    ///
    /// # Errors
    ///
    /// Returns `LogUnavailable` if a previous write failed, or the
    /// underlying write error. After an error the file may end in a partial
    /// line, so the handle is dropped.
    pub fn append(&mut self, record: &LogRecord) -> CoreResult<()> {
        let mut line = record.encode()?;
        line.push('\n');
        let sync = self.sync_on_append;
        let handle = self
            .handle
            .as_mut()
            .ok_or(CoreError::LogUnavailable)?;
        let written = handle
            .append(line.as_bytes())
            .and_then(|()| if sync { handle.sync() } else { handle.flush() });
        if let Err(e) = written {
            self.handle = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Rewrites the log as `meta` followed by one insert per document.
    ///
    /// The old log is renamed to the backup path first and only removed
    /// once the new file is durable, so a crash at any point leaves either
    /// the old or the new log recoverable by [`LogFile::recover`].
    ///
    /// # Errors
    ///
    /// Any I/O failure. If the failure happens after the rename the log
    /// stops accepting writes.
    pub fn compact<'a, I>(&mut self, meta: Meta, docs: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        tracing::debug!(path = %self.path.display(), "compaction started");

        // Encode first: a bad document must not cost us the live log.
        let mut lines = meta.encode()?;
        lines.push('\n');
        let mut count = 0usize;
        for doc in docs {
            lines.push_str(&LogRecord::Insert(doc.clone()).encode()?);
            lines.push('\n');
            count += 1;
        }

        match self.handle.take() {
            Some(mut handle) => handle.sync()?,
            // The backup is the only complete copy left.
            None if self.backend.exists(&self.backup)? => {
                return Err(CoreError::LogUnavailable)
            }
            None => {}
        }
        if let Err(e) = self.backend.rename(&self.path, &self.backup) {
            // Nothing moved yet, the live log is still valid.
            self.open_append()?;
            return Err(e.into());
        }

        let mut fresh = self.backend.open_append(&self.path)?;
        fresh.append(lines.as_bytes())?;
        fresh.sync()?;
        drop(fresh);

        self.backend.remove(&self.backup)?;
        self.open_append()?;

        tracing::info!(
            path = %self.path.display(),
            documents = count,
            client_version = meta.client_version,
            "compaction finished"
        );
        Ok(())
    }

    /// Syncs and releases the append handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&mut self) -> CoreResult<()> {
        if let Some(mut handle) = self.handle.take() {
            handle.sync()?;
        }
        Ok(())
    }

    /// Returns the path of the log.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for LogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFile")
            .field("path", &self.path)
            .field("open", &self.handle.is_some())
            .field("sync_on_append", &self.sync_on_append)
            .finish_non_exhaustive()
    }
}
