//! Error types for ObjectDB core.

use objectdb_codec::CodecError;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Boxed error returned by caller-supplied upgrade callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in ObjectDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] objectdb_storage::StorageError),

    /// Query, change spec or value failed to parse or validate.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A caller-supplied `_id` is already taken.
    #[error("duplicate document id: {id}")]
    DuplicateId {
        /// The identifier that collided.
        id: String,
    },

    /// The upgrade callback failed during open.
    #[error("upgrade from client version {from} to {to} failed: {message}")]
    UpgradeFailed {
        /// Version found in the log.
        from: u32,
        /// Version requested by the caller.
        to: u32,
        /// The callback's error.
        message: String,
    },

    /// The log file is unreadable as a log.
    #[error("invalid log format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// A write to the log failed part way, either an append or a
    /// compaction past the backup rename. The log accepts no further
    /// writes; reopening recovers it.
    #[error("log stopped accepting writes after a failed write; reopen the database to recover")]
    LogUnavailable,

    /// A batch insert failed to write part way. The documents in
    /// `inserted` were committed before the failure.
    #[error("batch insert stopped after {} documents: {source}", inserted.len())]
    PartialInsert {
        /// Identifiers of the committed prefix, in batch order.
        inserted: Vec<crate::id::DocumentId>,
        /// The write failure.
        #[source]
        source: Box<CoreError>,
    },

    /// A database call was made from a change listener, which runs on the
    /// worker that would have to serve it.
    #[error("database called from inside a change listener")]
    ReentrantCall,

    /// The database has been closed.
    #[error("database is closed")]
    DatabaseClosed,
}

impl CoreError {
    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid data type error.
    pub fn invalid_data_type(message: impl Into<String>) -> Self {
        Self::Codec(CodecError::invalid_data_type(message))
    }

    /// Returns true for a malformed query.
    #[must_use]
    pub fn is_invalid_query(&self) -> bool {
        matches!(self, Self::Codec(CodecError::InvalidQuery { .. }))
    }

    /// Returns true for a value outside the supported shapes.
    #[must_use]
    pub fn is_invalid_data_type(&self) -> bool {
        matches!(self, Self::Codec(CodecError::InvalidDataType { .. }))
    }

    /// Returns true for an unknown update operator.
    #[must_use]
    pub fn is_invalid_update_operator(&self) -> bool {
        matches!(self, Self::Codec(CodecError::InvalidUpdateOperator { .. }))
    }

    /// Returns true for filesystem failures.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Storage(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.into())
    }
}
