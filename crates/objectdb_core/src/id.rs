//! Document identifier.

use objectdb_codec::{Document, Value};
use std::fmt;
use uuid::Uuid;

/// Reserved document key holding the identifier.
pub const ID_FIELD: &str = "_id";

/// Unique identifier for a document.
///
/// Generated identifiers are UUIDv7 strings, so they sort by creation
/// time. Identifiers read back from a log or supplied by a caller may be any
/// string; they are:
/// - Unique within the collection at any point in time
/// - Immutable once assigned
/// - Compared by their string form
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generates a fresh, time-ordered identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().hyphenated().to_string())
    }

    /// Wraps an existing identifier string.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the identifier of a stored document.
    #[must_use]
    pub fn of(doc: &Document) -> Option<Self> {
        doc.get(ID_FIELD)
            .and_then(Value::as_str)
            .map(|s| Self(s.to_string()))
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        Value::String(id.0)
    }
}

impl From<&DocumentId> for Value {
    fn from(id: &DocumentId) -> Self {
        Value::String(id.0.clone())
    }
}

impl From<DocumentId> for String {
    fn from(id: DocumentId) -> Self {
        id.0
    }
}
