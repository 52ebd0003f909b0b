//! Log line types and their text encoding.

use crate::error::{CoreError, CoreResult};
use objectdb_codec::{decode_document, encode_document, ChangeSpec, Document, Query};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Marker opening the meta line.
pub const META_MARKER: &str = "$objectdb";

/// Current on-disk format version.
pub const STORAGE_VERSION: u32 = 1;

/// Prefix of an insert line.
pub const INSERT_PREFIX: char = '+';
/// Prefix of a remove line.
pub const REMOVE_PREFIX: char = '-';
/// Prefix of an update line.
pub const UPDATE_PREFIX: char = '~';

/// Header stored on the first line of a compacted log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    /// Format version of the file.
    pub storage_version: u32,
    /// Schema version declared by the client that last compacted the file.
    pub client_version: u32,
}

impl Default for Meta {
    fn default() -> Self {
        Self::for_client(0)
    }
}

impl Meta {
    /// Creates the header for the current format and `client_version`.
    #[must_use]
    pub const fn for_client(client_version: u32) -> Self {
        Self {
            storage_version: STORAGE_VERSION,
            client_version,
        }
    }

    /// Encodes the meta line, without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> CoreResult<String> {
        Ok(format!("{META_MARKER}{}", serde_json::to_string(self)?))
    }

    /// Decodes a meta line. Returns `Ok(None)` if `line` is not one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` if the marker is present but the header
    /// cannot be read or names a newer storage version.
    pub fn decode(line: &str) -> CoreResult<Option<Self>> {
        let Some(body) = line.strip_prefix(META_MARKER) else {
            return Ok(None);
        };
        let meta: Self = serde_json::from_str(body)
            .map_err(|e| CoreError::invalid_format(format!("unreadable meta line: {e}")))?;
        if meta.storage_version > STORAGE_VERSION {
            return Err(CoreError::invalid_format(format!(
                "storage version {} is newer than supported version {STORAGE_VERSION}",
                meta.storage_version
            )));
        }
        Ok(Some(meta))
    }
}

/// One data line of the log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    /// A document was inserted.
    Insert(Document),
    /// Documents matching the query were removed.
    Remove(Query),
    /// Documents matching the query were updated.
    Update {
        /// Selects the documents.
        query: Query,
        /// Applied to each selected document.
        change: ChangeSpec,
        /// Whether the change replaced the document body.
        replace: bool,
    },
}

#[derive(Serialize, Deserialize)]
struct UpdateEnvelope {
    q: JsonValue,
    c: JsonValue,
    r: bool,
}

impl LogRecord {
    /// Returns the one-character tag written before the payload.
    #[must_use]
    pub fn prefix(&self) -> char {
        match self {
            Self::Insert(_) => INSERT_PREFIX,
            Self::Remove(_) => REMOVE_PREFIX,
            Self::Update { .. } => UPDATE_PREFIX,
        }
    }

    /// Encodes the record as one line, without the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDataType` if a value cannot be represented in JSON.
    pub fn encode(&self) -> CoreResult<String> {
        let body = match self {
            Self::Insert(doc) => encode_document(doc)?,
            Self::Remove(query) => serde_json::to_string(&query.to_json()?)?,
            Self::Update {
                query,
                change,
                replace,
            } => serde_json::to_string(&UpdateEnvelope {
                q: query.to_json()?,
                c: change.to_json()?,
                r: *replace,
            })?,
        };
        Ok(format!("{}{body}", self.prefix()))
    }

    /// Decodes a data line.
    ///
    /// Returns `Ok(None)` for a line whose tag is not recognised. A line
    /// starting directly with `{` is a bare insert from older writers.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the payload does not decode.
    pub fn decode(line: &str) -> CoreResult<Option<Self>> {
        let mut chars = line.chars();
        let record = match chars.next() {
            Some(INSERT_PREFIX) => Self::Insert(decode_document(chars.as_str())?),
            Some('{') => Self::Insert(decode_document(line)?),
            Some(REMOVE_PREFIX) => Self::Remove(Query::parse(chars.as_str())?),
            Some(UPDATE_PREFIX) => {
                let envelope: UpdateEnvelope = serde_json::from_str(chars.as_str())?;
                Self::Update {
                    query: Query::from_json(&envelope.q)?,
                    change: ChangeSpec::from_json(&envelope.c)?,
                    replace: envelope.r,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objectdb_codec::Value;
    use serde_json::json;

    fn doc(json: JsonValue) -> Document {
        match Value::from(json) {
            Value::Object(map) => map,
            other => panic!("not a document: {other:?}"),
        }
    }

    #[test]
    fn meta_line_format() {
        let line = Meta::for_client(4).encode().unwrap();
        assert_eq!(line, r#"$objectdb{"storageVersion":1,"clientVersion":4}"#);
        assert_eq!(Meta::decode(&line).unwrap(), Some(Meta::for_client(4)));
        assert_eq!(Meta::decode(r#"+{"a":1}"#).unwrap(), None);
    }

    #[test]
    fn meta_rejects_newer_storage() {
        let line = r#"$objectdb{"storageVersion":9,"clientVersion":0}"#;
        assert!(matches!(
            Meta::decode(line),
            Err(CoreError::InvalidFormat { .. })
        ));
        assert!(Meta::decode("$objectdb{oops").is_err());
    }

    #[test]
    fn insert_line() {
        let record = LogRecord::Insert(doc(json!({"_id": "x", "n": 1})));
        let line = record.encode().unwrap();
        assert_eq!(line, r#"+{"_id":"x","n":1}"#);
        assert_eq!(LogRecord::decode(&line).unwrap(), Some(record));
    }

    #[test]
    fn bare_insert_line() {
        let decoded = LogRecord::decode(r#"{"a":"b"}"#).unwrap();
        assert_eq!(decoded, Some(LogRecord::Insert(doc(json!({"a": "b"})))));
    }

    #[test]
    fn remove_line() {
        let query = Query::from_json(&json!({"$gt": {"n": 3}})).unwrap();
        let line = LogRecord::Remove(query.clone()).encode().unwrap();
        assert_eq!(line, r#"-{"$gt":{"n":3}}"#);
        assert_eq!(
            LogRecord::decode(&line).unwrap(),
            Some(LogRecord::Remove(query))
        );
    }

    #[test]
    fn update_line_envelope() {
        let record = LogRecord::Update {
            query: Query::from_json(&json!({"name": {"type": "regex", "pattern": "^a", "flags": "i"}}))
                .unwrap(),
            change: ChangeSpec::from_json(&json!({"$set": {"tag": "x"}})).unwrap(),
            replace: false,
        };
        let line = record.encode().unwrap();
        assert!(line.starts_with('~'));
        let envelope: JsonValue = serde_json::from_str(&line[1..]).unwrap();
        assert_eq!(envelope["r"], json!(false));
        assert_eq!(envelope["c"], json!({"$set": {"tag": "x"}}));
        assert_eq!(envelope["q"]["name"]["type"], json!("regex"));
        assert_eq!(LogRecord::decode(&line).unwrap(), Some(record));
    }

    #[test]
    fn unknown_tag_is_skipped() {
        assert_eq!(LogRecord::decode("?whatever").unwrap(), None);
        assert_eq!(LogRecord::decode("").unwrap(), None);
    }

    #[test]
    fn bad_payload_is_an_error() {
        assert!(LogRecord::decode("+[1,2]").unwrap_err().is_invalid_data_type());
        assert!(LogRecord::decode(r#"-{"$bogus":{}}"#).unwrap_err().is_invalid_query());
        assert!(LogRecord::decode("~{}").is_err());
    }
}
