//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while parsing, validating or encoding values,
/// queries and change specs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A query key or operand is malformed.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// A value is outside the supported shape set, or has the wrong shape
    /// for where it appears.
    #[error("invalid data type: {message}")]
    InvalidDataType {
        /// Description of the problem.
        message: String,
    },

    /// A change spec uses an operator token that does not exist.
    #[error("invalid update operator: {token}")]
    InvalidUpdateOperator {
        /// The offending token.
        token: String,
    },

    /// The text is not valid JSON.
    #[error("JSON error: {message}")]
    Json {
        /// Parser message.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Create an invalid data type error.
    pub fn invalid_data_type(message: impl Into<String>) -> Self {
        Self::InvalidDataType {
            message: message.into(),
        }
    }

    /// Create an invalid update operator error.
    pub fn invalid_update_operator(token: impl Into<String>) -> Self {
        Self::InvalidUpdateOperator {
            token: token.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}
