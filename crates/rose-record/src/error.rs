//! Error types for Rose records
//!
//! Provides error handling for:
//! - Flat records that do not describe a scenario
//! - Failed or rejected remote calls

use serde_json::Value;

/// Errors while reading a flat record into a typed scenario
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// Required field absent
    #[error("record is missing field '{0}'")]
    MissingField(&'static str),

    /// Field present but unusable
    #[error("invalid value for field '{field}': {value}")]
    InvalidField { field: &'static str, value: String },

    /// Top-level value was not an object
    #[error("expected a record object, got {0}")]
    NotARecord(String),
}

impl RecordError {
    /// Create invalid field error
    pub fn invalid(field: &'static str, value: &Value) -> Self {
        Self::InvalidField {
            field,
            value: value.to_string(),
        }
    }
}

/// Errors returned by a remote call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The server has no record with the requested id
    #[error("{0}")]
    NotFound(String),

    /// Server answered with a non-success status
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Successful status but the body could not be understood
    #[error("could not decode response: {0}")]
    Decode(String),

    /// Request never produced a response
    #[error("transport failed: {0}")]
    Transport(String),

    /// Re-authentication failed
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl RemoteError {
    /// Create server error
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Check if the server reported a missing record
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
