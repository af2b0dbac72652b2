//! Error types for the scenario API

use rose_record::{RecordError, RemoteError};

/// Errors returned by [`ScenarioApi`](crate::ScenarioApi) operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// Transport or server failure
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Response record could not be typed
    #[error("malformed record: {0}")]
    Record(#[from] RecordError),

    /// A find-one query matched nothing
    #[error("found no record that matches the given query {0}")]
    NoMatch(String),

    /// A find-one query matched several records
    #[error("found more than one record that matches the given query {0}")]
    NotUnique(String),

    /// Request rejected before it was sent
    #[error("{0}")]
    Invalid(String),

    /// Response had an unexpected shape
    #[error("unexpected type of result: {0}")]
    UnexpectedResponse(String),
}

impl ApiError {
    /// Check if the server reported a missing record
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote(err) if err.is_not_found())
    }

    /// Create invalid request error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_survives_wrapping() {
        let err: ApiError = RemoteError::NotFound("no record found with id x".to_string()).into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "no record found with id x");
        assert!(!ApiError::NoMatch("{}".to_string()).is_not_found());
    }
}
