//! Error types for the HTTP transport

use rose_record::RemoteError;
use std::path::{Path, PathBuf};

/// Errors of sessions, token files and the HTTP client
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// No token file for this shell
    #[error("you are not logged in to Rose (no token file at {0}); run \"rose login\" first")]
    NotLoggedIn(PathBuf),

    /// Token file exists but is unusable
    #[error("token file {path} is invalid: {message}")]
    InvalidTokens { path: PathBuf, message: String },

    /// Refresh-token grant failed
    #[error("token refresh failed: {0}")]
    Refresh(String),

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HttpError {
    /// Create I/O error with path context
    pub fn io_error(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<HttpError> for RemoteError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Client(err) => Self::Transport(err.to_string()),
            other => Self::Auth(other.to_string()),
        }
    }
}
