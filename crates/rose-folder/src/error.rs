//! Error types for bindings and the folder index

use std::path::PathBuf;

/// Errors while reading or writing bindings
#[derive(Debug, thiserror::Error)]
pub enum FolderError {
    /// Directory carries no marker
    #[error("folder \"{}\" doesn't seem to be connected to any RoseStudio scenario.", .0.display())]
    NotBound(PathBuf),

    /// Marker exists but cannot be read as a binding
    #[error("malformed marker in {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    /// Path is not a directory
    #[error("\"{}\" is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// IO error on a marker or directory
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FolderError {
    /// Create malformed marker error
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
