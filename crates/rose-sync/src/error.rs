//! Error types for synchronization
//!
//! Provides error handling for:
//! - Operations on folders with no or the wrong kind of binding
//! - Bindings whose remote record has disappeared
//! - Provisioning input that fails validation
//! - Failed archive or remote transfers

use crate::archive::ArchiveError;
use rose_folder::FolderError;
use rose_remote::ApiError;
use std::path::PathBuf;
use uuid::Uuid;

/// Coarse classification of a [`SyncError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotBound,
    StaleBinding,
    Validation,
    Transfer,
    MissingSource,
    Aborted,
    Io,
    Config,
}

/// Main synchronization error type
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Folder has no binding, or one of the wrong kind
    #[error("{reason}")]
    NotBound { path: PathBuf, reason: String },

    /// Remote record is gone; the binding was removed
    #[error("scenario \"{name}\" ({uuid}) no longer exists on the server; folder \"{}\" has been disconnected", .path.display())]
    StaleBinding {
        path: PathBuf,
        name: String,
        uuid: Uuid,
    },

    /// Provisioning input rejected
    #[error("{0}")]
    Validation(String),

    /// Archive or remote call failed
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Local instance without a bound class folder to copy from
    #[error("scenario instance \"{instance}\" belongs to the local scenario class \"{class_name}\", but no folder connected to that class was found")]
    MissingSource {
        instance: String,
        class_name: String,
        class_uuid: Uuid,
    },

    /// User declined or cancelled a prompt
    #[error("operation aborted")]
    Aborted,

    /// Marker or directory error
    #[error(transparent)]
    Folder(#[from] FolderError),

    /// Other local IO failure
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Settings could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

/// Failures while moving code between folder and server
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Remote(#[from] ApiError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl From<ApiError> for SyncError {
    fn from(err: ApiError) -> Self {
        Self::Transfer(TransferError::Remote(err))
    }
}

impl From<ArchiveError> for SyncError {
    fn from(err: ArchiveError) -> Self {
        Self::Transfer(TransferError::Archive(err))
    }
}

impl SyncError {
    /// Create not-bound error
    pub fn not_bound(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::NotBound {
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

    /// Classify error
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotBound { .. } | Self::Folder(FolderError::NotBound(_)) => ErrorCategory::NotBound,
            Self::StaleBinding { .. } => ErrorCategory::StaleBinding,
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Transfer(_) => ErrorCategory::Transfer,
            Self::MissingSource { .. } => ErrorCategory::MissingSource,
            Self::Aborted => ErrorCategory::Aborted,
            Self::Folder(_) | Self::Io { .. } => ErrorCategory::Io,
            Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Check if the error is a real failure rather than information
    ///
    /// A stale binding has already been repaired by disconnecting.
    #[inline]
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.category() != ErrorCategory::StaleBinding
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rose_record::RemoteError;

    #[test]
    fn categories() {
        let remote: SyncError = ApiError::from(RemoteError::server(500, "boom")).into();
        assert_eq!(remote.category(), ErrorCategory::Transfer);

        let unbound: SyncError = FolderError::NotBound(PathBuf::from("/x")).into();
        assert_eq!(unbound.category(), ErrorCategory::NotBound);

        let stale = SyncError::StaleBinding {
            path: PathBuf::from("/x"),
            name: "Demo".to_string(),
            uuid: Uuid::nil(),
        };
        assert!(!stale.is_failure());
        assert!(SyncError::Validation("taken".to_string()).is_failure());
    }
}
