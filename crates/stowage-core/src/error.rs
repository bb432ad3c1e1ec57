use std::io;

use thiserror::Error;

/// Failure taxonomy shared by every persister and secrets keeper operation.
/// Messages carry paths and reasons only, never stored content.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Nothing is stored at the requested location.
    #[error("entry not found at path: {path}")]
    NotFound { path: String },
    /// The backend refused access to the location.
    #[error("permission denied at path: {path}")]
    PermissionDenied { path: String },
    /// The path is empty, absolute, or escapes the storage root.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    /// Operation attempted before `init`.
    #[error("storage used before init")]
    NotInitialized,
    /// Operation attempted after `close`.
    #[error("storage already closed")]
    Closed,
    /// Stored data could not be decoded or authenticated.
    #[error("stored data is corrupt: {reason}")]
    Corrupt { reason: String },
    /// Backend or key source could not be reached.
    #[error("backend unavailable: {reason}")]
    Unavailable { reason: String },
    /// Any other underlying failure.
    #[error("io failure: {reason}")]
    Io { reason: String },
}

impl StorageError {
    /// Classify an io error raised while touching `path`.
    pub fn from_io(err: io::Error, path: impl Into<String>) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound { path: path.into() },
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied { path: path.into() },
            _ => StorageError::Io {
                reason: err.to_string(),
            },
        }
    }

    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_are_classified() {
        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(
            StorageError::from_io(missing, "a/b"),
            StorageError::NotFound { path: "a/b".into() }
        );

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            StorageError::from_io(denied, "a"),
            StorageError::PermissionDenied { .. }
        ));

        let other = io::Error::new(io::ErrorKind::Other, "disk on fire");
        assert_eq!(
            StorageError::from_io(other, "a"),
            StorageError::Io {
                reason: "disk on fire".into()
            }
        );
    }
}
