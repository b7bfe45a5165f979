//! Storage Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::{Path, PathBuf};

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Path contains invalid characters or escapes root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// An ignore rule could not be compiled
    #[display("invalid ignore pattern: {_0}")]
    InvalidPattern(#[error(not(source))] String),
    /// The source root itself could not be listed; nothing else was walked
    #[display("unable to list site root: {}", _0.display())]
    RootUnavailable(#[error(not(source))] PathBuf),
    /// Backend-specific error
    #[display("backend error: {_0}")]
    BackendError(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }

    /// The source-relative path the error is about, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound(path) | Self::PermissionDenied(path) | Self::InvalidPath(path) => Some(path),
            Self::RootUnavailable(_) | Self::Io(_) | Self::InvalidPattern(_) | Self::BackendError(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::NotFound(PathBuf::from("a/b.html")).to_string(), "file not found: a/b.html");
        assert_eq!(ErrorKind::InvalidPattern("[".to_string()).to_string(), "invalid ignore pattern: [");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(!ErrorKind::NotFound(PathBuf::from("x")).is_retryable());
        assert!(!ErrorKind::InvalidPath(PathBuf::from("..")).is_retryable());
        assert!(ErrorKind::Io(IoError::other("disk on fire")).is_retryable());
        assert!(!ErrorKind::RootUnavailable(PathBuf::from("/srv/site")).is_retryable());
    }

    #[test]
    fn error_kind_path() {
        let denied = ErrorKind::PermissionDenied(PathBuf::from("private"));
        assert_eq!(denied.path(), Some(Path::new("private")));
        assert_eq!(ErrorKind::RootUnavailable(PathBuf::from("/srv/site")).path(), None);
        assert_eq!(ErrorKind::Io(IoError::other("disk on fire")).path(), None);
    }
}
