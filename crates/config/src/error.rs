//! Config Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The requested configuration file does not exist.
    #[display("config file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The file extension doesn't map to a supported format.
    #[display("unsupported config format: {}", _0.display())]
    UnsupportedFormat(#[error(not(source))] PathBuf),
    /// Merging or deserializing the configuration sources failed.
    #[display("failed to load configuration")]
    Load,
    /// A value is outside of its allowed range.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// A named site enabled an operation reserved for the root site.
    #[display("`site.{_0}` is only allowed for the root site")]
    RootOnly(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Configuration is either valid or it isn't.
        false
    }
}
