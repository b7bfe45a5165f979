//! Deploy Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Only a handful of conditions ever reach the caller of a deployment run:
//! per-file and per-endpoint failures are folded into the results instead.

use derive_more::{Display, Error};

/// A deploy error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for deploy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The pipeline stage a condition applies to.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Stage {
    #[display("scan")]
    Scan,
    #[display("fetch")]
    Fetch,
    #[display("upload")]
    Upload,
    #[display("manifest")]
    Manifest,
    #[display("announce")]
    Announce,
    #[display("purge")]
    Purge,
}

/// Classifies deployment failures.
///
/// ### Run-level
/// - [`ErrorKind::LocalReadFailure`]: the site root could not be listed.
/// - [`ErrorKind::NoEndpointsConfigured`]: a stage that needs endpoints has none.
///
/// ### Recovered locally
/// - [`ErrorKind::ReadFailure`], [`ErrorKind::ContentChanged`]: one file is excluded.
/// - [`ErrorKind::RemoteFetchFailure`]: the remote set is treated as empty.
/// - [`ErrorKind::Signer`], [`ErrorKind::Publish`]: recorded on the summary.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The site source could not be listed at all.
    #[display("unable to read local site")]
    LocalReadFailure,
    /// A single file could not be read.
    #[display("unable to read {_0}")]
    ReadFailure(#[error(not(source))] String),
    /// No event endpoint could be queried for previously published files.
    #[display("unable to fetch remote files")]
    RemoteFetchFailure,
    /// A stage requiring endpoints was reached with none configured.
    #[display("no endpoints configured for {_0}")]
    NoEndpointsConfigured(#[error(not(source))] Stage),
    /// A file changed between being scanned and being uploaded.
    #[display("{_0} changed since it was scanned")]
    ContentChanged(#[error(not(source))] String),
    /// The signer could not sign an event.
    #[display("signing failed")]
    Signer,
    /// A root-only event was requested for a named site.
    #[display("{_0} may only be published for the root site")]
    RootOnly(#[error(not(source))] &'static str),
    /// No event endpoint accepted an event batch.
    #[display("no event endpoint accepted the {_0} event")]
    Publish(#[error(not(source))] Stage),
}

impl ErrorKind {
    /// Returns `true` if re-running the deployment might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ReadFailure(_) | Self::RemoteFetchFailure | Self::Signer | Self::Publish(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::NoEndpointsConfigured(Stage::Purge).to_string(), "no endpoints configured for purge");
        assert_eq!(ErrorKind::ContentChanged("/a.css".to_string()).to_string(), "/a.css changed since it was scanned");
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::RemoteFetchFailure.is_retryable());
        assert!(!ErrorKind::LocalReadFailure.is_retryable());
        assert!(!ErrorKind::NoEndpointsConfigured(Stage::Upload).is_retryable());
    }
}
