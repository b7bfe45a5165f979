//! Remote Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A remote error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Endpoint failures fall into exactly three buckets (network, rejected,
/// timeout) because that is all a deployment can act upon.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The endpoint could not be reached or the connection dropped.
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// The endpoint answered, but refused the request (quota, auth, policy).
    #[display("rejected: {_0}")]
    Rejected(#[error(not(source))] String),
    /// The endpoint did not answer within the allotted time.
    #[display("timed out")]
    Timeout,
    /// The signer could not produce a signature (locked key, remote signer
    /// offline, user declined). Re-prompting is the caller's business.
    #[display("signer unavailable: {_0}")]
    SignerUnavailable(#[error(not(source))] String),
    /// An event is structurally invalid.
    #[display("invalid event: {_0}")]
    InvalidEvent(#[error(not(source))] String),
    /// A string is not a valid content hash.
    #[display("invalid content hash: {_0}")]
    InvalidHash(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}
