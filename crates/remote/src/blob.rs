//! Content-addressed blob endpoints.

use crate::error::Result;
use crate::hash::ContentHash;
use async_trait::async_trait;

/// What a successful [`put`](BlobEndpoint::put) did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The content was uploaded.
    Stored,
    /// The endpoint already held the content; nothing was transferred.
    AlreadyExists,
}

/// A service storing content addressed by its hash.
///
/// Failures must be reported as one of
/// [`Network`](crate::error::ErrorKind::Network),
/// [`Rejected`](crate::error::ErrorKind::Rejected) or
/// [`Timeout`](crate::error::ErrorKind::Timeout). Implementations must not
/// retry on their own.
#[async_trait]
pub trait BlobEndpoint: Send + Sync {
    /// Identifier of the endpoint (usually its URL).
    fn name(&self) -> &str;

    /// Store `data` under `hash`. Storing content that is already present is
    /// a success.
    async fn put(&self, hash: &ContentHash, data: &[u8]) -> Result<PutOutcome>;

    /// Whether the endpoint currently serves `hash`.
    async fn has(&self, hash: &ContentHash) -> Result<bool>;
}
