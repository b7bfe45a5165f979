//! In-memory endpoints and signer for testing.
//!
//! All three are cheap to construct, configurable through builder methods
//! before being wrapped in an [`Arc`](std::sync::Arc), and observable
//! afterwards through `&self` accessors.

mod blob;
mod relay;
mod signer;

pub use self::blob::MockBlobEndpoint;
pub use self::relay::MockEventEndpoint;
pub use self::signer::MockSigner;

/// Failure a mock endpoint should simulate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockFailure {
    Network,
    Rejected(String),
}

impl MockFailure {
    pub(crate) fn into_error(self) -> crate::error::Error {
        match self {
            Self::Network => crate::error::ErrorKind::Network("connection reset by mock".to_string()).into(),
            Self::Rejected(reason) => crate::error::ErrorKind::Rejected(reason).into(),
        }
    }
}
