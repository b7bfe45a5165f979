//! Remote capabilities consumed by the deployment engine.
//!
//! Three capabilities are injected into a deployment, and this crate only
//! defines their shape:
//!
//! - [`BlobEndpoint`]: stores content addressed by its [`ContentHash`].
//! - [`EventEndpoint`]: accepts and serves signed, append-only events.
//! - [`Signer`]: turns an [`EventTemplate`] into a [`SignedEvent`].
//!
//! How bytes travel over the wire, and how events are signed, is up to the
//! implementations. In-memory implementations live behind the `mock`
//! feature; [`dry_run`] wrappers turn any endpoint into one that never
//! writes.

pub mod blob;
pub mod dry_run;
pub mod error;
pub mod event;
mod hash;
#[cfg(feature = "mock")]
pub mod mock;
pub mod relay;
pub mod signer;

pub use crate::blob::{BlobEndpoint, PutOutcome};
pub use crate::event::{EventFilter, EventKind, EventTemplate, SignedEvent, Tag};
pub use crate::hash::ContentHash;
pub use crate::relay::{EventEndpoint, PublishReceipt};
pub use crate::signer::Signer;
use std::sync::Arc;

pub type BlobHandle = Arc<dyn BlobEndpoint + Send + Sync>;
pub type EventHandle = Arc<dyn EventEndpoint + Send + Sync>;
pub type SignerHandle = Arc<dyn Signer + Send + Sync>;
