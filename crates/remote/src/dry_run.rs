//! Dry-run endpoint wrappers.
//!
//! These wrap real endpoints and prevent write operations from executing,
//! while still indicating success on return. Reads are passed through, so a
//! dry run still compares against the real remote state.

use async_trait::async_trait;

use crate::blob::{BlobEndpoint, PutOutcome};
use crate::error::Result;
use crate::event::{EventFilter, SignedEvent};
use crate::hash::ContentHash;
use crate::relay::{EventEndpoint, PublishReceipt};
use crate::{BlobHandle, EventHandle};

/// Dry-run blob endpoint.
///
/// Wraps another endpoint and silently drops all uploads, logging an
/// [`info event`](tracing::Event).
#[derive(Clone)]
pub struct DryRunBlobEndpoint {
    inner: BlobHandle,
}
impl DryRunBlobEndpoint {
    pub fn new(inner: BlobHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl BlobEndpoint for DryRunBlobEndpoint {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn put(&self, hash: &ContentHash, data: &[u8]) -> Result<PutOutcome> {
        tracing::info!(endpoint = self.inner.name(), %hash, bytes = data.len(), "Skipping upload during dry-run mode");
        Ok(PutOutcome::Stored)
    }

    async fn has(&self, hash: &ContentHash) -> Result<bool> {
        self.inner.has(hash).await
    }
}

/// Dry-run event endpoint.
///
/// Wraps another endpoint and silently drops all published events, logging
/// an [`info event`](tracing::Event). Every event is reported as accepted.
#[derive(Clone)]
pub struct DryRunEventEndpoint {
    inner: EventHandle,
}
impl DryRunEventEndpoint {
    pub fn new(inner: EventHandle) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EventEndpoint for DryRunEventEndpoint {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn publish(&self, events: &[SignedEvent]) -> Result<PublishReceipt> {
        for event in events {
            tracing::info!(endpoint = self.inner.name(), id = %event.id, kind = ?event.kind, "Skipping publish during dry-run mode");
        }
        Ok(PublishReceipt {
            accepted: events.iter().map(|event| event.id.clone()).collect(),
            rejected: Vec::new(),
        })
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<SignedEvent>> {
        self.inner.query(filter).await
    }
}
