//! Append-only signed event endpoints.

use crate::error::Result;
use crate::event::{EventFilter, SignedEvent};
use async_trait::async_trait;

/// Per-event outcome of a [`publish`](EventEndpoint::publish) call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Identifiers of accepted events.
    pub accepted: Vec<String>,
    /// Identifiers of refused events, with the endpoint's reason.
    pub rejected: Vec<(String, String)>,
}

impl PublishReceipt {
    /// An endpoint only counts as having accepted a batch when nothing was refused.
    pub fn all_accepted(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// A service accepting and serving signed events.
#[async_trait]
pub trait EventEndpoint: Send + Sync {
    /// Identifier of the endpoint (usually its URL).
    fn name(&self) -> &str;

    /// Submit a batch of events. Transport-level failure is an `Err`;
    /// per-event refusal is reported in the receipt.
    async fn publish(&self, events: &[SignedEvent]) -> Result<PublishReceipt>;

    /// Fetch every stored event matching `filter`.
    async fn query(&self, filter: &EventFilter) -> Result<Vec<SignedEvent>>;
}
