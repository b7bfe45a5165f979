//! Broadcasting signed events to every event endpoint.

use crate::SyncContext;
use futures::future::join_all;
use pubsite_remote::SignedEvent;
use std::collections::BTreeSet;

/// What one event endpoint did with a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointPublish {
    pub endpoint: String,
    /// Ids of the events the endpoint accepted.
    pub accepted: Vec<String>,
    /// Ids of refused events, with the endpoint's reason.
    pub rejected: Vec<(String, String)>,
    /// Set when the call itself failed or timed out.
    pub error: Option<String>,
}

impl EndpointPublish {
    fn failed(endpoint: &str, error: String) -> Self {
        Self { endpoint: endpoint.to_string(), accepted: Vec::new(), rejected: Vec::new(), error: Some(error) }
    }

    /// Whether this endpoint accepted every event in `batch`.
    pub fn accepted_all(&self, batch: &[String]) -> bool {
        if self.error.is_some() || !self.rejected.is_empty() {
            return false;
        }
        let accepted: BTreeSet<&str> = self.accepted.iter().map(String::as_str).collect();
        batch.iter().all(|id| accepted.contains(id.as_str()))
    }
}

/// Outcome of publishing one batch of events.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Ids of the events in the batch.
    pub event_ids: Vec<String>,
    pub per_endpoint: Vec<EndpointPublish>,
}

impl PublishReport {
    /// True iff at least one endpoint accepted every event of the batch.
    ///
    /// An endpoint accepting only part of the batch counts as failing it.
    /// An empty batch is trivially accepted.
    pub fn accepted(&self) -> bool {
        self.event_ids.is_empty() || self.per_endpoint.iter().any(|endpoint| endpoint.accepted_all(&self.event_ids))
    }

    /// Endpoints that accepted the whole batch.
    pub fn accepted_by(&self) -> impl Iterator<Item = &str> {
        self.per_endpoint
            .iter()
            .filter(|endpoint| endpoint.accepted_all(&self.event_ids))
            .map(|endpoint| endpoint.endpoint.as_str())
    }
}

/// Publish `events` to every event endpoint of `ctx`, concurrently.
///
/// Each endpoint call is bounded by the context timeout. Nothing is
/// retried: the report says who took what, and the caller decides.
pub async fn publish(ctx: &SyncContext, events: &[SignedEvent]) -> PublishReport {
    let event_ids: Vec<String> = events.iter().map(|event| event.id.clone()).collect();
    if events.is_empty() {
        return PublishReport { event_ids, per_endpoint: Vec::new() };
    }
    if ctx.event_endpoints.is_empty() {
        tracing::warn!(events = events.len(), "No event endpoints to publish to");
    }

    let calls = ctx.event_endpoints.iter().map(|endpoint| async move {
        let name = endpoint.name();
        match tokio::time::timeout(ctx.timeout, endpoint.publish(events)).await {
            Ok(Ok(receipt)) => {
                if !receipt.all_accepted() {
                    tracing::warn!(endpoint = name, rejected = receipt.rejected.len(), "Endpoint refused part of the batch");
                    for (id, reason) in &receipt.rejected {
                        tracing::debug!(endpoint = name, id = %id, reason = %reason, "Event rejected");
                    }
                }
                EndpointPublish {
                    endpoint: name.to_string(),
                    accepted: receipt.accepted,
                    rejected: receipt.rejected,
                    error: None,
                }
            },
            Ok(Err(e)) => {
                tracing::warn!(endpoint = name, error = %e, "Publishing failed");
                EndpointPublish::failed(name, e.to_string())
            },
            Err(_) => {
                tracing::warn!(endpoint = name, "Publishing timed out");
                EndpointPublish::failed(name, pubsite_remote::error::ErrorKind::Timeout.to_string())
            },
        }
    });
    let report = PublishReport { event_ids, per_endpoint: join_all(calls).await };
    tracing::debug!(
        events = events.len(),
        accepted_by = report.accepted_by().count(),
        endpoints = report.per_endpoint.len(),
        "Published events"
    );
    report
}
