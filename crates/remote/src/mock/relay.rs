use super::MockFailure;
use crate::error::{ErrorKind, Result};
use crate::event::{EventFilter, EventKind, SignedEvent};
use crate::relay::{EventEndpoint, PublishReceipt};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory event endpoint.
///
/// Behaves like a well-mannered relay: events are stored once per id, and a
/// [`Deletion`](EventKind::Deletion) event removes the referenced events
/// (`e` tags) when they share the deletion's author.
///
/// # Examples
///
/// ```
/// use pubsite_remote::mock::{MockEventEndpoint, MockSigner};
/// use pubsite_remote::{EventEndpoint, EventFilter, EventKind, EventTemplate, Signer};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let signer = MockSigner::new("alice");
/// let relay = MockEventEndpoint::new("wss://relay.example");
/// let event = signer.sign(EventTemplate::new(EventKind::Manifest)).await.unwrap();
/// assert!(relay.publish(&[event]).await.unwrap().all_accepted());
/// assert_eq!(relay.query(&EventFilter::new().author("alice")).await.unwrap().len(), 1);
/// # }
/// ```
pub struct MockEventEndpoint {
    name: String,
    events: RwLock<Vec<SignedEvent>>,
    rejected_kinds: BTreeSet<EventKind>,
    publish_failure: Option<MockFailure>,
    query_failure: Option<MockFailure>,
    delay: Option<Duration>,
    publish_calls: AtomicUsize,
}

impl MockEventEndpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: RwLock::new(Vec::new()),
            rejected_kinds: BTreeSet::new(),
            publish_failure: None,
            query_failure: None,
            delay: None,
            publish_calls: AtomicUsize::new(0),
        }
    }

    /// Pre-populate the endpoint with already-published events.
    pub fn with_events(mut self, events: impl IntoIterator<Item = SignedEvent>) -> Self {
        self.events.get_mut().extend(events);
        self
    }

    /// Events of this kind are refused (but the call itself succeeds).
    pub fn rejecting(mut self, kind: EventKind) -> Self {
        self.rejected_kinds.insert(kind);
        self
    }

    /// Every `publish` call fails outright.
    pub fn failing_publish(mut self, failure: MockFailure) -> Self {
        self.publish_failure = Some(failure);
        self
    }

    /// Every `query` call fails outright.
    pub fn failing_query(mut self, failure: MockFailure) -> Self {
        self.query_failure = Some(failure);
        self
    }

    /// Every call takes at least this long.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Snapshot of every stored event.
    pub async fn stored(&self) -> Vec<SignedEvent> {
        self.events.read().await.clone()
    }

    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl EventEndpoint for MockEventEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self, events: &[SignedEvent]) -> Result<PublishReceipt> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(failure) = self.publish_failure.clone() {
            return Err(failure.into_error());
        }
        let mut receipt = PublishReceipt::default();
        let mut stored = self.events.write().await;
        for event in events {
            if event.id.is_empty() || event.sig.is_empty() {
                receipt.rejected.push((event.id.clone(), ErrorKind::InvalidEvent("unsigned".to_string()).to_string()));
                continue;
            }
            if self.rejected_kinds.contains(&event.kind) {
                receipt.rejected.push((event.id.clone(), "blocked: kind not accepted".to_string()));
                continue;
            }
            if event.kind == EventKind::Deletion {
                let targets: BTreeSet<&str> = event.tag_values("e").collect();
                stored.retain(|existing| !(existing.pubkey == event.pubkey && targets.contains(existing.id.as_str())));
            }
            if !stored.iter().any(|existing| existing.id == event.id) {
                stored.push(event.clone());
            }
            receipt.accepted.push(event.id.clone());
        }
        Ok(receipt)
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<SignedEvent>> {
        self.pause().await;
        if let Some(failure) = self.query_failure.clone() {
            return Err(failure.into_error());
        }
        Ok(self.events.read().await.iter().filter(|event| filter.matches(event)).cloned().collect())
    }
}
