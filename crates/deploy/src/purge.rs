//! Retracting remote files that no longer exist locally.
//!
//! Purging is two-step: find the orphans, then, only once the caller has
//! confirmed, publish a single deletion event referencing every orphan's
//! advertisement.

use crate::SyncContext;
use crate::compare::compare;
use crate::error::{ErrorKind, Result, Stage};
use crate::publish::{PublishReport, publish};
use crate::record::FileRecord;
use crate::remote::SITE_TAG;
use exn::{OptionExt, ResultExt};
use futures::future::join_all;
use pubsite_remote::{EventFilter, EventKind, EventTemplate, Tag};
use std::collections::BTreeSet;
use tracing::instrument;

/// Gate between finding orphans and deleting them.
pub trait Confirm: Send + Sync {
    /// Return `true` to go ahead and delete `orphans`.
    fn confirm(&self, orphans: &[FileRecord]) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&[FileRecord]) -> bool + Send + Sync,
{
    fn confirm(&self, orphans: &[FileRecord]) -> bool {
        self(orphans)
    }
}

/// Confirms everything, for non-interactive runs.
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&self, _orphans: &[FileRecord]) -> bool {
        true
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub orphans: Vec<FileRecord>,
    /// Paths whose advertisement was retracted.
    pub deleted: Vec<String>,
    /// Orphan paths with no known advertisement to retract.
    pub skipped: Vec<String>,
    /// The caller declined; nothing was published.
    pub declined: bool,
    pub tombstone_id: Option<String>,
    pub publish: Option<PublishReport>,
    /// Retracted advertisements some event endpoint still serves afterwards.
    pub still_served: usize,
}

/// Remote records with no local counterpart.
///
/// Always re-derived from both sets, even when the caller already compared
/// them.
pub fn reconcile(local: &[FileRecord], remote: &[FileRecord]) -> Vec<FileRecord> {
    compare(local, remote).to_delete
}

/// Retract `orphans` after confirmation.
///
/// Fails with [`NoEndpointsConfigured`](ErrorKind::NoEndpointsConfigured)
/// when there are no event endpoints, even with nothing to delete, and with
/// [`Signer`](ErrorKind::Signer) when the deletion event can't be signed.
/// Rejection by every endpoint is reported, not raised.
#[instrument(skip_all, fields(orphans = orphans.len(), site = ctx.site_id().unwrap_or("<root>")))]
pub async fn purge(ctx: &SyncContext, orphans: Vec<FileRecord>, confirm: &dyn Confirm) -> Result<PurgeReport> {
    if ctx.event_endpoints.is_empty() {
        exn::bail!(ErrorKind::NoEndpointsConfigured(Stage::Purge));
    }
    let mut report = PurgeReport::default();
    if orphans.is_empty() {
        tracing::info!("No orphaned remote files");
        return Ok(report);
    }
    if !confirm.confirm(&orphans) {
        tracing::info!("Purge declined");
        report.declined = true;
        report.orphans = orphans;
        return Ok(report);
    }

    let mut targets = Vec::new();
    for orphan in &orphans {
        match &orphan.remote_event_id {
            Some(id) => targets.push((orphan.path.clone(), id.clone())),
            None => {
                tracing::warn!(path = %orphan.path, "Orphan has no known advertisement; skipping");
                report.skipped.push(orphan.path.clone());
            },
        }
    }
    report.orphans = orphans;
    if targets.is_empty() {
        return Ok(report);
    }

    let mut template = EventTemplate::new(EventKind::Deletion);
    for (_, id) in &targets {
        template = template.tag(Tag::new("e", [id.as_str()]));
    }
    if let Some(site_id) = ctx.site_id() {
        template = template.tag(Tag::new(SITE_TAG, [site_id]));
    }
    let tombstone = tokio::time::timeout(ctx.timeout, ctx.signer.sign(template))
        .await
        .ok()
        .ok_or_raise(|| ErrorKind::Signer)?
        .or_raise(|| ErrorKind::Signer)?;

    let published = publish(ctx, std::slice::from_ref(&tombstone)).await;
    report.tombstone_id = Some(tombstone.id.clone());
    if published.accepted() {
        report.deleted = targets.iter().map(|(path, _)| path.clone()).collect();
        let ids: Vec<&str> = targets.iter().map(|(_, id)| id.as_str()).collect();
        report.still_served = still_served(ctx, &ids).await;
        tracing::info!(deleted = report.deleted.len(), still_served = report.still_served, "Published deletion event");
    } else {
        tracing::warn!(targets = targets.len(), "No event endpoint accepted the deletion event");
    }
    report.publish = Some(published);
    Ok(report)
}

/// How many of `ids` at least one event endpoint still returns.
async fn still_served(ctx: &SyncContext, ids: &[&str]) -> usize {
    let filter = ids.iter().fold(EventFilter::new(), |filter, id| filter.id(*id));
    let queries = ctx.event_endpoints.iter().map(|endpoint| {
        let filter = &filter;
        async move { (endpoint.name(), tokio::time::timeout(ctx.timeout, endpoint.query(filter)).await) }
    });
    let mut served = BTreeSet::new();
    for (endpoint, result) in join_all(queries).await {
        match result {
            Ok(Ok(events)) => served.extend(events.into_iter().map(|event| event.id)),
            Ok(Err(e)) => tracing::debug!(endpoint, error = %e, "Unable to verify deletion"),
            Err(_) => tracing::debug!(endpoint, "Deletion verification timed out"),
        }
    }
    served.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContentHasher;
    use pubsite_remote::mock::{MockEventEndpoint, MockFailure, MockSigner};
    use pubsite_remote::{EventHandle, Signer, SignedEvent};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord::new(path, content.len() as u64).with_hash(ContentHasher::hash(content.as_bytes()))
    }

    async fn advertised(path: &str) -> (FileRecord, SignedEvent) {
        let event = MockSigner::new("alice")
            .sign(EventTemplate::new(EventKind::FileAdvertisement).tag(Tag::new("d", [path])))
            .await
            .unwrap();
        (record(path, path).with_remote_event(event.id.clone()), event)
    }

    fn context(relays: Vec<EventHandle>) -> SyncContext {
        SyncContext::new(Arc::new(MockSigner::new("alice"))).with_event_endpoints(relays)
    }

    #[test]
    fn test_reconcile_is_exclusive() {
        let local = vec![record("/index.html", "new"), record("/a.css", "a")];
        let remote = vec![record("/INDEX.html", "old"), record("/a.css", "a"), record("/old.js", "o")];
        let orphans = reconcile(&local, &remote);
        assert_eq!(orphans.iter().map(|o| o.path.as_str()).collect::<Vec<_>>(), vec!["/old.js"]);
    }

    #[tokio::test]
    async fn test_no_event_endpoints_fails_closed() {
        let err = purge(&context(vec![]), vec![], &AssumeYes).await.unwrap_err();
        assert_eq!(*err, ErrorKind::NoEndpointsConfigured(Stage::Purge));
    }

    #[tokio::test]
    async fn test_zero_orphans_is_success() {
        let relay = Arc::new(MockEventEndpoint::new("relay"));
        let report = purge(&context(vec![relay.clone()]), vec![], &AssumeYes).await.unwrap();
        assert!(report.deleted.is_empty());
        assert!(report.tombstone_id.is_none());
        assert_eq!(relay.publish_calls(), 0);
    }

    #[tokio::test]
    async fn test_declined_publishes_nothing() {
        let (orphan, event) = advertised("/old.js").await;
        let relay = Arc::new(MockEventEndpoint::new("relay").with_events([event]));
        let asked = AtomicUsize::new(0);
        let confirm = |orphans: &[FileRecord]| {
            asked.fetch_add(orphans.len(), Ordering::SeqCst);
            false
        };
        let report = purge(&context(vec![relay.clone()]), vec![orphan], &confirm).await.unwrap();
        assert!(report.declined);
        assert_eq!(asked.load(Ordering::SeqCst), 1);
        assert_eq!(relay.stored().await.len(), 1);
    }

    #[tokio::test]
    async fn test_tombstone_retracts_orphans() {
        let (old, old_event) = advertised("/old.js").await;
        let (gone, gone_event) = advertised("/gone.css").await;
        let relay = Arc::new(MockEventEndpoint::new("relay").with_events([old_event.clone(), gone_event.clone()]));
        let unknown = record("/never-advertised.txt", "x");

        let report = purge(&context(vec![relay.clone()]), vec![old, gone, unknown], &AssumeYes).await.unwrap();
        assert_eq!(report.deleted, vec!["/old.js".to_string(), "/gone.css".to_string()]);
        assert_eq!(report.skipped, vec!["/never-advertised.txt".to_string()]);
        assert_eq!(report.still_served, 0);
        let stored = relay.stored().await;
        let tombstone = stored.iter().find(|event| event.kind == EventKind::Deletion).unwrap();
        assert_eq!(Some(&tombstone.id), report.tombstone_id.as_ref());
        let targets: Vec<_> = tombstone.tag_values("e").collect();
        assert_eq!(targets, vec![old_event.id.as_str(), gone_event.id.as_str()]);
        assert!(!stored.iter().any(|event| event.kind == EventKind::FileAdvertisement));
    }

    #[tokio::test]
    async fn test_verification_counts_surviving_events() {
        let (old, old_event) = advertised("/old.js").await;
        let honoring = Arc::new(MockEventEndpoint::new("honoring").with_events([old_event.clone()]));
        let ignoring = Arc::new(MockEventEndpoint::new("ignoring").with_events([old_event]).rejecting(EventKind::Deletion));
        let report = purge(&context(vec![honoring, ignoring]), vec![old], &AssumeYes).await.unwrap();
        assert_eq!(report.deleted.len(), 1);
        assert_eq!(report.still_served, 1);
    }

    #[tokio::test]
    async fn test_unaccepted_tombstone_deletes_nothing() {
        let (old, _) = advertised("/old.js").await;
        let relay: EventHandle = Arc::new(MockEventEndpoint::new("down").failing_publish(MockFailure::Network));
        let report = purge(&context(vec![relay]), vec![old], &AssumeYes).await.unwrap();
        assert!(report.deleted.is_empty());
        assert!(report.publish.is_some_and(|publish| !publish.accepted()));
    }

    #[tokio::test]
    async fn test_signer_failure_is_raised() {
        let (old, _) = advertised("/old.js").await;
        let ctx = SyncContext::new(Arc::new(MockSigner::unavailable("alice")))
            .with_event_endpoints([Arc::new(MockEventEndpoint::new("relay")) as EventHandle]);
        let err = purge(&ctx, vec![old], &AssumeYes).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Signer);
    }
}
