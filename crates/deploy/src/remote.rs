//! Reconstructing the remote state of a site from event endpoints.
//!
//! Nothing is persisted between runs: whatever the event endpoints serve
//! for this identity and site is the remote state.

use crate::SyncContext;
use crate::error::{ErrorKind, Result};
use crate::record::{FileRecord, canonical_path};
use futures::StreamExt;
use futures::future::join_all;
use pubsite_remote::{ContentHash, EventFilter, EventKind, SignedEvent};
use std::collections::BTreeMap;
use tracing::instrument;

/// Tag carrying the named site an event belongs to.
pub const SITE_TAG: &str = "site";

/// Query every event endpoint for this identity's file advertisements.
///
/// Endpoints that fail or time out are skipped with a warning; only when
/// every endpoint fails is [`RemoteFetchFailure`](ErrorKind::RemoteFetchFailure)
/// returned. With no event endpoints the remote set is empty.
#[instrument(skip(ctx), fields(site = ctx.site_id().unwrap_or("<root>")))]
pub async fn fetch(ctx: &SyncContext) -> Result<Vec<FileRecord>> {
    let mut filter = EventFilter::new().author(ctx.signer.public_key()).kind(EventKind::FileAdvertisement);
    if let Some(site_id) = ctx.site_id() {
        filter = filter.tag(SITE_TAG, [site_id]);
    }
    let queries = ctx.event_endpoints.iter().map(|endpoint| {
        let filter = &filter;
        async move {
            let result = tokio::time::timeout(ctx.timeout, endpoint.query(filter)).await;
            (endpoint.name(), result)
        }
    });

    let mut found = Vec::new();
    let mut failures = 0;
    for (endpoint, result) in join_all(queries).await {
        match result {
            Ok(Ok(events)) => {
                tracing::debug!(endpoint, events = events.len(), "Fetched remote file advertisements");
                found.extend(events.into_iter().map(|event| (endpoint.to_string(), event)));
            },
            Ok(Err(e)) => {
                failures += 1;
                tracing::warn!(endpoint, error = %e, "Unable to query event endpoint");
            },
            Err(_) => {
                failures += 1;
                tracing::warn!(endpoint, "Event endpoint query timed out");
            },
        }
    }
    if failures > 0 && failures == ctx.event_endpoints.len() {
        exn::bail!(ErrorKind::RemoteFetchFailure);
    }
    Ok(records_from_events(found, ctx.site_id()))
}

/// Collapse advertisements into one record per comparison key.
///
/// Candidates are ordered by path, then newest first, then event id, and
/// the first candidate per key wins. The same event seen on several
/// endpoints is merged, accumulating where it was found.
pub fn records_from_events(events: impl IntoIterator<Item = (String, SignedEvent)>, site_id: Option<&str>) -> Vec<FileRecord> {
    let mut by_id: BTreeMap<String, (SignedEvent, Vec<String>)> = BTreeMap::new();
    for (endpoint, event) in events {
        if event.kind != EventKind::FileAdvertisement || event.tag_value(SITE_TAG) != site_id {
            continue;
        }
        by_id.entry(event.id.clone()).or_insert_with(|| (event, Vec::new())).1.push(endpoint);
    }

    let mut candidates: Vec<_> = by_id
        .into_values()
        .filter_map(|(event, endpoints)| {
            let record = advertised_record(&event)?;
            Some((record, event.created_at, endpoints))
        })
        .collect();
    candidates.sort_by(|(a, a_time, _), (b, b_time, _)| {
        a.path.cmp(&b.path).then(b_time.cmp(a_time)).then(a.remote_event_id.cmp(&b.remote_event_id))
    });

    let mut records: BTreeMap<String, FileRecord> = BTreeMap::new();
    for (mut record, _, endpoints) in candidates {
        if records.contains_key(&record.key()) {
            tracing::trace!(path = %record.path, "Dropping superseded remote advertisement");
            continue;
        }
        record.found_on_event_endpoints.extend(endpoints);
        records.insert(record.key(), record);
    }
    records.into_values().collect()
}

fn advertised_record(event: &SignedEvent) -> Option<FileRecord> {
    let Some(path) = event.tag_value("d").filter(|path| !path.trim_matches('/').is_empty()) else {
        tracing::debug!(id = %event.id, "Ignoring advertisement without a path");
        return None;
    };
    let size = event.tag_value("size").and_then(|size| size.parse().ok()).unwrap_or(0);
    let mut record = FileRecord::new(canonical_path(path), size).with_remote_event(&event.id);
    match event.tag_value("x").map(str::parse::<ContentHash>) {
        Some(Ok(hash)) => record = record.with_hash(hash),
        Some(Err(e)) => tracing::warn!(id = %event.id, path, error = %e, "Ignoring malformed content hash"),
        None => {},
    }
    Some(record)
}

/// Ask every blob endpoint whether it serves each record's content.
///
/// Records without a hash are returned untouched. Failing endpoints count
/// as not serving anything.
#[instrument(skip_all, fields(records = records.len()))]
pub async fn probe_availability(ctx: &SyncContext, records: Vec<FileRecord>) -> Vec<FileRecord> {
    let probes = records.into_iter().map(|mut record| async move {
        let Some(hash) = record.content_hash().copied() else {
            return record;
        };
        for endpoint in ctx.blob_endpoints.iter() {
            match tokio::time::timeout(ctx.timeout, endpoint.has(&hash)).await {
                Ok(Ok(true)) => {
                    record.available_on_blob_endpoints.insert(endpoint.name().to_string());
                },
                Ok(Ok(false)) => {},
                Ok(Err(e)) => tracing::debug!(endpoint = endpoint.name(), error = %e, "Availability probe failed"),
                Err(_) => tracing::debug!(endpoint = endpoint.name(), "Availability probe timed out"),
            }
        }
        record
    });
    futures::stream::iter(probes).buffered(ctx.concurrency).collect().await
}
