//! Local scanning: list and hash every visible file of a site source.

use crate::error::{ErrorKind, Result};
use crate::hash::ContentHasher;
use crate::record::{FileRecord, path_key};
use exn::ResultExt;
use futures::StreamExt;
use pubsite_storage::error::{Error as SourceError, ErrorKind as SourceErrorKind};
use pubsite_storage::{SiteSource, to_site_path};
use std::collections::BTreeMap;
use tracing::instrument;

/// A file that was listed but could not be scanned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanFailure {
    pub path: String,
    pub error: String,
}

/// Result of scanning a local source.
#[derive(Clone, Debug, Default)]
pub struct ScanReport {
    /// Hashed files, sorted by path, one per comparison key. Payloads are
    /// not retained.
    pub files: Vec<FileRecord>,
    /// Files excluded from the run.
    pub failures: Vec<ScanFailure>,
}

/// List and hash every visible file of `source`, `concurrency` files at a time.
///
/// Only a failure to list the source root is fatal
/// ([`LocalReadFailure`](ErrorKind::LocalReadFailure)). Anything going wrong
/// with an individual file is recorded in [`ScanReport::failures`] and the
/// file is left out.
///
/// Paths that only differ by case collapse to the lexicographically first.
#[instrument(skip(source), fields(source = source.name()))]
pub async fn scan(source: &dyn SiteSource, concurrency: usize) -> Result<ScanReport> {
    let mut report = ScanReport::default();
    let mut listed = Vec::new();
    let mut listing = source.list_stream(None);
    while let Some(entry) = listing.next().await {
        match entry {
            Ok(file) => match to_site_path(&file.path) {
                Ok(path) => listed.push(FileRecord::new(path, file.size)),
                Err(e) => report.failures.push(ScanFailure { path: file.path.display().to_string(), error: e.to_string() }),
            },
            Err(e) if is_root_failure(&e) => return Err(e).or_raise(|| ErrorKind::LocalReadFailure),
            Err(e) => {
                let path = failed_path(&e).unwrap_or_default();
                tracing::warn!(path = %path, error = %e, "Excluding unlistable entry");
                report.failures.push(ScanFailure { path, error: e.to_string() });
            },
        }
    }
    tracing::debug!(files = listed.len(), "Local listing complete");

    let loaded: Vec<_> = futures::stream::iter(listed)
        .map(|record| async move {
            let path = record.path.clone();
            ContentHasher::load(source, record).await.map(FileRecord::without_payload).map_err(|e| (path, e))
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut by_key: BTreeMap<String, FileRecord> = BTreeMap::new();
    for result in loaded {
        match result {
            Ok(record) => match by_key.get(&record.key()) {
                Some(kept) if kept.path <= record.path => {
                    tracing::warn!(kept = %kept.path, dropped = %record.path, "Paths differ only by case; keeping the first");
                },
                _ => {
                    by_key.insert(record.key(), record);
                },
            },
            Err((path, e)) => {
                tracing::warn!(path = %path, error = %e, "Excluding unreadable file");
                report.failures.push(ScanFailure { path, error: e.to_string() });
            },
        }
    }
    report.files = by_key.into_values().collect();
    report.files.sort_by(|a, b| a.path.cmp(&b.path));
    report.failures.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::info!(files = report.files.len(), failures = report.failures.len(), "Scanned local site");
    Ok(report)
}

/// Local paths, without contents.
#[derive(Clone, Debug, Default)]
pub struct LocalListing {
    pub files: Vec<FileRecord>,
    /// Entries that could not be listed. Whether anything at or beneath
    /// these paths still exists locally is unknown.
    pub unlisted: Vec<String>,
}

impl LocalListing {
    /// Whether `path` is an unlisted entry or lies beneath one.
    pub fn is_unlisted(&self, path: &str) -> bool {
        let key = path_key(path);
        self.unlisted.iter().any(|unlisted| {
            let unlisted = path_key(unlisted);
            key == unlisted || key.strip_prefix(unlisted.trim_end_matches('/')).is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// List the current local paths without hashing anything.
///
/// Used where only presence matters, e.g. deciding what to purge. As with
/// [`scan`], only a failure to list the root is fatal. An entry that fails is
/// left out and reported in [`LocalListing::unlisted`]; an error that can't
/// be tied to a path also fails the listing, since nothing could then be
/// said about what exists locally.
#[instrument(skip(source), fields(source = source.name()))]
pub async fn list_paths(source: &dyn SiteSource) -> Result<LocalListing> {
    let mut listing = LocalListing::default();
    let mut entries = source.list_stream(None);
    while let Some(entry) = entries.next().await {
        match entry {
            Ok(file) => {
                let path = to_site_path(&file.path).or_raise(|| ErrorKind::LocalReadFailure)?;
                listing.files.push(FileRecord::new(path, file.size));
            },
            Err(e) if is_root_failure(&e) => return Err(e).or_raise(|| ErrorKind::LocalReadFailure),
            Err(e) => match failed_path(&e) {
                Some(path) => {
                    tracing::warn!(path = %path, error = %e, "Unable to list entry");
                    listing.unlisted.push(path);
                },
                None => return Err(e).or_raise(|| ErrorKind::LocalReadFailure),
            },
        }
    }
    Ok(listing)
}

fn is_root_failure(error: &SourceError) -> bool {
    matches!(&**error, SourceErrorKind::RootUnavailable(_))
}

/// Site path of the entry a listing error is about.
fn failed_path(error: &SourceError) -> Option<String> {
    error.path().and_then(|path| to_site_path(path).ok())
}
