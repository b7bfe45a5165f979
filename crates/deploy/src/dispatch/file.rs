use super::progress::Progress;
use super::{EndpointOutcome, EndpointStatus, FailureKind, UploadResult};
use crate::SyncContext;
use crate::error::{ErrorKind, Result};
use crate::hash::ContentHasher;
use crate::publish::{PublishReport, publish};
use crate::record::FileRecord;
use crate::remote::SITE_TAG;
use exn::{OptionExt, ResultExt};
use pubsite_remote::{BlobHandle, ContentHash, EventKind, EventTemplate, PutOutcome, Tag};
use pubsite_storage::SiteSource;

/// Upload one file to every blob endpoint, then advertise it.
///
/// Endpoint attempts run one after the other; the pool provides the
/// concurrency. The payload lives only as long as this future.
pub(crate) async fn upload_file(
    ctx: &SyncContext,
    source: &dyn SiteSource,
    file: FileRecord,
    progress: &Progress<'_>,
) -> UploadResult {
    progress.started();
    let scanned = file.content_hash().copied();
    let mut loaded = match ContentHasher::load(source, file.clone()).await {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::warn!(path = %file.path, error = %e, "Unable to read file for upload");
            progress.abandoned();
            return UploadResult::failed(file, e.to_string());
        },
    };
    let payload = loaded.take_payload().unwrap_or_default();
    let Some(hash) = loaded.content_hash().copied() else {
        progress.abandoned();
        return UploadResult::failed(loaded, ErrorKind::ReadFailure(file.path).to_string());
    };
    if scanned.is_some_and(|scanned| scanned != hash) {
        tracing::warn!(path = %loaded.path, "File changed between scan and upload; skipping");
        progress.abandoned();
        return UploadResult::failed(loaded, ErrorKind::ContentChanged(file.path).to_string());
    }
    if ctx.blob_endpoints.is_empty() {
        progress.abandoned();
        return UploadResult::failed(loaded, ErrorKind::NoEndpointsConfigured(crate::error::Stage::Upload).to_string());
    }

    let mut per_endpoint = Vec::with_capacity(ctx.blob_endpoints.len());
    for (n, endpoint) in ctx.blob_endpoints.iter().enumerate() {
        let outcome = put(ctx, endpoint, &hash, &payload).await;
        let is_last = n + 1 == ctx.blob_endpoints.len();
        per_endpoint.push(outcome);
        let overall = per_endpoint.iter().any(|outcome| outcome.status.is_success());
        if let Some(outcome) = per_endpoint.last() {
            progress.attempt(&loaded.path, outcome, is_last.then_some(overall));
        }
    }
    drop(payload);

    let overall_success = per_endpoint.iter().any(|outcome| outcome.status.is_success());
    let mut result = UploadResult {
        file: loaded.without_payload(),
        overall_success,
        per_endpoint,
        advertisement: None,
        error: None,
        cancelled: false,
    };
    if !overall_success {
        tracing::warn!(path = %result.file.path, "Upload failed on every blob endpoint");
        return result;
    }
    match advertise(ctx, &result.file, &hash).await {
        Ok(report) => {
            if report.accepted() {
                result.file.remote_event_id = report.event_ids.first().cloned();
            } else {
                tracing::warn!(path = %result.file.path, "No event endpoint accepted the file advertisement");
            }
            result.advertisement = Some(report);
        },
        Err(e) => {
            tracing::warn!(path = %result.file.path, error = %e, "Unable to advertise uploaded file");
            result.error = Some(e.to_string());
        },
    }
    tracing::info!(path = %result.file.path, converged = result.is_converged(), "Uploaded file");
    result
}

async fn put(ctx: &SyncContext, endpoint: &BlobHandle, hash: &ContentHash, payload: &[u8]) -> EndpointOutcome {
    let name = endpoint.name();
    match tokio::time::timeout(ctx.timeout, endpoint.put(hash, payload)).await {
        Ok(Ok(PutOutcome::Stored)) => EndpointOutcome::new(name, EndpointStatus::Success),
        Ok(Ok(PutOutcome::AlreadyExists)) => EndpointOutcome::new(name, EndpointStatus::AlreadyPresent),
        Ok(Err(e)) => {
            tracing::debug!(endpoint = name, %hash, error = %e, "Blob upload failed");
            EndpointOutcome::failed(name, FailureKind::from(&*e), e.to_string())
        },
        Err(_) => EndpointOutcome::failed(name, FailureKind::Timeout, "timed out"),
    }
}

/// Template of the file-advertisement event for `file`.
pub(crate) fn advertisement(file: &FileRecord, hash: &ContentHash, site_id: Option<&str>) -> EventTemplate {
    let mut template = EventTemplate::new(EventKind::FileAdvertisement)
        .tag(Tag::new("d", [file.path.as_str()]))
        .tag(Tag::new("x", [hash.to_string()]))
        .tag(Tag::new("size", [file.size.to_string()]))
        .tag(Tag::new("m", [file.media_type]));
    if let Some(site_id) = site_id {
        template = template.tag(Tag::new(SITE_TAG, [site_id]));
    }
    template
}

async fn advertise(ctx: &SyncContext, file: &FileRecord, hash: &ContentHash) -> Result<PublishReport> {
    let template = advertisement(file, hash, ctx.site_id());
    let event = tokio::time::timeout(ctx.timeout, ctx.signer.sign(template))
        .await
        .ok()
        .ok_or_raise(|| ErrorKind::Signer)?
        .or_raise(|| ErrorKind::Signer)?;
    Ok(publish(ctx, std::slice::from_ref(&event)).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertisement_tags() {
        let hash = ContentHash::from_bytes([9; 32]);
        let file = FileRecord::new("/index.html", 42);
        let root = advertisement(&file, &hash, None);
        assert_eq!(root.kind, EventKind::FileAdvertisement);
        assert_eq!(root.tag_value("d"), Some("/index.html"));
        assert_eq!(root.tag_value("x"), Some(hash.to_string().as_str()));
        assert_eq!(root.tag_value("size"), Some("42"));
        assert_eq!(root.tag_value("m"), Some("text/html"));
        assert_eq!(root.tag_value(SITE_TAG), None);
        let named = advertisement(&file, &hash, Some("blog"));
        assert_eq!(named.tag_value(SITE_TAG), Some("blog"));
    }
}
