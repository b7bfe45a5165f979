use super::file::upload_file;
use super::progress::{Progress, ProgressObserver};
use super::UploadResult;
use crate::SyncContext;
use crate::record::FileRecord;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use pubsite_storage::SiteSource;
use std::collections::VecDeque;
use tracing::instrument;

/// Upload `files` to every blob endpoint of `ctx`, at most
/// [`ctx.concurrency`](SyncContext::concurrency) files at a time.
///
/// Files are started in input order; as one finishes, the next queued file
/// is promoted. Results are returned in input order regardless of when each
/// file finished.
///
/// Once [`ctx.cancellation`](SyncContext::cancellation) fires no further
/// file is started. Files already in flight run to completion, and the rest
/// are returned as [`cancelled`](UploadResult::cancelled).
#[instrument(skip_all, fields(files = files.len(), endpoints = ctx.blob_endpoints.len()))]
pub async fn dispatch(
    ctx: &SyncContext,
    source: &dyn SiteSource,
    files: Vec<FileRecord>,
    observer: &dyn ProgressObserver,
) -> Vec<UploadResult> {
    let total = files.len();
    let progress = Progress::new(observer, total);
    let launch = |(index, file): (usize, FileRecord)| {
        let progress = &progress;
        async move { (index, upload_file(ctx, source, file, progress).await) }
    };

    let mut queue: VecDeque<(usize, FileRecord)> = files.into_iter().enumerate().collect();
    let mut results: Vec<Option<UploadResult>> = (0..total).map(|_| None).collect();
    let mut processing = FuturesUnordered::new();
    while processing.len() < ctx.concurrency
        && !ctx.cancellation.is_cancelled()
        && let Some(next) = queue.pop_front()
    {
        processing.push(launch(next));
    }
    while let Some((index, result)) = processing.next().await {
        results[index] = Some(result);
        // Pop-n-push, FIFO.
        if !ctx.cancellation.is_cancelled()
            && let Some(next) = queue.pop_front()
        {
            processing.push(launch(next));
        }
    }

    if !queue.is_empty() {
        tracing::info!(skipped = queue.len(), "Dispatch cancelled; remaining files were not started");
        let endpoints = ctx.blob_endpoint_names();
        for (index, file) in queue {
            results[index] = Some(UploadResult::skipped(file, &endpoints));
        }
    }
    results.into_iter().flatten().collect()
}
