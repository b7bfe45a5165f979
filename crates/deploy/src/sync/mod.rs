//! The deployment run, stage by stage.
//!
//! [`SyncOrchestrator::run`] sequences scan → fetch → compare → upload →
//! manifest → (purge). Only a failure to list the local site aborts the
//! run; everything after that degrades into a partial result reported on
//! the [`SyncSummary`].

mod state;

pub use self::state::SyncState;
use crate::SyncContext;
use crate::compare::{Comparison, compare};
use crate::dispatch::{NoProgress, ProgressObserver, UploadResult, dispatch};
use crate::error::{Error, ErrorKind, Result, Stage};
use crate::manifest::{Announce, ManifestBuilder, SiteMetadata, root_announcements};
use crate::publish::publish;
use crate::purge::{AssumeYes, Confirm, PurgeReport, purge, reconcile};
use crate::record::FileRecord;
use crate::remote::{fetch, probe_availability};
use crate::scan::{ScanFailure, list_paths, scan};
use exn::{OptionExt, ResultExt};
use pubsite_config::Config;
use pubsite_remote::{EventTemplate, SignedEvent};
use pubsite_storage::SourceHandle;
use std::sync::Arc;
use tracing::instrument;

/// What a run should do beyond uploading.
#[derive(Clone, Debug, Default)]
pub struct SyncOptions {
    /// Retract remote files that no longer exist locally.
    pub purge: bool,
    /// Purge without asking.
    pub non_interactive: bool,
    /// Re-upload unchanged files that no blob endpoint serves any more.
    pub check_availability: bool,
    pub metadata: SiteMetadata,
    pub announce: Announce,
}

impl From<&Config> for SyncOptions {
    fn from(config: &Config) -> Self {
        Self {
            purge: config.deploy.purge,
            non_interactive: config.deploy.non_interactive,
            check_availability: false,
            metadata: SiteMetadata::from(config),
            announce: Announce::from(config),
        }
    }
}

/// A stage that did not fully succeed. The run carried on regardless.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
    pub retryable: bool,
}

impl StageError {
    fn new(stage: Stage, error: &Error) -> Self {
        Self { stage, message: error.to_string(), retryable: error.is_retryable() }
    }
}

/// Everything a run did, for display.
#[derive(Clone, Debug, Default)]
pub struct SyncSummary {
    pub uploaded: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
    /// Files never attempted because the run was cancelled.
    pub skipped: usize,
    pub manifest_event_id: Option<String>,
    /// Per file, per endpoint outcomes of the upload stage.
    pub uploads: Vec<UploadResult>,
    pub scan_failures: Vec<ScanFailure>,
    pub purge: Option<PurgeReport>,
    pub stage_errors: Vec<StageError>,
    pub cancelled: bool,
    /// Every state the run went through, in order.
    pub states: Vec<SyncState>,
}

impl SyncSummary {
    pub fn state(&self) -> SyncState {
        self.states.last().copied().unwrap_or_default()
    }

    /// No file failed and no stage reported an error.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.stage_errors.is_empty() && self.scan_failures.is_empty()
    }

    fn enter(&mut self, next: SyncState) {
        let current = self.state();
        if !current.can_transition_to(next) {
            tracing::warn!(from = %current, to = %next, "Unexpected state transition");
        }
        tracing::info!(from = %current, to = %next, "Deployment state changed");
        self.states.push(next);
    }

    fn stage_error(&mut self, stage: Stage, error: &Error) {
        tracing::warn!(%stage, error = %error, "Deployment stage failed");
        self.stage_errors.push(StageError::new(stage, error));
    }
}

/// Runs a complete deployment of one site source.
///
/// ```no_run
/// use pubsite_deploy::{SyncContext, SyncOptions, SyncOrchestrator};
/// # async fn run(ctx: SyncContext, source: pubsite_storage::SourceHandle) {
/// let summary = SyncOrchestrator::new(ctx, source)
///     .with_options(SyncOptions { purge: true, non_interactive: true, ..Default::default() })
///     .run()
///     .await;
/// # }
/// ```
pub struct SyncOrchestrator {
    ctx: SyncContext,
    source: SourceHandle,
    options: SyncOptions,
    confirm: Option<Arc<dyn Confirm>>,
    observer: Arc<dyn ProgressObserver>,
}

impl SyncOrchestrator {
    pub fn new(ctx: SyncContext, source: SourceHandle) -> Self {
        Self { ctx, source, options: SyncOptions::default(), confirm: None, observer: Arc::new(NoProgress) }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Asked before purging, unless running non-interactively. Without one,
    /// an interactive purge is declined.
    pub fn with_confirm(mut self, confirm: Arc<dyn Confirm>) -> Self {
        self.confirm = Some(confirm);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Run every stage once.
    ///
    /// Returns an error only when the local site can't be listed. Every
    /// other failure ends up on the summary.
    #[instrument(skip(self), fields(source = self.source.name(), site = self.ctx.site_id().unwrap_or("<root>")))]
    pub async fn run(&self) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();
        summary.states.push(SyncState::Idle);

        summary.enter(SyncState::ScanningLocal);
        let scanned = match scan(self.source.as_ref(), self.ctx.concurrency).await {
            Ok(scanned) => scanned,
            Err(e) => {
                tracing::error!(error = %e, "Unable to scan local site");
                summary.enter(SyncState::Failed);
                return Err(e);
            },
        };
        summary.scan_failures = scanned.failures;
        if self.cancelled(&mut summary) {
            return Ok(summary);
        }

        summary.enter(SyncState::FetchingRemote);
        let remote = match fetch(&self.ctx).await {
            Ok(remote) => remote,
            Err(e) => {
                summary.stage_error(Stage::Fetch, &e);
                Vec::new()
            },
        };
        if self.cancelled(&mut summary) {
            return Ok(summary);
        }

        summary.enter(SyncState::Comparing);
        let comparison = self.compare(&scanned.files, &remote).await;
        summary.unchanged = comparison.unchanged.len();
        if self.cancelled(&mut summary) {
            return Ok(summary);
        }

        summary.enter(SyncState::Uploading);
        self.upload(comparison.to_upload, &mut summary).await;
        if self.cancelled(&mut summary) {
            return Ok(summary);
        }

        summary.enter(SyncState::PublishingManifest);
        self.publish_manifest(&comparison.unchanged, &mut summary).await;
        self.announce(&mut summary).await;

        if self.options.purge {
            if self.cancelled(&mut summary) {
                return Ok(summary);
            }
            summary.enter(SyncState::Purging);
            match self.purge(&remote).await {
                Ok(report) => {
                    summary.deleted = report.deleted.len();
                    summary.purge = Some(report);
                },
                Err(e) => summary.stage_error(Stage::Purge, &e),
            }
        }

        summary.enter(SyncState::Done);
        tracing::info!(
            uploaded = summary.uploaded,
            unchanged = summary.unchanged,
            deleted = summary.deleted,
            failed = summary.failed,
            stage_errors = summary.stage_errors.len(),
            "Deployment finished"
        );
        Ok(summary)
    }

    fn cancelled(&self, summary: &mut SyncSummary) -> bool {
        if !self.ctx.cancellation.is_cancelled() {
            return false;
        }
        tracing::info!(state = %summary.state(), "Deployment cancelled");
        summary.cancelled = true;
        summary.enter(SyncState::Done);
        true
    }

    async fn compare(&self, local: &[FileRecord], remote: &[FileRecord]) -> Comparison {
        let mut comparison = compare(local, remote);
        if !self.options.check_availability || self.ctx.blob_endpoints.is_empty() {
            return comparison;
        }
        let probed = probe_availability(&self.ctx, std::mem::take(&mut comparison.unchanged)).await;
        let (missing, served): (Vec<_>, Vec<_>) = probed
            .into_iter()
            .partition(|record| record.content_hash().is_some() && record.available_on_blob_endpoints.is_empty());
        if !missing.is_empty() {
            tracing::info!(files = missing.len(), "Unchanged files no longer served by any blob endpoint");
        }
        comparison.unchanged = served;
        comparison.to_upload.extend(missing);
        comparison
    }

    async fn upload(&self, files: Vec<FileRecord>, summary: &mut SyncSummary) {
        if files.is_empty() {
            return;
        }
        let uploads = if self.ctx.blob_endpoints.is_empty() {
            let e = Error::from(ErrorKind::NoEndpointsConfigured(Stage::Upload));
            summary.stage_error(Stage::Upload, &e);
            files.into_iter().map(|file| UploadResult::failed(file, e.to_string())).collect()
        } else {
            dispatch(&self.ctx, self.source.as_ref(), files, self.observer.as_ref()).await
        };
        summary.uploaded = uploads.iter().filter(|upload| upload.overall_success).count();
        summary.failed = uploads.iter().filter(|upload| upload.is_failed()).count();
        summary.skipped = uploads.iter().filter(|upload| upload.cancelled).count();
        summary.uploads = uploads;
    }

    async fn publish_manifest(&self, unchanged: &[FileRecord], summary: &mut SyncSummary) {
        let manifest = ManifestBuilder::new(self.ctx.site_id(), self.options.metadata.clone())
            .with_endpoint_hints(self.ctx.blob_endpoint_names(), self.ctx.event_endpoint_names())
            .with_uploads(&summary.uploads)
            .with_unchanged(unchanged)
            .build();
        let Some(manifest) = manifest else {
            return;
        };
        match self.sign_and_publish(vec![manifest.to_template()], Stage::Manifest).await {
            Ok(mut ids) => summary.manifest_event_id = ids.pop(),
            Err(e) => summary.stage_error(Stage::Manifest, &e),
        }
    }

    async fn announce(&self, summary: &mut SyncSummary) {
        if self.options.announce.is_empty() {
            return;
        }
        let result = match root_announcements(self.ctx.site_id(), &self.options.announce) {
            Ok(templates) => self.sign_and_publish(templates, Stage::Announce).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            summary.stage_error(Stage::Announce, &e);
        }
    }

    /// Sign `templates` and publish them as one batch. Returns the event ids
    /// once some endpoint accepted the whole batch.
    async fn sign_and_publish(&self, templates: Vec<EventTemplate>, stage: Stage) -> Result<Vec<String>> {
        let mut events: Vec<SignedEvent> = Vec::with_capacity(templates.len());
        for template in templates {
            let event = tokio::time::timeout(self.ctx.timeout, self.ctx.signer.sign(template))
                .await
                .ok()
                .ok_or_raise(|| ErrorKind::Signer)?
                .or_raise(|| ErrorKind::Signer)?;
            events.push(event);
        }
        let report = publish(&self.ctx, &events).await;
        if !report.accepted() {
            exn::bail!(ErrorKind::Publish(stage));
        }
        tracing::info!(%stage, events = events.len(), accepted_by = report.accepted_by().count(), "Published events");
        Ok(report.event_ids)
    }

    /// Purge against a fresh listing, so files uploaded during this run are
    /// never considered orphans. Remote files at or beneath an entry that
    /// could not be listed are left alone.
    async fn purge(&self, remote: &[FileRecord]) -> Result<PurgeReport> {
        let local = list_paths(self.source.as_ref()).await?;
        let mut orphans = reconcile(&local.files, remote);
        orphans.retain(|orphan| {
            let unknown = local.is_unlisted(&orphan.path);
            if unknown {
                tracing::warn!(path = %orphan.path, "Not purging a path that could not be listed locally");
            }
            !unknown
        });
        let declined = |_: &[FileRecord]| false;
        let confirm: &dyn Confirm = match (&self.confirm, self.options.non_interactive) {
            (_, true) => &AssumeYes,
            (Some(confirm), false) => confirm.as_ref(),
            (None, false) => &declined,
        };
        purge(&self.ctx, orphans, confirm).await
    }
}
