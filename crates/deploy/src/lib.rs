//! Deployment synchronization and replication engine.
//!
//! A deployment converges a set of blob and event endpoints onto the
//! contents of a local site:
//!
//! 1. [`scan`] the local source, hashing every file,
//! 2. [`fetch`](remote::fetch) what was previously published,
//! 3. [`compare`] both sets,
//! 4. [`dispatch`] changed files to every blob endpoint,
//! 5. [`publish`] a [`Manifest`] of the result,
//! 6. optionally [`purge`] remote files that no longer exist locally.
//!
//! [`SyncOrchestrator`] sequences all of the above. Every step takes an
//! explicit [`SyncContext`]; nothing is global.

pub mod compare;
pub mod dispatch;
pub mod error;
mod hash;
pub mod manifest;
pub mod publish;
pub mod purge;
pub mod record;
pub mod remote;
pub mod scan;
pub mod sync;

pub use crate::compare::{Comparison, compare};
pub use crate::dispatch::{
    EndpointOutcome, EndpointStatus, FailureKind, NoProgress, ProgressObserver, ProgressSnapshot, UploadResult, dispatch,
};
pub use crate::hash::ContentHasher;
pub use crate::manifest::{Announce, Manifest, ManifestBuilder, SiteMetadata, root_announcements};
pub use crate::publish::{EndpointPublish, PublishReport, publish};
pub use crate::purge::{AssumeYes, Confirm, PurgeReport, purge, reconcile};
pub use crate::record::FileRecord;
pub use crate::scan::{LocalListing, ScanFailure, ScanReport, list_paths, scan};
pub use crate::sync::{StageError, SyncOptions, SyncOrchestrator, SyncState, SyncSummary};
use pubsite_config::Config;
use pubsite_remote::dry_run::{DryRunBlobEndpoint, DryRunEventEndpoint};
use pubsite_remote::{BlobHandle, EventHandle, SignerHandle};
use pubsite_storage::backend::LocalSource;
use pubsite_storage::{IgnoreRules, SourceHandle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONCURRENCY: usize = pubsite_config::DEFAULT_CONCURRENCY;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(pubsite_config::DEFAULT_TIMEOUT_SECS);

/// The standard ignore rules followed by the configured ones, which take
/// precedence.
pub fn ignore_rules(config: &Config) -> pubsite_storage::error::Result<IgnoreRules> {
    IgnoreRules::standard().extend(IgnoreRules::new(&config.ignore)?)
}

/// Source for the site directory at `root`, filtered by [`ignore_rules`].
pub fn local_source(config: &Config, root: impl AsRef<Path>) -> pubsite_storage::error::Result<SourceHandle> {
    let root = root.as_ref();
    let source = LocalSource::new(root.display().to_string(), root)?.with_ignore(ignore_rules(config)?);
    tracing::debug!(root = %root.display(), rules = config.ignore.len(), "Prepared local site source");
    Ok(Arc::new(source))
}

/// Everything a deployment step needs, passed explicitly.
///
/// Endpoint lists are fixed for the lifetime of the context. Cloning is
/// cheap and clones share the same cancellation token.
#[derive(Clone)]
pub struct SyncContext {
    pub signer: SignerHandle,
    pub blob_endpoints: Arc<[BlobHandle]>,
    pub event_endpoints: Arc<[EventHandle]>,
    site_id: Option<String>,
    /// Maximum number of files uploading at once.
    pub concurrency: usize,
    /// Applied to every individual endpoint and signer call.
    pub timeout: Duration,
    pub cancellation: CancellationToken,
}

impl SyncContext {
    pub fn new(signer: SignerHandle) -> Self {
        Self {
            signer,
            blob_endpoints: Arc::from(Vec::new()),
            event_endpoints: Arc::from(Vec::new()),
            site_id: None,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            cancellation: CancellationToken::new(),
        }
    }

    /// Build a context from loaded configuration.
    ///
    /// Endpoint clients are created by the caller from
    /// [`config.endpoints`](pubsite_config::EndpointsConfig); when
    /// `deploy.dry_run` is set they are wrapped so that nothing is written.
    pub fn from_config(
        config: &Config,
        signer: SignerHandle,
        blob_endpoints: Vec<BlobHandle>,
        event_endpoints: Vec<EventHandle>,
    ) -> Self {
        let context = Self::new(signer)
            .with_blob_endpoints(blob_endpoints)
            .with_event_endpoints(event_endpoints)
            .with_site_id(config.site.site_id())
            .with_concurrency(config.deploy.concurrency)
            .with_timeout(config.deploy.timeout());
        match config.deploy.dry_run {
            true => context.dry_run(),
            false => context,
        }
    }

    pub fn with_blob_endpoints(mut self, endpoints: impl IntoIterator<Item = BlobHandle>) -> Self {
        self.blob_endpoints = endpoints.into_iter().collect();
        self
    }

    pub fn with_event_endpoints(mut self, endpoints: impl IntoIterator<Item = EventHandle>) -> Self {
        self.event_endpoints = endpoints.into_iter().collect();
        self
    }

    /// Deploy as a named site. `None` or an empty id means the root site.
    pub fn with_site_id(mut self, site_id: Option<&str>) -> Self {
        self.site_id = site_id.filter(|id| !id.is_empty()).map(str::to_string);
        self
    }

    /// Values below one are raised to one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Wrap every endpoint so that writes are logged and skipped.
    pub fn dry_run(mut self) -> Self {
        self.blob_endpoints = self
            .blob_endpoints
            .iter()
            .map(|endpoint| Arc::new(DryRunBlobEndpoint::new(endpoint.clone())) as BlobHandle)
            .collect();
        self.event_endpoints = self
            .event_endpoints
            .iter()
            .map(|endpoint| Arc::new(DryRunEventEndpoint::new(endpoint.clone())) as EventHandle)
            .collect();
        self
    }

    pub fn site_id(&self) -> Option<&str> {
        self.site_id.as_deref()
    }

    pub fn is_root_site(&self) -> bool {
        self.site_id.is_none()
    }

    pub fn blob_endpoint_names(&self) -> Vec<String> {
        self.blob_endpoints.iter().map(|endpoint| endpoint.name().to_string()).collect()
    }

    pub fn event_endpoint_names(&self) -> Vec<String> {
        self.event_endpoints.iter().map(|endpoint| endpoint.name().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubsite_remote::mock::{MockBlobEndpoint, MockEventEndpoint, MockSigner};
    use pubsite_remote::{BlobEndpoint, ContentHash, EventEndpoint, EventKind, EventTemplate, Signer};
    use pubsite_storage::SiteSource;

    #[test]
    fn test_context_defaults() {
        let ctx = SyncContext::new(Arc::new(MockSigner::new("alice")));
        assert_eq!(ctx.concurrency, 4);
        assert_eq!(ctx.timeout, Duration::from_secs(30));
        assert!(ctx.is_root_site());
        assert!(ctx.blob_endpoints.is_empty());
    }

    #[test]
    fn test_empty_site_id_is_root() {
        let ctx = SyncContext::new(Arc::new(MockSigner::new("alice"))).with_site_id(Some(""));
        assert!(ctx.is_root_site());
        let ctx = ctx.with_site_id(Some("blog"));
        assert_eq!(ctx.site_id(), Some("blog"));
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.site.id = Some("docs".to_string());
        config.deploy.concurrency = 9;
        config.deploy.timeout_secs = 3;
        let blob: BlobHandle = Arc::new(MockBlobEndpoint::new("https://b.example"));
        let ctx = SyncContext::from_config(&config, Arc::new(MockSigner::new("alice")), vec![blob], vec![]);
        assert_eq!(ctx.site_id(), Some("docs"));
        assert_eq!(ctx.concurrency, 9);
        assert_eq!(ctx.timeout, Duration::from_secs(3));
        assert_eq!(ctx.blob_endpoint_names(), vec!["https://b.example".to_string()]);
    }

    #[tokio::test]
    async fn test_local_source_applies_configured_ignore_rules() {
        let dir = tempfile::tempdir().unwrap();
        for path in ["index.html", "app.js.map", "drafts/wip.html", ".git/HEAD", "keep/.DS_Store"] {
            let full = dir.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, path).unwrap();
        }
        let mut config = Config::default();
        config.ignore = vec!["*.map".to_string(), "drafts/".to_string(), "!keep/.DS_Store".to_string()];
        let source = local_source(&config, dir.path()).unwrap();
        let mut paths: Vec<_> = source.list(None).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(paths, vec![std::path::PathBuf::from("index.html"), std::path::PathBuf::from("keep/.DS_Store")]);
    }

    #[test]
    fn test_ignore_rules_reject_bad_pattern() {
        let mut config = Config::default();
        assert_eq!(ignore_rules(&config).unwrap().patterns().count(), 3);
        config.ignore = vec!["[oops".to_string()];
        let err = ignore_rules(&config).unwrap_err();
        assert!(matches!(&*err, pubsite_storage::error::ErrorKind::InvalidPattern(_)));
    }

    #[tokio::test]
    async fn test_dry_run_context_never_writes() {
        let mut config = Config::default();
        config.deploy.dry_run = true;
        let blob = Arc::new(MockBlobEndpoint::new("blobs"));
        let relay = Arc::new(MockEventEndpoint::new("relay"));
        let blobs = vec![blob.clone() as BlobHandle];
        let relays = vec![relay.clone() as EventHandle];
        let ctx = SyncContext::from_config(&config, Arc::new(MockSigner::new("alice")), blobs, relays);
        let hash = ContentHash::from_bytes([1; 32]);
        ctx.blob_endpoints[0].put(&hash, b"x").await.unwrap();
        assert!(!blob.contains(&hash).await);
        let event = ctx.signer.sign(EventTemplate::new(EventKind::Manifest)).await.unwrap();
        ctx.event_endpoints[0].publish(&[event]).await.unwrap();
        assert!(relay.stored().await.is_empty());
    }
}
