//! Configuration loading and validation.
//!
//! Configuration is merged from three layers, later layers winning:
//!
//! 1. built-in defaults,
//! 2. a config file (`.toml`, `.yaml`/`.yml` or `.json`),
//! 3. environment variables prefixed with `PUBSITE_`, nested with `__`
//!    (`PUBSITE_DEPLOY__CONCURRENCY=8`).
//!
//! The merged result is validated before it is handed out, so a [`Config`]
//! obtained from [`Config::load`] never enables a root-only operation for a
//! named site.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "PUBSITE_";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_SITE_ID_LEN: usize = 32;

/// Complete deployment configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub deploy: DeployConfig,
    pub endpoints: EndpointsConfig,
    /// `.gitignore`-style rules, applied after the standard set; `!` negates.
    pub ignore: Vec<String>,
}

/// What is being published, and under which name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Named site identifier. Absent or empty designates the root site.
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// Publish the identity's profile. Root site only.
    pub publish_profile: bool,
    /// Publish the configured event endpoints as the identity's relay list. Root site only.
    pub publish_relay_list: bool,
    /// Publish the configured blob endpoints as the identity's server list. Root site only.
    pub publish_server_list: bool,
}

impl SiteConfig {
    /// The named site id, or `None` for the root site.
    pub fn site_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.site_id().is_none()
    }
}

/// How a deployment behaves.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Maximum number of files uploading at the same time.
    pub concurrency: usize,
    /// Per-endpoint-call timeout, in seconds.
    pub timeout_secs: u64,
    /// Delete remote files that no longer exist locally.
    pub purge: bool,
    /// Purge without asking for confirmation.
    pub non_interactive: bool,
    /// Compare and report, but never write to any endpoint.
    pub dry_run: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            purge: false,
            non_interactive: false,
            dry_run: false,
        }
    }
}

impl DeployConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where a deployment publishes to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Blob endpoint identifiers (URLs).
    pub blob: Vec<String>,
    /// Event endpoint identifiers (URLs).
    pub event: Vec<String>,
}

impl Config {
    /// Location of the per-user configuration file, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "pubsite").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load, merge and validate configuration.
    ///
    /// With `path = None` only defaults and environment variables are used.
    /// An explicitly requested file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(file_provider(path)?);
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Validate and return configuration from an arbitrary [`Figment`].
    pub fn extract(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        tracing::debug!(
            site = config.site.site_id().unwrap_or("<root>"),
            blob_endpoints = config.endpoints.blob.len(),
            event_endpoints = config.endpoints.event.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.deploy.concurrency == 0 {
            exn::bail!(ErrorKind::Invalid("deploy.concurrency must be at least 1".to_string()));
        }
        if self.deploy.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("deploy.timeout_secs must be at least 1".to_string()));
        }
        if let Some(id) = self.site.site_id() {
            let valid_chars = id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
            if !valid_chars || id.len() > MAX_SITE_ID_LEN {
                exn::bail!(ErrorKind::Invalid(format!(
                    "site.id `{id}` must be at most {MAX_SITE_ID_LEN} characters of a-z, 0-9 and `-`"
                )));
            }
            if self.site.publish_profile {
                exn::bail!(ErrorKind::RootOnly("publish_profile"));
            }
            if self.site.publish_relay_list {
                exn::bail!(ErrorKind::RootOnly("publish_relay_list"));
            }
            if self.site.publish_server_list {
                exn::bail!(ErrorKind::RootOnly("publish_server_list"));
            }
        }
        let blank = self.endpoints.blob.iter().chain(&self.endpoints.event).any(|endpoint| endpoint.trim().is_empty());
        if blank {
            exn::bail!(ErrorKind::Invalid("endpoint identifiers must not be blank".to_string()));
        }
        Ok(())
    }
}

fn file_provider(path: &Path) -> Result<Figment> {
    if !path.is_file() {
        exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
    }
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase);
    let figment = match extension.as_deref() {
        Some("toml") => Figment::from(Toml::file(path)),
        Some("yaml" | "yml") => Figment::from(Yaml::file(path)),
        Some("json") => Figment::from(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    };
    Ok(figment)
}
