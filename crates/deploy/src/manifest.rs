//! Site manifest and root-site announcements.
//!
//! A manifest is one signed event enumerating every path → hash mapping a
//! site currently serves. It is built once per run from the files that are
//! known to be published: successful uploads plus unchanged files.

use crate::dispatch::UploadResult;
use crate::error::{ErrorKind, Result};
use crate::record::FileRecord;
use crate::remote::SITE_TAG;
use pubsite_config::Config;
use pubsite_remote::{ContentHash, EventKind, EventTemplate, Tag};
use std::collections::BTreeMap;

/// Display metadata. Informational only; never affects what gets synced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SiteMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl From<&Config> for SiteMetadata {
    fn from(config: &Config) -> Self {
        Self { title: config.site.title.clone(), description: config.site.description.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Manifest {
    /// `None` for the root site.
    pub site_id: Option<String>,
    pub files: BTreeMap<String, ContentHash>,
    pub metadata: SiteMetadata,
    /// Blob endpoint hints. Always empty for named sites.
    pub servers: Vec<String>,
    /// Event endpoint hints. Always empty for named sites.
    pub relays: Vec<String>,
}

impl Manifest {
    pub fn is_root(&self) -> bool {
        self.site_id.is_none()
    }

    /// Render the unsigned manifest event.
    pub fn to_template(&self) -> EventTemplate {
        let mut template = EventTemplate::new(EventKind::Manifest);
        if let Some(site_id) = &self.site_id {
            template = template.tag(Tag::new("d", [site_id.as_str()])).tag(Tag::new(SITE_TAG, [site_id.as_str()]));
        }
        for (path, hash) in &self.files {
            template = template.tag(Tag::new("path", [path.clone(), hash.to_string()]));
        }
        if let Some(title) = &self.metadata.title {
            template = template.tag(Tag::new("title", [title.as_str()]));
        }
        if let Some(description) = &self.metadata.description {
            template = template.tag(Tag::new("description", [description.as_str()]));
        }
        if self.is_root() {
            for server in &self.servers {
                template = template.tag(Tag::new("server", [server.as_str()]));
            }
            for relay in &self.relays {
                template = template.tag(Tag::new("relay", [relay.as_str()]));
            }
        }
        template
    }
}

/// Collects the published files of a run into a [`Manifest`].
///
/// ```
/// use pubsite_deploy::{ContentHasher, FileRecord, ManifestBuilder, SiteMetadata};
///
/// let unchanged = vec![FileRecord::new("/a.css", 1).with_hash(ContentHasher::hash(b"a"))];
/// let manifest = ManifestBuilder::new(None, SiteMetadata::default()).with_unchanged(&unchanged).build();
/// assert_eq!(manifest.map(|m| m.files.len()), Some(1));
///
/// assert!(ManifestBuilder::new(None, SiteMetadata::default()).build().is_none());
/// ```
#[derive(Clone, Debug)]
pub struct ManifestBuilder {
    site_id: Option<String>,
    metadata: SiteMetadata,
    files: BTreeMap<String, ContentHash>,
    servers: Vec<String>,
    relays: Vec<String>,
}

impl ManifestBuilder {
    /// `None` or an empty id builds the root site's manifest.
    pub fn new(site_id: Option<&str>, metadata: SiteMetadata) -> Self {
        Self {
            site_id: site_id.filter(|id| !id.is_empty()).map(str::to_string),
            metadata,
            files: BTreeMap::new(),
            servers: Vec::new(),
            relays: Vec::new(),
        }
    }

    /// Endpoint hints embedded in the root manifest. Ignored for named sites.
    pub fn with_endpoint_hints(mut self, servers: Vec<String>, relays: Vec<String>) -> Self {
        self.servers = servers;
        self.relays = relays;
        self
    }

    /// Add every upload that reached at least one blob endpoint.
    pub fn with_uploads(mut self, uploads: &[UploadResult]) -> Self {
        let published = uploads.iter().filter(|upload| upload.overall_success).map(|upload| &upload.file);
        self.add(published);
        self
    }

    pub fn with_unchanged(mut self, records: &[FileRecord]) -> Self {
        self.add(records);
        self
    }

    fn add<'a>(&mut self, records: impl IntoIterator<Item = &'a FileRecord>) {
        for record in records {
            match record.content_hash() {
                Some(hash) => {
                    self.files.insert(record.path.clone(), *hash);
                },
                None => tracing::debug!(path = %record.path, "Leaving file without a known hash out of the manifest"),
            }
        }
    }

    /// `None` when no file qualifies: an empty manifest would advertise an
    /// empty site.
    pub fn build(self) -> Option<Manifest> {
        if self.files.is_empty() {
            tracing::info!(site = self.site_id.as_deref().unwrap_or("<root>"), "Manifest is empty; nothing to publish");
            return None;
        }
        let root = self.site_id.is_none();
        Some(Manifest {
            site_id: self.site_id,
            files: self.files,
            metadata: self.metadata,
            servers: if root { self.servers } else { Vec::new() },
            relays: if root { self.relays } else { Vec::new() },
        })
    }
}

/// Identity-wide events that only the root site may publish.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Announce {
    pub profile: Option<SiteMetadata>,
    pub relays: Option<Vec<String>>,
    pub servers: Option<Vec<String>>,
}

impl Announce {
    pub fn is_empty(&self) -> bool {
        self.profile.is_none() && self.relays.is_none() && self.servers.is_none()
    }
}

impl From<&Config> for Announce {
    fn from(config: &Config) -> Self {
        let site = &config.site;
        Self {
            profile: site.publish_profile.then(|| SiteMetadata::from(config)),
            relays: site.publish_relay_list.then(|| config.endpoints.event.clone()),
            servers: site.publish_server_list.then(|| config.endpoints.blob.clone()),
        }
    }
}

/// Build the profile, relay-list and server-list events requested by
/// `announce`.
///
/// Fails with [`ErrorKind::RootOnly`] if anything is requested for a named
/// site.
pub fn root_announcements(site_id: Option<&str>, announce: &Announce) -> Result<Vec<EventTemplate>> {
    let mut templates = Vec::new();
    if let Some(profile) = &announce.profile {
        let content = serde_json::json!({
            "name": profile.title,
            "about": profile.description,
        });
        templates.push(EventTemplate::new(EventKind::Profile).content(content.to_string()));
    }
    if let Some(relays) = &announce.relays {
        let template = relays.iter().fold(EventTemplate::new(EventKind::RelayList), |template, relay| {
            template.tag(Tag::new("r", [relay.as_str()]))
        });
        templates.push(template);
    }
    if let Some(servers) = &announce.servers {
        let template = servers.iter().fold(EventTemplate::new(EventKind::ServerList), |template, server| {
            template.tag(Tag::new("server", [server.as_str()]))
        });
        templates.push(template);
    }

    let named = site_id.is_some_and(|id| !id.is_empty());
    if named && let Some(template) = templates.iter().find(|template| template.kind.is_root_only()) {
        exn::bail!(ErrorKind::RootOnly(template.kind.as_str()));
    }
    Ok(templates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ContentHasher;
    use crate::dispatch::{EndpointOutcome, EndpointStatus, FailureKind};

    fn record(path: &str, content: &str) -> FileRecord {
        FileRecord::new(path, content.len() as u64).with_hash(ContentHasher::hash(content.as_bytes()))
    }

    fn upload(file: FileRecord, success: bool) -> UploadResult {
        let status = match success {
            true => EndpointStatus::Success,
            false => EndpointStatus::Failed(FailureKind::Network),
        };
        UploadResult {
            file,
            overall_success: success,
            per_endpoint: vec![EndpointOutcome::new("blobs", status)],
            advertisement: None,
            error: None,
            cancelled: false,
        }
    }

    #[test]
    fn test_emptiness_guard() {
        let uploads = vec![upload(record("/a.txt", "a"), false)];
        assert!(ManifestBuilder::new(None, SiteMetadata::default()).with_uploads(&uploads).build().is_none());
        let unhashed = vec![FileRecord::new("/b.txt", 1)];
        assert!(ManifestBuilder::new(None, SiteMetadata::default()).with_unchanged(&unhashed).build().is_none());
    }

    #[test]
    fn test_only_published_files_are_listed() {
        let uploads = vec![upload(record("/new.html", "n"), true), upload(record("/broken.js", "b"), false)];
        let unchanged = vec![record("/a.css", "a"), FileRecord::new("/unknown.txt", 3)];
        let manifest = ManifestBuilder::new(Some("blog"), SiteMetadata::default())
            .with_uploads(&uploads)
            .with_unchanged(&unchanged)
            .build()
            .unwrap();
        assert_eq!(manifest.files.keys().collect::<Vec<_>>(), vec!["/a.css", "/new.html"]);
        assert_eq!(manifest.files["/a.css"], ContentHasher::hash(b"a"));
    }

    #[test]
    fn test_template_tags() {
        let metadata = SiteMetadata { title: Some("Notes".to_string()), description: None };
        let manifest = ManifestBuilder::new(Some("blog"), metadata)
            .with_unchanged(&[record("/index.html", "i")])
            .build()
            .unwrap();
        let template = manifest.to_template();
        assert_eq!(template.kind, EventKind::Manifest);
        assert_eq!(template.tag_value("d"), Some("blog"));
        assert_eq!(template.tag_value(SITE_TAG), Some("blog"));
        assert_eq!(template.tag_value("title"), Some("Notes"));
        assert_eq!(template.tag_value("description"), None);
        let path = template.tags.iter().find(|tag| tag.name() == "path").unwrap();
        assert_eq!(path.values(), &["/index.html".to_string(), ContentHasher::hash(b"i").to_string()]);
    }

    #[test]
    fn test_hints_only_for_root() {
        let hints = || (vec!["https://blobs.example".to_string()], vec!["wss://relay.example".to_string()]);
        let files = [record("/index.html", "i")];

        let (servers, relays) = hints();
        let root = ManifestBuilder::new(Some(""), SiteMetadata::default())
            .with_endpoint_hints(servers, relays)
            .with_unchanged(&files)
            .build()
            .unwrap();
        assert!(root.is_root());
        let template = root.to_template();
        assert_eq!(template.tag_value("server"), Some("https://blobs.example"));
        assert_eq!(template.tag_value("relay"), Some("wss://relay.example"));
        assert_eq!(template.tag_value("d"), None);

        let (servers, relays) = hints();
        let named = ManifestBuilder::new(Some("docs"), SiteMetadata::default())
            .with_endpoint_hints(servers, relays)
            .with_unchanged(&files)
            .build()
            .unwrap();
        assert!(named.servers.is_empty() && named.relays.is_empty());
        assert_eq!(named.to_template().tag_value("server"), None);
    }

    #[test]
    fn test_root_announcements() {
        let announce = Announce {
            profile: Some(SiteMetadata { title: Some("Alice".to_string()), description: Some("hi".to_string()) }),
            relays: Some(vec!["wss://a".to_string(), "wss://b".to_string()]),
            servers: Some(vec!["https://c".to_string()]),
        };
        let templates = root_announcements(None, &announce).unwrap();
        let kinds: Vec<_> = templates.iter().map(|template| template.kind).collect();
        assert_eq!(kinds, vec![EventKind::Profile, EventKind::RelayList, EventKind::ServerList]);
        let profile: serde_json::Value = serde_json::from_str(&templates[0].content).unwrap();
        assert_eq!(profile["name"], "Alice");
        assert_eq!(profile["about"], "hi");
        assert_eq!(templates[1].tags.len(), 2);
        assert_eq!(templates[2].tag_value("server"), Some("https://c"));
    }

    #[test]
    fn test_root_announcements_refused_for_named_site() {
        let announce = Announce { relays: Some(vec![]), ..Default::default() };
        let err = root_announcements(Some("blog"), &announce).unwrap_err();
        assert_eq!(*err, ErrorKind::RootOnly("relay_list"));
        assert!(root_announcements(Some("blog"), &Announce::default()).unwrap().is_empty());
        let announce = Announce { servers: Some(vec![]), ..Default::default() };
        let err = root_announcements(Some("blog"), &announce).unwrap_err();
        assert_eq!(*err, ErrorKind::RootOnly(EventKind::ServerList.as_str()));
    }

    #[test]
    fn test_announce_from_config() {
        let mut config = Config::default();
        config.site.title = Some("Alice".to_string());
        config.site.publish_profile = true;
        config.endpoints.event = vec!["wss://relay".to_string()];
        config.site.publish_relay_list = true;
        let announce = Announce::from(&config);
        assert_eq!(announce.profile.and_then(|p| p.title).as_deref(), Some("Alice"));
        assert_eq!(announce.relays, Some(vec!["wss://relay".to_string()]));
        assert!(announce.servers.is_none());
    }
}
