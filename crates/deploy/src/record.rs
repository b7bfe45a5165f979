//! File records: one logical site file, local or remote.

use pubsite_remote::ContentHash;
use std::collections::BTreeSet;

pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Collapse any run of leading slashes to exactly one.
///
/// ```
/// use pubsite_deploy::record::canonical_path;
/// assert_eq!(canonical_path("index.html"), "/index.html");
/// assert_eq!(canonical_path("///a/B.css"), "/a/B.css");
/// ```
pub fn canonical_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

/// Comparison key for a site path: canonical and lower-cased.
pub fn path_key(path: &str) -> String {
    canonical_path(path).to_lowercase()
}

/// Infer a media type from the path extension.
pub fn media_type(path: &str) -> &'static str {
    let Some((_, extension)) = path.rsplit_once('.') else {
        return DEFAULT_MEDIA_TYPE;
    };
    if extension.contains('/') {
        return DEFAULT_MEDIA_TYPE;
    }
    match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" | "map" => "application/json",
        "webmanifest" => "application/manifest+json",
        "xml" => "application/xml",
        "rss" => "application/rss+xml",
        "atom" => "application/atom+xml",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        _ => DEFAULT_MEDIA_TYPE,
    }
}

/// One logical site file.
///
/// Records are rebuilt on every run. The content hash is fixed once set:
/// [`with_hash`](Self::with_hash) consumes the record, so new content always
/// means a new record. The payload is the only transient part and is
/// dropped as soon as the bytes have been handed to the endpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Site path, always starting with exactly one `/`. Case is preserved.
    pub path: String,
    /// Byte length, authoritative once the file has been loaded.
    pub size: u64,
    pub media_type: &'static str,
    content_hash: Option<ContentHash>,
    payload: Option<Vec<u8>>,
    /// Event currently advertising this file remotely.
    pub remote_event_id: Option<String>,
    /// Event endpoints where the advertisement was observed.
    pub found_on_event_endpoints: BTreeSet<String>,
    /// Blob endpoints where the content was observed.
    pub available_on_blob_endpoints: BTreeSet<String>,
}

impl FileRecord {
    pub fn new(path: impl AsRef<str>, size: u64) -> Self {
        let path = canonical_path(path.as_ref());
        let media_type = media_type(&path);
        Self {
            path,
            size,
            media_type,
            content_hash: None,
            payload: None,
            remote_event_id: None,
            found_on_event_endpoints: BTreeSet::new(),
            available_on_blob_endpoints: BTreeSet::new(),
        }
    }

    /// Case-insensitive comparison key.
    pub fn key(&self) -> String {
        path_key(&self.path)
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        self.content_hash.as_ref()
    }

    /// A new record carrying `hash`.
    pub fn with_hash(self, hash: ContentHash) -> Self {
        Self { content_hash: Some(hash), ..self }
    }

    pub fn with_media_type(self, media_type: &'static str) -> Self {
        Self { media_type, ..self }
    }

    pub fn with_remote_event(self, event_id: impl Into<String>) -> Self {
        Self { remote_event_id: Some(event_id.into()), ..self }
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    pub(crate) fn with_payload(self, payload: Vec<u8>) -> Self {
        Self { payload: Some(payload), ..self }
    }

    pub(crate) fn take_payload(&mut self) -> Option<Vec<u8>> {
        self.payload.take()
    }

    /// Release the payload, keeping everything else.
    pub fn without_payload(self) -> Self {
        Self { payload: None, ..self }
    }

    /// Copy what discovery observed about `remote` onto this record.
    pub(crate) fn observed_as(mut self, remote: &FileRecord) -> Self {
        self.remote_event_id.clone_from(&remote.remote_event_id);
        self.found_on_event_endpoints.extend(remote.found_on_event_endpoints.iter().cloned());
        self.available_on_blob_endpoints.extend(remote.available_on_blob_endpoints.iter().cloned());
        self
    }
}
