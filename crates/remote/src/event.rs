//! Signed event model.
//!
//! Events are append-only records. Their meaning is carried by the
//! [`EventKind`] and by tags, which are ordered string lists whose first
//! element is the tag name (`["x", "<hash>"]`, `["d", "/index.html"]`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Kinds of events a deployment publishes or reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Advertises one file of a site: its path, content hash, size and media type.
    FileAdvertisement,
    /// Enumerates every path → hash mapping of a site.
    Manifest,
    /// Requests retraction of previously published events.
    Deletion,
    /// The identity's preferred event endpoints. Root site only.
    RelayList,
    /// The identity's preferred blob endpoints. Root site only.
    ServerList,
    /// The identity's public profile. Root site only.
    Profile,
}

impl EventKind {
    /// Whether this kind may only be published on behalf of the root site.
    pub fn is_root_only(&self) -> bool {
        matches!(self, Self::RelayList | Self::ServerList | Self::Profile)
    }

    /// Same name as the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileAdvertisement => "file_advertisement",
            Self::Manifest => "manifest",
            Self::Deletion => "deletion",
            Self::RelayList => "relay_list",
            Self::ServerList => "server_list",
            Self::Profile => "profile",
        }
    }
}

/// A single event tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(Vec<String>);

impl Tag {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut parts = vec![name.into()];
        parts.extend(values.into_iter().map(Into::into));
        Self(parts)
    }

    pub fn name(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// First value after the name.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        self.0.get(1..).unwrap_or_default()
    }
}

fn first_tag_value<'a>(tags: &'a [Tag], name: &str) -> Option<&'a str> {
    tags.iter().find(|tag| tag.name() == name).and_then(Tag::value)
}

/// An unsigned event, ready to be handed to a [`Signer`](crate::Signer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub kind: EventKind,
    /// Unix timestamp, seconds.
    pub created_at: i64,
    pub tags: Vec<Tag>,
    pub content: String,
}

impl EventTemplate {
    /// A template stamped with the current time.
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
            tags: Vec::new(),
            content: String::new(),
        }
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn tag_value(&self, name: &str) -> Option<&str> {
        first_tag_value(&self.tags, name)
    }
}

/// An event carrying its identifier, author and signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: i64,
    pub kind: EventKind,
    pub tags: Vec<Tag>,
    pub content: String,
    pub sig: String,
}

impl SignedEvent {
    pub fn tag_value(&self, name: &str) -> Option<&str> {
        first_tag_value(&self.tags, name)
    }

    /// Values of every tag called `name`, in order.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags.iter().filter(move |tag| tag.name() == name).filter_map(Tag::value)
    }
}

/// A query over an event endpoint.
///
/// Every populated field narrows the result; empty fields don't constrain
/// anything. Tag constraints match when the event has a tag with that name
/// whose first value is one of the listed values.
///
/// ```
/// use pubsite_remote::{EventFilter, EventKind};
///
/// let filter = EventFilter::new()
///     .author("npub-alice")
///     .kind(EventKind::FileAdvertisement)
///     .tag("site", ["blog"]);
/// assert!(filter.kinds.contains(&EventKind::FileAdvertisement));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub ids: Vec<String>,
    pub authors: Vec<String>,
    pub kinds: Vec<EventKind>,
    pub tags: BTreeMap<String, Vec<String>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.push(id.into());
        self
    }

    pub fn author(mut self, pubkey: impl Into<String>) -> Self {
        self.authors.push(pubkey.into());
        self
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn tag(mut self, name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.entry(name.into()).or_default().extend(values.into_iter().map(Into::into));
        self
    }

    pub fn matches(&self, event: &SignedEvent) -> bool {
        if !self.ids.is_empty() && !self.ids.contains(&event.id) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.contains(&event.pubkey) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        self.tags.iter().all(|(name, values)| {
            event.tag_values(name).any(|value| values.iter().any(|wanted| wanted == value))
        })
    }
}
