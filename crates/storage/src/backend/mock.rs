//! In-memory site source for testing.

use super::SourceFileStream;
use crate::error::{ErrorKind, Result};
use crate::models::SourceFile;
use crate::path::validate as validate_path;
use crate::SiteSource;
use async_stream::stream;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// In-memory site source for testing.
///
/// Files are stored in a `BTreeMap` behind a [`RwLock`], so listing order is
/// deterministic and tests can mutate the site between deployment stages.
/// Individual files can be marked unreadable, single listing entries can be
/// made to fail, and so can the whole listing, to exercise error paths.
///
/// # Examples
///
/// ```
/// use pubsite_storage::backend::{MockSource, SiteSource};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = MockSource::with_files([("index.html", "<h1>hi</h1>")]);
/// assert_eq!(source.read(Path::new("/index.html")).await?, b"<h1>hi</h1>");
/// # Ok(())
/// # }
/// ```
pub struct MockSource {
    name: String,
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
    unreadable: BTreeSet<PathBuf>,
    broken: BTreeSet<PathBuf>,
    listing_fails: bool,
}

impl MockSource {
    /// Create a mock source pre-populated with files.
    ///
    /// Panics if any path fails validation. If test setup is wrong, then
    /// test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = BTreeMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockSource::with_files: invalid path {}", path.display());
            };
            map.insert(validated, data.into());
        }
        Self {
            name: "mock".to_string(),
            files: RwLock::new(map),
            unreadable: BTreeSet::new(),
            broken: BTreeSet::new(),
            listing_fails: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Listing the source root fails, as if the directory were unreadable.
    pub fn with_failing_listing(mut self) -> Self {
        self.listing_fails = true;
        self
    }

    /// Listing yields a permission error for `path` in its place, as if it
    /// were an unreadable subdirectory.
    pub fn with_broken_entry(mut self, path: impl AsRef<Path>) -> Self {
        let Ok(validated) = validate_path(path.as_ref()) else {
            panic!("MockSource::with_broken_entry: invalid path {}", path.as_ref().display());
        };
        self.broken.insert(validated);
        self
    }

    /// The file is still listed, but reading it fails with a permission error.
    pub fn with_unreadable(mut self, path: impl AsRef<Path>) -> Self {
        let Ok(validated) = validate_path(path.as_ref()) else {
            panic!("MockSource::with_unreadable: invalid path {}", path.as_ref().display());
        };
        self.unreadable.insert(validated);
        self
    }

    /// Add or replace a file.
    pub async fn insert(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) -> Result<()> {
        let path = validate_path(path.as_ref())?;
        self.files.write().await.insert(path, data.into());
        Ok(())
    }

    /// Remove a file, returning whether it existed.
    pub async fn remove(&self, path: impl AsRef<Path>) -> Result<bool> {
        let path = validate_path(path.as_ref())?;
        Ok(self.files.write().await.remove(&path).is_some())
    }
}
impl Default for MockSource {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl SiteSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> SourceFileStream<'a> {
        if self.listing_fails {
            let err = ErrorKind::RootUnavailable(PathBuf::from("/"));
            return Box::pin(futures::stream::once(async { Err(exn::Exn::from(err)) }));
        }
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Err(e) })),
        };

        Box::pin(stream! {
            // Snapshot under the read lock, then drop it before yielding.
            let entries: BTreeMap<PathBuf, Option<u64>> = {
                let guard = self.files.read().await;
                guard
                    .iter()
                    .map(|(path, data)| (path.clone(), Some(data.len() as u64)))
                    .chain(self.broken.iter().map(|path| (path.clone(), None)))
                    .filter(|(path, _)| match &validated_prefix {
                        Some(pfx) => path.starts_with(pfx),
                        None => true,
                    })
                    .collect()
            };
            for (path, size) in entries {
                match size {
                    Some(size) => yield Ok(SourceFile::new(path, size, OffsetDateTime::UNIX_EPOCH)),
                    None => yield Err(exn::Exn::from(ErrorKind::PermissionDenied(path))),
                }
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        if self.unreadable.contains(&path) {
            exn::bail!(ErrorKind::PermissionDenied(path));
        }
        self.files.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }
}
