//! Site source trait and implementations.
//!
//! This module defines the `SiteSource` trait, which provides a read-only
//! view over the files that make up a site (local filesystem, in-memory for
//! tests, ...).

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalSource;
#[cfg(feature = "mock")]
pub use self::mock::MockSource;
use crate::error::Result;
use crate::models::SourceFile;
use async_trait::async_trait;
use futures::{Stream, TryStreamExt};
use std::path::Path;
use std::pin::Pin;

pub(crate) type SourceFileStream<'a> = Pin<Box<dyn Stream<Item = Result<SourceFile>> + Send + 'a>>;

/// Unified read interface for site sources.
///
/// # Path Handling
/// All paths are relative to the source root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// should enforce this validation. Site paths (with a leading `/`) are
/// accepted as well.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use pubsite_storage::{backend::SiteSource, error::Result};
///
/// async fn size_of_index(source: &dyn SiteSource) -> Result<u64> {
///     let data = source.read(Path::new("/index.html")).await?;
///     Ok(data.len() as u64)
/// }
/// ```
#[async_trait]
pub trait SiteSource: Send + Sync {
    /// Name of the source, used for logging only.
    fn name(&self) -> &str;

    /// List all visible files matching an optional prefix.
    ///
    /// Default implementation of this method is to collect all the results
    /// from [`list_stream()`](Self::list_stream) into a [`Vec`] before
    /// returning.
    async fn list(&self, prefix: Option<&Path>) -> Result<Vec<SourceFile>> {
        self.list_stream(prefix).try_collect().await
    }

    /// Stream metadata for all visible files matching an optional prefix.
    ///
    /// Errors for individual entries are yielded in place and do not end the
    /// stream. Failing to list the root itself is reported as
    /// [`RootUnavailable`](crate::error::ErrorKind::RootUnavailable), after
    /// which the stream ends; callers should treat that kind as fatal.
    ///
    /// # Examples
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use pubsite_storage::{backend::SiteSource, error::Result};
    /// # async fn example(source: &dyn SiteSource) -> Result<()> {
    /// let mut stream = source.list_stream(None);
    /// while let Some(info) = stream.try_next().await? {
    ///     println!("{}: {} bytes", info.path.display(), info.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> SourceFileStream<'a>;

    /// Read file contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the file
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
}
