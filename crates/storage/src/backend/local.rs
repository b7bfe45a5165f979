//! Local filesystem site source.
//!
//! Files are read from a configured directory using `tokio::fs` for async
//! I/O. Ignore rules are applied while walking, so ignored directories are
//! never descended into.

use crate::backend::SourceFileStream;
use crate::error::ErrorKind;
use crate::{IgnoreRules, SiteSource, SourceFile, error::Result, path::validate as validate_path};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use tokio::fs::{self, DirEntry};

enum WalkEntry {
    File(SourceFile),
    Descend(PathBuf),
    Skip,
}

/// Local filesystem site source.
///
/// All paths are relative to the configured root directory.
///
/// # Examples
///
/// ```no_run
/// use pubsite_storage::IgnoreRules;
/// use pubsite_storage::backend::LocalSource;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = LocalSource::new("dist", "/path/to/site/dist")?
///     .with_ignore(IgnoreRules::standard());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalSource {
    name: String,
    /// Root directory of the site
    root: PathBuf,
    ignore: IgnoreRules,
}
impl LocalSource {
    /// Create a new local filesystem source.
    ///
    /// Unlike a writable backend, a missing root is not created: publishing
    /// a directory that doesn't exist is a mistake the caller needs to hear
    /// about.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, does not exist, or is
    /// not a directory.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if !root.exists() {
            exn::bail!(ErrorKind::NotFound(root));
        }
        if !root.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self {
            name: name.into(),
            root,
            ignore: IgnoreRules::default(),
        })
    }

    /// Replace the ignore rules applied while listing.
    pub fn with_ignore(mut self, ignore: IgnoreRules) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the absolute path for a relative storage path.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Convert an absolute path back to a relative storage path.
    fn relative_path(&self, absolute: impl AsRef<Path>) -> Result<PathBuf> {
        let absolute = absolute.as_ref();
        let relative = absolute.strip_prefix(&self.root).or_raise(|| {
            ErrorKind::BackendError(format!("path `{:?}` is not within root `{:?}`", absolute, self.root))
        })?;
        Ok(validate_path(relative)?)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<SourceFile> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(SourceFile::new(path, metadata.len(), modified))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }

    /// Errors can't be `?`-ed inside the stream loop, so the per-entry logic
    /// lives here and the loop only has to yield.
    ///
    /// Symlinks to files are followed, so a linked file is published with the
    /// target's contents. Symlinked directories are never descended into: a
    /// link back up the tree would otherwise be walked until the OS gives up.
    async fn process_entry(&self, entry: DirEntry, prefix: Option<&Path>) -> Result<WalkEntry> {
        let path = entry.path();
        let relative = self.relative_path(&path)?;
        let file_type = entry.file_type().await.map_err(|e| Self::map_io_error(e, &relative))?;
        let metadata = if file_type.is_symlink() {
            match fs::metadata(&path).await {
                Ok(target) if target.is_file() => target,
                Ok(_) => {
                    tracing::debug!(source = %self.name, path = %relative.display(), "Not following symlinked directory");
                    return Ok(WalkEntry::Skip);
                },
                Err(e) => {
                    tracing::debug!(source = %self.name, path = %relative.display(), error = %e, "Skipping broken symlink");
                    return Ok(WalkEntry::Skip);
                },
            }
        } else {
            entry.metadata().await.map_err(|e| Self::map_io_error(e, &relative))?
        };
        if self.ignore.is_ignored(&relative, metadata.is_dir()) {
            tracing::trace!(source = %self.name, path = %relative.display(), "Ignoring path");
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_dir() {
            return Ok(WalkEntry::Descend(path));
        }
        if let Some(pfx) = prefix
            && !relative.starts_with(pfx)
        {
            return Ok(WalkEntry::Skip);
        }
        if metadata.is_file() {
            return Ok(WalkEntry::File(Self::metadata(&relative, metadata)?));
        }
        Ok(WalkEntry::Skip)
    }
}

#[async_trait]
impl SiteSource for LocalSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_stream<'a>(&'a self, prefix: Option<&'a Path>) -> SourceFileStream<'a> {
        let validated_prefix = match prefix.map(validate_path).transpose() {
            Ok(pfx) => pfx,
            Err(e) => return Box::pin(futures::stream::once(async { Result::Err(e) })),
        };
        let root = self.root.clone();
        let mut stack = vec![root.clone()];

        Box::pin(stream! {
            'dirs: while let Some(current) = stack.pop() {
                let shown = self.relative_path(&current).unwrap_or_else(|_| current.clone());
                let mut entries = match fs::read_dir(&current).await {
                    Ok(entries) => entries,
                    // A root that cannot be read leaves nothing to walk.
                    Err(err) if current == root => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &current)).raise(ErrorKind::RootUnavailable(root.clone())));
                        return;
                    },
                    Err(err) => {
                        yield Err(exn::Exn::from(Self::map_io_error(err, &shown)));
                        continue 'dirs;
                    }
                };

                'entries: loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break 'entries,
                        Err(e) => { yield Err(exn::Exn::from(Self::map_io_error(e, &shown))); continue 'entries; },
                    };
                    match self.process_entry(entry, validated_prefix.as_deref()).await {
                        Ok(WalkEntry::File(f)) => yield Ok(f),
                        Ok(WalkEntry::Descend(d)) => stack.push(d),
                        Ok(WalkEntry::Skip) => {},
                        Err(e) => yield Err(e),
                    };
                }
            }
        })
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn write(root: &Path, path: &str, data: &[u8]) {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, data).unwrap();
    }

    #[test]
    fn test_new_requires_existing_absolute_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(LocalSource::new("dist", temp_dir.path()).is_ok());
        assert!(LocalSource::new("dist", "relative/path").is_err());
        let missing = LocalSource::new("dist", temp_dir.path().join("missing")).unwrap_err();
        assert!(matches!(&*missing, ErrorKind::NotFound(_)));
        write(temp_dir.path(), "file.txt", b"data");
        assert!(LocalSource::new("dist", temp_dir.path().join("file.txt")).is_err());
    }

    #[test]
    fn test_relative_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = LocalSource::new("dist", temp_dir.path()).unwrap();
        let abs = temp_dir.path().join("assets/site.css");
        assert_eq!(source.relative_path(&abs).unwrap(), Path::new("assets/site.css"));
        assert!(source.relative_path(Path::new("/other/file.html")).is_err());
    }

    #[tokio::test]
    async fn test_read_accepts_site_paths() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "index.html", b"<h1>hi</h1>");
        let source = LocalSource::new("dist", temp_dir.path()).unwrap();
        assert_eq!(source.read(Path::new("/index.html")).await.unwrap(), b"<h1>hi</h1>");
        assert_eq!(source.read(Path::new("index.html")).await.unwrap(), b"<h1>hi</h1>");
    }

    #[tokio::test]
    async fn test_read_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = LocalSource::new("dist", temp_dir.path()).unwrap();
        let err = source.read(Path::new("missing.html")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_returns_nested_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "index.html", b"a");
        write(temp_dir.path(), "assets/css/site.css", b"b");
        write(temp_dir.path(), "assets/js/app.js", b"c");
        let source = LocalSource::new("dist", temp_dir.path()).unwrap();
        let mut paths: Vec<_> = source.list(None).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("assets/css/site.css"),
                PathBuf::from("assets/js/app.js"),
                PathBuf::from("index.html"),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_with_prefix() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "blog/post.html", b"a");
        write(temp_dir.path(), "blogroll/list.html", b"b");
        write(temp_dir.path(), "index.html", b"c");
        let source = LocalSource::new("dist", temp_dir.path()).unwrap();
        let files = source.list(Some(Path::new("blog"))).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, Path::new("blog/post.html"));
    }

    #[tokio::test]
    async fn test_list_applies_ignore_rules() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "index.html", b"a");
        write(temp_dir.path(), ".git/HEAD", b"ref");
        write(temp_dir.path(), "drafts/wip.html", b"b");
        write(temp_dir.path(), "drafts/keep.html", b"c");
        let ignore = IgnoreRules::standard().extend(IgnoreRules::new(["drafts/*", "!drafts/keep.html"]).unwrap()).unwrap();
        let source = LocalSource::new("dist", temp_dir.path()).unwrap().with_ignore(ignore);
        let mut paths: Vec<_> = source.list(None).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("drafts/keep.html"), PathBuf::from("index.html")]);
    }

    #[tokio::test]
    async fn test_root_removed_after_construction_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("site");
        std::fs::create_dir(&root).unwrap();
        let source = LocalSource::new("dist", &root).unwrap();
        std::fs::remove_dir(&root).unwrap();
        let err = source.list(None).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::RootUnavailable(path) if path == &root));
    }

    #[tokio::test]
    async fn test_directory_only_rule_keeps_plain_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "build", b"a plain file named build");
        write(temp_dir.path(), "out/build/app.js", b"x");
        let ignore = IgnoreRules::new(["build/"]).unwrap();
        let source = LocalSource::new("dist", temp_dir.path()).unwrap().with_ignore(ignore);
        let paths: Vec<_> = source.list(None).await.unwrap().into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec![PathBuf::from("build")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_directory_is_not_descended() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "index.html", b"a");
        write(temp_dir.path(), "shared/logo.svg", b"<svg/>");
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("loop")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("shared"), temp_dir.path().join("assets")).unwrap();
        let source = LocalSource::new("dist", temp_dir.path()).unwrap();
        let mut paths: Vec<_> = source.list(None).await.unwrap().into_iter().map(|f| f.path).collect();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("index.html"), PathBuf::from("shared/logo.svg")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_file_is_followed_and_broken_link_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "real.html", b"real");
        std::os::unix::fs::symlink(temp_dir.path().join("real.html"), temp_dir.path().join("alias.html")).unwrap();
        std::os::unix::fs::symlink(temp_dir.path().join("missing.html"), temp_dir.path().join("dangling.html")).unwrap();
        let source = LocalSource::new("dist", temp_dir.path()).unwrap();
        let mut files = source.list(None).await.unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        let paths: Vec<_> = files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("alias.html"), PathBuf::from("real.html")]);
        assert_eq!(files[0].size, 4);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_subdirectory_is_not_a_root_failure() {
        use futures::StreamExt;
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        write(temp_dir.path(), "private/notes.html", b"x");
        let private = temp_dir.path().join("private");
        std::fs::set_permissions(&private, std::fs::Permissions::from_mode(0o000)).unwrap();
        let source = LocalSource::new("dist", temp_dir.path()).unwrap();
        let entries: Vec<_> = source.list_stream(None).collect().await;
        std::fs::set_permissions(&private, std::fs::Permissions::from_mode(0o755)).unwrap();
        // Privileged users can read the directory anyway; either way the root is fine.
        for entry in &entries {
            if let Err(e) = entry {
                assert!(matches!(&**e, ErrorKind::PermissionDenied(path) if path == Path::new("private")));
            }
        }
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_path_security() {
        let temp_dir = tempfile::tempdir().unwrap();
        let source = LocalSource::new("dist", temp_dir.path()).unwrap();
        assert!(source.read(Path::new("../etc/passwd")).await.is_err());
        assert!(source.read(Path::new("etc/../../passwd")).await.is_err());
    }
}
