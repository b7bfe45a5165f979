//! Path validation and conversion to site paths.
//!
//! Storage paths are relative to the source root and must never escape it.
//! Site paths are what visitors request: UTF-8, `/`-separated, and always
//! rooted with exactly one leading slash.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a storage path for security and correctness.
/// Ensures that paths don't escape the source root (no `..` traversal).
///
/// A leading `/` is accepted and dropped, so site paths can be handed
/// straight back to a source.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use pubsite_storage::validate_path;
/// assert!(validate_path("assets/site.css").is_ok());
/// assert!(validate_path("/index.html").is_ok());
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("//blog/../docs/./intro.html/").unwrap(),
///     Path::new("docs/intro.html")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls — reject them explicitly.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Converts a storage path into a site path (`/` + components joined by `/`).
///
/// Non-UTF-8 components cannot be served over HTTP and are rejected with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// ```
/// use pubsite_storage::to_site_path;
/// assert_eq!(to_site_path("assets/site.css").unwrap(), "/assets/site.css");
/// assert_eq!(to_site_path("/index.html").unwrap(), "/index.html");
/// ```
pub fn to_site_path(path: impl AsRef<Path>) -> Result<String> {
    let validated = validate(path.as_ref())?;
    let mut site_path = String::new();
    for component in validated.components() {
        let Some(part) = component.as_os_str().to_str() else {
            exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
        };
        site_path.push('/');
        site_path.push_str(part);
    }
    Ok(site_path)
}
