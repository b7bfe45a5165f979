//! Storage models.

use std::path::PathBuf;
use time::OffsetDateTime;

/// File metadata returned by site sources.
///
/// Listing never reads file contents; the size is whatever the source
/// reported at listing time and is only authoritative once the deployment
/// engine has loaded the bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Relative path from source root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }
}
