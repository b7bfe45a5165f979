//! Content hashing.

use crate::error::{ErrorKind, Result};
use crate::record::FileRecord;
use exn::ResultExt;
use pubsite_remote::ContentHash;
use pubsite_storage::SiteSource;
use std::path::Path;

/// Computes content identifiers for site files.
///
/// BLAKE3-256 is used for both local files and blob addressing, so the same
/// bytes always produce the same [`ContentHash`].
pub struct ContentHasher;

impl ContentHasher {
    pub fn hash(bytes: &[u8]) -> ContentHash {
        blake3::hash(bytes).into()
    }

    /// Read `record` from `source`, returning a new record with its hash,
    /// size and payload set.
    ///
    /// Any hash already present on `record` is discarded; callers that need
    /// to detect changed content compare against it themselves.
    pub async fn load(source: &dyn SiteSource, record: FileRecord) -> Result<FileRecord> {
        let bytes = source.read(Path::new(&record.path)).await.or_raise(|| ErrorKind::ReadFailure(record.path.clone()))?;
        let hash = Self::hash(&bytes);
        // Listing sizes can be stale; the bytes we just read are not.
        let size = bytes.len() as u64;
        let mut loaded =
            FileRecord::new(&record.path, size).with_media_type(record.media_type).with_hash(hash).with_payload(bytes);
        loaded.remote_event_id = record.remote_event_id;
        Ok(loaded)
    }
}
