use super::MockFailure;
use crate::blob::{BlobEndpoint, PutOutcome};
use crate::error::Result;
use crate::hash::ContentHash;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory blob endpoint.
///
/// Besides storing blobs, it records how many uploads were in flight at the
/// same time, which is what concurrency tests assert against.
///
/// # Examples
///
/// ```
/// use pubsite_remote::mock::{MockBlobEndpoint, MockFailure};
/// use pubsite_remote::{BlobEndpoint, ContentHash, PutOutcome};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let hash = ContentHash::from_bytes([1; 32]);
/// let endpoint = MockBlobEndpoint::new("https://blobs.example");
/// assert_eq!(endpoint.put(&hash, b"data").await.unwrap(), PutOutcome::Stored);
/// assert_eq!(endpoint.put(&hash, b"data").await.unwrap(), PutOutcome::AlreadyExists);
///
/// let broken = MockBlobEndpoint::new("https://down.example").failing_all(MockFailure::Network);
/// assert!(broken.put(&hash, b"data").await.is_err());
/// # }
/// ```
pub struct MockBlobEndpoint {
    name: String,
    blobs: RwLock<HashMap<ContentHash, Vec<u8>>>,
    failures: HashMap<ContentHash, MockFailure>,
    fail_all: Option<MockFailure>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    puts: AtomicUsize,
}

impl MockBlobEndpoint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blobs: RwLock::new(HashMap::new()),
            failures: HashMap::new(),
            fail_all: None,
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    /// Pre-populate the endpoint, as if an earlier deployment had uploaded it.
    pub fn with_blob(mut self, hash: ContentHash, data: impl Into<Vec<u8>>) -> Self {
        self.blobs.get_mut().insert(hash, data.into());
        self
    }

    /// Uploads of this particular hash fail.
    pub fn failing_for(mut self, hash: ContentHash, failure: MockFailure) -> Self {
        self.failures.insert(hash, failure);
        self
    }

    /// Every upload fails.
    pub fn failing_all(mut self, failure: MockFailure) -> Self {
        self.fail_all = Some(failure);
        self
    }

    /// Every upload takes at least this long.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn contains(&self, hash: &ContentHash) -> bool {
        self.blobs.read().await.contains_key(hash)
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Total number of `put` calls received, including failed ones.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Highest number of `put` calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn put_inner(&self, hash: &ContentHash, data: &[u8]) -> Result<PutOutcome> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = self.fail_all.clone().or_else(|| self.failures.get(hash).cloned()) {
            return Err(failure.into_error());
        }
        let mut blobs = self.blobs.write().await;
        if blobs.contains_key(hash) {
            return Ok(PutOutcome::AlreadyExists);
        }
        blobs.insert(*hash, data.to_vec());
        Ok(PutOutcome::Stored)
    }
}

#[async_trait]
impl BlobEndpoint for MockBlobEndpoint {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, hash: &ContentHash, data: &[u8]) -> Result<PutOutcome> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let result = self.put_inner(hash, data).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn has(&self, hash: &ContentHash) -> Result<bool> {
        if let Some(failure) = self.fail_all.clone() {
            return Err(failure.into_error());
        }
        Ok(self.contains(hash).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_put_and_has() {
        let hash = ContentHash::from_bytes([2; 32]);
        let endpoint = MockBlobEndpoint::new("blobs");
        assert!(!endpoint.has(&hash).await.unwrap());
        assert_eq!(endpoint.put(&hash, b"x").await.unwrap(), PutOutcome::Stored);
        assert!(endpoint.has(&hash).await.unwrap());
        assert_eq!(endpoint.put_count(), 1);
        assert_eq!(endpoint.len().await, 1);
    }

    #[tokio::test]
    async fn test_preloaded_blob_already_exists() {
        let hash = ContentHash::from_bytes([3; 32]);
        let endpoint = MockBlobEndpoint::new("blobs").with_blob(hash, "x");
        assert_eq!(endpoint.put(&hash, b"x").await.unwrap(), PutOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_failing_for_single_hash() {
        let bad = ContentHash::from_bytes([4; 32]);
        let good = ContentHash::from_bytes([5; 32]);
        let endpoint = MockBlobEndpoint::new("blobs").failing_for(bad, MockFailure::Rejected("quota".to_string()));
        let err = endpoint.put(&bad, b"x").await.unwrap_err();
        assert_eq!(&*err, &ErrorKind::Rejected("quota".to_string()));
        assert!(endpoint.put(&good, b"y").await.is_ok());
        assert!(!endpoint.contains(&bad).await);
    }

    #[tokio::test]
    async fn test_in_flight_tracking() {
        let endpoint = MockBlobEndpoint::new("blobs").with_delay(Duration::from_millis(5));
        let a = ContentHash::from_bytes([6; 32]);
        let b = ContentHash::from_bytes([7; 32]);
        let (ra, rb) = tokio::join!(endpoint.put(&a, b"a"), endpoint.put(&b, b"b"));
        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(endpoint.max_in_flight(), 2);
    }
}
