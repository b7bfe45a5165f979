//! Replicating changed files onto every blob endpoint.
//!
//! The primary entry point is [`dispatch`], which runs a bounded pool of
//! per-file uploads. Each file is pushed to *every* configured blob endpoint
//! (replication is all-endpoints, not best-of-N) and, once at least one
//! endpoint holds it, advertised with a signed file-advertisement event.
//!
//! Failures are recorded per endpoint and never abort the pool.

mod file;
mod pool;
mod progress;

pub use self::pool::dispatch;
pub use self::progress::{LastAttempt, NoProgress, ProgressObserver, ProgressSnapshot};
use crate::publish::PublishReport;
use crate::record::FileRecord;
use pubsite_remote::error::ErrorKind as RemoteErrorKind;

/// Why an endpoint attempt failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    /// Endpoint-specific refusal: quota, auth, policy.
    Rejected,
    Timeout,
}

impl From<&RemoteErrorKind> for FailureKind {
    fn from(kind: &RemoteErrorKind) -> Self {
        match kind {
            RemoteErrorKind::Network(_) => Self::Network,
            RemoteErrorKind::Timeout => Self::Timeout,
            _ => Self::Rejected,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointStatus {
    /// Not attempted (yet).
    Pending,
    InFlight,
    Success,
    /// The endpoint already held the content.
    AlreadyPresent,
    Failed(FailureKind),
}

impl EndpointStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::AlreadyPresent)
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Pending | Self::InFlight)
    }
}

/// Result of one (file, endpoint) pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointOutcome {
    pub endpoint: String,
    pub status: EndpointStatus,
    pub error: Option<String>,
}

impl EndpointOutcome {
    pub fn new(endpoint: impl Into<String>, status: EndpointStatus) -> Self {
        Self { endpoint: endpoint.into(), status, error: None }
    }

    pub fn failed(endpoint: impl Into<String>, kind: FailureKind, error: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), status: EndpointStatus::Failed(kind), error: Some(error.into()) }
    }
}

/// Aggregate of one file over every blob endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadResult {
    /// The file, without its payload.
    pub file: FileRecord,
    /// At least one endpoint stored the content or already had it.
    pub overall_success: bool,
    pub per_endpoint: Vec<EndpointOutcome>,
    /// Publication of the file-advertisement event, if one was attempted.
    pub advertisement: Option<PublishReport>,
    /// File-level failure: unreadable, changed since scanning, or not signable.
    pub error: Option<String>,
    /// Never started because the run was cancelled.
    pub cancelled: bool,
}

impl UploadResult {
    pub(crate) fn failed(file: FileRecord, error: impl Into<String>) -> Self {
        Self {
            file: file.without_payload(),
            overall_success: false,
            per_endpoint: Vec::new(),
            advertisement: None,
            error: Some(error.into()),
            cancelled: false,
        }
    }

    pub(crate) fn skipped(file: FileRecord, endpoints: &[String]) -> Self {
        Self {
            file: file.without_payload(),
            overall_success: false,
            per_endpoint: endpoints.iter().map(|name| EndpointOutcome::new(name, EndpointStatus::Pending)).collect(),
            advertisement: None,
            error: None,
            cancelled: true,
        }
    }

    /// Hash known, held by at least one blob endpoint, and advertised by at
    /// least one event endpoint.
    pub fn is_converged(&self) -> bool {
        self.file.content_hash().is_some()
            && self.overall_success
            && self.advertisement.as_ref().is_some_and(PublishReport::accepted)
    }

    /// Attempted and not stored anywhere.
    pub fn is_failed(&self) -> bool {
        !self.cancelled && !self.overall_success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::EndpointPublish;
    use pubsite_remote::ContentHash;

    fn result(success: bool, accepted: bool) -> UploadResult {
        let file = FileRecord::new("/a.txt", 1).with_hash(ContentHash::from_bytes([1; 32]));
        let per_endpoint = vec![EndpointOutcome::new("blobs", EndpointStatus::Success)];
        let advertisement = PublishReport {
            event_ids: vec!["ev".to_string()],
            per_endpoint: vec![EndpointPublish {
                endpoint: "relay".to_string(),
                accepted: if accepted { vec!["ev".to_string()] } else { vec![] },
                rejected: vec![],
                error: None,
            }],
        };
        UploadResult {
            file,
            overall_success: success,
            per_endpoint,
            advertisement: Some(advertisement),
            error: None,
            cancelled: false,
        }
    }

    #[test]
    fn test_converged() {
        assert!(result(true, true).is_converged());
        assert!(!result(true, false).is_converged());
        assert!(!result(false, true).is_converged());
    }

    #[test]
    fn test_skipped_is_not_failed() {
        let skipped = UploadResult::skipped(FileRecord::new("/a", 1), &["blobs".to_string()]);
        assert!(skipped.cancelled);
        assert!(!skipped.is_failed());
        assert_eq!(skipped.per_endpoint[0].status, EndpointStatus::Pending);
    }

    #[test]
    fn test_failure_kind_from_remote_error() {
        assert_eq!(FailureKind::from(&RemoteErrorKind::Timeout), FailureKind::Timeout);
        assert_eq!(FailureKind::from(&RemoteErrorKind::Network("x".to_string())), FailureKind::Network);
        assert_eq!(FailureKind::from(&RemoteErrorKind::Rejected("quota".to_string())), FailureKind::Rejected);
    }
}
