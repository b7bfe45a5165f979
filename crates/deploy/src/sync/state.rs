use derive_more::Display;

/// Where a deployment run currently is.
///
/// ```text
/// Idle → ScanningLocal → FetchingRemote → Comparing → Uploading
///      → PublishingManifest → (Purging) → Done
/// ```
///
/// Only a local scan failure leads to [`Failed`](Self::Failed). A cancelled
/// run jumps straight to [`Done`](Self::Done) from wherever it was once the
/// scan has started.
#[derive(Clone, Copy, Debug, Display, Default, PartialEq, Eq, Hash)]
pub enum SyncState {
    #[default]
    #[display("idle")]
    Idle,
    #[display("scanning local files")]
    ScanningLocal,
    #[display("fetching remote files")]
    FetchingRemote,
    #[display("comparing")]
    Comparing,
    #[display("uploading")]
    Uploading,
    #[display("publishing manifest")]
    PublishingManifest,
    #[display("purging")]
    Purging,
    #[display("done")]
    Done,
    #[display("failed")]
    Failed,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn can_transition_to(&self, next: SyncState) -> bool {
        use SyncState::*;
        match (*self, next) {
            (Idle, ScanningLocal)
            | (ScanningLocal, FetchingRemote)
            | (ScanningLocal, Failed)
            | (FetchingRemote, Comparing)
            | (Comparing, Uploading)
            | (Uploading, PublishingManifest)
            | (PublishingManifest, Purging)
            | (PublishingManifest | Purging, Done) => true,
            (ScanningLocal | FetchingRemote | Comparing | Uploading, Done) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SyncState::Idle, SyncState::ScanningLocal)]
    #[case(SyncState::ScanningLocal, SyncState::Failed)]
    #[case(SyncState::PublishingManifest, SyncState::Done)]
    #[case(SyncState::PublishingManifest, SyncState::Purging)]
    #[case(SyncState::Uploading, SyncState::Done)]
    fn test_allowed(#[case] from: SyncState, #[case] to: SyncState) {
        assert!(from.can_transition_to(to));
    }

    #[rstest]
    #[case(SyncState::Uploading, SyncState::Failed)]
    #[case(SyncState::PublishingManifest, SyncState::Failed)]
    #[case(SyncState::Idle, SyncState::Uploading)]
    #[case(SyncState::Comparing, SyncState::Purging)]
    #[case(SyncState::Done, SyncState::Idle)]
    #[case(SyncState::Idle, SyncState::Done)]
    fn test_refused(#[case] from: SyncState, #[case] to: SyncState) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn test_terminal() {
        assert!(SyncState::Failed.is_terminal());
        assert!(!SyncState::Purging.is_terminal());
    }
}
