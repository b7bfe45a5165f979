use super::EndpointOutcome;
use std::sync::{Mutex, PoisonError};

/// The endpoint attempt that triggered a [`ProgressSnapshot`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LastAttempt {
    pub path: String,
    pub outcome: EndpointOutcome,
}

/// Running aggregate of a [`dispatch`](super::dispatch) call, in files.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    /// Files finalized with at least one successful endpoint.
    pub completed: usize,
    /// Files finalized without any successful endpoint.
    pub failed: usize,
    pub in_progress: usize,
    pub last: Option<LastAttempt>,
}

/// Receives progress while files are being uploaded.
///
/// Called synchronously from the upload pool, so implementations must
/// return quickly. Closures work too:
///
/// ```
/// use pubsite_deploy::{ProgressObserver, ProgressSnapshot};
///
/// let observer = |snapshot: &ProgressSnapshot| println!("{}/{}", snapshot.completed, snapshot.total);
/// observer.on_progress(&ProgressSnapshot::default());
/// ```
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

/// Discards progress.
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}
}

pub(crate) struct Progress<'a> {
    observer: &'a dyn ProgressObserver,
    state: Mutex<ProgressSnapshot>,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(observer: &'a dyn ProgressObserver, total: usize) -> Self {
        Self { observer, state: Mutex::new(ProgressSnapshot { total, ..Default::default() }) }
    }

    pub(crate) fn started(&self) {
        self.update(|state| {
            state.in_progress += 1;
            state.last = None;
        });
    }

    /// Report an endpoint attempt. `finalized` carries the file's overall
    /// success once its last endpoint attempt is in.
    pub(crate) fn attempt(&self, path: &str, outcome: &EndpointOutcome, finalized: Option<bool>) {
        self.update(|state| {
            if let Some(success) = finalized {
                state.finish(success);
            }
            state.last = Some(LastAttempt { path: path.to_string(), outcome: outcome.clone() });
        });
    }

    /// Finalize a file that never reached its endpoints.
    pub(crate) fn abandoned(&self) {
        self.update(|state| {
            state.finish(false);
            state.last = None;
        });
    }

    fn update(&self, f: impl FnOnce(&mut ProgressSnapshot)) {
        // The lock is never held across the observer call.
        let snapshot = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut state);
            state.clone()
        };
        self.observer.on_progress(&snapshot);
    }
}

impl ProgressSnapshot {
    fn finish(&mut self, success: bool) {
        self.in_progress = self.in_progress.saturating_sub(1);
        match success {
            true => self.completed += 1,
            false => self.failed += 1,
        }
    }
}
