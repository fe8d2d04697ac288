//! Progress-callback trait for batch and per-submission events.
//!
//! Pass an [`Arc<dyn PipelineProgressCallback>`] to
//! [`crate::orchestrator::Pipeline::with_progress`] to be told when each
//! submission starts and how it ended. The CLI drives an `indicatif` bar
//! from these events; a server could forward them to a channel instead.
//!
//! # Example
//!
//! ```rust
//! use edgequake_cvflow::{PipelineProgressCallback, SubmissionOutcome};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     failed: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_submission_complete(&self, index: usize, total: usize, outcome: &SubmissionOutcome) {
//!         if outcome.error.is_some() {
//!             self.failed.fetch_add(1, Ordering::SeqCst);
//!         }
//!         eprintln!("{}/{}: {:?}", index, total, outcome.state);
//!     }
//! }
//! ```

use crate::output::{BatchStats, SubmissionOutcome};
use std::sync::Arc;

/// Called by the pipeline as a batch progresses.
///
/// All methods default to no-ops so callers only override what they need.
/// Submissions run one at a time, so calls never overlap within a batch.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once before the first submission.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called before a submission is checked against the ledger.
    ///
    /// `index` is 1-based.
    fn on_submission_start(&self, index: usize, total: usize, candidate_name: &str) {
        let _ = (index, total, candidate_name);
    }

    /// Called when a submission reaches a terminal state.
    fn on_submission_complete(&self, index: usize, total: usize, outcome: &SubmissionOutcome) {
        let _ = (index, total, outcome);
    }

    /// Called once after the last submission ran (or the batch was stopped).
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::SubmissionState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        failures: AtomicUsize,
        batch_total: AtomicUsize,
    }

    impl PipelineProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total: usize) {
            self.batch_total.store(total, Ordering::SeqCst);
        }

        fn on_submission_start(&self, _index: usize, _total: usize, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_submission_complete(&self, _index: usize, _total: usize, outcome: &SubmissionOutcome) {
            self.completes.fetch_add(1, Ordering::SeqCst);
            if outcome.state == SubmissionState::Failed {
                self.failures.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_submission_start(1, 2, "Jane");
        cb.on_submission_complete(1, 2, &SubmissionOutcome::new("t", "Jane"));
        cb.on_batch_complete(&BatchStats::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start(2);

        let mut ok = SubmissionOutcome::new("a", "A");
        ok.enter(SubmissionState::Recorded);
        let mut bad = SubmissionOutcome::new("b", "B");
        bad.enter(SubmissionState::Failed);

        tracker.on_submission_start(1, 2, "A");
        tracker.on_submission_complete(1, 2, &ok);
        tracker.on_submission_start(2, 2, "B");
        tracker.on_submission_complete(2, 2, &bad);

        assert_eq!(tracker.batch_total.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
    }
}
