//! Result types returned by the pipeline.
//!
//! Everything here is `Serialize` so the CLI's `--json` mode can dump a
//! batch report without a parallel set of DTOs.

use crate::error::SubmissionError;
use crate::pipeline::extract::ExtractionMode;
use crate::pipeline::redact::RedactionSummary;
use crate::profile::Category;
use serde::{Deserialize, Serialize};

/// Lifecycle of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    Fetched,
    TextExtracted,
    Analyzed,
    Rendered,
    Delivered,
    Recorded,
    /// The token was already in the ledger.
    Skipped,
    Failed,
}

impl SubmissionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubmissionState::Recorded | SubmissionState::Skipped | SubmissionState::Failed
        )
    }
}

/// How one category write ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryStatus {
    Uploaded,
    /// A same-named file was already filed there.
    AlreadyPresent,
    Failed { error: String },
}

impl DeliveryStatus {
    /// The category holds the artifact after this write.
    pub fn holds_artifact(&self) -> bool {
        !matches!(self, DeliveryStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDelivery {
    pub category: Category,
    pub file_name: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
}

/// Everything known about one processed submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub token: String,
    pub candidate_name: String,
    /// Final state.
    pub state: SubmissionState,
    /// Every state entered, in order.
    pub transitions: Vec<SubmissionState>,
    pub fetch_attempts: u32,
    pub extraction_mode: Option<ExtractionMode>,
    pub output_file: Option<String>,
    pub deliveries: Vec<CategoryDelivery>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub error: Option<SubmissionError>,
    pub duration_ms: u64,
}

impl SubmissionOutcome {
    pub fn new(token: impl Into<String>, candidate_name: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            candidate_name: candidate_name.into(),
            state: SubmissionState::Fetched,
            transitions: Vec::new(),
            fetch_attempts: 0,
            extraction_mode: None,
            output_file: None,
            deliveries: Vec::new(),
            input_tokens: 0,
            output_tokens: 0,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn enter(&mut self, state: SubmissionState) {
        self.state = state;
        self.transitions.push(state);
    }

    pub fn fail(&mut self, error: SubmissionError) {
        self.error = Some(error);
        self.enter(SubmissionState::Failed);
    }

    pub fn is_success(&self) -> bool {
        self.state == SubmissionState::Recorded
    }
}

/// Aggregate counters for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub recorded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Submissions never started because the batch was stopped.
    pub cancelled: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<SubmissionOutcome>,
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: Vec<SubmissionOutcome>, total: usize) -> Self {
        let mut stats = BatchStats {
            total,
            ..Default::default()
        };
        for o in &outcomes {
            match o.state {
                SubmissionState::Recorded => stats.recorded += 1,
                SubmissionState::Skipped => stats.skipped += 1,
                _ => stats.failed += 1,
            }
            stats.total_input_tokens += o.input_tokens as u64;
            stats.total_output_tokens += o.output_tokens as u64;
            stats.total_duration_ms += o.duration_ms;
        }
        stats.cancelled = total.saturating_sub(outcomes.len());
        Self { outcomes, stats }
    }
}

/// Result of the redaction-only variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedactionOutcome {
    pub token: String,
    pub file_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub summary: RedactionSummary,
    /// The token was already in the ledger before this run.
    pub already_processed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_count_each_terminal_state() {
        let mut recorded = SubmissionOutcome::new("a", "A");
        recorded.enter(SubmissionState::Recorded);
        recorded.input_tokens = 10;
        let mut skipped = SubmissionOutcome::new("b", "B");
        skipped.enter(SubmissionState::Skipped);
        let mut failed = SubmissionOutcome::new("c", "C");
        failed.fail(SubmissionError::Timeout { secs: 1 });

        let report = BatchReport::from_outcomes(vec![recorded, skipped, failed], 5);
        assert_eq!(report.stats.recorded, 1);
        assert_eq!(report.stats.skipped, 1);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(report.stats.cancelled, 2);
        assert_eq!(report.stats.total_input_tokens, 10);
    }

    #[test]
    fn delivery_serialises_flat() {
        let d = CategoryDelivery {
            category: Category::IT,
            file_name: "X_Standard.pdf".into(),
            status: DeliveryStatus::Failed { error: "boom".into() },
        };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
        assert!(!d.status.holds_artifact());
    }

    #[test]
    fn fail_records_transition() {
        let mut o = SubmissionOutcome::new("t", "N");
        o.enter(SubmissionState::Fetched);
        o.fail(SubmissionError::Internal("x".into()));
        assert_eq!(o.transitions, vec![SubmissionState::Fetched, SubmissionState::Failed]);
        assert!(o.state.is_terminal());
        assert!(!o.is_success());
    }
}
