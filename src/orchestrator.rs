//! End-to-end driver: one submission, or a batch of them, from source URL to
//! filed document and ledger entry.
//!
//! ## Lifecycle
//!
//! ```text
//! ledger.has(token)? ──yes──▶ Skipped
//!        │ no
//!        ▼
//! Fetched ─▶ TextExtracted ─▶ Analyzed ─▶ Rendered ─▶ Delivered ─▶ Recorded
//!    └──────────────┴──────────────┴───────────┴───────────┴──▶ Failed
//! ```
//!
//! Each stage runs once. Fetch is the only stage with local retry; the
//! text-to-image switch inside extraction is the only fallback. The whole
//! run is bounded by the per-submission timeout, and the document is opened
//! only inside the blocking tasks of [`DocumentTextExtractor`], so nothing
//! stays open between stages.
//!
//! ## Why record after a partial delivery?
//!
//! Category writes are independent. Once at least one category holds the
//! file the submission is reachable, and re-running it would only hit the
//! existence checks of the categories that already succeeded.

use crate::config::{resolve_provider, PipelineConfig};
use crate::delivery::{deliver, LocalFolderStore, StorageGateway};
use crate::error::{CvFlowError, SubmissionError};
use crate::ledger::{FileLedger, ProcessingLedger};
use crate::output::{BatchReport, DeliveryStatus, RedactionOutcome, SubmissionOutcome, SubmissionState};
use crate::pipeline::document::{DocumentEngine, DocumentTextExtractor, PdfiumEngine};
use crate::pipeline::extract::{
    ExtractionService, LlmExtractionService, StructuredProfileExtractor, UnavailableExtractionService,
};
use crate::pipeline::fetch::{fetch_with_retry, HttpFetcher, SourceFetcher};
use crate::pipeline::redact::PatternRedactor;
use crate::pipeline::render::{cleaned_file_name, standard_file_name, ProfileDocumentRenderer};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::submission::Submission;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Cooperative stop flag checked between submissions.
#[derive(Debug, Default)]
pub struct StopSignal(AtomicBool);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The external collaborators a pipeline is wired to.
pub struct PipelineParts {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub engine: Arc<dyn DocumentEngine>,
    pub service: Arc<dyn ExtractionService>,
    pub ledger: Arc<dyn ProcessingLedger>,
    pub store: Arc<dyn StorageGateway>,
}

pub struct Pipeline {
    config: PipelineConfig,
    fetcher: Arc<dyn SourceFetcher>,
    documents: DocumentTextExtractor,
    extractor: StructuredProfileExtractor,
    renderer: ProfileDocumentRenderer,
    redactor: PatternRedactor,
    ledger: Arc<dyn ProcessingLedger>,
    store: Arc<dyn StorageGateway>,
    progress: ProgressCallback,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, parts: PipelineParts) -> Self {
        let extractor = StructuredProfileExtractor::new(parts.service, config.pacer(), config.min_text_chars);
        let renderer = ProfileDocumentRenderer::new(config.renderer_config());
        if config.font_path.is_some() && !renderer.has_extended_font() {
            warn!("Font asset unusable, output will be transliterated to ASCII");
        }
        Self {
            fetcher: parts.fetcher,
            documents: DocumentTextExtractor::new(parts.engine),
            extractor,
            renderer,
            redactor: PatternRedactor::new(),
            ledger: parts.ledger,
            store: parts.store,
            progress: Arc::new(NoopProgressCallback),
            config,
        }
    }

    /// Production wiring: pdfium, HTTP downloads, the resolved LLM provider,
    /// a line-file ledger and a local category store.
    pub async fn from_config(
        config: PipelineConfig,
        ledger_path: &Path,
        output_root: &Path,
    ) -> Result<Self, CvFlowError> {
        let provider = resolve_provider(&config)?;
        info!(
            "Extraction provider ready (model: {})",
            config.model.as_deref().unwrap_or("provider default")
        );
        let service = LlmExtractionService::new(
            provider,
            config.temperature,
            config.max_tokens,
            config.api_timeout(),
        );
        Self::wire(config, Arc::new(service), ledger_path, output_root).await
    }

    /// Production wiring for [`Pipeline::redact_submission`] only.
    ///
    /// No LLM provider is resolved, so no API key is needed; extraction
    /// through this pipeline fails with a service error.
    pub async fn for_redaction(
        config: PipelineConfig,
        ledger_path: &Path,
        output_root: &Path,
    ) -> Result<Self, CvFlowError> {
        Self::wire(config, Arc::new(UnavailableExtractionService), ledger_path, output_root).await
    }

    async fn wire(
        config: PipelineConfig,
        service: Arc<dyn ExtractionService>,
        ledger_path: &Path,
        output_root: &Path,
    ) -> Result<Self, CvFlowError> {
        let engine = PdfiumEngine::new(config.pdfium_library.clone());
        engine.verify()?;
        let parts = PipelineParts {
            fetcher: Arc::new(HttpFetcher::new(config.fetch_timeout())?),
            engine: Arc::new(engine),
            service,
            ledger: Arc::new(FileLedger::open(ledger_path).await?),
            store: Arc::new(LocalFolderStore::new(output_root)),
        };
        Ok(Self::new(config, parts))
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one submission to a terminal state. Never returns an error; the
    /// failure, if any, is in `outcome.error`.
    pub async fn process_submission(&self, submission: &Submission) -> SubmissionOutcome {
        let started = Instant::now();
        let mut outcome = SubmissionOutcome::new(&submission.token, &submission.candidate_name);

        match self.ledger.has(&submission.token).await {
            Ok(true) => {
                info!("{}: token already processed, skipping", submission.candidate_name);
                outcome.enter(SubmissionState::Skipped);
                return outcome;
            }
            Ok(false) => {}
            Err(e) => {
                outcome.fail(SubmissionError::Ledger(e.to_string()));
                return outcome;
            }
        }

        let budget = self.config.submission_timeout();
        let result = tokio::time::timeout(budget, self.run(submission, &mut outcome)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    "{}: failed ({}) after {:?}: {}",
                    submission.candidate_name,
                    e.classification(),
                    outcome.transitions.last(),
                    e
                );
                outcome.fail(e);
            }
            Err(_) => {
                warn!("{}: exceeded {:?} budget", submission.candidate_name, budget);
                outcome.fail(SubmissionError::Timeout {
                    secs: budget.as_secs(),
                });
            }
        }
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    async fn run(&self, submission: &Submission, outcome: &mut SubmissionOutcome) -> Result<(), SubmissionError> {
        let bytes = self.fetch(submission, outcome).await?;
        outcome.enter(SubmissionState::Fetched);

        let text = self.documents.extract_text(Arc::clone(&bytes)).await?;
        outcome.enter(SubmissionState::TextExtracted);

        let scale = self.config.render_scale;
        let extraction = self
            .extractor
            .extract(&text, || self.documents.render_first_page(Arc::clone(&bytes), scale))
            .await?;
        outcome.extraction_mode = Some(extraction.mode);
        outcome.input_tokens = extraction.input_tokens;
        outcome.output_tokens = extraction.output_tokens;
        outcome.enter(SubmissionState::Analyzed);

        let mut profile = extraction.profile;
        if profile.name.trim().is_empty() {
            profile.name = submission.candidate_name.clone();
        }
        let categories = profile.suggested_categories.clone();
        info!(
            "{}: analysed via {:?} mode, categories [{}]",
            submission.candidate_name,
            extraction.mode,
            categories.iter().map(|c| c.label()).collect::<Vec<_>>().join(", ")
        );

        let renderer = self.renderer.clone();
        let pdf = tokio::task::spawn_blocking(move || renderer.render(&profile))
            .await
            .map_err(|e| SubmissionError::Internal(format!("render task panicked: {e}")))?
            .map_err(|e| {
                error!("{}: render failed on a valid profile: {}", submission.candidate_name, e);
                e
            })?;
        let file_name = standard_file_name(&submission.candidate_name);
        outcome.output_file = Some(file_name.clone());
        outcome.enter(SubmissionState::Rendered);

        let deliveries = deliver(self.store.as_ref(), &categories, &file_name, &pdf).await;
        let held = deliveries.iter().filter(|d| d.status.holds_artifact()).count();
        let first_error = deliveries
            .iter()
            .find_map(|d| match &d.status {
                DeliveryStatus::Failed { error } => Some(error.clone()),
                _ => None,
            });
        outcome.deliveries = deliveries;
        if held == 0 {
            return Err(SubmissionError::Delivery {
                categories: categories.len(),
                first_error: first_error.unwrap_or_default(),
            });
        }
        outcome.enter(SubmissionState::Delivered);

        self.ledger
            .record(&submission.token)
            .await
            .map_err(|e| SubmissionError::Ledger(e.to_string()))?;
        outcome.enter(SubmissionState::Recorded);
        info!(
            "{}: {} filed in {}/{} categor(ies)",
            submission.candidate_name,
            file_name,
            held,
            categories.len()
        );
        Ok(())
    }

    async fn fetch(
        &self,
        submission: &Submission,
        outcome: &mut SubmissionOutcome,
    ) -> Result<Arc<Vec<u8>>, SubmissionError> {
        let credential = self.config.credential.as_deref();
        match fetch_with_retry(self.fetcher.as_ref(), &submission.source, credential, &self.config.fetch_retry).await {
            Ok((bytes, attempts)) => {
                outcome.fetch_attempts = attempts;
                Ok(Arc::new(bytes))
            }
            Err((source, attempts)) => {
                outcome.fetch_attempts = attempts;
                Err(SubmissionError::Fetch { attempts, source })
            }
        }
    }

    /// Run submissions one after another.
    ///
    /// `stop` is checked before each submission; a stopped batch reports the
    /// remainder as cancelled.
    pub async fn process_batch(&self, submissions: &[Submission], stop: Option<&StopSignal>) -> BatchReport {
        let total = submissions.len();
        self.progress.on_batch_start(total);
        info!("Batch: {} submission(s)", total);

        let mut outcomes = Vec::with_capacity(total);
        for (i, submission) in submissions.iter().enumerate() {
            if stop.is_some_and(StopSignal::is_stopped) {
                warn!("Batch stopped, {} submission(s) not started", total - i);
                break;
            }
            self.progress.on_submission_start(i + 1, total, &submission.candidate_name);
            let outcome = self.process_submission(submission).await;
            self.progress.on_submission_complete(i + 1, total, &outcome);
            outcomes.push(outcome);
        }

        let report = BatchReport::from_outcomes(outcomes, total);
        info!(
            "Batch done: {} recorded, {} skipped, {} failed, {} cancelled",
            report.stats.recorded, report.stats.skipped, report.stats.failed, report.stats.cancelled
        );
        self.progress.on_batch_complete(&report.stats);
        report
    }

    /// Redaction-only variant: fetch, mask e-mails and phone numbers, and
    /// record the token. A token already in the ledger is reported through
    /// `already_processed` but the document is still produced.
    pub async fn redact_submission(&self, submission: &Submission) -> Result<RedactionOutcome, SubmissionError> {
        let already_processed = self
            .ledger
            .has(&submission.token)
            .await
            .map_err(|e| SubmissionError::Ledger(e.to_string()))?;
        if already_processed {
            info!("{}: token already processed, redacting anyway", submission.candidate_name);
        }

        let budget = self.config.submission_timeout();
        let work = async {
            let mut scratch = SubmissionOutcome::new(&submission.token, &submission.candidate_name);
            let bytes = self.fetch(submission, &mut scratch).await?;
            let redacted = self
                .redactor
                .redact_bytes(&self.documents, bytes)
                .await?;
            if !already_processed {
                self.ledger
                    .record(&submission.token)
                    .await
                    .map_err(|e| SubmissionError::Ledger(e.to_string()))?;
            }
            Ok::<_, SubmissionError>(redacted)
        };
        let redacted = tokio::time::timeout(budget, work)
            .await
            .map_err(|_| SubmissionError::Timeout {
                secs: budget.as_secs(),
            })??;

        Ok(RedactionOutcome {
            token: submission.token.clone(),
            file_name: cleaned_file_name(&submission.candidate_name),
            bytes: redacted.bytes,
            summary: redacted.summary,
            already_processed,
        })
    }
}
