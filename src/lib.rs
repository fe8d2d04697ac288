//! # edgequake-cvflow
//!
//! Turn submitted résumé PDFs into standardized, category-filed documents,
//! exactly once per submission.
//!
//! ## Why this crate?
//!
//! Form backlogs collect CVs in every layout imaginable: two-column designer
//! templates, scanned pages, exports with no text layer at all. Reviewers
//! want the same layout for every candidate and want each CV filed under the
//! departments it fits. This crate reads each CV with a language model,
//! lays the extracted profile out again from scratch, and files the result,
//! keeping a ledger so a re-run never files the same submission twice.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Submission (token, name, URL)
//!  │
//!  ├─ 0. Ledger   already processed? → Skipped
//!  ├─ 1. Fetch    download with 3-attempt exponential backoff
//!  ├─ 2. Text     per-page text via pdfium (spawn_blocking)
//!  ├─ 3. Analyze  LLM → JSON profile; image mode when text is too thin
//!  ├─ 4. Render   deterministic single-column PDF (lopdf)
//!  ├─ 5. Deliver  one copy per suggested category, skip if present
//!  └─ 6. Record   token appended to the ledger
//! ```
//!
//! A redaction-only variant masks e-mail addresses and phone numbers in the
//! original document instead.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_cvflow::{Pipeline, PipelineConfig, Submission};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = PipelineConfig::default();
//!     let pipeline = Pipeline::from_config(
//!         config,
//!         Path::new("processed_tokens.txt"),
//!         Path::new("out"),
//!     )
//!     .await?;
//!
//!     let submission = Submission::new("tok-1", "Jane Doe", "https://example.com/cv.pdf");
//!     let outcome = pipeline.process_submission(&submission).await;
//!     eprintln!("{:?}", outcome.state);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cvflow` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-cvflow = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod delivery;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod output;
pub mod pacing;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod prompts;
pub mod submission;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{resolve_provider, Pacing, PipelineConfig, PipelineConfigBuilder, RetryPolicy};
pub use delivery::{FolderHandle, LocalFolderStore, StorageGateway};
pub use error::{
    CvFlowError, DocumentError, ExtractionFailure, FetchError, InternalRenderError, LedgerError,
    ServiceError, SubmissionError, UploadError,
};
pub use ledger::{FileLedger, ProcessingLedger};
pub use orchestrator::{Pipeline, PipelineParts, StopSignal};
pub use output::{
    BatchReport, BatchStats, CategoryDelivery, DeliveryStatus, RedactionOutcome, SubmissionOutcome,
    SubmissionState,
};
pub use pacing::{CallPacer, FixedDelayPacer, NoPacing, TokenBucketPacer};
pub use pipeline::document::{DocumentEngine, DocumentTextExtractor, PdfiumEngine, SourceDocument};
pub use pipeline::extract::{
    ExtractionMode, ExtractionService, StructuredProfileExtractor, UnavailableExtractionService,
};
pub use pipeline::fetch::{HttpFetcher, SourceFetcher};
pub use pipeline::redact::{PatternRedactor, RedactionSummary};
pub use pipeline::render::{ProfileDocumentRenderer, RendererConfig};
pub use profile::{CandidateProfile, Category};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use submission::{Backlog, BacklogColumns, Submission};
