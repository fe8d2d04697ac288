//! Error types for the edgequake-cvflow library.
//!
//! Two levels of failure mirror the two scopes the pipeline works at:
//!
//! * [`CvFlowError`] is **fatal**: the call cannot proceed at all (invalid
//!   configuration, pdfium library missing, ledger file unreadable, backlog
//!   table malformed). Returned as `Err(CvFlowError)` from constructors and
//!   batch entry points.
//!
//! * [`SubmissionError`] is **non-fatal**: one submission failed (download
//!   exhausted its retries, the service answered garbage, the renderer hit an
//!   invariant violation) but the batch carries on. Stored inside
//!   [`crate::output::SubmissionOutcome`] so callers can report it later.
//!
//! The leaf enums ([`FetchError`], [`DocumentError`], [`ServiceError`],
//! [`ExtractionFailure`], [`UploadError`], [`LedgerError`]) are what each
//! boundary returns; they are folded into `SubmissionError` by the
//! orchestrator.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-cvflow library.
#[derive(Debug, Error)]
pub enum CvFlowError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or the directory that contains it)\n\
or install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Ledger errors ─────────────────────────────────────────────────────
    /// The processing ledger could not be opened or written.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // ── Backlog errors ────────────────────────────────────────────────────
    /// The backlog table could not be read.
    #[error("Failed to read backlog '{path}': {detail}")]
    BacklogUnreadable { path: PathBuf, detail: String },

    /// The webhook payload did not describe a usable submission.
    #[error("Webhook payload rejected: {0}")]
    InvalidWebhook(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Boundary errors ──────────────────────────────────────────────────────

/// Failure retrieving the source document.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching '{url}'")]
    Status { url: String, status: u16 },

    /// The request exceeded the configured timeout.
    #[error("Timed out after {secs}s fetching '{url}'")]
    Timeout { url: String, secs: u64 },

    /// DNS, TLS, or socket failure before a response arrived.
    #[error("Connection failed for '{url}': {detail}")]
    Connection { url: String, detail: String },

    /// A local source path could not be read.
    #[error("Cannot read '{path}': {detail}")]
    Local { path: String, detail: String },
}

impl FetchError {
    /// Whether a second attempt has a realistic chance of succeeding.
    ///
    /// 5xx, 408 and 429 are transient; every other status (401, 403, 404…)
    /// will answer the same way on the next try.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            FetchError::Timeout { .. } | FetchError::Connection { .. } => true,
            FetchError::Local { .. } => false,
        }
    }
}

/// Failure opening or reading a document.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentError {
    /// The bytes are not a PDF, or pdfium refused to parse them.
    #[error("Not a valid PDF document: {detail}")]
    Format { detail: String },

    /// The document is encrypted.
    #[error("Document is password protected")]
    PasswordProtected,

    /// The requested page does not exist.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// A pdfium call failed on an otherwise valid document.
    #[error("Page {page}: {detail}")]
    Page { page: usize, detail: String },

    /// The redacted document could not be serialised.
    #[error("Failed to save document: {0}")]
    Save(String),

    /// The blocking document task panicked or the engine misbehaved.
    #[error("Document worker failed: {0}")]
    Worker(String),
}

/// Failure reported by the external extraction service itself.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceError {
    /// The service call exceeded the per-call timeout.
    #[error("Extraction service timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider returned an error (quota, auth, 5xx…).
    #[error("Extraction service error: {0}")]
    Api(String),

    /// The payload could not be prepared (image encoding, etc.).
    #[error("Could not build request: {0}")]
    Request(String),
}

/// Structured extraction produced nothing usable.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExtractionFailure {
    /// The service call itself failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The response was not valid JSON after fence stripping.
    #[error("Malformed JSON in service response: {0}")]
    MalformedJson(String),

    /// The response parsed but is not a JSON object.
    #[error("Service response is not a JSON object (got {0})")]
    NotAMapping(String),

    /// Neither text nor image mode had anything to work with.
    #[error("No extractable content: {0}")]
    NoContent(String),
}

/// Destination write failure for one category.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("Upload of '{file_name}' to '{folder}' failed: {detail}")]
pub struct UploadError {
    pub folder: String,
    pub file_name: String,
    pub detail: String,
}

/// Layout failed on a profile that parsed successfully.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[error("Internal render error: {0}")]
pub struct InternalRenderError(pub String);

/// Ledger storage failure.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tokens are stored one per line, so a token cannot contain a newline.
    #[error("Token {0:?} cannot be stored in a line-oriented ledger")]
    InvalidToken(String),
}

// ── Per-submission error ─────────────────────────────────────────────────

/// A non-fatal error for a single submission.
///
/// Stored in [`crate::output::SubmissionOutcome`]; the batch continues with
/// the next submission.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum SubmissionError {
    /// Retrieval failed after all retries.
    #[error("Fetch failed after {attempts} attempt(s): {source}")]
    Fetch {
        attempts: u32,
        #[source]
        source: FetchError,
    },

    /// The fetched bytes are not a usable document.
    #[error(transparent)]
    Format(DocumentError),

    /// Structured extraction failed in every sanctioned mode.
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionFailure),

    /// The renderer broke on a valid profile.
    #[error(transparent)]
    Render(#[from] InternalRenderError),

    /// Every category write failed; nothing was filed.
    #[error("Delivery failed for all {categories} categories: {first_error}")]
    Delivery {
        categories: usize,
        first_error: String,
    },

    /// The ledger could not be consulted or updated.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// The submission exceeded its overall time budget.
    #[error("Submission timed out after {secs}s")]
    Timeout { secs: u64 },

    /// A blocking task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DocumentError> for SubmissionError {
    fn from(e: DocumentError) -> Self {
        match e {
            DocumentError::Worker(detail) => SubmissionError::Internal(detail),
            other => SubmissionError::Format(other),
        }
    }
}

impl SubmissionError {
    /// Short machine-readable classification used in reports and logs.
    pub fn classification(&self) -> &'static str {
        match self {
            SubmissionError::Fetch { .. } => "network",
            SubmissionError::Format(_) => "format",
            SubmissionError::Extraction(_) => "extraction",
            SubmissionError::Render(_) => "render",
            SubmissionError::Delivery { .. } => "delivery",
            SubmissionError::Ledger(_) => "ledger",
            SubmissionError::Timeout { .. } => "timeout",
            SubmissionError::Internal(_) => "internal",
        }
    }
}
