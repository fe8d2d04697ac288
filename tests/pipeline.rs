//! End-to-end pipeline tests against in-memory collaborators.
//!
//! Documents are plain text wrapped in a `%PDF-fake` envelope so redaction
//! output can be opened again; the extraction service replays a canned JSON
//! reply. Folder delivery and the ledger use the real local implementations
//! in a temporary directory.

use async_trait::async_trait;
use edgequake_cvflow::pipeline::document::{RedactionMark, Region};
use edgequake_cvflow::pipeline::extract::{ServicePayload, ServiceReply, ServiceRequest};
use edgequake_cvflow::{
    Category, DeliveryStatus, DocumentEngine, DocumentError, ExtractionMode, ExtractionService,
    FetchError, FileLedger, FolderHandle, LocalFolderStore, Pacing, Pipeline, PipelineConfig,
    PipelineParts, ServiceError, SourceDocument, SourceFetcher, StopSignal, StorageGateway,
    Submission, SubmissionState, UnavailableExtractionService, UploadError,
};
use image::{DynamicImage, Rgba, RgbaImage};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Fake document engine ─────────────────────────────────────────────────

const ENVELOPE: &str = "%PDF-fake\n";
const PAGE_BREAK: char = '\u{c}';

fn fake_pdf(pages: &[&str]) -> Vec<u8> {
    format!("{ENVELOPE}{}", pages.join(&PAGE_BREAK.to_string())).into_bytes()
}

fn pages_of(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    let body = text.strip_prefix(ENVELOPE).unwrap_or("");
    if body.is_empty() {
        return Vec::new();
    }
    body.split(PAGE_BREAK).map(str::to_string).collect()
}

struct FakeDocument {
    pages: Vec<String>,
    pending: Vec<RedactionMark>,
}

impl SourceDocument for FakeDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page: usize) -> Result<String, DocumentError> {
        self.pages.get(page).cloned().ok_or(DocumentError::PageOutOfRange {
            page,
            total: self.pages.len(),
        })
    }

    fn find_text(&self, page: usize, needle: &str) -> Result<Vec<Region>, DocumentError> {
        let text = self.page_text(page)?;
        Ok(text
            .match_indices(needle)
            .map(|(i, _)| Region::new(i as f32, 0.0, (i + needle.len()) as f32, 10.0))
            .collect())
    }

    fn mark_redaction(&mut self, mark: RedactionMark) {
        self.pending.push(mark);
    }

    fn apply_redactions(&mut self) -> Result<usize, DocumentError> {
        let applied = self.pending.len();
        for mark in self.pending.drain(..) {
            let masked = "█".repeat(mark.text.chars().count());
            if let Some(page) = self.pages.get_mut(mark.page) {
                *page = page.replacen(&mark.text, &masked, 1);
            }
        }
        Ok(applied)
    }

    fn render_page(&self, page: usize, _scale: f32) -> Result<DynamicImage, DocumentError> {
        if page >= self.pages.len() {
            return Err(DocumentError::PageOutOfRange {
                page,
                total: self.pages.len(),
            });
        }
        Ok(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            8,
            8,
            Rgba([255, 255, 255, 255]),
        )))
    }

    fn save(&self) -> Result<Vec<u8>, DocumentError> {
        let pages: Vec<&str> = self.pages.iter().map(String::as_str).collect();
        Ok(fake_pdf(&pages))
    }
}

/// Page text that keeps the document open for 1.5 s while it is read.
const SLOW_PAGE: &str = "(slow page)";

/// Opens fake documents and records the peak number open at once.
#[derive(Default)]
struct FakeEngine {
    open: AtomicUsize,
    peak: AtomicUsize,
}

impl DocumentEngine for FakeEngine {
    fn with_document(
        &self,
        bytes: &[u8],
        f: &mut dyn FnMut(&mut dyn SourceDocument) -> Result<(), DocumentError>,
    ) -> Result<(), DocumentError> {
        let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let mut doc = FakeDocument {
            pages: pages_of(bytes),
            pending: Vec::new(),
        };
        if doc.pages.iter().any(|p| p == SLOW_PAGE) {
            std::thread::sleep(Duration::from_millis(1500));
        }
        let result = f(&mut doc);
        self.open.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ── Fake fetcher and service ─────────────────────────────────────────────

#[derive(Default)]
struct MapFetcher {
    sources: HashMap<String, Result<Vec<u8>, FetchError>>,
    calls: AtomicUsize,
}

impl MapFetcher {
    fn with(mut self, source: &str, result: Result<Vec<u8>, FetchError>) -> Self {
        self.sources.insert(source.to_string(), result);
        self
    }
}

#[async_trait]
impl SourceFetcher for MapFetcher {
    async fn fetch(&self, source: &str, _credential: Option<&str>) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sources.get(source).cloned().unwrap_or_else(|| {
            Err(FetchError::Status {
                url: source.to_string(),
                status: 404,
            })
        })
    }
}

struct CannedService {
    reply: String,
    seen: Mutex<Vec<&'static str>>,
}

impl CannedService {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<&'static str> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionService for CannedService {
    async fn call(&self, request: ServiceRequest) -> Result<ServiceReply, ServiceError> {
        let kind = match request.payload {
            ServicePayload::Text(_) => "text",
            ServicePayload::Image(_) => "image",
        };
        self.seen.lock().unwrap().push(kind);
        Ok(ServiceReply {
            text: self.reply.clone(),
            input_tokens: 100,
            output_tokens: 40,
        })
    }
}

/// Local store that refuses to create folders for some categories.
struct PickyStore {
    inner: LocalFolderStore,
    refuse: Vec<Category>,
}

#[async_trait]
impl StorageGateway for PickyStore {
    async fn ensure_folder(&self, category: Category) -> Result<FolderHandle, UploadError> {
        if self.refuse.contains(&category) {
            return Err(UploadError {
                folder: category.label().to_string(),
                file_name: String::new(),
                detail: "quota exceeded".into(),
            });
        }
        self.inner.ensure_folder(category).await
    }

    async fn exists(&self, folder: &FolderHandle, file_name: &str) -> Result<bool, UploadError> {
        self.inner.exists(folder, file_name).await
    }

    async fn upload(&self, folder: &FolderHandle, file_name: &str, bytes: Vec<u8>) -> Result<(), UploadError> {
        self.inner.upload(folder, file_name, bytes).await
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

const CV_TEXT: &str = "Jane Doe\nSenior backend engineer, ten years of Rust and Go.\n\
                       Contact: jane.doe@example.com, +90 532 123 45 67";

const ENGINEERING_REPLY: &str = r#"```json
{"candidate_data": {"name": "Jane Doe", "title": "Backend Engineer"},
 "suggested_categories": ["Engineering"]}
```"#;

struct Harness {
    dir: TempDir,
    fetcher: Arc<MapFetcher>,
    engine: Arc<FakeEngine>,
    service: Arc<CannedService>,
}

impl Harness {
    fn new(fetcher: MapFetcher, reply: &str) -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            fetcher: Arc::new(fetcher),
            engine: Arc::new(FakeEngine::default()),
            service: CannedService::new(reply),
        }
    }

    fn ledger_path(&self) -> std::path::PathBuf {
        self.dir.path().join("ledger.txt")
    }

    fn out(&self) -> std::path::PathBuf {
        self.dir.path().join("out")
    }

    async fn assemble(
        &self,
        store: Arc<dyn StorageGateway>,
        service: Arc<dyn ExtractionService>,
        submission_timeout_secs: u64,
    ) -> Pipeline {
        let config = PipelineConfig::builder()
            .pacing(Pacing::None)
            .fetch_backoff_ms(1)
            .submission_timeout_secs(submission_timeout_secs)
            .build()
            .unwrap();
        let parts = PipelineParts {
            fetcher: self.fetcher.clone(),
            engine: self.engine.clone(),
            service,
            ledger: Arc::new(FileLedger::open(self.ledger_path()).await.unwrap()),
            store,
        };
        Pipeline::new(config, parts)
    }

    async fn pipeline_with_store(&self, store: Arc<dyn StorageGateway>) -> Pipeline {
        self.assemble(store, self.service.clone(), 300).await
    }

    async fn pipeline(&self) -> Pipeline {
        self.pipeline_with_store(Arc::new(LocalFolderStore::new(self.out()))).await
    }

    fn ledger_lines(&self) -> Vec<String> {
        std::fs::read_to_string(self.ledger_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

// ── Standardization ──────────────────────────────────────────────────────

#[tokio::test]
async fn text_cv_is_rendered_filed_and_recorded() {
    let h = Harness::new(
        MapFetcher::default().with("https://forms/cv1.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        ENGINEERING_REPLY,
    );
    let pipeline = h.pipeline().await;

    let outcome = pipeline
        .process_submission(&Submission::new("tok-1", "Jane Doe", "https://forms/cv1.pdf"))
        .await;

    assert_eq!(outcome.state, SubmissionState::Recorded, "{:?}", outcome.error);
    assert_eq!(
        outcome.transitions,
        vec![
            SubmissionState::Fetched,
            SubmissionState::TextExtracted,
            SubmissionState::Analyzed,
            SubmissionState::Rendered,
            SubmissionState::Delivered,
            SubmissionState::Recorded,
        ]
    );
    assert_eq!(outcome.extraction_mode, Some(ExtractionMode::Text));
    assert_eq!(outcome.fetch_attempts, 1);
    assert_eq!(outcome.input_tokens, 100);
    assert_eq!(h.service.seen(), vec!["text"]);

    let filed = h.out().join("Engineering").join("Jane Doe_Standard.pdf");
    let bytes = std::fs::read(&filed).unwrap();
    assert!(bytes.starts_with(b"%PDF"));
    assert_eq!(h.ledger_lines(), vec!["tok-1".to_string()]);
}

#[tokio::test]
async fn image_only_cv_goes_straight_to_image_mode() {
    let h = Harness::new(
        MapFetcher::default().with("scan.pdf", Ok(fake_pdf(&["   \n  "]))),
        ENGINEERING_REPLY,
    );
    let pipeline = h.pipeline().await;

    let outcome = pipeline
        .process_submission(&Submission::new("tok-scan", "Ali Veli", "scan.pdf"))
        .await;

    assert_eq!(outcome.state, SubmissionState::Recorded, "{:?}", outcome.error);
    assert_eq!(outcome.extraction_mode, Some(ExtractionMode::Image));
    assert_eq!(h.service.seen(), vec!["image"]);
}

#[tokio::test]
async fn duplicate_token_is_delivered_once() {
    let h = Harness::new(
        MapFetcher::default().with("cv.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        ENGINEERING_REPLY,
    );
    let pipeline = h.pipeline().await;
    let submission = Submission::new("tok-dup", "Jane Doe", "cv.pdf");

    let report = pipeline
        .process_batch(&[submission.clone(), submission], None)
        .await;

    assert_eq!(report.stats.recorded, 1);
    assert_eq!(report.stats.skipped, 1);
    assert_eq!(report.outcomes[1].state, SubmissionState::Skipped);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.service.seen().len(), 1);
    assert_eq!(files_in(&h.out().join("Engineering")), vec!["Jane Doe_Standard.pdf"]);
    assert_eq!(h.ledger_lines(), vec!["tok-dup".to_string()]);
}

#[tokio::test]
async fn unknown_category_is_filed_under_others() {
    let h = Harness::new(
        MapFetcher::default().with("pilot.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        r#"{"candidate_data": {"name": "Kaptan Pilot"}, "suggested_categories": ["Aviation"]}"#,
    );
    let pipeline = h.pipeline().await;

    let outcome = pipeline
        .process_submission(&Submission::new("tok-av", "Kaptan Pilot", "pilot.pdf"))
        .await;

    assert_eq!(outcome.state, SubmissionState::Recorded, "{:?}", outcome.error);
    assert_eq!(outcome.deliveries.len(), 1);
    assert_eq!(outcome.deliveries[0].category, Category::Others);
    assert!(h.out().join("Others").join("Kaptan Pilot_Standard.pdf").exists());
    assert_eq!(files_in(&h.out()), vec!["Others"]);
}

// ── Failures ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_document_fails_as_network_without_retry() {
    let h = Harness::new(MapFetcher::default(), ENGINEERING_REPLY);
    let pipeline = h.pipeline().await;

    let outcome = pipeline
        .process_submission(&Submission::new("tok-404", "Nobody", "https://forms/gone.pdf"))
        .await;

    assert_eq!(outcome.state, SubmissionState::Failed);
    assert_eq!(outcome.fetch_attempts, 1);
    let error = outcome.error.expect("error recorded");
    assert_eq!(error.classification(), "network");
    assert!(h.service.seen().is_empty());
    assert!(h.ledger_lines().is_empty());
}

#[tokio::test]
async fn server_errors_exhaust_the_retry_budget() {
    let h = Harness::new(
        MapFetcher::default().with(
            "https://forms/busy.pdf",
            Err(FetchError::Status {
                url: "https://forms/busy.pdf".into(),
                status: 503,
            }),
        ),
        ENGINEERING_REPLY,
    );
    let pipeline = h.pipeline().await;

    let outcome = pipeline
        .process_submission(&Submission::new("tok-503", "Busy", "https://forms/busy.pdf"))
        .await;

    assert_eq!(outcome.state, SubmissionState::Failed);
    assert_eq!(outcome.fetch_attempts, 3);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 3);
    assert!(h.ledger_lines().is_empty());
}

#[tokio::test]
async fn non_pdf_bytes_fail_as_format_error() {
    let h = Harness::new(
        MapFetcher::default().with("page.html", Ok(b"<html>login</html>".to_vec())),
        ENGINEERING_REPLY,
    );
    let pipeline = h.pipeline().await;

    let outcome = pipeline
        .process_submission(&Submission::new("tok-html", "Html", "page.html"))
        .await;

    assert_eq!(outcome.state, SubmissionState::Failed);
    assert_eq!(outcome.error.unwrap().classification(), "format");
    assert_eq!(outcome.transitions.last(), Some(&SubmissionState::Failed));
}

#[tokio::test]
async fn partial_delivery_still_records_the_token() {
    let h = Harness::new(
        MapFetcher::default().with("cv.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        r#"{"candidate_data": {"name": "Jane Doe"}, "suggested_categories": ["Engineering", "Finance"]}"#,
    );
    let store = PickyStore {
        inner: LocalFolderStore::new(h.out()),
        refuse: vec![Category::Finance],
    };
    let pipeline = h.pipeline_with_store(Arc::new(store)).await;

    let outcome = pipeline
        .process_submission(&Submission::new("tok-part", "Jane Doe", "cv.pdf"))
        .await;

    assert_eq!(outcome.state, SubmissionState::Recorded, "{:?}", outcome.error);
    assert_eq!(outcome.deliveries[0].status, DeliveryStatus::Uploaded);
    assert!(matches!(outcome.deliveries[1].status, DeliveryStatus::Failed { .. }));
    assert_eq!(h.ledger_lines(), vec!["tok-part".to_string()]);
}

#[tokio::test]
async fn failed_delivery_everywhere_leaves_the_ledger_untouched() {
    let h = Harness::new(
        MapFetcher::default().with("cv.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        ENGINEERING_REPLY,
    );
    let store = PickyStore {
        inner: LocalFolderStore::new(h.out()),
        refuse: vec![Category::Engineering],
    };
    let pipeline = h.pipeline_with_store(Arc::new(store)).await;

    let outcome = pipeline
        .process_submission(&Submission::new("tok-none", "Jane Doe", "cv.pdf"))
        .await;

    assert_eq!(outcome.state, SubmissionState::Failed);
    assert_eq!(outcome.error.unwrap().classification(), "delivery");
    assert!(h.ledger_lines().is_empty());
}

#[tokio::test]
async fn stopped_batch_reports_remaining_as_cancelled() {
    let h = Harness::new(
        MapFetcher::default().with("cv.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        ENGINEERING_REPLY,
    );
    let pipeline = h.pipeline().await;
    let stop = StopSignal::new();
    stop.stop();

    let submissions = vec![
        Submission::new("a", "A", "cv.pdf"),
        Submission::new("b", "B", "cv.pdf"),
    ];
    let report = pipeline.process_batch(&submissions, Some(&stop)).await;

    assert!(report.outcomes.is_empty());
    assert_eq!(report.stats.cancelled, 2);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn one_failure_does_not_stop_the_batch() {
    let h = Harness::new(
        MapFetcher::default().with("good.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        ENGINEERING_REPLY,
    );
    let pipeline = h.pipeline().await;

    let submissions = vec![
        Submission::new("bad", "Bad", "missing.pdf"),
        Submission::new("good", "Good", "good.pdf"),
    ];
    let report = pipeline.process_batch(&submissions, None).await;

    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.recorded, 1);
    assert_eq!(h.ledger_lines(), vec!["good".to_string()]);
}

#[tokio::test]
async fn unparsable_replies_in_both_modes_fail_as_extraction() {
    let h = Harness::new(
        MapFetcher::default().with("cv.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        "Sorry, I cannot help with that.",
    );
    let pipeline = h.pipeline().await;

    let outcome = pipeline
        .process_submission(&Submission::new("tok-bad-json", "Jane Doe", "cv.pdf"))
        .await;

    assert_eq!(outcome.state, SubmissionState::Failed);
    assert_eq!(outcome.error.unwrap().classification(), "extraction");
    assert_eq!(h.service.seen(), vec!["text", "image"]);
    assert!(outcome.deliveries.is_empty());
    assert!(files_in(&h.out()).is_empty());
    assert!(h.ledger_lines().is_empty());
}

#[tokio::test]
async fn timed_out_submission_fails_and_the_batch_moves_on() {
    let h = Harness::new(
        MapFetcher::default()
            .with("slow.pdf", Ok(fake_pdf(&[SLOW_PAGE])))
            .with("good.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        ENGINEERING_REPLY,
    );
    let pipeline = h
        .assemble(
            Arc::new(LocalFolderStore::new(h.out())),
            h.service.clone(),
            1,
        )
        .await;

    let submissions = vec![
        Submission::new("slow", "Slow", "slow.pdf"),
        Submission::new("good", "Jane Doe", "good.pdf"),
    ];
    let report = pipeline.process_batch(&submissions, None).await;

    assert_eq!(report.outcomes[0].state, SubmissionState::Failed);
    assert_eq!(
        report.outcomes[0].error.as_ref().unwrap().classification(),
        "timeout"
    );
    assert_eq!(report.outcomes[1].state, SubmissionState::Recorded, "{:?}", report.outcomes[1].error);
    assert_eq!(h.ledger_lines(), vec!["good".to_string()]);
    // The next submission waited for the abandoned document to close.
    assert_eq!(h.engine.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn timed_out_documents_never_overlap() {
    let h = Harness::new(
        MapFetcher::default().with("slow.pdf", Ok(fake_pdf(&[SLOW_PAGE]))),
        ENGINEERING_REPLY,
    );
    let pipeline = h
        .assemble(
            Arc::new(LocalFolderStore::new(h.out())),
            h.service.clone(),
            1,
        )
        .await;

    let submissions: Vec<Submission> = (0..3)
        .map(|i| Submission::new(format!("slow-{i}"), "Slow", "slow.pdf"))
        .collect();
    let report = pipeline.process_batch(&submissions, None).await;

    assert_eq!(report.stats.failed, 3);
    assert_eq!(h.engine.peak.load(Ordering::SeqCst), 1);
}

// ── Redaction ────────────────────────────────────────────────────────────

#[tokio::test]
async fn redaction_masks_email_and_phone() {
    let h = Harness::new(
        MapFetcher::default().with("cv.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        ENGINEERING_REPLY,
    );
    let pipeline = h.pipeline().await;

    let outcome = pipeline
        .redact_submission(&Submission::new("tok-red", "Jane Doe", "cv.pdf"))
        .await
        .unwrap();

    assert_eq!(outcome.summary.regions_redacted, 2);
    assert_eq!(outcome.summary.pages_modified, 1);
    assert_eq!(outcome.file_name, "Jane Doe_Cleaned.pdf");
    assert!(!outcome.already_processed);

    let masked = pages_of(&outcome.bytes).join("\n");
    assert!(!masked.contains('@'));
    assert!(!masked.chars().any(|c| c.is_ascii_digit()));
    assert!(masked.contains("Senior backend engineer"));
    assert_eq!(h.ledger_lines(), vec!["tok-red".to_string()]);
}

#[tokio::test]
async fn redaction_works_without_an_extraction_provider() {
    let h = Harness::new(
        MapFetcher::default().with("cv.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        ENGINEERING_REPLY,
    );
    let pipeline = h
        .assemble(
            Arc::new(LocalFolderStore::new(h.out())),
            Arc::new(UnavailableExtractionService),
            300,
        )
        .await;

    let redacted = pipeline
        .redact_submission(&Submission::new("tok-plain", "Jane Doe", "cv.pdf"))
        .await
        .unwrap();
    assert_eq!(redacted.summary.regions_redacted, 2);

    let outcome = pipeline
        .process_submission(&Submission::new("tok-llm", "Jane Doe", "cv.pdf"))
        .await;
    assert_eq!(outcome.error.unwrap().classification(), "extraction");
}

#[tokio::test]
async fn redaction_only_touches_pages_with_matches() {
    let doc = fake_pdf(&[
        "Contact me: jane.doe@example.com or 0532 123 45 67",
        "Experience\nBuilt payment systems in 2019.",
    ]);
    let h = Harness::new(MapFetcher::default().with("two.pdf", Ok(doc)), ENGINEERING_REPLY);

    let outcome = h
        .pipeline()
        .await
        .redact_submission(&Submission::new("tok-two", "Jane Doe", "two.pdf"))
        .await
        .unwrap();

    assert_eq!(outcome.summary.regions_redacted, 2);
    assert_eq!(outcome.summary.pages_scanned, 2);
    assert_eq!(outcome.summary.pages_modified, 1);

    let pages = pages_of(&outcome.bytes);
    assert!(!pages[0].contains("jane.doe@example.com"));
    assert!(!pages[0].contains("0532 123 45 67"));
    assert!(pages[0].starts_with("Contact me: "));
    assert_eq!(pages[1], "Experience\nBuilt payment systems in 2019.");
}

#[tokio::test]
async fn redacting_a_redacted_document_changes_nothing() {
    let first = {
        let h = Harness::new(
            MapFetcher::default().with("cv.pdf", Ok(fake_pdf(&[CV_TEXT]))),
            ENGINEERING_REPLY,
        );
        h.pipeline()
            .await
            .redact_submission(&Submission::new("t1", "Jane Doe", "cv.pdf"))
            .await
            .unwrap()
    };

    let h = Harness::new(
        MapFetcher::default().with("cleaned.pdf", Ok(first.bytes.clone())),
        ENGINEERING_REPLY,
    );
    let second = h
        .pipeline()
        .await
        .redact_submission(&Submission::new("t2", "Jane Doe", "cleaned.pdf"))
        .await
        .unwrap();

    assert_eq!(second.summary.regions_redacted, 0);
    assert_eq!(second.bytes, first.bytes);
}

#[tokio::test]
async fn redaction_of_a_known_token_is_flagged_but_not_rerecorded() {
    let h = Harness::new(
        MapFetcher::default().with("cv.pdf", Ok(fake_pdf(&[CV_TEXT]))),
        ENGINEERING_REPLY,
    );
    let pipeline = h.pipeline().await;
    let submission = Submission::new("tok-again", "Jane Doe", "cv.pdf");

    pipeline.redact_submission(&submission).await.unwrap();
    let again = pipeline.redact_submission(&submission).await.unwrap();

    assert!(again.already_processed);
    assert_eq!(h.ledger_lines(), vec!["tok-again".to_string()]);
}
