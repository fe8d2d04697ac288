//! Document access: per-page text, text geometry, redaction marks, rasters.
//!
//! ## Why a closure-scoped handle?
//!
//! A pdfium document borrows the bound library, and the library must not
//! outlive the call that bound it. [`DocumentEngine::with_document`] opens the
//! bytes, hands a `&mut dyn SourceDocument` to the caller's closure, and
//! closes everything when the closure returns, on every path (success,
//! error, or panic unwinding). Nothing outside the closure can hold the
//! handle, and [`DocumentTextExtractor`] holds a single open slot, so at most
//! one document is open at any time.
//!
//! All pdfium work runs inside `tokio::task::spawn_blocking`; see
//! [`DocumentTextExtractor`].

use crate::error::{CvFlowError, DocumentError};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Axis-aligned rectangle in PDF user space (points, origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Region {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.bottom < other.top
            && other.bottom < self.top
    }
}

/// A region queued for permanent masking.
#[derive(Debug, Clone, PartialEq)]
pub struct RedactionMark {
    /// 0-indexed page.
    pub page: usize,
    pub region: Region,
    /// The matched text the region covers.
    pub text: String,
}

/// An open document, valid only inside [`DocumentEngine::with_document`].
pub trait SourceDocument {
    fn page_count(&self) -> usize;

    /// Plain text of a 0-indexed page.
    fn page_text(&self, page: usize) -> Result<String, DocumentError>;

    /// Every on-page occurrence of `needle`; may be empty.
    fn find_text(&self, page: usize, needle: &str) -> Result<Vec<Region>, DocumentError>;

    /// Queue a mask; nothing changes until [`SourceDocument::apply_redactions`].
    fn mark_redaction(&mut self, mark: RedactionMark);

    /// Commit every queued mask at once. Returns the number committed.
    fn apply_redactions(&mut self) -> Result<usize, DocumentError>;

    fn render_page(&self, page: usize, scale: f32) -> Result<DynamicImage, DocumentError>;

    /// Serialise the (possibly redacted) document.
    fn save(&self) -> Result<Vec<u8>, DocumentError>;
}

/// Opens document bytes for the duration of a callback.
pub trait DocumentEngine: Send + Sync {
    fn with_document(
        &self,
        bytes: &[u8],
        f: &mut dyn FnMut(&mut dyn SourceDocument) -> Result<(), DocumentError>,
    ) -> Result<(), DocumentError>;
}

/// Run `f` against an open document and return its value.
pub fn scoped<T>(
    engine: &dyn DocumentEngine,
    bytes: &[u8],
    f: impl FnOnce(&mut dyn SourceDocument) -> Result<T, DocumentError>,
) -> Result<T, DocumentError> {
    let mut f = Some(f);
    let mut out = None;
    engine.with_document(bytes, &mut |doc| {
        let f = f
            .take()
            .ok_or_else(|| DocumentError::Worker("document callback invoked twice".into()))?;
        out = Some(f(doc)?);
        Ok(())
    })?;
    out.ok_or_else(|| DocumentError::Worker("document callback never ran".into()))
}

/// Reject anything that does not start with the `%PDF` magic.
pub fn check_pdf_magic(bytes: &[u8]) -> Result<(), DocumentError> {
    match bytes.get(..4) {
        Some(b"%PDF") => Ok(()),
        Some(magic) => Err(DocumentError::Format {
            detail: format!("first bytes {:?}", magic),
        }),
        None => Err(DocumentError::Format {
            detail: format!("only {} bytes", bytes.len()),
        }),
    }
}

// ── Async facade ─────────────────────────────────────────────────────────

/// Text of every page of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedText {
    pub pages: Vec<String>,
}

impl ExtractedText {
    /// Pages joined with newlines.
    pub fn joined(&self) -> String {
        self.pages.join("\n")
    }

    /// Non-whitespace character count across all pages.
    pub fn content_chars(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| p.chars())
            .filter(|c| !c.is_whitespace())
            .count()
    }
}

/// Async wrapper that runs engine work on the blocking pool.
///
/// Clones share one permit, so at most one document is open at a time even
/// when a caller gives up on a task that is still running: the permit moves
/// into the blocking closure and is released only when the document closes.
#[derive(Clone)]
pub struct DocumentTextExtractor {
    engine: Arc<dyn DocumentEngine>,
    open_slot: Arc<Semaphore>,
}

impl DocumentTextExtractor {
    pub fn new(engine: Arc<dyn DocumentEngine>) -> Self {
        Self {
            engine,
            open_slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Wait for the open slot, then run `f` against the opened document on
    /// the blocking pool.
    pub async fn with_open_document<T, F>(
        &self,
        bytes: Arc<Vec<u8>>,
        task: &'static str,
        f: F,
    ) -> Result<T, DocumentError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SourceDocument) -> Result<T, DocumentError> + Send + 'static,
    {
        check_pdf_magic(&bytes)?;
        let permit = Arc::clone(&self.open_slot)
            .acquire_owned()
            .await
            .map_err(|e| DocumentError::Worker(format!("document slot closed: {e}")))?;
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            scoped(engine.as_ref(), &bytes, f)
        })
        .await
        .map_err(|e| DocumentError::Worker(format!("{task} task panicked: {e}")))?
    }

    /// Open, read every page, close.
    ///
    /// A page whose text cannot be read contributes an empty string; only a
    /// document that cannot be opened is an error.
    pub async fn extract_text(&self, bytes: Arc<Vec<u8>>) -> Result<ExtractedText, DocumentError> {
        self.with_open_document(bytes, "text", |doc| {
            let pages = (0..doc.page_count())
                .map(|i| {
                    doc.page_text(i).unwrap_or_else(|e| {
                        warn!("Page {}: text extraction failed, treating as empty: {}", i + 1, e);
                        String::new()
                    })
                })
                .collect::<Vec<_>>();
            debug!("Extracted text from {} page(s)", pages.len());
            Ok(ExtractedText { pages })
        })
        .await
    }

    /// Re-open the document and rasterise its first page.
    pub async fn render_first_page(
        &self,
        bytes: Arc<Vec<u8>>,
        scale: f32,
    ) -> Result<DynamicImage, DocumentError> {
        self.with_open_document(bytes, "render", move |doc| {
            if doc.page_count() == 0 {
                return Err(DocumentError::PageOutOfRange { page: 1, total: 0 });
            }
            doc.render_page(0, scale)
        })
        .await
    }
}

// ── pdfium implementation ────────────────────────────────────────────────

/// [`DocumentEngine`] backed by pdfium.
///
/// The library is bound per call inside the blocking task, the same way each
/// render call gets its own `Pdfium` instance, so no pdfium state is shared
/// across threads.
#[derive(Debug, Clone, Default)]
pub struct PdfiumEngine {
    library_path: Option<PathBuf>,
}

impl PdfiumEngine {
    /// Use the system library, or `library_path` (a file, or a directory
    /// holding the platform library) when given.
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    /// Bind once up front so a missing library is reported before any work.
    pub fn verify(&self) -> Result<(), CvFlowError> {
        self.bind().map(|_| ()).map_err(|e| match e {
            DocumentError::Worker(detail) => CvFlowError::PdfiumBindingFailed(detail),
            other => CvFlowError::PdfiumBindingFailed(other.to_string()),
        })
    }

    fn bind(&self) -> Result<Pdfium, DocumentError> {
        let bindings = match self.library_path.as_deref() {
            Some(path) => Pdfium::bind_to_library(library_file(path)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| DocumentError::Worker(format!("pdfium binding: {:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }
}

fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

impl DocumentEngine for PdfiumEngine {
    fn with_document(
        &self,
        bytes: &[u8],
        f: &mut dyn FnMut(&mut dyn SourceDocument) -> Result<(), DocumentError>,
    ) -> Result<(), DocumentError> {
        let pdfium = self.bind()?;
        let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
            let detail = format!("{:?}", e);
            if detail.contains("Password") || detail.contains("password") {
                DocumentError::PasswordProtected
            } else {
                DocumentError::Format { detail }
            }
        })?;
        let mut doc = PdfiumDocument {
            document,
            pending: Vec::new(),
        };
        info!("PDF loaded: {} pages", doc.page_count());
        f(&mut doc)
    }
}

struct PdfiumDocument<'a> {
    document: PdfDocument<'a>,
    pending: Vec<RedactionMark>,
}

fn page_err(page: usize) -> impl Fn(PdfiumError) -> DocumentError {
    move |e| DocumentError::Page {
        page: page + 1,
        detail: format!("{:?}", e),
    }
}

fn to_region(rect: &PdfRect) -> Region {
    Region::new(
        rect.left().value,
        rect.bottom().value,
        rect.right().value,
        rect.top().value,
    )
}

fn to_rect(region: &Region) -> PdfRect {
    PdfRect::new_from_values(region.bottom, region.left, region.top, region.right)
}

/// Replace every occurrence of `needle` with spaces of equal char length.
fn blank_out(text: &str, needle: &str) -> String {
    text.replace(needle, &" ".repeat(needle.chars().count()))
}

impl<'a> PdfiumDocument<'a> {
    fn page(&self, index: usize) -> Result<PdfPage<'a>, DocumentError> {
        let total = self.page_count();
        if index >= total {
            return Err(DocumentError::PageOutOfRange {
                page: index + 1,
                total,
            });
        }
        self.document.pages().get(index as u16).map_err(page_err(index))
    }

    /// Scrub the text behind each mark, then paint an opaque box over it.
    fn redact_page(&self, index: usize, marks: &[RedactionMark]) -> Result<(), DocumentError> {
        let mut page = self.page(index)?;

        let mut scrubbed = 0usize;
        for mut object in page.objects().iter() {
            let hits: Vec<&RedactionMark> = marks
                .iter()
                .filter(|m| object.does_overlap_rect(&to_rect(&m.region)))
                .collect();
            if hits.is_empty() {
                continue;
            }
            if let Some(text_object) = object.as_text_object_mut() {
                let original = text_object.text();
                let mut replaced = original.clone();
                for mark in &hits {
                    replaced = blank_out(&replaced, &mark.text);
                }
                // A fragment of a match split across text objects: drop it whole.
                if replaced == original {
                    replaced = " ".repeat(original.chars().count());
                }
                text_object.set_text(&replaced).map_err(page_err(index))?;
                scrubbed += 1;
            }
        }

        for mark in marks {
            page.objects_mut()
                .create_path_object_rect(to_rect(&mark.region), None, None, Some(PdfColor::BLACK))
                .map_err(page_err(index))?;
        }
        page.regenerate_content().map_err(page_err(index))?;
        debug!(
            "Page {}: {} mask(s) painted, {} text object(s) scrubbed",
            index + 1,
            marks.len(),
            scrubbed
        );
        Ok(())
    }
}

impl<'a> SourceDocument for PdfiumDocument<'a> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn page_text(&self, page: usize) -> Result<String, DocumentError> {
        let p = self.page(page)?;
        let text = p.text().map_err(page_err(page))?;
        Ok(text.all())
    }

    fn find_text(&self, page: usize, needle: &str) -> Result<Vec<Region>, DocumentError> {
        let p = self.page(page)?;
        let text = p.text().map_err(page_err(page))?;
        let search = text
            .search(needle, &PdfSearchOptions::new())
            .map_err(page_err(page))?;
        let mut regions = Vec::new();
        for segments in search.iter(PdfSearchDirection::SearchForward) {
            for segment in segments.iter() {
                regions.push(to_region(&segment.bounds()));
            }
        }
        Ok(regions)
    }

    fn mark_redaction(&mut self, mark: RedactionMark) {
        self.pending.push(mark);
    }

    fn apply_redactions(&mut self) -> Result<usize, DocumentError> {
        let marks = std::mem::take(&mut self.pending);
        let total = marks.len();
        let mut by_page: BTreeMap<usize, Vec<RedactionMark>> = BTreeMap::new();
        for mark in marks {
            by_page.entry(mark.page).or_default().push(mark);
        }
        for (page, marks) in &by_page {
            self.redact_page(*page, marks)?;
        }
        Ok(total)
    }

    fn render_page(&self, page: usize, scale: f32) -> Result<DynamicImage, DocumentError> {
        let p = self.page(page)?;
        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = p.render_with_config(&config).map_err(page_err(page))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page + 1,
            image.width(),
            image.height()
        );
        Ok(image)
    }

    fn save(&self) -> Result<Vec<u8>, DocumentError> {
        self.document
            .save_to_bytes()
            .map_err(|e| DocumentError::Save(format!("{:?}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingEngine;

    struct Empty;

    impl SourceDocument for Empty {
        fn page_count(&self) -> usize {
            0
        }
        fn page_text(&self, page: usize) -> Result<String, DocumentError> {
            Err(DocumentError::PageOutOfRange { page, total: 0 })
        }
        fn find_text(&self, _: usize, _: &str) -> Result<Vec<Region>, DocumentError> {
            Ok(vec![])
        }
        fn mark_redaction(&mut self, _: RedactionMark) {}
        fn apply_redactions(&mut self) -> Result<usize, DocumentError> {
            Ok(0)
        }
        fn render_page(&self, page: usize, _: f32) -> Result<DynamicImage, DocumentError> {
            Err(DocumentError::PageOutOfRange { page, total: 0 })
        }
        fn save(&self) -> Result<Vec<u8>, DocumentError> {
            Ok(b"%PDF-empty".to_vec())
        }
    }

    impl DocumentEngine for CountingEngine {
        fn with_document(
            &self,
            _bytes: &[u8],
            f: &mut dyn FnMut(&mut dyn SourceDocument) -> Result<(), DocumentError>,
        ) -> Result<(), DocumentError> {
            f(&mut Empty)
        }
    }

    #[test]
    fn magic_check() {
        assert!(check_pdf_magic(b"%PDF-1.7\n").is_ok());
        assert!(matches!(
            check_pdf_magic(b"<html>"),
            Err(DocumentError::Format { .. })
        ));
        assert!(matches!(
            check_pdf_magic(b"%P"),
            Err(DocumentError::Format { .. })
        ));
    }

    #[test]
    fn scoped_returns_closure_value() {
        let saved = scoped(&CountingEngine, b"%PDF", |doc| doc.save()).expect("scoped");
        assert_eq!(saved, b"%PDF-empty".to_vec());
    }

    #[test]
    fn scoped_propagates_closure_error() {
        let err = scoped(&CountingEngine, b"%PDF", |doc| doc.page_text(3)).unwrap_err();
        assert!(matches!(err, DocumentError::PageOutOfRange { page: 3, .. }));
    }

    #[tokio::test]
    async fn first_page_render_of_empty_document_is_out_of_range() {
        let extractor = DocumentTextExtractor::new(Arc::new(CountingEngine));
        let err = extractor
            .render_first_page(Arc::new(b"%PDF-1.4".to_vec()), 2.0)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::PageOutOfRange { total: 0, .. }));
    }

    #[tokio::test]
    async fn non_pdf_bytes_never_reach_the_engine() {
        let extractor = DocumentTextExtractor::new(Arc::new(CountingEngine));
        let err = extractor
            .extract_text(Arc::new(b"GIF89a".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentError::Format { .. }));
    }

    /// Holds each document open for a while and records the peak number of
    /// documents open at once.
    #[derive(Default)]
    struct SlowEngine {
        open: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
    }

    impl DocumentEngine for SlowEngine {
        fn with_document(
            &self,
            _bytes: &[u8],
            f: &mut dyn FnMut(&mut dyn SourceDocument) -> Result<(), DocumentError>,
        ) -> Result<(), DocumentError> {
            use std::sync::atomic::Ordering;
            let now = self.open.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(200));
            let result = f(&mut Empty);
            self.open.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    #[tokio::test]
    async fn abandoned_task_keeps_the_slot_until_the_document_closes() {
        use std::sync::atomic::Ordering;
        let engine = Arc::new(SlowEngine::default());
        let extractor = DocumentTextExtractor::new(engine.clone());
        let bytes = Arc::new(b"%PDF-1.4".to_vec());

        let abandoned = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            extractor.extract_text(Arc::clone(&bytes)),
        )
        .await;
        assert!(abandoned.is_err());

        let text = extractor.clone().extract_text(bytes).await.expect("second open");
        assert!(text.pages.is_empty());
        assert_eq!(engine.peak.load(Ordering::SeqCst), 1);
        assert_eq!(engine.open.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn content_chars_ignores_whitespace() {
        let text = ExtractedText {
            pages: vec!["  a b \n".into(), "\t c".into()],
        };
        assert_eq!(text.content_chars(), 3);
        assert_eq!(text.joined(), "  a b \n\n\t c");
    }

    #[test]
    fn regions_intersect() {
        let a = Region::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Region::new(5.0, 5.0, 15.0, 15.0)));
        assert!(!a.intersects(&Region::new(10.0, 0.0, 20.0, 10.0)));
    }

    #[test]
    fn blank_out_keeps_length() {
        assert_eq!(blank_out("mail a@b.c now", "a@b.c"), "mail       now");
    }
}
