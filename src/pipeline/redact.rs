//! Pattern-based redaction of e-mail addresses and Turkish phone numbers.
//!
//! ## How a redaction pass works
//!
//! 1. Read each page's text and run both patterns over it.
//! 2. For every distinct matched string, ask the document where that exact
//!    string sits on the page. Zero, one or many regions may come back (a
//!    phone number printed in the header and again in the footer).
//! 3. Queue a mask per region.
//! 4. After the last page, commit every mask in a single step.
//!
//! A failed geometry lookup is logged and skipped; it never aborts the pass.
//! Pattern matching is best-effort and deliberately favours over-matching;
//! it is not a privacy guarantee.

use crate::error::DocumentError;
use crate::pipeline::document::{DocumentTextExtractor, RedactionMark, SourceDocument};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};

// Runs of word characters, dots or hyphens on both sides of the `@`.
static RE_EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\w.-]+@[\w.-]+").unwrap());

// Optional +90 / 0 prefix, then 3-3-2-2 digit groups with optional spacing.
static RE_PHONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+90|0)?\s*[0-9]{3}\s*[0-9]{3}\s*[0-9]{2}\s*[0-9]{2}").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Email,
    Phone,
}

/// One sensitive match on one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensitiveSpan {
    pub kind: SpanKind,
    pub text: String,
    /// 0-indexed page.
    pub page: usize,
}

/// Counters from one redaction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionSummary {
    /// Masked regions; the headline redaction count.
    pub regions_redacted: usize,
    /// Distinct sensitive strings found across pages.
    pub spans_found: usize,
    pub pages_scanned: usize,
    pub pages_modified: usize,
    /// Geometry lookups that errored and were skipped.
    pub lookups_failed: usize,
}

/// A redacted document ready to be written out.
#[derive(Debug, Clone)]
pub struct RedactedDocument {
    pub bytes: Vec<u8>,
    pub summary: RedactionSummary,
}

/// Stateless e-mail / phone redactor.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternRedactor;

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

impl PatternRedactor {
    pub fn new() -> Self {
        Self
    }

    /// Sensitive strings on one page, in reading order, each listed once.
    ///
    /// A phone-shaped run inside an e-mail address is part of the e-mail
    /// match and is not reported separately.
    pub fn scan(&self, page: usize, text: &str) -> Vec<SensitiveSpan> {
        let mut found: Vec<(Range<usize>, SpanKind, String)> = Vec::new();

        for m in RE_EMAIL.find_iter(text) {
            found.push((m.range(), SpanKind::Email, m.as_str().to_string()));
        }
        for m in RE_PHONE.find_iter(text) {
            // Leading whitespace is allowed by the pattern but is not part of the number.
            let trimmed = m.as_str().trim_start();
            let start = m.end() - trimmed.len();
            let range = start..m.end();
            if found.iter().any(|(r, _, _)| overlaps(r, &range)) {
                continue;
            }
            found.push((range, SpanKind::Phone, trimmed.to_string()));
        }

        found.sort_by_key(|(r, _, _)| r.start);
        let mut spans: Vec<SensitiveSpan> = Vec::new();
        for (_, kind, text) in found {
            if !spans.iter().any(|s| s.text == text) {
                spans.push(SensitiveSpan { kind, text, page });
            }
        }
        spans
    }

    /// Mask every sensitive span in `doc` and commit the masks in one step.
    ///
    /// Returns the pass counters; `regions_redacted` is at least the number
    /// of distinct matches that had geometry.
    pub fn redact(&self, doc: &mut dyn SourceDocument) -> Result<RedactionSummary, DocumentError> {
        let mut summary = RedactionSummary::default();

        for page in 0..doc.page_count() {
            summary.pages_scanned += 1;
            let text = match doc.page_text(page) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Page {}: cannot read text, skipping redaction: {}", page + 1, e);
                    continue;
                }
            };

            let spans = self.scan(page, &text);
            summary.spans_found += spans.len();
            let mut marked_here = 0usize;

            for span in spans {
                match doc.find_text(page, &span.text) {
                    Ok(regions) => {
                        if regions.is_empty() {
                            debug!("Page {}: no geometry for {:?} match", page + 1, span.kind);
                        }
                        for region in regions {
                            doc.mark_redaction(RedactionMark {
                                page,
                                region,
                                text: span.text.clone(),
                            });
                            marked_here += 1;
                        }
                    }
                    Err(e) => {
                        warn!("Page {}: geometry lookup failed, skipping match: {}", page + 1, e);
                        summary.lookups_failed += 1;
                    }
                }
            }

            if marked_here > 0 {
                summary.pages_modified += 1;
                summary.regions_redacted += marked_here;
            }
        }

        let applied = doc.apply_redactions()?;
        debug!("Committed {} redaction(s)", applied);
        Ok(summary)
    }

    /// Open `bytes`, redact, and save, all on the blocking pool.
    pub async fn redact_bytes(
        &self,
        documents: &DocumentTextExtractor,
        bytes: Arc<Vec<u8>>,
    ) -> Result<RedactedDocument, DocumentError> {
        let redactor = *self;
        let result = documents
            .with_open_document(bytes, "redaction", move |doc| {
                let summary = redactor.redact(doc)?;
                let bytes = doc.save()?;
                Ok(RedactedDocument { bytes, summary })
            })
            .await?;

        info!(
            "Redacted {} region(s) on {}/{} page(s)",
            result.summary.regions_redacted, result.summary.pages_modified, result.summary.pages_scanned
        );
        Ok(result)
    }
}
