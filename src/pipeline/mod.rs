//! Pipeline stages for résumé processing.
//!
//! Each submodule implements exactly one transformation step so it can be
//! tested on its own and swapped behind its trait.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ document ──▶ extract ──▶ render ──▶ (delivery)
//! (URL/path) (pdfium)    (LLM JSON)  (lopdf)
//!              │            ▲
//!              └─ encode ───┘  first page as PNG when text is too thin
//!
//! fetch ──▶ document ──▶ redact ──▶ save        (redaction-only variant)
//! ```
//!
//! 1. [`fetch`]: download the source document with retry and backoff
//! 2. [`document`]: per-page text, search geometry and rasters; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]: PNG-encode and base64-wrap the first page for image mode
//! 4. [`extract`]: call the extraction service and parse the profile
//! 5. [`render`]: lay the profile out as a fresh PDF; [`glyphs`] holds
//!    its font tables
//! 6. [`redact`]: mask e-mail addresses and phone numbers in place

pub mod document;
pub mod encode;
pub mod extract;
pub mod fetch;
pub mod glyphs;
pub mod redact;
pub mod render;
