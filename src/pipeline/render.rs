//! Résumé regeneration: [`CandidateProfile`] → standardized PDF bytes.
//!
//! The output never reuses anything from the source document. Layout is a
//! single column on A4: a centred header block, then the fixed section order
//! below, each section emitted only when it has content.
//!
//! ```text
//! name / title / location · contact
//! PROFESSIONAL SUMMARY → EDUCATION → EXPERIENCE → PROJECTS
//!   → CERTIFICATES → SKILLS → LANGUAGES → INTERESTS
//! ```
//!
//! ## Why lopdf instead of pdfium?
//!
//! pdfium is bound at runtime and its writer stamps the save time into the
//! file. `lopdf` assembles the object graph in pure Rust, writes no `/ID` and
//! no dates, and therefore gives byte-identical output for identical input,
//! which lets us compare regenerated files across runs.
//!
//! ## Fonts
//!
//! With a TrueType asset (e.g. `DejaVuSans.ttf`) the font is embedded once
//! and Turkish letters are reachable through a patched WinAnsi encoding.
//! Without one, the profile is transliterated to ASCII once up front and the
//! standard Helvetica family is used; see [`super::glyphs`].

use crate::error::InternalRenderError;
use crate::pipeline::glyphs::{self, TrueTypeMetrics, WidthTable};
use crate::profile::CandidateProfile;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PRODUCER: &str = "edgequake-cvflow";
const HEADING_RGB: (f32, f32, f32) = (0.0, 0.2, 0.4);

/// Page geometry and font selection for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// TrueType font with extended glyph coverage. `None` or an unreadable
    /// file selects the built-in Helvetica path.
    pub font_path: Option<PathBuf>,
    /// Page width in points. Default: A4 (595.28).
    pub page_width: f32,
    /// Page height in points. Default: A4 (841.89).
    pub page_height: f32,
    /// Margin on all four sides in points. Default: 50.
    pub margin: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            page_width: 595.28,
            page_height: 841.89,
            margin: 50.0,
        }
    }
}

// ── Section plan ─────────────────────────────────────────────────────────

/// One body section, in render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Summary,
    Education,
    Experience,
    Projects,
    Certificates,
    Skills,
    Languages,
    Interests,
}

impl SectionKind {
    pub fn heading(self) -> &'static str {
        match self {
            SectionKind::Summary => "PROFESSIONAL SUMMARY",
            SectionKind::Education => "EDUCATION",
            SectionKind::Experience => "EXPERIENCE",
            SectionKind::Projects => "PROJECTS",
            SectionKind::Certificates => "CERTIFICATES",
            SectionKind::Skills => "SKILLS",
            SectionKind::Languages => "LANGUAGES",
            SectionKind::Interests => "INTERESTS",
        }
    }
}

/// A bold lead line and/or a body paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionEntry {
    pub lead: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSection {
    pub kind: SectionKind,
    pub entries: Vec<SectionEntry>,
}

fn join_non_empty(parts: &[&str], sep: &str) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

fn with_year(text: String, year: &str) -> String {
    match (text.is_empty(), year.trim().is_empty()) {
        (_, true) => text,
        (true, false) => year.trim().to_string(),
        (false, false) => format!("{} ({})", text, year.trim()),
    }
}

fn lead(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Decide which sections appear and what they say.
///
/// Pure: the renderer only turns this plan into drawing operations.
pub fn plan_sections(p: &CandidateProfile) -> Vec<PlannedSection> {
    let mut sections = Vec::new();
    let mut push = |kind, entries: Vec<SectionEntry>| {
        let entries: Vec<SectionEntry> = entries
            .into_iter()
            .filter(|e| e.lead.is_some() || !e.body.trim().is_empty())
            .collect();
        if !entries.is_empty() {
            sections.push(PlannedSection { kind, entries });
        }
    };

    push(
        SectionKind::Summary,
        vec![SectionEntry {
            lead: None,
            body: p.summary.clone(),
        }],
    );
    push(
        SectionKind::Education,
        p.education
            .iter()
            .map(|e| SectionEntry {
                lead: lead(with_year(join_non_empty(&[&e.degree, &e.school], " - "), &e.year)),
                body: String::new(),
            })
            .collect(),
    );
    push(
        SectionKind::Experience,
        p.experience
            .iter()
            .map(|e| SectionEntry {
                lead: lead(join_non_empty(&[&e.role, &e.company], " at ")),
                body: e.description.clone(),
            })
            .collect(),
    );
    push(
        SectionKind::Projects,
        p.projects
            .iter()
            .map(|pr| SectionEntry {
                lead: lead(pr.name.trim().to_string()),
                body: pr.description.clone(),
            })
            .collect(),
    );
    push(
        SectionKind::Certificates,
        p.certificates
            .iter()
            .map(|c| SectionEntry {
                lead: lead(with_year(join_non_empty(&[&c.name, &c.issuer], " - "), &c.year)),
                body: String::new(),
            })
            .collect(),
    );
    push(
        SectionKind::Skills,
        p.skills
            .iter()
            .map(|(group, description)| SectionEntry {
                lead: None,
                body: if group.trim().is_empty() {
                    description.clone()
                } else {
                    format!("{}: {}", group.trim(), description)
                },
            })
            .collect(),
    );
    push(
        SectionKind::Languages,
        vec![SectionEntry {
            lead: None,
            body: p.spoken_languages.join(", "),
        }],
    );
    push(
        SectionKind::Interests,
        vec![SectionEntry {
            lead: None,
            body: p.interests.join(", "),
        }],
    );
    sections
}

/// File name for a regenerated résumé.
///
/// Path separators and control characters are replaced so the name is safe
/// as a single path component; an empty name becomes `Candidate`.
pub fn standard_file_name(display_name: &str) -> String {
    format!("{}_Standard.pdf", safe_stem(display_name))
}

/// File name for a redacted copy of the original document.
pub fn cleaned_file_name(display_name: &str) -> String {
    format!("{}_Cleaned.pdf", safe_stem(display_name))
}

fn safe_stem(display_name: &str) -> String {
    let stem: String = display_name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = stem.trim_matches('.').trim();
    if stem.is_empty() {
        "Candidate".to_string()
    } else {
        stem.to_string()
    }
}

// ── Fonts ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Regular,
    Bold,
    Italic,
}

#[derive(Debug, Clone)]
struct EmbeddedFont {
    bytes: Vec<u8>,
    metrics: TrueTypeMetrics,
    widths: WidthTable,
    base_name: String,
}

#[derive(Debug, Clone)]
enum FontSet {
    Builtin { widths: WidthTable },
    Embedded(Box<EmbeddedFont>),
}

impl FontSet {
    fn resource_name(&self, style: Style) -> &'static str {
        match (self, style) {
            (FontSet::Embedded(_), _) | (FontSet::Builtin { .. }, Style::Regular) => "F1",
            (FontSet::Builtin { .. }, Style::Bold) => "F2",
            (FontSet::Builtin { .. }, Style::Italic) => "F3",
        }
    }

    fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            FontSet::Builtin { .. } => glyphs::encode_ascii(text),
            FontSet::Embedded(_) => glyphs::encode_patched(text),
        }
    }

    fn measure(&self, text: &str, style: Style, size: f32) -> f32 {
        let encoded = self.encode(text);
        match self {
            // Helvetica-Bold runs roughly 8% wider than the regular metrics.
            FontSet::Builtin { widths } if style == Style::Bold => widths.measure(&encoded, size) * 1.08,
            FontSet::Builtin { widths } => widths.measure(&encoded, size),
            FontSet::Embedded(font) => font.widths.measure(&encoded, size),
        }
    }
}

fn load_font(path: &Path) -> Option<EmbeddedFont> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            warn!(
                "Font asset {} unavailable ({}); falling back to Helvetica with transliteration",
                path.display(),
                e
            );
            return None;
        }
    };
    let Some(metrics) = TrueTypeMetrics::parse(&bytes) else {
        warn!(
            "Font asset {} is not a usable TrueType font; falling back to Helvetica",
            path.display()
        );
        return None;
    };
    let widths = WidthTable::from_truetype(&metrics);
    let base_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "EmbeddedFont".to_string());
    info!("Loaded font asset {} ({} bytes)", path.display(), bytes.len());
    Some(EmbeddedFont {
        bytes,
        metrics,
        widths,
        base_name,
    })
}

// ── Renderer ─────────────────────────────────────────────────────────────

/// Deterministic profile → PDF renderer.
///
/// The font asset is read once in [`ProfileDocumentRenderer::new`]; `render`
/// itself performs no I/O.
#[derive(Debug, Clone)]
pub struct ProfileDocumentRenderer {
    config: RendererConfig,
    fonts: FontSet,
}

impl ProfileDocumentRenderer {
    pub fn new(config: RendererConfig) -> Self {
        let fonts = match config.font_path.as_deref().and_then(load_font) {
            Some(font) => FontSet::Embedded(Box::new(font)),
            None => FontSet::Builtin {
                widths: WidthTable::helvetica(),
            },
        };
        Self { config, fonts }
    }

    /// Whether non-ASCII text is drawn as-is rather than transliterated.
    pub fn has_extended_font(&self) -> bool {
        matches!(self.fonts, FontSet::Embedded(_))
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Lay out `profile` and serialise it to PDF bytes.
    pub fn render(&self, profile: &CandidateProfile) -> Result<Vec<u8>, InternalRenderError> {
        let transliterated;
        let profile = if self.has_extended_font() {
            profile
        } else {
            transliterated = profile.map_strings(glyphs::transliterate);
            &transliterated
        };

        let mut writer = PageWriter::new(&self.config, &self.fonts);
        writer.header(profile);
        for section in plan_sections(profile) {
            writer.section(&section);
        }
        let pages = writer.finish();
        debug!("Laid out profile '{}' on {} page(s)", profile.name, pages.len());

        let title = if profile.name.is_empty() {
            "Resume".to_string()
        } else {
            profile.name.clone()
        };
        self.assemble(pages, &title)
    }

    fn assemble(&self, pages: Vec<Vec<Operation>>, title: &str) -> Result<Vec<u8>, InternalRenderError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut font_resources = Dictionary::new();
        match &self.fonts {
            FontSet::Builtin { .. } => {
                for (key, base) in [("F1", "Helvetica"), ("F2", "Helvetica-Bold"), ("F3", "Helvetica-Oblique")] {
                    let id = doc.add_object(dictionary! {
                        "Type" => "Font",
                        "Subtype" => "Type1",
                        "BaseFont" => base,
                        "Encoding" => "WinAnsiEncoding",
                    });
                    font_resources.set(key, id);
                }
            }
            FontSet::Embedded(font) => {
                let id = embed_truetype(&mut doc, font);
                font_resources.set("F1", id);
            }
        }
        let resources_id = doc.add_object(dictionary! { "Font" => font_resources });

        let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
        for operations in pages {
            let content = Content { operations }
                .encode()
                .map_err(|e| InternalRenderError(format!("content stream: {e}")))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), self.config.page_width.into(), self.config.page_height.into()],
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Producer" => Object::string_literal(PRODUCER),
            "Title" => Object::string_literal(self.fonts.encode(title)),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| InternalRenderError(format!("serialise: {e}")))?;
        Ok(bytes)
    }
}

fn embed_truetype(doc: &mut Document, font: &EmbeddedFont) -> lopdf::ObjectId {
    let m = &font.metrics;
    let file_id = doc.add_object(Stream::new(
        dictionary! { "Length1" => font.bytes.len() as i64 },
        font.bytes.clone(),
    ));
    let bbox: Vec<Object> = m.bbox.iter().map(|v| (m.scale(*v as i32) as i64).into()).collect();
    let ascent = m.scale(m.ascender as i32) as i64;
    let descent = m.scale(m.descender as i32) as i64;
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => font.base_name.as_str(),
        // Nonsymbolic: glyphs are addressed through a standard encoding.
        "Flags" => 32,
        "FontBBox" => bbox,
        "ItalicAngle" => 0,
        "Ascent" => ascent,
        "Descent" => descent,
        "CapHeight" => ascent,
        "StemV" => 80,
        "FontFile2" => file_id,
    });

    let mut differences: Vec<Object> = Vec::new();
    let mut previous: Option<u8> = None;
    for (code, _, name) in glyphs::TURKISH_DIFFERENCES {
        if previous.map(|p| p + 1) != Some(code) {
            differences.push((code as i64).into());
        }
        differences.push(Object::Name(name.as_bytes().to_vec()));
        previous = Some(code);
    }

    let widths: Vec<Object> = font
        .widths
        .pdf_widths()
        .into_iter()
        .map(|w| (w as i64).into())
        .collect();

    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => font.base_name.as_str(),
        "FirstChar" => 32,
        "LastChar" => 255,
        "Widths" => widths,
        "FontDescriptor" => descriptor_id,
        "Encoding" => dictionary! {
            "Type" => "Encoding",
            "BaseEncoding" => "WinAnsiEncoding",
            "Differences" => differences,
        },
    })
}

// ── Page writer ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
enum Align {
    Left,
    Center,
}

struct PageWriter<'a> {
    config: &'a RendererConfig,
    fonts: &'a FontSet,
    cursor: f32,
    current: Vec<Operation>,
    pages: Vec<Vec<Operation>>,
}

impl<'a> PageWriter<'a> {
    fn new(config: &'a RendererConfig, fonts: &'a FontSet) -> Self {
        Self {
            config,
            fonts,
            cursor: config.page_height - config.margin,
            current: Vec::new(),
            pages: Vec::new(),
        }
    }

    fn usable_width(&self) -> f32 {
        self.config.page_width - 2.0 * self.config.margin
    }

    fn ensure(&mut self, height: f32) {
        if self.cursor - height < self.config.margin && !self.current.is_empty() {
            self.pages.push(std::mem::take(&mut self.current));
            self.cursor = self.config.page_height - self.config.margin;
        }
    }

    fn gap(&mut self, height: f32) {
        self.cursor -= height;
    }

    fn line(&mut self, text: &str, style: Style, size: f32, align: Align, rgb: (f32, f32, f32)) {
        let leading = size * 1.3;
        self.ensure(leading);
        self.cursor -= leading;
        let x = match align {
            Align::Left => self.config.margin,
            Align::Center => {
                let w = self.fonts.measure(text, style, size);
                self.config.margin + ((self.usable_width() - w) / 2.0).max(0.0)
            }
        };
        // The embedded font has a single face: fake bold with fill+stroke and
        // italic with a skewed text matrix.
        let embedded = matches!(self.fonts, FontSet::Embedded(_));
        let skew = if embedded && style == Style::Italic { 0.2f32 } else { 0.0 };
        let render_mode: i64 = if embedded && style == Style::Bold { 2 } else { 0 };

        self.current.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(self.fonts.resource_name(style).as_bytes().to_vec()), size.into()]),
            Operation::new("rg", vec![rgb.0.into(), rgb.1.into(), rgb.2.into()]),
            Operation::new("RG", vec![rgb.0.into(), rgb.1.into(), rgb.2.into()]),
            Operation::new("Tr", vec![render_mode.into()]),
            Operation::new("Tm", vec![1.into(), 0.into(), skew.into(), 1.into(), x.into(), self.cursor.into()]),
            Operation::new("Tj", vec![Object::string_literal(self.fonts.encode(text))]),
            Operation::new("ET", vec![]),
        ]);
    }

    fn wrapped(&mut self, text: &str, style: Style, size: f32) {
        let max = self.usable_width();
        let fonts = self.fonts;
        for paragraph in text.split('\n') {
            for line in wrap(paragraph, max, |s| fonts.measure(s, style, size)) {
                self.line(&line, style, size, Align::Left, (0.0, 0.0, 0.0));
            }
        }
    }

    fn rule(&mut self, rgb: (f32, f32, f32)) {
        let y = self.cursor - 3.0;
        let left = self.config.margin;
        let right = self.config.page_width - self.config.margin;
        self.current.extend([
            Operation::new("RG", vec![rgb.0.into(), rgb.1.into(), rgb.2.into()]),
            Operation::new("w", vec![0.5f32.into()]),
            Operation::new("m", vec![left.into(), y.into()]),
            Operation::new("l", vec![right.into(), y.into()]),
            Operation::new("S", vec![]),
        ]);
        self.cursor = y - 4.0;
    }

    fn header(&mut self, p: &CandidateProfile) {
        if !p.name.trim().is_empty() {
            self.line(p.name.trim(), Style::Bold, 16.0, Align::Center, (0.0, 0.0, 0.0));
        }
        if !p.title.trim().is_empty() {
            self.line(p.title.trim(), Style::Italic, 12.0, Align::Center, (0.0, 0.0, 0.0));
        }
        let details = join_non_empty(&[&p.location, &p.contact], " | ");
        if !details.is_empty() {
            self.line(&details, Style::Regular, 10.0, Align::Center, (0.3, 0.3, 0.3));
        }
        self.gap(10.0);
    }

    fn section(&mut self, section: &PlannedSection) {
        // Keep a heading with at least its first line.
        self.ensure(12.0 * 1.3 + 8.0 + 10.0 * 1.3);
        self.line(section.kind.heading(), Style::Bold, 12.0, Align::Left, HEADING_RGB);
        self.rule(HEADING_RGB);
        for entry in &section.entries {
            if let Some(lead) = &entry.lead {
                self.wrapped(lead, Style::Bold, 10.0);
            }
            if !entry.body.trim().is_empty() {
                self.wrapped(entry.body.trim(), Style::Regular, 10.0);
            }
            self.gap(4.0);
        }
        self.gap(6.0);
    }

    fn finish(mut self) -> Vec<Vec<Operation>> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

/// Greedy word wrap; words wider than `max` are split by character.
fn wrap(text: &str, max: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if measure(&candidate) <= max {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if measure(word) <= max {
            current = word.to_string();
        } else {
            for c in word.chars() {
                current.push(c);
                if measure(&current) > max && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::replace(&mut current, c.to_string()));
                }
            }
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}
