//! Character handling for the résumé renderer.
//!
//! Two font paths exist and this module serves both:
//!
//! * **Built-in Helvetica** (no font asset on disk). Only ASCII is safe, so
//!   the renderer runs [`transliterate`] over the whole profile once and then
//!   measures with [`HELVETICA_WIDTHS`].
//! * **Embedded TrueType** (e.g. `DejaVuSans.ttf`). Text is encoded as
//!   WinAnsi with a `/Differences` patch that maps six otherwise unused codes
//!   to the Turkish letters WinAnsi lacks, and widths come from the font's
//!   own `hmtx` table via [`TrueTypeMetrics`].

use std::collections::BTreeMap;

// ── Transliteration ──────────────────────────────────────────────────────

/// ASCII substitute for a single character, if one is known.
fn ascii_substitute(c: char) -> Option<&'static str> {
    Some(match c {
        'ç' => "c",
        'Ç' => "C",
        'ğ' => "g",
        'Ğ' => "G",
        'ı' | 'í' | 'ì' | 'î' | 'ï' => "i",
        'İ' | 'Í' | 'Ì' | 'Î' | 'Ï' => "I",
        'ö' | 'ó' | 'ò' | 'ô' | 'õ' | 'ø' => "o",
        'Ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ø' => "O",
        'ş' | 'ś' | 'š' => "s",
        'Ş' | 'Ś' | 'Š' => "S",
        'ü' | 'ú' | 'ù' | 'û' => "u",
        'Ü' | 'Ú' | 'Ù' | 'Û' => "U",
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => "a",
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => "A",
        'é' | 'è' | 'ê' | 'ë' => "e",
        'É' | 'È' | 'Ê' | 'Ë' => "E",
        'ñ' => "n",
        'Ñ' => "N",
        'ý' | 'ÿ' => "y",
        'Ý' | 'Ÿ' => "Y",
        'ž' | 'ź' | 'ż' => "z",
        'Ž' | 'Ź' | 'Ż' => "Z",
        'ß' => "ss",
        'æ' => "ae",
        'Æ' => "AE",
        'œ' => "oe",
        'Œ' => "OE",
        '‘' | '’' | '‚' | '′' => "'",
        '“' | '”' | '„' | '″' => "\"",
        '–' | '—' | '‐' | '‑' | '−' => "-",
        '•' | '·' | '▪' | '◦' => "-",
        '…' => "...",
        '€' => "EUR",
        '™' => "(TM)",
        '©' => "(c)",
        '®' => "(R)",
        _ => return None,
    })
}

/// Reduce `input` to printable ASCII.
///
/// Known letters lose their diacritics, typographic punctuation becomes its
/// ASCII look-alike, whitespace becomes a plain space (newlines survive) and
/// anything else becomes `?`.
pub fn transliterate(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c == '\n' || (c.is_ascii() && !c.is_ascii_control()) {
            out.push(c);
        } else if c.is_whitespace() {
            out.push(' ');
        } else if let Some(sub) = ascii_substitute(c) {
            out.push_str(sub);
        } else if c.is_control() {
            continue;
        } else {
            out.push('?');
        }
    }
    out
}

// ── WinAnsi + Differences ────────────────────────────────────────────────

/// Codes patched through the font's `/Differences` array.
pub const TURKISH_DIFFERENCES: [(u8, char, &str); 6] = [
    (0x81, 'Ğ', "Gbreve"),
    (0x8D, 'ğ', "gbreve"),
    (0x8F, 'Ş', "Scedilla"),
    (0x90, 'ş', "scedilla"),
    (0x9D, 'İ', "Idotaccent"),
    (0x9E, 'ı', "dotlessi"),
];

/// WinAnsi assignments in 0x80..=0x9F (Latin-1 covers 0xA0..=0xFF).
const WIN_ANSI_HIGH: [(u8, char); 27] = [
    (0x80, '€'),
    (0x82, '‚'),
    (0x83, 'ƒ'),
    (0x84, '„'),
    (0x85, '…'),
    (0x86, '†'),
    (0x87, '‡'),
    (0x88, 'ˆ'),
    (0x89, '‰'),
    (0x8A, 'Š'),
    (0x8B, '‹'),
    (0x8C, 'Œ'),
    (0x8E, 'Ž'),
    (0x91, '‘'),
    (0x92, '’'),
    (0x93, '“'),
    (0x94, '”'),
    (0x95, '•'),
    (0x96, '–'),
    (0x97, '—'),
    (0x98, '˜'),
    (0x99, '™'),
    (0x9A, 'š'),
    (0x9B, '›'),
    (0x9C, 'œ'),
    (0x9E, 'ž'),
    (0x9F, 'Ÿ'),
];

/// Unicode character drawn for a single-byte code under the patched encoding.
pub fn patched_code_to_char(code: u8) -> Option<char> {
    if let Some((_, c, _)) = TURKISH_DIFFERENCES.iter().find(|(k, _, _)| *k == code) {
        return Some(*c);
    }
    match code {
        0x20..=0x7E => Some(code as char),
        0xA0..=0xFF => char::from_u32(code as u32),
        _ => WIN_ANSI_HIGH
            .iter()
            .find(|(k, _)| *k == code)
            .map(|(_, c)| *c),
    }
}

fn patched_char_to_code(c: char) -> Option<u8> {
    if let Some((code, _, _)) = TURKISH_DIFFERENCES.iter().find(|(_, k, _)| *k == c) {
        return Some(*code);
    }
    let cp = c as u32;
    match cp {
        0x20..=0x7E | 0xA0..=0xFF => Some(cp as u8),
        _ => WIN_ANSI_HIGH
            .iter()
            // 0x9E belongs to dotlessi under the patch.
            .find(|(k, v)| *v == c && *k != 0x9E)
            .map(|(k, _)| *k),
    }
}

/// Encode `text` for the embedded font (patched WinAnsi).
pub fn encode_patched(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        if let Some(code) = patched_char_to_code(c) {
            out.push(code);
        } else if c.is_whitespace() {
            out.push(b' ');
        } else if let Some(sub) = ascii_substitute(c) {
            out.extend_from_slice(sub.as_bytes());
        } else if !c.is_control() {
            out.push(b'?');
        }
    }
    out
}

/// Encode already-transliterated text for the built-in font.
pub fn encode_ascii(text: &str) -> Vec<u8> {
    text.chars()
        .filter(|c| !c.is_control())
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .collect()
}

// ── Metrics ──────────────────────────────────────────────────────────────

/// Helvetica advance widths (1/1000 em) for codes 32..=126.
pub const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32-47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48-63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64-79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80-95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96-111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 112-126
];

/// Per-code widths for one font, indexed by single-byte code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidthTable {
    widths: [u16; 256],
}

impl WidthTable {
    pub fn helvetica() -> Self {
        let mut widths = [556u16; 256];
        for (i, w) in HELVETICA_WIDTHS.iter().enumerate() {
            widths[32 + i] = *w;
        }
        Self { widths }
    }

    /// Widths for codes 32..=255 under the patched encoding, read from the font.
    pub fn from_truetype(metrics: &TrueTypeMetrics) -> Self {
        let fallback = metrics.advance_for_char(' ').unwrap_or(500);
        let mut widths = [fallback; 256];
        for code in 32u8..=255 {
            if let Some(w) = patched_code_to_char(code).and_then(|c| metrics.advance_for_char(c)) {
                widths[code as usize] = w;
            }
        }
        Self { widths }
    }

    pub fn code_width(&self, code: u8) -> u16 {
        self.widths[code as usize]
    }

    /// Width in points of encoded bytes at `size`.
    pub fn measure(&self, encoded: &[u8], size: f32) -> f32 {
        let units: u32 = encoded.iter().map(|b| self.code_width(*b) as u32).sum();
        units as f32 * size / 1000.0
    }

    /// `/Widths` entries for `/FirstChar 32 /LastChar 255`.
    pub fn pdf_widths(&self) -> Vec<u16> {
        self.widths[32..].to_vec()
    }
}

/// The handful of TrueType tables needed to embed and measure a font.
#[derive(Debug, Clone)]
pub struct TrueTypeMetrics {
    pub units_per_em: u16,
    pub bbox: [i16; 4],
    pub ascender: i16,
    pub descender: i16,
    advances: Vec<u16>,
    cmap: BTreeMap<u32, u16>,
}

fn read_u16(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..pos + 2).map(|b| u16::from_be_bytes([b[0], b[1]]))
}

fn read_i16(data: &[u8], pos: usize) -> Option<i16> {
    read_u16(data, pos).map(|v| v as i16)
}

fn read_u32(data: &[u8], pos: usize) -> Option<u32> {
    data.get(pos..pos + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

impl TrueTypeMetrics {
    /// Parse `head`, `hhea`, `hmtx` and the Unicode BMP `cmap` subtable.
    ///
    /// Only the characters the patched encoding can emit are looked up, so
    /// the cmap map stays small. Returns `None` for anything that is not a
    /// well-formed TrueType font with a format-4 Unicode cmap.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let num_tables = read_u16(data, 4)? as usize;
        let mut tables: BTreeMap<[u8; 4], usize> = BTreeMap::new();
        for i in 0..num_tables {
            let rec = 12 + i * 16;
            let tag: [u8; 4] = data.get(rec..rec + 4)?.try_into().ok()?;
            tables.insert(tag, read_u32(data, rec + 8)? as usize);
        }

        let head = *tables.get(b"head")?;
        let units_per_em = read_u16(data, head + 18)?;
        if units_per_em == 0 {
            return None;
        }
        let bbox = [
            read_i16(data, head + 36)?,
            read_i16(data, head + 38)?,
            read_i16(data, head + 40)?,
            read_i16(data, head + 42)?,
        ];

        let hhea = *tables.get(b"hhea")?;
        let ascender = read_i16(data, hhea + 4)?;
        let descender = read_i16(data, hhea + 6)?;
        let metric_count = read_u16(data, hhea + 34)? as usize;

        let hmtx = *tables.get(b"hmtx")?;
        let advances = (0..metric_count)
            .map(|i| read_u16(data, hmtx + i * 4))
            .collect::<Option<Vec<_>>>()?;
        if advances.is_empty() {
            return None;
        }

        let cmap_offset = *tables.get(b"cmap")?;
        let subtable = find_unicode_subtable(data, cmap_offset)?;
        let mut cmap = BTreeMap::new();
        for code in 32u8..=255 {
            if let Some(c) = patched_code_to_char(code) {
                if let Some(glyph) = format4_lookup(data, subtable, c as u32) {
                    cmap.insert(c as u32, glyph);
                }
            }
        }

        Some(Self {
            units_per_em,
            bbox,
            ascender,
            descender,
            advances,
            cmap,
        })
    }

    /// Advance width in 1/1000 em, if the font maps `c`.
    pub fn advance_for_char(&self, c: char) -> Option<u16> {
        let glyph = *self.cmap.get(&(c as u32))? as usize;
        // Glyphs past numberOfHMetrics reuse the last advance.
        let advance = self
            .advances
            .get(glyph)
            .or_else(|| self.advances.last())
            .copied()?;
        Some(self.scale(advance as i32).clamp(0, u16::MAX as i32) as u16)
    }

    /// Convert font units to 1/1000 em.
    pub fn scale(&self, units: i32) -> i32 {
        units * 1000 / self.units_per_em as i32
    }
}

fn find_unicode_subtable(data: &[u8], cmap: usize) -> Option<usize> {
    let count = read_u16(data, cmap + 2)? as usize;
    let mut fallback = None;
    for i in 0..count {
        let rec = cmap + 4 + i * 8;
        let platform = read_u16(data, rec)?;
        let encoding = read_u16(data, rec + 2)?;
        let offset = cmap + read_u32(data, rec + 4)? as usize;
        if read_u16(data, offset)? != 4 {
            continue;
        }
        match (platform, encoding) {
            (3, 1) => return Some(offset),
            (0, _) => fallback = fallback.or(Some(offset)),
            _ => {}
        }
    }
    fallback
}

fn format4_lookup(data: &[u8], sub: usize, code: u32) -> Option<u16> {
    if code > 0xFFFF {
        return None;
    }
    let seg_count = read_u16(data, sub + 6)? as usize / 2;
    let end_codes = sub + 14;
    let start_codes = end_codes + seg_count * 2 + 2;
    let id_deltas = start_codes + seg_count * 2;
    let id_range_offsets = id_deltas + seg_count * 2;

    for i in 0..seg_count {
        let end = read_u16(data, end_codes + i * 2)? as u32;
        if end < code {
            continue;
        }
        let start = read_u16(data, start_codes + i * 2)? as u32;
        if start > code {
            return None;
        }
        let delta = read_u16(data, id_deltas + i * 2)?;
        let range_pos = id_range_offsets + i * 2;
        let range_offset = read_u16(data, range_pos)? as usize;
        let glyph = if range_offset == 0 {
            (code as u16).wrapping_add(delta)
        } else {
            let pos = range_pos + range_offset + (code - start) as usize * 2;
            match read_u16(data, pos)? {
                0 => 0,
                g => g.wrapping_add(delta),
            }
        };
        return (glyph != 0).then_some(glyph);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turkish_letters_transliterate() {
        assert_eq!(transliterate("Çağrı Şişmanoğlu, İzmir"), "Cagri Sismanoglu, Izmir");
        assert_eq!(transliterate("Öğün Ünal"), "Ogun Unal");
    }

    #[test]
    fn typographic_punctuation_is_flattened() {
        assert_eq!(transliterate("“Lead” – 2019…"), "\"Lead\" - 2019...");
        assert_eq!(transliterate("a\u{a0}b\tc\nd"), "a b c\nd");
    }

    #[test]
    fn unknown_characters_become_question_marks() {
        assert_eq!(transliterate("日本"), "??");
        assert!(transliterate("Ω").is_ascii());
    }

    #[test]
    fn patched_encoding_covers_turkish() {
        assert_eq!(encode_patched("ğ"), vec![0x8D]);
        assert_eq!(encode_patched("İı"), vec![0x9D, 0x9E]);
        assert_eq!(encode_patched("ç"), vec![0xE7]);
        assert_eq!(encode_patched("’"), vec![0x92]);
        // ž lost its slot to dotlessi; it falls back to transliteration.
        assert_eq!(encode_patched("ž"), b"z".to_vec());
    }

    #[test]
    fn codes_round_trip_through_the_patch() {
        for (code, c, _) in TURKISH_DIFFERENCES {
            assert_eq!(patched_code_to_char(code), Some(c));
            assert_eq!(patched_char_to_code(c), Some(code));
        }
    }

    #[test]
    fn helvetica_measure() {
        let table = WidthTable::helvetica();
        assert_eq!(table.code_width(b' '), 278);
        assert_eq!(table.code_width(b'W'), 944);
        let w = table.measure(b"ab", 10.0);
        assert!((w - 11.12).abs() < 0.01, "got {w}");
        assert_eq!(table.pdf_widths().len(), 224);
    }

    #[test]
    fn wide_advances_saturate_for_small_em_squares() {
        let metrics = TrueTypeMetrics {
            units_per_em: 16,
            bbox: [0, 0, 16, 16],
            ascender: 12,
            descender: -4,
            advances: vec![8, 4000],
            cmap: BTreeMap::from([(u32::from('a'), 0), (u32::from('W'), 1)]),
        };
        assert_eq!(metrics.advance_for_char('a'), Some(500));
        assert_eq!(metrics.advance_for_char('W'), Some(u16::MAX));
        assert_eq!(metrics.advance_for_char('z'), None);
    }

    #[test]
    fn garbage_is_not_a_font() {
        assert!(TrueTypeMetrics::parse(b"not a font at all").is_none());
        assert!(TrueTypeMetrics::parse(&[]).is_none());
    }
}
