//! ToUnicode CMap parsing
//!
//! Catalogs set in CJK fonts almost always use Type0 (CID-keyed) fonts whose
//! string bytes are glyph ids. The font's ToUnicode CMap is the only reliable
//! way back to text, so it is parsed here and consulted before any other
//! decoding.

use lopdf::{Dictionary, Document};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static BFCHAR_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)beginbfchar(.*?)endbfchar").unwrap());
static BFRANGE_SECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)beginbfrange(.*?)endbfrange").unwrap());
static CHAR_PAIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]*)>").unwrap());
static RANGE_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<([0-9A-Fa-f]+)>\s*<([0-9A-Fa-f]+)>\s*(?:<([0-9A-Fa-f]+)>|\[([^\]]*)\])").unwrap()
});
static HEX_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([0-9A-Fa-f]*)>").unwrap());

/// A parsed ToUnicode CMap mapping character codes to Unicode strings
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ToUnicodeCMap {
    /// Direct code -> text mappings (bfchar entries and array-form ranges)
    chars: HashMap<u32, String>,
    /// (first code, last code, first Unicode scalar) ranges
    ranges: Vec<(u32, u32, u32)>,
}

impl ToUnicodeCMap {
    /// Parse a CMap program; `None` when it holds no mappings
    pub fn parse(content: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(content);
        let mut cmap = ToUnicodeCMap::default();

        for section in BFCHAR_SECTION.captures_iter(&text) {
            for pair in CHAR_PAIR.captures_iter(&section[1]) {
                if let (Some(code), Some(dst)) = (parse_code(&pair[1]), utf16_hex(&pair[2])) {
                    cmap.chars.insert(code, dst);
                }
            }
        }

        for section in BFRANGE_SECTION.captures_iter(&text) {
            for entry in RANGE_ENTRY.captures_iter(&section[1]) {
                let (Some(start), Some(end)) = (parse_code(&entry[1]), parse_code(&entry[2])) else {
                    continue;
                };
                if let Some(base) = entry.get(3) {
                    if let Some(base) = parse_code(base.as_str()) {
                        cmap.ranges.push((start, end, base));
                    }
                } else if let Some(array) = entry.get(4) {
                    let targets = HEX_TOKEN.captures_iter(array.as_str());
                    for (code, target) in (start..=end).zip(targets) {
                        if let Some(dst) = utf16_hex(&target[1]) {
                            cmap.chars.insert(code, dst);
                        }
                    }
                }
            }
        }

        if cmap.chars.is_empty() && cmap.ranges.is_empty() {
            None
        } else {
            Some(cmap)
        }
    }

    /// Load the CMap referenced by a font dictionary's `/ToUnicode` entry
    pub fn from_font(doc: &Document, font: &Dictionary) -> Option<Self> {
        let entry = font.get(b"ToUnicode").ok()?;
        let stream = crate::extractor::resolve(doc, entry)?.as_stream().ok()?;
        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        Self::parse(&data)
    }

    pub fn lookup(&self, code: u32) -> Option<String> {
        if let Some(s) = self.chars.get(&code) {
            return Some(s.clone());
        }
        self.ranges
            .iter()
            .find(|(start, end, _)| code >= *start && code <= *end)
            .and_then(|(start, _, base)| base.checked_add(code - start))
            .and_then(char::from_u32)
            .map(|c| c.to_string())
    }

    /// Decode string bytes; `two_byte` selects 2-byte codes (Type0 fonts).
    /// Unmapped codes fall back to the code as a Unicode scalar.
    pub fn decode(&self, bytes: &[u8], two_byte: bool) -> String {
        let width = if two_byte { 2 } else { 1 };
        let mut out = String::new();
        for chunk in bytes.chunks(width) {
            let code = chunk.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
            match self.lookup(code) {
                Some(s) => out.push_str(&s),
                None => {
                    if let Some(c) = char::from_u32(code) {
                        out.push(c);
                    }
                }
            }
        }
        out
    }
}

fn parse_code(hex: &str) -> Option<u32> {
    u32::from_str_radix(hex.trim(), 16).ok()
}

/// Destination strings are UTF-16BE, possibly with surrogate pairs
fn utf16_hex(hex: &str) -> Option<String> {
    let units: Vec<u16> = hex
        .as_bytes()
        .chunks_exact(4)
        .filter_map(|c| std::str::from_utf8(c).ok())
        .filter_map(|s| u16::from_str_radix(s, 16).ok())
        .collect();
    if units.is_empty() {
        None
    } else {
        Some(String::from_utf16_lossy(&units))
    }
}
