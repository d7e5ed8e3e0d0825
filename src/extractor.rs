//! Positioned text and image placements from PDF content streams
//!
//! Walks a page's content stream with lopdf, tracking the graphics state
//! (CTM) and text state (text/line matrices, font) so every shown string and
//! every painted image XObject can be placed in page space.
//!
//! Coordinates produced here keep the PDF convention (origin bottom-left,
//! y grows upwards) and are scaled by the render scale, so they share units
//! with the rendered raster but NOT its y direction. Callers flip with
//! [`crate::associate::to_top_down`].

use crate::tounicode::ToUnicodeCMap;
use crate::CatalogError;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::{BTreeMap, HashMap};

/// A positioned fragment of page text
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    /// The text content
    pub text: String,
    /// Anchor x in page pixel space
    pub x: f32,
    /// Anchor y in page pixel space (direction depends on the producer)
    pub y: f32,
    /// Rendered font size; larger runs are more likely to be titles
    pub font_weight: f32,
}

impl TextRun {
    pub fn new(text: impl Into<String>, x: f32, y: f32, font_weight: f32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            font_weight,
        }
    }
}

/// An image XObject painted on the page
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    /// Resource name of the XObject (without the leading slash)
    pub name: Vec<u8>,
    /// CTM at the `Do` operator; maps the unit square onto the page
    pub ctm: [f32; 6],
}

impl ImagePlacement {
    /// Bounding box of the placed unit square in PDF points:
    /// (x_min, y_min, x_max, y_max), bottom-up
    pub fn bbox(&self) -> (f32, f32, f32, f32) {
        let corners = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)];
        let mut x_min = f32::INFINITY;
        let mut y_min = f32::INFINITY;
        let mut x_max = f32::NEG_INFINITY;
        let mut y_max = f32::NEG_INFINITY;
        for (u, v) in corners {
            let x = self.ctm[0] * u + self.ctm[2] * v + self.ctm[4];
            let y = self.ctm[1] * u + self.ctm[3] * v + self.ctm[5];
            x_min = x_min.min(x);
            y_min = y_min.min(y);
            x_max = x_max.max(x);
            y_max = y_max.max(y);
        }
        (x_min, y_min, x_max, y_max)
    }
}

/// Everything the pipeline needs from one page's content stream
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub runs: Vec<TextRun>,
    pub images: Vec<ImagePlacement>,
}

/// Multiply two 2D transformation matrices
/// Matrix format: [a, b, c, d, e, f] representing:
/// | a  b  0 |
/// | c  d  0 |
/// | e  f  1 |
pub(crate) fn multiply_matrices(m1: &[f32; 6], m2: &[f32; 6]) -> [f32; 6] {
    [
        m1[0] * m2[0] + m1[1] * m2[2],
        m1[0] * m2[1] + m1[1] * m2[3],
        m1[2] * m2[0] + m1[3] * m2[2],
        m1[2] * m2[1] + m1[3] * m2[3],
        m1[4] * m2[0] + m1[5] * m2[2] + m2[4],
        m1[4] * m2[1] + m1[5] * m2[3] + m2[5],
    ]
}

/// Per-font decoding information, resolved once per page
struct FontDecoder<'a> {
    dict: &'a Dictionary,
    cmap: Option<ToUnicodeCMap>,
    two_byte: bool,
}

/// Text state carried across operators
struct TextState {
    font: Vec<u8>,
    font_size: f32,
    text_matrix: [f32; 6],
    line_matrix: [f32; 6],
    leading: f32,
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Walk a page's content stream, collecting text runs and image placements.
/// Positions are multiplied by `scale`.
pub fn extract_page_content(
    doc: &Document,
    page_id: ObjectId,
    scale: f32,
) -> Result<PageContent, CatalogError> {
    let fonts = doc.get_page_fonts(page_id).unwrap_or_default();
    let decoders = build_decoders(doc, &fonts);

    let content_data = doc
        .get_page_content(page_id)
        .map_err(|e| CatalogError::InvalidDocument(e.to_string()))?;
    let content =
        Content::decode(&content_data).map_err(|e| CatalogError::InvalidDocument(e.to_string()))?;

    let mut page = PageContent::default();

    let mut ctm = IDENTITY;
    let mut ctm_stack: Vec<[f32; 6]> = Vec::new();
    let mut state = TextState {
        font: Vec::new(),
        font_size: 12.0,
        text_matrix: IDENTITY,
        line_matrix: IDENTITY,
        leading: 0.0,
    };
    let mut in_text_block = false;

    for op in &content.operations {
        match op.operator.as_str() {
            "q" => ctm_stack.push(ctm),
            "Q" => {
                if let Some(saved) = ctm_stack.pop() {
                    ctm = saved;
                }
            }
            "cm" => {
                if op.operands.len() >= 6 {
                    let m = read_matrix(&op.operands);
                    ctm = multiply_matrices(&m, &ctm);
                }
            }
            "Do" => {
                if let Some(Ok(name)) = op.operands.first().map(|o| o.as_name()) {
                    page.images.push(ImagePlacement {
                        name: name.to_vec(),
                        ctm,
                    });
                }
            }
            "BT" => {
                in_text_block = true;
                state.text_matrix = IDENTITY;
                state.line_matrix = IDENTITY;
            }
            "ET" => in_text_block = false,
            "Tf" => {
                if op.operands.len() >= 2 {
                    if let Ok(name) = op.operands[0].as_name() {
                        state.font = name.to_vec();
                    }
                    if let Some(size) = get_number(&op.operands[1]) {
                        state.font_size = size;
                    }
                }
            }
            "TL" => {
                if let Some(leading) = op.operands.first().and_then(get_number) {
                    state.leading = leading;
                }
            }
            "Td" | "TD" => {
                if op.operands.len() >= 2 {
                    let tx = get_number(&op.operands[0]).unwrap_or(0.0);
                    let ty = get_number(&op.operands[1]).unwrap_or(0.0);
                    if op.operator == "TD" {
                        state.leading = -ty;
                    }
                    let translate = [1.0, 0.0, 0.0, 1.0, tx, ty];
                    state.line_matrix = multiply_matrices(&translate, &state.line_matrix);
                    state.text_matrix = state.line_matrix;
                }
            }
            "Tm" => {
                if op.operands.len() >= 6 {
                    state.line_matrix = read_matrix(&op.operands);
                    state.text_matrix = state.line_matrix;
                }
            }
            "T*" => next_line(&mut state),
            "Tj" | "'" | "\"" => {
                if op.operator != "Tj" {
                    next_line(&mut state);
                }
                // `"` carries word and char spacing before the string
                let operand = if op.operator == "\"" {
                    op.operands.get(2)
                } else {
                    op.operands.first()
                };
                if in_text_block {
                    if let Some(text) =
                        operand.and_then(|o| decode_operand(o, doc, &decoders, &state.font))
                    {
                        push_run(&mut page.runs, text, &state, &ctm, scale);
                    }
                }
            }
            "TJ" => {
                if in_text_block {
                    if let Some(Ok(array)) = op.operands.first().map(|o| o.as_array()) {
                        let mut combined = String::new();
                        for item in array {
                            if let Some(text) = decode_operand(item, doc, &decoders, &state.font) {
                                combined.push_str(&text);
                            } else if let Some(adjust) = get_number(item) {
                                // Large negative kerning is a word gap
                                if adjust < -200.0 && !combined.ends_with(' ') {
                                    combined.push(' ');
                                }
                            }
                        }
                        push_run(&mut page.runs, combined, &state, &ctm, scale);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(page)
}

fn next_line(state: &mut TextState) {
    let leading = if state.leading != 0.0 {
        state.leading
    } else {
        state.font_size * 1.2
    };
    let translate = [1.0, 0.0, 0.0, 1.0, 0.0, -leading];
    state.line_matrix = multiply_matrices(&translate, &state.line_matrix);
    state.text_matrix = state.line_matrix;
}

fn push_run(runs: &mut Vec<TextRun>, text: String, state: &TextState, ctm: &[f32; 6], scale: f32) {
    if text.trim().is_empty() {
        return;
    }
    let combined = multiply_matrices(&state.text_matrix, ctm);
    let weight = effective_font_size(state.font_size, &combined);
    runs.push(TextRun {
        text,
        x: combined[4] * scale,
        y: combined[5] * scale,
        font_weight: weight * scale,
    });
}

fn read_matrix(operands: &[Object]) -> [f32; 6] {
    let mut m = IDENTITY;
    for (i, operand) in operands.iter().take(6).enumerate() {
        m[i] = get_number(operand).unwrap_or(IDENTITY[i]);
    }
    m
}

/// Helper to get f32 from Object
pub(crate) fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Compute effective font size from base size and the text rendering matrix
fn effective_font_size(base_size: f32, matrix: &[f32; 6]) -> f32 {
    let scale_x = (matrix[0].powi(2) + matrix[1].powi(2)).sqrt();
    let scale_y = (matrix[2].powi(2) + matrix[3].powi(2)).sqrt();
    base_size * scale_x.max(scale_y)
}

fn build_decoders<'a>(
    doc: &'a Document,
    fonts: &BTreeMap<Vec<u8>, &'a Dictionary>,
) -> HashMap<Vec<u8>, FontDecoder<'a>> {
    fonts
        .iter()
        .map(|(name, dict)| {
            let two_byte = dict
                .get(b"Subtype")
                .and_then(|s| s.as_name())
                .map(|n| n == b"Type0")
                .unwrap_or(false);
            let decoder = FontDecoder {
                dict: *dict,
                cmap: ToUnicodeCMap::from_font(doc, dict),
                two_byte,
            };
            (name.clone(), decoder)
        })
        .collect()
}

/// Decode a string operand using the current font
fn decode_operand(
    obj: &Object,
    doc: &Document,
    decoders: &HashMap<Vec<u8>, FontDecoder<'_>>,
    current_font: &[u8],
) -> Option<String> {
    let Object::String(bytes, _) = obj else {
        return None;
    };

    if let Some(decoder) = decoders.get(current_font) {
        if let Some(cmap) = &decoder.cmap {
            return Some(cmap.decode(bytes, decoder.two_byte));
        }
        if !decoder.two_byte {
            if let Ok(encoding) = decoder.dict.get_font_encoding(doc) {
                if let Ok(text) = Document::decode_text(&encoding, bytes) {
                    return Some(text);
                }
            }
        }
    }

    // UTF-16BE with BOM, then Latin-1
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return Some(String::from_utf16_lossy(&utf16));
    }
    Some(bytes.iter().map(|&b| b as char).collect())
}

/// Look up a page attribute, following the `Parent` chain for inherited keys
pub(crate) fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut node = doc.get_dictionary(page_id).ok()?;
    // Page trees are shallow; the bound only guards against cycles
    for _ in 0..32 {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Resolve an object that may be an indirect reference
pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Page size in PDF points from the (possibly inherited) MediaBox.
/// Falls back to US Letter when absent or malformed.
pub fn page_size_points(doc: &Document, page_id: ObjectId) -> (f32, f32) {
    let media_box = inherited_attribute(doc, page_id, b"MediaBox")
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_array().ok())
        .and_then(|arr| {
            let nums: Vec<f32> = arr.iter().filter_map(get_number).collect();
            (nums.len() == 4).then(|| ((nums[2] - nums[0]).abs(), (nums[3] - nums[1]).abs()))
        });
    match media_box {
        Some((w, h)) if w > 0.0 && h > 0.0 => (w, h),
        _ => (612.0, 792.0),
    }
}
