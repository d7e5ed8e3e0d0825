//! Page rendering collaborators
//!
//! The pipeline only needs two capabilities from a PDF backend: a raster of
//! each page and the positioned text runs on it. [`PageSource`] is that seam.
//! [`LopdfPageSource`] implements it with lopdf by compositing the page's
//! placed image XObjects onto a white canvas, which is what a photo grid
//! catalog page mostly consists of. Vector artwork and glyph outlines are not
//! painted.

use crate::extractor::{
    extract_page_content, get_number, inherited_attribute, page_size_points, resolve,
    ImagePlacement, PageContent, TextRun,
};
use crate::grid::Rect;
use crate::raster::RasterImage;
use crate::CatalogError;
use flate2::read::ZlibDecoder;
use image::imageops::{self, FilterType};
use image::RgbImage;
use log::debug;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// An image painted on a page, with its placement in top-down pixel space
#[derive(Debug, Clone)]
pub struct PlacedImage {
    /// Position of the XObject among the page's `Do` operators
    pub index: usize,
    pub bounds: Rect,
    /// Decoded pixels at the image's native resolution
    pub image: RasterImage,
}

/// One page rendered and read in a single pass
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub raster: RasterImage,
    /// Bottom-up text runs, as returned by [`PageSource::extract_text`]
    pub runs: Vec<TextRun>,
    /// Empty unless placed images were requested
    pub placed: Vec<PlacedImage>,
}

/// Rendering and text location capability for one opened document
pub trait PageSource {
    fn page_count(&self) -> usize;

    /// Page width and height in points
    fn page_size(&self, page_index: usize) -> Result<(f32, f32), CatalogError>;

    /// Rasterize page `page_index` (0-based) at `scale` pixels per point
    fn render(&self, page_index: usize, scale: f32) -> Result<RasterImage, CatalogError>;

    /// Text runs of the page in pixel units at `scale`, with the PDF's
    /// bottom-up y axis (y = 0 at the bottom edge of the page)
    fn extract_text(&self, page_index: usize, scale: f32) -> Result<Vec<TextRun>, CatalogError>;

    /// Images placed on the page, in top-down pixel space at `scale`
    fn placed_images(
        &self,
        _page_index: usize,
        _scale: f32,
    ) -> Result<Vec<PlacedImage>, CatalogError> {
        Ok(Vec::new())
    }

    /// Render the page and locate its text, plus its placed images when
    /// `with_images` is set. Backends that parse the page content once for
    /// all three should override this.
    fn analyze(
        &self,
        page_index: usize,
        scale: f32,
        with_images: bool,
    ) -> Result<PageAnalysis, CatalogError> {
        let raster = self.render(page_index, scale)?;
        let runs = self.extract_text(page_index, scale)?;
        let placed = if with_images {
            self.placed_images(page_index, scale)?
        } else {
            Vec::new()
        };
        Ok(PageAnalysis {
            raster,
            runs,
            placed,
        })
    }
}

/// Largest canvas [`LopdfPageSource`] allocates, whatever the scale
pub const MAX_CANVAS_PIXELS: u64 = 100_000_000;

/// lopdf-backed page source
pub struct LopdfPageSource {
    doc: Document,
    pages: Vec<ObjectId>,
}

impl LopdfPageSource {
    /// Open a PDF from memory
    pub fn load_mem(buffer: &[u8]) -> Result<Self, CatalogError> {
        let doc = Document::load_mem(buffer)?;
        Self::from_document(doc)
    }

    /// Open a PDF file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let doc = Document::load(path)?;
        Self::from_document(doc)
    }

    pub fn from_document(doc: Document) -> Result<Self, CatalogError> {
        if doc.is_encrypted() {
            return Err(CatalogError::InvalidDocument("PDF is encrypted".into()));
        }
        let pages: Vec<ObjectId> = doc.get_pages().values().copied().collect();
        if pages.is_empty() {
            return Err(CatalogError::InvalidDocument("PDF has no pages".into()));
        }
        Ok(Self { doc, pages })
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    fn page_id(&self, page_index: usize) -> Result<ObjectId, CatalogError> {
        self.pages
            .get(page_index)
            .copied()
            .ok_or_else(|| CatalogError::Render {
                page: page_index + 1,
                message: format!("page out of range (document has {})", self.pages.len()),
            })
    }

    /// White page canvas, refused when it would exceed [`MAX_CANVAS_PIXELS`]
    fn canvas(
        &self,
        page_index: usize,
        page_id: ObjectId,
        scale: f32,
    ) -> Result<RasterImage, CatalogError> {
        let (width, height) = page_size_points(&self.doc, page_id);
        let (w, h) = canvas_size(width, height, scale).ok_or_else(|| CatalogError::Render {
            page: page_index + 1,
            message: format!(
                "{width}x{height} pt page at scale {scale} exceeds {MAX_CANVAS_PIXELS} pixels"
            ),
        })?;
        Ok(RasterImage::blank(w, h))
    }

    /// Image XObjects from the page's (possibly inherited) resources
    fn image_xobjects(&self, page_id: ObjectId) -> HashMap<Vec<u8>, &Stream> {
        let mut images = HashMap::new();
        let resources = inherited_attribute(&self.doc, page_id, b"Resources")
            .and_then(|o| resolve(&self.doc, o))
            .and_then(|o| o.as_dict().ok());
        let xobjects = resources
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|o| resolve(&self.doc, o))
            .and_then(|o| o.as_dict().ok());

        if let Some(xobjects) = xobjects {
            for (name, value) in xobjects.iter() {
                let Some(Ok(stream)) = resolve(&self.doc, value).map(|o| o.as_stream()) else {
                    continue;
                };
                let is_image = stream
                    .dict
                    .get(b"Subtype")
                    .and_then(|s| s.as_name())
                    .map(|n| n == b"Image")
                    .unwrap_or(false);
                if is_image {
                    images.insert(name.clone(), stream);
                }
            }
        }
        images
    }

    /// Decode every placed image of a page and compute its pixel bounds.
    /// Each XObject is decoded once however often it is drawn.
    fn decode_placements(
        &self,
        page_index: usize,
        page_id: ObjectId,
        content: &PageContent,
        scale: f32,
    ) -> Vec<PlacedImage> {
        let (_, page_height) = page_size_points(&self.doc, page_id);
        let xobjects = self.image_xobjects(page_id);

        let mut placed = Vec::new();
        let mut cache: HashMap<&[u8], RasterImage> = HashMap::new();
        for (index, placement) in content.images.iter().enumerate() {
            let Some(stream) = xobjects.get(&placement.name) else {
                continue;
            };
            let image = match cache.get(placement.name.as_slice()) {
                Some(image) => image.clone(),
                None => match decode_image_stream(&self.doc, stream) {
                    Ok(image) => {
                        cache.insert(placement.name.as_slice(), image.clone());
                        image
                    }
                    Err(reason) => {
                        debug!(
                            "page {}: skipping image /{}: {}",
                            page_index + 1,
                            String::from_utf8_lossy(&placement.name),
                            reason
                        );
                        continue;
                    }
                },
            };
            placed.push(PlacedImage {
                index,
                bounds: placement_rect(placement, page_height, scale),
                image,
            });
        }
        placed
    }
}

impl PageSource for LopdfPageSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, page_index: usize) -> Result<(f32, f32), CatalogError> {
        Ok(page_size_points(&self.doc, self.page_id(page_index)?))
    }

    fn render(&self, page_index: usize, scale: f32) -> Result<RasterImage, CatalogError> {
        Ok(self.analyze(page_index, scale, false)?.raster)
    }

    fn extract_text(&self, page_index: usize, scale: f32) -> Result<Vec<TextRun>, CatalogError> {
        let page_id = self.page_id(page_index)?;
        Ok(extract_page_content(&self.doc, page_id, scale)?.runs)
    }

    fn placed_images(
        &self,
        page_index: usize,
        scale: f32,
    ) -> Result<Vec<PlacedImage>, CatalogError> {
        let page_id = self.page_id(page_index)?;
        let content = extract_page_content(&self.doc, page_id, scale)?;
        Ok(self.decode_placements(page_index, page_id, &content, scale))
    }

    fn analyze(
        &self,
        page_index: usize,
        scale: f32,
        with_images: bool,
    ) -> Result<PageAnalysis, CatalogError> {
        let page_id = self.page_id(page_index)?;
        let mut raster = self.canvas(page_index, page_id, scale)?;
        let content = extract_page_content(&self.doc, page_id, scale)?;
        let placed = self.decode_placements(page_index, page_id, &content, scale);
        for image in &placed {
            composite(&mut raster, image);
        }
        Ok(PageAnalysis {
            raster,
            runs: content.runs,
            placed: if with_images { placed } else { Vec::new() },
        })
    }
}

/// Canvas dimensions for a page, or `None` past [`MAX_CANVAS_PIXELS`]
fn canvas_size(width: f32, height: f32, scale: f32) -> Option<(u32, u32)> {
    let w = (f64::from(width) * f64::from(scale)).round().max(1.0);
    let h = (f64::from(height) * f64::from(scale)).round().max(1.0);
    if !(w * h <= MAX_CANVAS_PIXELS as f64) {
        return None;
    }
    Some((w as u32, h as u32))
}

/// Paint a placed image onto the canvas. Only the part of the placement
/// that lands on the canvas is resampled.
fn composite(canvas: &mut RasterImage, placed: &PlacedImage) {
    let page = Rect::new(0.0, 0.0, canvas.width() as f32, canvas.height() as f32);
    let Some(visible) = placed.bounds.intersection(&page) else {
        return;
    };
    let (w, h) = (visible.width.round() as u32, visible.height.round() as u32);
    if w == 0 || h == 0 {
        return;
    }

    let bounds = placed.bounds;
    let sx = placed.image.width() as f32 / bounds.width;
    let sy = placed.image.height() as f32 / bounds.height;
    let source = placed.image.crop(&Rect::new(
        (visible.x - bounds.x) * sx,
        (visible.y - bounds.y) * sy,
        visible.width * sx,
        visible.height * sy,
    ));
    if source.width() == 0 || source.height() == 0 {
        return;
    }
    let scaled = imageops::resize(source.as_rgb(), w, h, FilterType::Triangle);
    canvas.overlay(&scaled, visible.x.round() as i64, visible.y.round() as i64);
}

/// Map a placement's unit square to a top-down pixel rectangle
fn placement_rect(placement: &ImagePlacement, page_height: f32, scale: f32) -> Rect {
    let (x_min, y_min, x_max, y_max) = placement.bbox();
    Rect::new(
        x_min * scale,
        (page_height - y_max) * scale,
        (x_max - x_min) * scale,
        (y_max - y_min) * scale,
    )
}

fn filter_names(dict: &Dictionary) -> Vec<Vec<u8>> {
    match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|o| o.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

fn dict_number(dict: &Dictionary, key: &[u8]) -> Option<f32> {
    dict.get(key).ok().and_then(get_number)
}

/// Decode an image XObject to RGB. Supports DCTDecode, and 8-bit
/// FlateDecode/unfiltered samples in Gray, RGB and CMYK.
pub(crate) fn decode_image_stream(doc: &Document, stream: &Stream) -> Result<RasterImage, String> {
    let filters = filter_names(&stream.dict);

    // A leading FlateDecode may wrap any other encoding
    let (data, rest) = match filters.split_first() {
        Some((first, rest)) if first == b"FlateDecode" => (inflate(&stream.content)?, rest),
        _ => (stream.content.clone(), filters.as_slice()),
    };

    if rest.len() == 1 && rest[0] == b"DCTDecode" {
        let img = image::load_from_memory_with_format(&data, image::ImageFormat::Jpeg)
            .map_err(|e| format!("JPEG decode failed: {e}"))?;
        return Ok(RasterImage::from_rgb(img.to_rgb8()));
    }
    if !rest.is_empty() {
        let names: Vec<String> = filters
            .iter()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .collect();
        return Err(format!("unsupported filter chain {names:?}"));
    }

    let width = dict_number(&stream.dict, b"Width").unwrap_or(0.0) as u32;
    let height = dict_number(&stream.dict, b"Height").unwrap_or(0.0) as u32;
    if width == 0 || height == 0 {
        return Err("missing image dimensions".into());
    }
    let bits = dict_number(&stream.dict, b"BitsPerComponent").unwrap_or(8.0) as u32;
    if bits != 8 {
        return Err(format!("unsupported BitsPerComponent {bits}"));
    }
    let components = color_components(doc, &stream.dict)?;

    let predictor = stream
        .dict
        .get(b"DecodeParms")
        .ok()
        .and_then(|o| resolve(doc, o))
        .and_then(|o| o.as_dict().ok())
        .and_then(|p| dict_number(p, b"Predictor"))
        .unwrap_or(1.0) as u32;
    let samples = if predictor >= 10 && filters.len() == 1 {
        undo_png_predictor(&data, width as usize * components, components)?
    } else {
        data
    };

    let expected = width as usize * height as usize * components;
    if samples.len() < expected {
        return Err(format!(
            "short sample data: {} bytes, expected {expected}",
            samples.len()
        ));
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for px in samples[..expected].chunks_exact(components) {
        match components {
            1 => rgb.extend_from_slice(&[px[0], px[0], px[0]]),
            3 => rgb.extend_from_slice(px),
            4 => {
                let k = px[3] as u32;
                let channel = |c: u8| (255 - ((c as u32 + k).min(255))) as u8;
                rgb.extend_from_slice(&[channel(px[0]), channel(px[1]), channel(px[2])]);
            }
            _ => unreachable!("component count checked in color_components"),
        }
    }
    RgbImage::from_raw(width, height, rgb)
        .map(RasterImage::from_rgb)
        .ok_or_else(|| "sample buffer size mismatch".to_string())
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut decoder = ZlibDecoder::new(data);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| format!("inflate failed: {e}"))?;
    Ok(raw)
}

fn color_components(doc: &Document, dict: &Dictionary) -> Result<usize, String> {
    let space = dict
        .get(b"ColorSpace")
        .ok()
        .and_then(|o| resolve(doc, o))
        .ok_or("missing ColorSpace")?;
    let components = match space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" => 1,
            b"DeviceRGB" | b"CalRGB" => 3,
            b"DeviceCMYK" => 4,
            other => {
                return Err(format!(
                    "unsupported ColorSpace {}",
                    String::from_utf8_lossy(other)
                ))
            }
        },
        Object::Array(items) => {
            let family: &[u8] = items
                .first()
                .and_then(|o| o.as_name().ok())
                .unwrap_or_default();
            if family != b"ICCBased" {
                return Err(format!(
                    "unsupported ColorSpace family {}",
                    String::from_utf8_lossy(family)
                ));
            }
            items
                .get(1)
                .and_then(|o| resolve(doc, o))
                .and_then(|o| o.as_stream().ok())
                .and_then(|s| dict_number(&s.dict, b"N"))
                .ok_or("ICCBased profile without /N")? as usize
        }
        _ => return Err("malformed ColorSpace".into()),
    };
    match components {
        1 | 3 | 4 => Ok(components),
        n => Err(format!("unsupported component count {n}")),
    }
}

/// Reverse PNG row filters (predictors 10-15)
fn undo_png_predictor(data: &[u8], row_len: usize, bpp: usize) -> Result<Vec<u8>, String> {
    let stride = row_len + 1;
    let mut out = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev = vec![0u8; row_len];
    for row in data.chunks(stride) {
        if row.len() < stride {
            break;
        }
        let filter = row[0];
        let mut cur = row[1..].to_vec();
        for i in 0..row_len {
            let left = if i >= bpp { cur[i - bpp] } else { 0 };
            let up = prev[i];
            let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
            let delta = match filter {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((left as u16 + up as u16) / 2) as u8,
                4 => paeth(left, up, up_left),
                f => return Err(format!("bad PNG filter type {f}")),
            };
            cur[i] = cur[i].wrapping_add(delta);
        }
        out.extend_from_slice(&cur);
        prev = cur;
    }
    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
