//! Embedded image layout
//!
//! Catalogs that are not laid out on a regular grid usually still place one
//! photo per product. In this mode the candidates are the page's placed
//! image XObjects; captions are found by looking below (then above) each
//! photo.

use crate::associate::sort_by_weight;
use crate::classify::BrightnessBand;
use crate::extractor::TextRun;
use crate::grid::Rect;
use crate::raster::RasterImage;
use crate::render::PlacedImage;
use log::debug;
use std::collections::HashSet;

/// Limits on the native pixel size of a product photo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageFilter {
    pub min_side: u32,
    pub max_side: u32,
    pub min_area: u64,
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Placements whose centers are closer than this on both axes overlap
    pub duplicate_radius: f32,
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self {
            min_side: 150,
            max_side: 1500,
            min_area: 40_000,
            min_aspect: 0.5,
            max_aspect: 2.0,
            duplicate_radius: 50.0,
        }
    }
}

impl ImageFilter {
    /// Reason a photo of this size is rejected, if any
    pub fn rejects(&self, width: u32, height: u32) -> Option<&'static str> {
        if width < self.min_side || height < self.min_side {
            return Some("too small");
        }
        if width > self.max_side || height > self.max_side {
            return Some("too large");
        }
        if (width as u64) * (height as u64) < self.min_area {
            return Some("area too small");
        }
        let aspect = width as f32 / height as f32;
        if aspect < self.min_aspect || aspect > self.max_aspect {
            return Some("aspect ratio");
        }
        None
    }
}

/// Where caption text is searched relative to a photo
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionWindow {
    /// Max gap between the photo's bottom edge and the top of a caption
    pub below: f32,
    /// Max gap between a caption's baseline and the photo's top edge
    pub above: f32,
    /// Required horizontal overlap as a fraction of the narrower of the
    /// photo and the caption
    pub min_overlap: f32,
    pub max_runs: usize,
}

impl Default for CaptionWindow {
    fn default() -> Self {
        Self {
            below: 150.0,
            above: 80.0,
            min_overlap: 0.3,
            max_runs: 8,
        }
    }
}

/// A photo accepted as a product, with its caption runs
#[derive(Debug, Clone)]
pub struct EmbeddedCandidate {
    pub image_index: usize,
    pub bounds: Rect,
    pub image: RasterImage,
    /// Caption runs, largest font first
    pub runs: Vec<TextRun>,
}

/// Approximate horizontal extent of a run: one em for wide glyphs
/// (CJK), half an em otherwise
pub fn estimated_width(run: &TextRun) -> f32 {
    run.text
        .chars()
        .map(|c| if c.is_ascii() { 0.5 } else { 1.0 })
        .sum::<f32>()
        * run.font_weight
}

fn run_bounds(run: &TextRun) -> Rect {
    // y is the baseline in top-down space; the glyphs sit above it
    Rect::new(
        run.x,
        run.y - run.font_weight,
        estimated_width(run),
        run.font_weight,
    )
}

/// Drop overlapping placements (keeping the larger photo), identical
/// pixel content and photos outside the size limits. Order of the result
/// is largest native area first.
pub fn select_images(mut images: Vec<PlacedImage>, filter: &ImageFilter) -> Vec<PlacedImage> {
    let area = |p: &PlacedImage| p.image.width() as u64 * p.image.height() as u64;
    images.sort_by(|a, b| area(b).cmp(&area(a)).then(a.index.cmp(&b.index)));

    let mut kept: Vec<PlacedImage> = Vec::new();
    for image in images {
        let (cx, cy) = image.bounds.center();
        let overlaps = kept.iter().any(|k| {
            let (kx, ky) = k.bounds.center();
            (cx - kx).abs() < filter.duplicate_radius
                && (cy - ky).abs() < filter.duplicate_radius
                && area(&image) < area(k)
        });
        if overlaps {
            debug!("image {}: overlaps a larger image", image.index);
        } else {
            kept.push(image);
        }
    }

    let mut seen = HashSet::new();
    kept.into_iter()
        .filter(|image| {
            if !seen.insert(image.image.content_hash()) {
                debug!("image {}: duplicate content", image.index);
                return false;
            }
            match filter.rejects(image.image.width(), image.image.height()) {
                Some(reason) => {
                    debug!(
                        "image {}: {} ({}x{})",
                        image.index,
                        reason,
                        image.image.width(),
                        image.image.height()
                    );
                    false
                }
                None => true,
            }
        })
        .collect()
}

/// Caption runs for one photo. Runs already claimed by another photo are
/// skipped, and the chosen ones are marked in `used`.
pub fn caption_runs(
    bounds: &Rect,
    runs: &[TextRun],
    used: &mut [bool],
    window: &CaptionWindow,
) -> Vec<TextRun> {
    // (priority, distance, overlap, run index)
    let mut nearby: Vec<(u8, f32, f32, usize)> = Vec::new();

    for (i, run) in runs.iter().enumerate() {
        if used[i] {
            continue;
        }
        let text = run_bounds(run);
        let overlap = bounds.horizontal_overlap(&text);
        if overlap <= bounds.width.min(text.width) * window.min_overlap {
            continue;
        }

        let below = text.y - bounds.bottom();
        let above = bounds.y - text.bottom();
        if (0.0..=window.below).contains(&below) {
            nearby.push((1, below, overlap, i));
        } else if (0.0..=window.above).contains(&above) {
            nearby.push((2, above, overlap, i));
        }
    }

    nearby.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then(a.1.total_cmp(&b.1))
            .then(b.2.total_cmp(&a.2))
    });
    nearby.truncate(window.max_runs);

    let mut chosen: Vec<TextRun> = nearby
        .iter()
        .map(|&(_, _, _, i)| {
            used[i] = true;
            runs[i].clone()
        })
        .collect();
    sort_by_weight(&mut chosen);
    chosen
}

/// Product candidates of one page. `runs` must already be top-down.
pub fn embedded_candidates(
    images: Vec<PlacedImage>,
    runs: &[TextRun],
    band: &BrightnessBand,
    filter: &ImageFilter,
    window: &CaptionWindow,
) -> Vec<EmbeddedCandidate> {
    let mut used = vec![false; runs.len()];
    let mut candidates = Vec::new();

    for placed in select_images(images, filter) {
        let class = band.classify(&placed.image);
        if !class.is_candidate() {
            debug!("image {}: blank ({:?})", placed.index, class);
            continue;
        }
        let caption = caption_runs(&placed.bounds, runs, &mut used, window);
        candidates.push(EmbeddedCandidate {
            image_index: placed.index,
            bounds: placed.bounds,
            image: placed.image,
            runs: caption,
        });
    }
    candidates
}
