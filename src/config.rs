//! Extraction configuration
//!
//! Every numeric knob of the pipeline lives here. The defaults are a
//! starting tuning for 2x3 product grids, not a universal answer, so all of
//! them can be overridden (including from a JSON file via serde).

use crate::CatalogError;
use serde::{Deserialize, Serialize};

/// How candidate product regions are found on a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// Fixed rows x cols grid over the rendered page
    Grid,
    /// One candidate per placed image XObject on the page
    EmbeddedImages,
}

/// Encoding used for thumbnail data URIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// Which heuristic names a product from its caption text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleStrategy {
    /// Run with the largest font
    LargestFont,
    /// Top-most, then left-most run
    Topmost,
    /// First caption lines that are not mostly digits
    CaptionLines,
}

/// Configuration for catalog extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Grid rows per page (default: 2)
    pub rows: u32,
    /// Grid columns per page (default: 3)
    pub cols: u32,
    /// Pages beyond this count are ignored (default: 5)
    pub max_pages: u32,
    /// Cells with mean brightness below this are blank (default: 5.0)
    pub min_brightness: f32,
    /// Cells with mean brightness above this are blank (default: 250.0)
    pub max_brightness: f32,
    /// Pixels per PDF point when rendering (default: 3.0)
    pub render_scale: f32,
    /// Pages whose raster would exceed this many pixels at `render_scale`
    /// are rendered at a lower scale (default: 40_000_000)
    pub max_render_pixels: u64,
    /// Fraction of the cell width trimmed from every side of the image region
    pub cell_inset: f32,
    /// Top fraction of each cell holding the product photo; the rest is caption
    pub image_fraction: f32,
    /// Thumbnails wider than this are downscaled before encoding
    pub thumbnail_max_width: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    pub image_format: ImageFormat,
    pub max_name_len: usize,
    pub max_specs_len: usize,
    /// Number of non-title runs joined into the specs block
    pub max_spec_runs: usize,
    /// Number of non-title runs kept in the specs list
    pub max_specs_list: usize,
    /// The largest run becomes the title only if longer than this
    pub min_title_len: usize,
    /// Fallback title must be longer than this
    pub min_fallback_title_len: usize,
    pub title_strategy: TitleStrategy,
    pub layout: LayoutMode,
    /// Extract pages concurrently and renumber afterwards
    pub parallel_pages: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            rows: 2,
            cols: 3,
            max_pages: 5,
            min_brightness: 5.0,
            max_brightness: 250.0,
            render_scale: 3.0,
            max_render_pixels: 40_000_000,
            cell_inset: 0.1,
            image_fraction: 0.75,
            thumbnail_max_width: 400,
            jpeg_quality: 90,
            image_format: ImageFormat::Jpeg,
            max_name_len: 100,
            max_specs_len: 300,
            max_spec_runs: 5,
            max_specs_list: 4,
            min_title_len: 2,
            min_fallback_title_len: 3,
            title_strategy: TitleStrategy::LargestFont,
            layout: LayoutMode::Grid,
            parallel_pages: false,
        }
    }
}

impl ExtractionConfig {
    /// Default configuration with a different grid shape
    pub fn with_grid(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            ..Self::default()
        }
    }

    /// Load a configuration from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(json).map_err(|e| CatalogError::InvalidConfiguration(e.to_string()))
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(CatalogError::InvalidConfiguration(format!(
                "grid must have at least one row and column, got {}x{}",
                self.rows, self.cols
            )));
        }
        if self.max_pages == 0 {
            return Err(CatalogError::InvalidConfiguration(
                "max_pages must be at least 1".into(),
            ));
        }
        if !(self.min_brightness < self.max_brightness) {
            return Err(CatalogError::InvalidConfiguration(format!(
                "brightness band is empty: min {} >= max {}",
                self.min_brightness, self.max_brightness
            )));
        }
        if !(0.0..0.5).contains(&self.cell_inset) {
            return Err(CatalogError::InvalidConfiguration(format!(
                "cell_inset must be in [0, 0.5), got {}",
                self.cell_inset
            )));
        }
        if !(self.image_fraction > 0.0 && self.image_fraction <= 1.0) {
            return Err(CatalogError::InvalidConfiguration(format!(
                "image_fraction must be in (0, 1], got {}",
                self.image_fraction
            )));
        }
        if !(self.render_scale > 0.0) {
            return Err(CatalogError::InvalidConfiguration(format!(
                "render_scale must be positive, got {}",
                self.render_scale
            )));
        }
        if self.max_render_pixels == 0 {
            return Err(CatalogError::InvalidConfiguration(
                "max_render_pixels must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
