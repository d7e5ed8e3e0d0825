//! Blank cell detection
//!
//! Unused grid slots are usually plain paper or a solid filler block. Both
//! show up as a mean brightness at one extreme of the 0..=255 range.

use crate::config::ExtractionConfig;
use crate::raster::RasterImage;

/// Outcome of classifying one cropped cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellClass {
    /// Worth turning into a product record
    Candidate { brightness: f32 },
    /// Near-white: empty paper
    BlankLight { brightness: f32 },
    /// Near-black: solid filler
    BlankDark { brightness: f32 },
}

impl CellClass {
    pub fn is_candidate(&self) -> bool {
        matches!(self, CellClass::Candidate { .. })
    }

    pub fn brightness(&self) -> f32 {
        match *self {
            CellClass::Candidate { brightness }
            | CellClass::BlankLight { brightness }
            | CellClass::BlankDark { brightness } => brightness,
        }
    }
}

/// Inclusive brightness band a candidate cell must fall into
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrightnessBand {
    pub min: f32,
    pub max: f32,
}

impl Default for BrightnessBand {
    fn default() -> Self {
        Self {
            min: 5.0,
            max: 250.0,
        }
    }
}

impl BrightnessBand {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new(config.min_brightness, config.max_brightness)
    }

    pub fn classify_brightness(&self, brightness: f32) -> CellClass {
        if brightness > self.max {
            CellClass::BlankLight { brightness }
        } else if brightness < self.min {
            CellClass::BlankDark { brightness }
        } else {
            CellClass::Candidate { brightness }
        }
    }

    pub fn classify(&self, image: &RasterImage) -> CellClass {
        self.classify_brightness(image.mean_brightness())
    }

    /// True when the cell should be skipped
    pub fn is_blank(&self, image: &RasterImage) -> bool {
        !self.classify(image).is_candidate()
    }
}
