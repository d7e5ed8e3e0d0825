//! Product catalog extraction from PDF grid layouts using lopdf
//!
//! This crate provides:
//! - Page rendering and positioned text location for catalog PDFs
//! - Grid segmentation with blank-cell rejection
//! - Heuristic product name, spec and category extraction
//! - Catalog assembly with a deterministic fallback sample set

pub mod associate;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod embedded;
pub mod extractor;
pub mod fields;
pub mod grid;
pub mod pipeline;
pub mod product;
pub mod raster;
pub mod render;
pub mod rules;
pub mod sample;
pub mod tounicode;

pub use catalog::{build_catalog, CatalogDocument};
pub use config::{ExtractionConfig, ImageFormat, LayoutMode, TitleStrategy};
pub use extractor::TextRun;
pub use fields::{
    CaptionLinesTitle, LargestFontTitle, TitleSelectionStrategy, TopmostTitle,
};
pub use grid::{Cell, GridLayout, Rect};
pub use pipeline::{CancelToken, CatalogExtractor, CatalogResult, Stage};
pub use product::ProductRecord;
pub use raster::RasterImage;
pub use render::{LopdfPageSource, PageAnalysis, PageSource, PlacedImage};
pub use rules::ProductType;

use std::path::Path;

/// Extract a catalog from PDF bytes
///
/// Documents that cannot be read, or that contain no usable product cells,
/// yield the fixed sample catalog instead of an error. Only an invalid
/// configuration or cancellation is returned as `Err`.
pub fn extract_catalog(
    pdf_bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<CatalogDocument, CatalogError> {
    Ok(process_catalog_mem(pdf_bytes, config)?.catalog)
}

/// Extract a catalog from a PDF file
pub fn extract_catalog_file<P: AsRef<Path>>(
    path: P,
    config: &ExtractionConfig,
) -> Result<CatalogDocument, CatalogError> {
    Ok(process_catalog(path, config)?.catalog)
}

/// Process a PDF file, returning the catalog with a processing summary
pub fn process_catalog<P: AsRef<Path>>(
    path: P,
    config: &ExtractionConfig,
) -> Result<CatalogResult, CatalogError> {
    CatalogExtractor::new(config.clone())?.extract_file(path)
}

/// Process PDF from memory buffer
pub fn process_catalog_mem(
    buffer: &[u8],
    config: &ExtractionConfig,
) -> Result<CatalogResult, CatalogError> {
    CatalogExtractor::new(config.clone())?.extract_mem(buffer)
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid PDF document: {0}")]
    InvalidDocument(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("No product cells found in document")]
    EmptyExtraction,
    #[error("Image encoding failed on page {page}, cell ({row}, {col}): {message}")]
    ImageEncoding {
        page: usize,
        row: u32,
        col: u32,
        message: String,
    },
    #[error("Rendering failed on page {page}: {message}")]
    Render { page: usize, message: String },
    #[error("Extraction cancelled")]
    Cancelled,
}

impl From<lopdf::Error> for CatalogError {
    fn from(e: lopdf::Error) -> Self {
        CatalogError::InvalidDocument(e.to_string())
    }
}
