//! Per-document extraction pipeline
//!
//! ```text
//! Idle -> Analyzing -> Extracting -> Assembling -> Done
//!              \            \
//!               +------------+--> Fallback
//! ```
//!
//! Pages are analyzed (rendered, text located) one at a time in page order.
//! Each page is turned into an unnumbered list of candidates, which are then
//! folded into the product list in page order; the running product index
//! lives only in that fold. With `parallel_pages` the per-page candidate
//! work runs on rayon and the same fold numbers the merged result, so both
//! paths produce the same catalog.

use crate::associate::{runs_in_rect, to_top_down};
use crate::catalog::{build_catalog, CatalogDocument};
use crate::classify::BrightnessBand;
use crate::config::{ExtractionConfig, LayoutMode};
use crate::embedded::{embedded_candidates, CaptionWindow, ImageFilter};
use crate::extractor::TextRun;
use crate::fields::{extract_fields, strategy_for, TitleSelectionStrategy};
use crate::grid::GridLayout;
use crate::product::{assemble, encode_thumbnail, ProductRecord};
use crate::raster::RasterImage;
use crate::render::{LopdfPageSource, PageAnalysis, PageSource, PlacedImage};
use crate::sample::sample_products;
use crate::CatalogError;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Processing stage of one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Analyzing,
    Extracting,
    Assembling,
    Done,
    Fallback,
}

/// Cooperative cancellation, checked between pages
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Catalog plus a summary of how it was produced
#[derive(Debug)]
pub struct CatalogResult {
    pub catalog: CatalogDocument,
    /// `Done`, or `Fallback` when the sample catalog was substituted
    pub stage: Stage,
    pub pages_processed: usize,
    pub cells_visited: usize,
    pub cells_skipped_blank: usize,
    pub cells_failed: usize,
    pub products_count: usize,
    pub images_count: usize,
    pub processing_time_ms: u64,
    pub fallback_reason: Option<String>,
}

impl CatalogResult {
    pub fn is_fallback(&self) -> bool {
        self.stage == Stage::Fallback
    }
}

/// Where on a page a candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Cell { row: u32, col: u32 },
    Image { index: usize },
}

/// A non-blank region waiting for its product number
#[derive(Debug)]
struct Candidate {
    page: usize,
    origin: Origin,
    thumbnail: Result<String, String>,
    runs: Vec<TextRun>,
}

/// Everything the candidate pass needs from one analyzed page
struct PageData {
    index: usize,
    raster: RasterImage,
    /// Top-down text runs
    runs: Vec<TextRun>,
    placed: Vec<PlacedImage>,
}

struct PageCandidates {
    candidates: Vec<Candidate>,
    visited: usize,
    skipped_blank: usize,
}

/// Running state of the page fold
#[derive(Default)]
struct Assembly {
    records: Vec<ProductRecord>,
    pages_processed: usize,
    cells_visited: usize,
    cells_skipped_blank: usize,
    cells_failed: usize,
}

fn advance(stage: &mut Stage, next: Stage) {
    if *stage != next {
        debug!("stage {:?} -> {:?}", stage, next);
        *stage = next;
    }
}

/// Extracts catalogs with a fixed configuration
pub struct CatalogExtractor {
    config: ExtractionConfig,
    grid: GridLayout,
    band: BrightnessBand,
    strategy: Box<dyn TitleSelectionStrategy>,
    image_filter: ImageFilter,
    caption_window: CaptionWindow,
    cancel: CancelToken,
}

impl CatalogExtractor {
    /// Validate the configuration; invalid ones never start processing
    pub fn new(config: ExtractionConfig) -> Result<Self, CatalogError> {
        config.validate()?;
        Ok(Self {
            grid: GridLayout::from_config(&config)?,
            band: BrightnessBand::from_config(&config),
            strategy: strategy_for(config.title_strategy),
            image_filter: ImageFilter::default(),
            caption_window: CaptionWindow::default(),
            cancel: CancelToken::new(),
            config,
        })
    }

    pub fn with_title_strategy(mut self, strategy: Box<dyn TitleSelectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_image_filter(mut self, filter: ImageFilter) -> Self {
        self.image_filter = filter;
        self
    }

    pub fn with_caption_window(mut self, window: CaptionWindow) -> Self {
        self.caption_window = window;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Extract from PDF bytes; unreadable documents give the sample catalog
    pub fn extract_mem(&self, buffer: &[u8]) -> Result<CatalogResult, CatalogError> {
        let start = Instant::now();
        match LopdfPageSource::load_mem(buffer) {
            Ok(source) => self.extract_source(&source),
            Err(e) => Ok(self.fallback(e, Assembly::default(), start)),
        }
    }

    /// Extract from a PDF file; a missing file is an I/O error, an
    /// unreadable one gives the sample catalog
    pub fn extract_file<P: AsRef<Path>>(&self, path: P) -> Result<CatalogResult, CatalogError> {
        let buffer = std::fs::read(path)?;
        self.extract_mem(&buffer)
    }

    /// Run the pipeline over any page source
    pub fn extract_source(&self, source: &dyn PageSource) -> Result<CatalogResult, CatalogError> {
        let start = Instant::now();
        let mut stage = Stage::Idle;

        let total = source.page_count();
        let limit = total.min(self.config.max_pages as usize);
        if total > limit {
            info!("processing {} of {} pages", limit, total);
        }

        let outcome = if self.config.parallel_pages {
            self.run_parallel(source, limit, &mut stage)
        } else {
            self.run_sequential(source, limit, &mut stage)
        };

        let assembly = match outcome {
            Ok(assembly) => assembly,
            Err(CatalogError::Cancelled) => return Err(CatalogError::Cancelled),
            Err(e) => {
                advance(&mut stage, Stage::Fallback);
                return Ok(self.fallback(e, Assembly::default(), start));
            }
        };

        if assembly.records.is_empty() {
            advance(&mut stage, Stage::Fallback);
            return Ok(self.fallback(CatalogError::EmptyExtraction, assembly, start));
        }

        advance(&mut stage, Stage::Assembling);
        let Assembly {
            records,
            pages_processed,
            cells_visited,
            cells_skipped_blank,
            cells_failed,
        } = assembly;
        let catalog = build_catalog(records);
        advance(&mut stage, Stage::Done);

        info!(
            "extracted {} products from {} pages ({} blank, {} failed)",
            catalog.len(),
            pages_processed,
            cells_skipped_blank,
            cells_failed
        );

        Ok(CatalogResult {
            products_count: catalog.len(),
            images_count: catalog.image_count(),
            catalog,
            stage,
            pages_processed,
            cells_visited,
            cells_skipped_blank,
            cells_failed,
            processing_time_ms: start.elapsed().as_millis() as u64,
            fallback_reason: None,
        })
    }

    fn run_sequential(
        &self,
        source: &dyn PageSource,
        limit: usize,
        stage: &mut Stage,
    ) -> Result<Assembly, CatalogError> {
        let mut assembly = Assembly::default();
        for page in 0..limit {
            self.check_cancelled()?;
            advance(stage, Stage::Analyzing);
            let data = self.analyze(source, page)?;
            advance(stage, Stage::Extracting);
            let candidates = self.page_candidates(&data);
            assembly = self.absorb(assembly, candidates);
        }
        Ok(assembly)
    }

    fn run_parallel(
        &self,
        source: &dyn PageSource,
        limit: usize,
        stage: &mut Stage,
    ) -> Result<Assembly, CatalogError> {
        advance(stage, Stage::Analyzing);
        let mut pages = Vec::with_capacity(limit);
        for page in 0..limit {
            self.check_cancelled()?;
            pages.push(self.analyze(source, page)?);
        }

        advance(stage, Stage::Extracting);
        let per_page: Vec<PageCandidates> = pages
            .par_iter()
            .map(|data| self.page_candidates(data))
            .collect();

        Ok(per_page
            .into_iter()
            .fold(Assembly::default(), |acc, page| self.absorb(acc, page)))
    }

    fn check_cancelled(&self) -> Result<(), CatalogError> {
        if self.cancel.is_cancelled() {
            info!("extraction cancelled");
            return Err(CatalogError::Cancelled);
        }
        Ok(())
    }

    /// Render a page and locate its text
    fn analyze(&self, source: &dyn PageSource, page: usize) -> Result<PageData, CatalogError> {
        let scale = self.page_scale(source, page)?;
        let with_images = self.config.layout == LayoutMode::EmbeddedImages;
        let PageAnalysis {
            raster,
            runs,
            placed,
        } = source.analyze(page, scale, with_images)?;
        let runs = to_top_down(&runs, raster.height() as f32);
        info!(
            "page {}: {}x{} px, {} text runs",
            page + 1,
            raster.width(),
            raster.height(),
            runs.len()
        );
        Ok(PageData {
            index: page,
            raster,
            runs,
            placed,
        })
    }

    /// The configured render scale, lowered for pages that would otherwise
    /// exceed `max_render_pixels`
    fn page_scale(&self, source: &dyn PageSource, page: usize) -> Result<f32, CatalogError> {
        let scale = self.config.render_scale;
        let (width, height) = source.page_size(page)?;
        let points = f64::from(width) * f64::from(height);
        let limit = self.config.max_render_pixels as f64;
        if !(points > 0.0) || points * f64::from(scale).powi(2) <= limit {
            return Ok(scale);
        }
        let lowered = (limit / points).sqrt() as f32;
        info!(
            "page {}: {}x{} pt exceeds {} pixels at scale {}, rendering at {:.6}",
            page + 1,
            width,
            height,
            self.config.max_render_pixels,
            scale,
            lowered
        );
        Ok(lowered)
    }

    fn page_candidates(&self, data: &PageData) -> PageCandidates {
        match self.config.layout {
            LayoutMode::Grid => self.grid_candidates(data),
            LayoutMode::EmbeddedImages => self.image_candidates(data),
        }
    }

    fn grid_candidates(&self, data: &PageData) -> PageCandidates {
        let cells = self
            .grid
            .cells(data.raster.width() as f32, data.raster.height() as f32);
        let visited = cells.len();
        let mut skipped_blank = 0;
        let mut candidates = Vec::new();

        for cell in cells {
            let crop = data.raster.crop(&cell.image_region);
            let class = self.band.classify(&crop);
            if !class.is_candidate() {
                debug!(
                    "page {} cell ({}, {}): skipped, {:?}",
                    data.index + 1,
                    cell.row,
                    cell.col,
                    class
                );
                skipped_blank += 1;
                continue;
            }
            candidates.push(Candidate {
                page: data.index,
                origin: Origin::Cell {
                    row: cell.row,
                    col: cell.col,
                },
                thumbnail: encode_thumbnail(&crop, &self.config).map_err(|e| e.to_string()),
                runs: runs_in_rect(&data.runs, &cell.text_target()),
            });
        }

        PageCandidates {
            candidates,
            visited,
            skipped_blank,
        }
    }

    fn image_candidates(&self, data: &PageData) -> PageCandidates {
        let visited = data.placed.len();
        let found = embedded_candidates(
            data.placed.clone(),
            &data.runs,
            &self.band,
            &self.image_filter,
            &self.caption_window,
        );
        let candidates: Vec<Candidate> = found
            .into_iter()
            .map(|c| Candidate {
                page: data.index,
                origin: Origin::Image {
                    index: c.image_index,
                },
                thumbnail: encode_thumbnail(&c.image, &self.config).map_err(|e| e.to_string()),
                runs: c.runs,
            })
            .collect();

        PageCandidates {
            skipped_blank: visited - candidates.len(),
            candidates,
            visited,
        }
    }

    /// Number and assemble one page's candidates onto the running list.
    /// A candidate whose image failed to encode is dropped without taking
    /// a number.
    fn absorb(&self, mut acc: Assembly, page: PageCandidates) -> Assembly {
        acc.pages_processed += 1;
        acc.cells_visited += page.visited;
        acc.cells_skipped_blank += page.skipped_blank;

        for candidate in page.candidates {
            let thumbnail = match candidate.thumbnail {
                Ok(uri) => uri,
                Err(message) => {
                    let (row, col) = match candidate.origin {
                        Origin::Cell { row, col } => (row, col),
                        Origin::Image { index } => (0, index as u32),
                    };
                    let err = CatalogError::ImageEncoding {
                        page: candidate.page + 1,
                        row,
                        col,
                        message,
                    };
                    warn!("{}; cell skipped", err);
                    acc.cells_failed += 1;
                    continue;
                }
            };

            let index = acc.records.len() + 1;
            let fields = extract_fields(&candidate.runs, index, &self.config, self.strategy.as_ref());
            debug!(
                "page {} {:?}: product {} '{}'",
                candidate.page + 1,
                candidate.origin,
                index,
                fields.name
            );
            acc.records.push(assemble(index, thumbnail, fields));
        }
        acc
    }

    fn fallback(&self, reason: CatalogError, acc: Assembly, start: Instant) -> CatalogResult {
        warn!("substituting sample catalog: {}", reason);
        let catalog = build_catalog(sample_products());
        CatalogResult {
            products_count: catalog.len(),
            images_count: catalog.image_count(),
            catalog,
            stage: Stage::Fallback,
            pages_processed: acc.pages_processed,
            cells_visited: acc.cells_visited,
            cells_skipped_blank: acc.cells_skipped_blank,
            cells_failed: acc.cells_failed,
            processing_time_ms: start.elapsed().as_millis() as u64,
            fallback_reason: Some(reason.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Rect;
    use std::cell::RefCell;

    /// Pages of solid-colour cells with one caption run per cell
    struct GridSource {
        pages: Vec<Vec<Option<[u8; 3]>>>,
        caption: String,
        cols: u32,
        rows: u32,
        /// Reported page size in points
        size: (f32, f32),
        /// Rendering this page fails
        broken_page: Option<usize>,
        /// Scales requested from `render`
        scales: RefCell<Vec<f32>>,
    }

    const PAGE_W: f32 = 300.0;
    const PAGE_H: f32 = 200.0;

    impl PageSource for GridSource {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_size(&self, _page_index: usize) -> Result<(f32, f32), CatalogError> {
            Ok(self.size)
        }

        fn render(&self, page_index: usize, scale: f32) -> Result<RasterImage, CatalogError> {
            self.scales.borrow_mut().push(scale);
            if self.broken_page == Some(page_index) {
                return Err(CatalogError::Render {
                    page: page_index + 1,
                    message: "unsupported content".into(),
                });
            }
            let mut raster = RasterImage::blank(PAGE_W as u32, PAGE_H as u32);
            let (w, h) = (PAGE_W / self.cols as f32, PAGE_H / self.rows as f32);
            for (i, fill) in self.pages[page_index].iter().enumerate() {
                if let Some(rgb) = fill {
                    let (r, c) = (i as u32 / self.cols, i as u32 % self.cols);
                    raster.fill_rect(&Rect::new(c as f32 * w, r as f32 * h, w, h), *rgb);
                }
            }
            Ok(raster)
        }

        fn extract_text(&self, page_index: usize, _scale: f32) -> Result<Vec<TextRun>, CatalogError> {
            let (w, h) = (PAGE_W / self.cols as f32, PAGE_H / self.rows as f32);
            Ok((0..self.pages[page_index].len())
                .map(|i| {
                    let (r, c) = (i as u32 / self.cols, i as u32 % self.cols);
                    let top_down_y = r as f32 * h + h * 0.9;
                    TextRun::new(self.caption.clone(), c as f32 * w + 5.0, PAGE_H - top_down_y, 12.0)
                })
                .collect())
        }
    }

    fn source(pages: Vec<Vec<Option<[u8; 3]>>>) -> GridSource {
        GridSource {
            pages,
            caption: "Spot 7W 4000K IP65".into(),
            cols: 3,
            rows: 2,
            size: (PAGE_W / 3.0, PAGE_H / 3.0),
            broken_page: None,
            scales: RefCell::new(Vec::new()),
        }
    }

    fn candidate(col: u32, thumbnail: Result<String, String>) -> Candidate {
        Candidate {
            page: 0,
            origin: Origin::Cell { row: 0, col },
            thumbnail,
            runs: vec![TextRun::new(format!("Lamp {col}"), 0.0, 0.0, 12.0)],
        }
    }

    const GRAY: Option<[u8; 3]> = Some([120, 120, 120]);

    #[test]
    fn test_numbering_skips_blank_cells() {
        let src = source(vec![vec![GRAY, None, GRAY, None, GRAY, GRAY]]);
        let extractor = CatalogExtractor::new(ExtractionConfig::default()).unwrap();
        let result = extractor.extract_source(&src).unwrap();
        assert_eq!(result.stage, Stage::Done);
        assert_eq!(result.cells_visited, 6);
        assert_eq!(result.cells_skipped_blank, 2);
        let numbers: Vec<&str> = result
            .catalog
            .products()
            .iter()
            .map(|p| p.product_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["PROD_0001", "PROD_0002", "PROD_0003", "PROD_0004"]);
        assert_eq!(result.catalog.products()[0].name, "Spot 7W 4000K IP65");
        assert_eq!(result.catalog.products()[0].categories.ip, "IP65");
    }

    #[test]
    fn test_page_cap() {
        let src = source(vec![vec![GRAY; 6]; 4]);
        let config = ExtractionConfig {
            max_pages: 2,
            ..Default::default()
        };
        let result = CatalogExtractor::new(config).unwrap().extract_source(&src).unwrap();
        assert_eq!(result.pages_processed, 2);
        assert_eq!(result.products_count, 12);
    }

    #[test]
    fn test_all_blank_falls_back() {
        let src = source(vec![vec![None; 6]]);
        let result = CatalogExtractor::new(ExtractionConfig::default())
            .unwrap()
            .extract_source(&src)
            .unwrap();
        assert!(result.is_fallback());
        assert_eq!(result.products_count, 12);
        assert_eq!(result.cells_skipped_blank, 6);
        assert!(result.fallback_reason.is_some());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let pages = vec![
            vec![GRAY, None, GRAY, GRAY, GRAY, None],
            vec![None, GRAY, Some([60, 90, 200]), GRAY, None, GRAY],
            vec![GRAY; 6],
        ];
        let sequential = CatalogExtractor::new(ExtractionConfig::default())
            .unwrap()
            .extract_source(&source(pages.clone()))
            .unwrap();
        let parallel = CatalogExtractor::new(ExtractionConfig {
            parallel_pages: true,
            ..Default::default()
        })
        .unwrap()
        .extract_source(&source(pages))
        .unwrap();
        assert_eq!(sequential.catalog, parallel.catalog);
    }

    #[test]
    fn test_cancelled_before_first_page() {
        let token = CancelToken::new();
        token.cancel();
        let extractor = CatalogExtractor::new(ExtractionConfig::default())
            .unwrap()
            .with_cancel_token(token);
        let err = extractor.extract_source(&source(vec![vec![GRAY; 6]])).unwrap_err();
        assert!(matches!(err, CatalogError::Cancelled));
    }

    #[test]
    fn test_invalid_configuration_rejected() {
        let err = CatalogExtractor::new(ExtractionConfig::with_grid(0, 3)).err().unwrap();
        assert!(matches!(err, CatalogError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_failed_encoding_takes_no_number() {
        let extractor = CatalogExtractor::new(ExtractionConfig::default()).unwrap();
        let page = PageCandidates {
            candidates: vec![
                candidate(0, Ok("data:image/jpeg;base64,AA==".into())),
                candidate(1, Err("encoder refused".into())),
                candidate(2, Ok("data:image/jpeg;base64,AQ==".into())),
            ],
            visited: 3,
            skipped_blank: 0,
        };
        let acc = extractor.absorb(Assembly::default(), page);
        assert_eq!(acc.cells_failed, 1);
        let numbered: Vec<(&str, &str)> = acc
            .records
            .iter()
            .map(|r| (r.product_number.as_str(), r.name.as_str()))
            .collect();
        assert_eq!(
            numbered,
            vec![("PROD_0001", "Lamp 0"), ("PROD_0002", "Lamp 2")]
        );
    }

    #[test]
    fn test_render_failure_falls_back() {
        let mut src = source(vec![vec![GRAY; 6]; 3]);
        src.broken_page = Some(1);
        let result = CatalogExtractor::new(ExtractionConfig::default())
            .unwrap()
            .extract_source(&src)
            .unwrap();
        assert_eq!(result.stage, Stage::Fallback);
        assert_eq!(result.products_count, 12);
        let reason = result.fallback_reason.unwrap();
        assert!(reason.contains("page 2"), "{reason}");
    }

    #[test]
    fn test_oversized_page_renders_at_lower_scale() {
        let mut src = source(vec![vec![GRAY; 6]]);
        src.size = (14_400.0, 14_400.0);
        let config = ExtractionConfig::default();
        let limit = config.max_render_pixels as f64;
        let result = CatalogExtractor::new(config).unwrap().extract_source(&src).unwrap();
        assert_eq!(result.stage, Stage::Done);

        let scale = src.scales.borrow()[0];
        assert!(scale < 3.0);
        let pixels = (14_400.0 * f64::from(scale)).powi(2);
        assert!(pixels <= limit * 1.001, "{pixels}");
    }

    #[test]
    fn test_regular_page_keeps_configured_scale() {
        let src = source(vec![vec![GRAY; 6]]);
        CatalogExtractor::new(ExtractionConfig::default())
            .unwrap()
            .extract_source(&src)
            .unwrap();
        assert_eq!(*src.scales.borrow(), vec![3.0]);
    }
}
