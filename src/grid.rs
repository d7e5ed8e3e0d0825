//! Grid segmentation of rendered pages
//!
//! A catalog page is treated as a fixed rows x cols grid. Each cell is split
//! into a photo region (top `image_fraction` of the cell, inset on every side)
//! and a caption region (the remaining bottom strip at full cell width).

use crate::config::ExtractionConfig;
use crate::CatalogError;

/// Axis-aligned rectangle in top-down pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Half-open containment: [x, x + w) x [y, y + h)
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Overlapping region, or `None` when the rectangles do not intersect
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let overlap = Rect::new(
            x,
            y,
            self.right().min(other.right()) - x,
            self.bottom().min(other.bottom()) - y,
        );
        (!overlap.is_empty()).then_some(overlap)
    }

    /// Length of the overlap of the two x-extents (negative when disjoint)
    pub fn horizontal_overlap(&self, other: &Rect) -> f32 {
        self.right().min(other.right()) - self.x.max(other.x)
    }
}

/// One grid cell of a page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub row: u32,
    pub col: u32,
    /// Full cell rectangle
    pub bounds: Rect,
    /// Inset photo region that is cropped into the thumbnail
    pub image_region: Rect,
    /// Bottom caption strip whose text belongs to this cell
    pub text_region: Rect,
}

impl Cell {
    /// The rectangle text runs are matched against. When the photo region
    /// takes the whole cell there is no caption strip, so the full cell is
    /// used instead.
    pub fn text_target(&self) -> Rect {
        if self.text_region.is_empty() {
            self.bounds
        } else {
            self.text_region
        }
    }
}

/// Grid geometry shared by every page of a document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    rows: u32,
    cols: u32,
    inset: f32,
    image_fraction: f32,
}

impl GridLayout {
    /// Plain grid: no inset, photo region is the whole cell
    pub fn new(rows: u32, cols: u32) -> Result<Self, CatalogError> {
        if rows == 0 || cols == 0 {
            return Err(CatalogError::InvalidConfiguration(format!(
                "grid must have at least one row and column, got {}x{}",
                rows, cols
            )));
        }
        Ok(Self {
            rows,
            cols,
            inset: 0.0,
            image_fraction: 1.0,
        })
    }

    pub fn from_config(config: &ExtractionConfig) -> Result<Self, CatalogError> {
        Ok(Self::new(config.rows, config.cols)?
            .with_inset(config.cell_inset)
            .with_image_fraction(config.image_fraction))
    }

    pub fn with_inset(mut self, inset: f32) -> Self {
        self.inset = inset.clamp(0.0, 0.49);
        self
    }

    pub fn with_image_fraction(mut self, fraction: f32) -> Self {
        self.image_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Geometry of cell (row, col) on a page of the given pixel size
    pub fn cell(&self, row: u32, col: u32, page_width: f32, page_height: f32) -> Cell {
        let w = page_width / self.cols as f32;
        let h = page_height / self.rows as f32;
        let x = col as f32 * w;
        let y = row as f32 * h;
        let bounds = Rect::new(x, y, w, h);

        let image_height = h * self.image_fraction;
        let pad = w * self.inset;
        let image_region = Rect::new(
            x + pad,
            y + pad,
            (w - 2.0 * pad).max(0.0),
            (image_height - 2.0 * pad).max(0.0),
        );
        let text_region = Rect::new(x, y + image_height, w, h - image_height);

        Cell {
            row,
            col,
            bounds,
            image_region,
            text_region,
        }
    }

    /// All cells in row-major order (row outer, column inner)
    pub fn cells(&self, page_width: f32, page_height: f32) -> Vec<Cell> {
        let mut cells = Vec::with_capacity(self.cell_count());
        for row in 0..self.rows {
            for col in 0..self.cols {
                cells.push(self.cell(row, col, page_width, page_height));
            }
        }
        cells
    }
}

/// Partition a page into a rows x cols grid with no inset
pub fn segment(
    page_width: f32,
    page_height: f32,
    rows: u32,
    cols: u32,
) -> Result<Vec<Cell>, CatalogError> {
    Ok(GridLayout::new(rows, cols)?.cells(page_width, page_height))
}
