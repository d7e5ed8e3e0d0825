//! Raster page images
//!
//! A thin wrapper over `image::RgbImage` with the handful of operations the
//! pipeline needs: cropping a cell, measuring brightness, downscaling a
//! thumbnail and encoding it as an inline data URI.

use crate::config::ImageFormat;
use crate::grid::Rect;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::error::{ImageError, ParameterError, ParameterErrorKind};
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, ImageResult, Rgb, RgbImage};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// An RGB raster image in top-down pixel space
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pixels: RgbImage,
}

impl RasterImage {
    /// White canvas, the background of a rendered page
    pub fn blank(width: u32, height: u32) -> Self {
        Self::filled(width, height, [255, 255, 255])
    }

    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self {
            pixels: RgbImage::from_pixel(width, height, Rgb(rgb)),
        }
    }

    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn as_rgb(&self) -> &RgbImage {
        &self.pixels
    }

    /// Fill a rectangle with a solid colour (clamped to the image)
    pub fn fill_rect(&mut self, rect: &Rect, rgb: [u8; 3]) {
        let (x0, y0, x1, y1) = self.clamp_rect(rect);
        for y in y0..y1 {
            for x in x0..x1 {
                self.pixels.put_pixel(x, y, Rgb(rgb));
            }
        }
    }

    /// Paint `other` with its top-left corner at (x, y)
    pub fn overlay(&mut self, other: &RgbImage, x: i64, y: i64) {
        imageops::overlay(&mut self.pixels, other, x, y);
    }

    /// Copy out the region covered by `rect`, clamped to the image bounds.
    /// A rectangle entirely outside the image yields a 0x0 image.
    pub fn crop(&self, rect: &Rect) -> RasterImage {
        let (x0, y0, x1, y1) = self.clamp_rect(rect);
        let pixels = imageops::crop_imm(&self.pixels, x0, y0, x1 - x0, y1 - y0).to_image();
        RasterImage { pixels }
    }

    /// Mean over all pixels of (R + G + B) / 3, in 0..=255.
    /// An empty image reports 0.0.
    pub fn mean_brightness(&self) -> f32 {
        let count = self.pixels.width() as u64 * self.pixels.height() as u64;
        if count == 0 {
            return 0.0;
        }
        let total: f64 = self
            .pixels
            .pixels()
            .map(|p| (p[0] as f64 + p[1] as f64 + p[2] as f64) / 3.0)
            .sum();
        (total / count as f64) as f32
    }

    /// Downscale so the width is at most `max_width`, keeping the aspect ratio
    pub fn fit_width(&self, max_width: u32) -> RasterImage {
        if max_width == 0 || self.width() <= max_width {
            return self.clone();
        }
        let ratio = max_width as f32 / self.width() as f32;
        let height = ((self.height() as f32 * ratio) as u32).max(1);
        RasterImage {
            pixels: imageops::resize(&self.pixels, max_width, height, FilterType::Lanczos3),
        }
    }

    /// Encode to the requested format
    pub fn encode(&self, format: ImageFormat, quality: u8) -> ImageResult<Vec<u8>> {
        let (w, h) = self.pixels.dimensions();
        if w == 0 || h == 0 {
            return Err(ImageError::Parameter(ParameterError::from_kind(
                ParameterErrorKind::DimensionMismatch,
            )));
        }
        let mut buf = Vec::new();
        match format {
            ImageFormat::Jpeg => JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
                .write_image(self.pixels.as_raw(), w, h, ExtendedColorType::Rgb8)?,
            ImageFormat::Png => {
                PngEncoder::new(&mut buf).write_image(self.pixels.as_raw(), w, h, ExtendedColorType::Rgb8)?
            }
        }
        Ok(buf)
    }

    /// Encode as `data:<mime>;base64,...`
    pub fn to_data_uri(&self, format: ImageFormat, quality: u8) -> ImageResult<String> {
        let bytes = self.encode(format, quality)?;
        Ok(format!(
            "data:{};base64,{}",
            format.mime_type(),
            STANDARD.encode(bytes)
        ))
    }

    /// Content hash of dimensions and pixel data, for duplicate detection
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.pixels.dimensions().hash(&mut hasher);
        self.pixels.as_raw().hash(&mut hasher);
        hasher.finish()
    }

    fn clamp_rect(&self, rect: &Rect) -> (u32, u32, u32, u32) {
        let w = self.pixels.width() as f32;
        let h = self.pixels.height() as f32;
        let x0 = rect.x.max(0.0).min(w).floor() as u32;
        let y0 = rect.y.max(0.0).min(h).floor() as u32;
        let x1 = rect.right().max(0.0).min(w).ceil() as u32;
        let y1 = rect.bottom().max(0.0).min(h).ceil() as u32;
        (x0, y0, x1.max(x0), y1.max(y0))
    }
}
