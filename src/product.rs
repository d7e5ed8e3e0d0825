//! Product record assembly

use crate::config::ExtractionConfig;
use crate::fields::{ExtractedFields, DEFAULT_CRI, DEFAULT_VOLTAGE};
use crate::raster::RasterImage;
use crate::rules::Categories;
use image::ImageResult;
use serde::{Deserialize, Serialize};

/// Display-table projection of a product's attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    pub model: String,
    pub watt: String,
    pub voltage: String,
    pub cct: String,
    pub cri: String,
    pub ip: String,
}

/// One extracted product, in the shape the site generator consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub name: String,
    pub product_number: String,
    /// Inline data URI of the cropped photo
    pub thumbnail: String,
    pub detail_images: Vec<String>,
    pub specs: String,
    pub specs_list: Vec<String>,
    pub categories: Categories,
    pub table_data: TableData,
}

/// `PROD_0001` style number for the 1-based sequence index
pub fn product_number(index: usize) -> String {
    format!("PROD_{:04}", index)
}

/// Downscale a cropped region to the thumbnail width and encode it
pub fn encode_thumbnail(image: &RasterImage, config: &ExtractionConfig) -> ImageResult<String> {
    image
        .fit_width(config.thumbnail_max_width)
        .to_data_uri(config.image_format, config.jpeg_quality)
}

/// Build the record for product `index` from its encoded image and fields
pub fn assemble(index: usize, thumbnail: String, fields: ExtractedFields) -> ProductRecord {
    let number = product_number(index);
    let ExtractedFields {
        name,
        specs,
        specs_list,
        categories,
    } = fields;

    let table_data = TableData {
        model: number.clone(),
        watt: categories.watt.clone(),
        voltage: DEFAULT_VOLTAGE.to_string(),
        cct: categories.cct.clone(),
        cri: DEFAULT_CRI.to_string(),
        ip: categories.ip.clone(),
    };

    ProductRecord {
        name,
        product_number: number,
        detail_images: vec![thumbnail.clone()],
        thumbnail,
        specs,
        specs_list,
        categories,
        table_data,
    }
}
