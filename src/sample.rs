//! Fallback sample catalog
//!
//! Substituted when a document cannot be opened or yields no products, so
//! the site generator always receives a well-formed, non-empty catalog.
//! Every field is derived from the sample's position; nothing is random.

use crate::fields::DEFAULT_CRI;
use crate::product::{ProductRecord, TableData};
use crate::rules::{default_cct, Categories, ProductType};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub const SAMPLE_COUNT: usize = 12;

const SWATCHES: [&str; 5] = ["#667eea", "#f093fb", "#4facfe", "#43e97b", "#fa709a"];
const GRADIENT_END: &str = "#764ba2";

/// Gradient placeholder image as an SVG data URI
pub fn placeholder_image(width: u32, height: u32, label: &str, swatch: usize) -> String {
    let color = SWATCHES[swatch % SWATCHES.len()];
    let svg = format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}">"#,
            r#"<defs><linearGradient id="g{s}" x1="0%" y1="0%" x2="100%" y2="100%">"#,
            r#"<stop offset="0%" stop-color="{c}"/><stop offset="100%" stop-color="{e}"/>"#,
            r#"</linearGradient></defs>"#,
            r#"<rect width="100%" height="100%" fill="url(#g{s})"/>"#,
            r#"<circle cx="50%" cy="45%" r="25%" fill="rgba(255,255,255,0.3)"/>"#,
            r#"<text x="50%" y="50%" text-anchor="middle" dy=".3em" fill="white" font-size="32" font-weight="bold">{l}</text>"#,
            r#"</svg>"#
        ),
        w = width,
        h = height,
        s = swatch,
        c = color,
        e = GRADIENT_END,
        l = label,
    );
    format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg.as_bytes()))
}

fn type_prefix(product_type: ProductType) -> &'static str {
    match product_type {
        ProductType::Downlight => "매입형",
        ProductType::Spotlight => "스팟",
        ProductType::Tracklight => "트랙",
    }
}

/// Sample product at 0-based position `i`
pub fn sample_product(i: usize) -> ProductRecord {
    let product_type = ProductType::ALL[i % 3];
    let number = format!("LAMP_{:04}", i + 1);
    let watt = format!("{}W", 5 + i);
    let cct = default_cct(i);
    let ip = if i % 2 == 0 { "IP20" } else { "IP44" }.to_string();
    let voltage = if i % 2 == 0 { "220V" } else { "110V" }.to_string();

    ProductRecord {
        name: format!("{} LED {}", type_prefix(product_type), i + 1),
        product_number: number.clone(),
        thumbnail: placeholder_image(400, 400, &format!("제품 {}", i + 1), i + 1),
        detail_images: vec![placeholder_image(800, 600, "제품 상세", 0)],
        specs: format!(
            "타입: {}\n규격: Ø{}mm\n용량: {}",
            product_type,
            50 + (i % 4) * 5,
            watt
        ),
        specs_list: vec![
            "CRI > 90".to_string(),
            format!("전압: {}", voltage),
            format!("색온도: {}", cct),
        ],
        categories: Categories {
            product_type,
            watt: watt.clone(),
            cct: cct.clone(),
            ip: ip.clone(),
        },
        table_data: TableData {
            model: number,
            watt,
            voltage,
            cct,
            cri: DEFAULT_CRI.to_string(),
            ip,
        },
    }
}

/// The full fallback product set
pub fn sample_products() -> Vec<ProductRecord> {
    (0..SAMPLE_COUNT).map(sample_product).collect()
}
