//! Integration tests for catalog extraction

use catalog_extract::associate::{group_into_lines, runs_in_rect, to_top_down};
use catalog_extract::classify::BrightnessBand;
use catalog_extract::fields::{extract_fields, LargestFontTitle};
use catalog_extract::grid::segment;
use catalog_extract::{
    build_catalog, extract_catalog, extract_catalog_file, process_catalog_mem, CancelToken,
    CatalogError, CatalogExtractor, ExtractionConfig, LayoutMode, LopdfPageSource, PageSource,
    ProductType, RasterImage, Rect, Stage, TextRun,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::io::Write;

const DOWNLIGHT_CAPTION: &str = "Downlight 10W 3000K IP44";

// Helper to create test TextRuns
fn make_run(text: &str, x: f32, y: f32, font_weight: f32) -> TextRun {
    TextRun::new(text, x, y, font_weight)
}

/// In-memory pages of 2x3 solid cells; `None` leaves a cell white. Each
/// cell gets one caption run in its bottom strip, reported bottom-up like
/// a PDF text locator would.
struct SyntheticCatalog {
    pages: Vec<Vec<Option<[u8; 3]>>>,
    caption: String,
}

const PAGE_W: f32 = 600.0;
const PAGE_H: f32 = 400.0;
const ROWS: u32 = 2;
const COLS: u32 = 3;

impl SyntheticCatalog {
    fn cell_size() -> (f32, f32) {
        (PAGE_W / COLS as f32, PAGE_H / ROWS as f32)
    }
}

impl PageSource for SyntheticCatalog {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, _page_index: usize) -> Result<(f32, f32), CatalogError> {
        Ok((PAGE_W, PAGE_H))
    }

    fn render(&self, page_index: usize, _scale: f32) -> Result<RasterImage, CatalogError> {
        let (w, h) = Self::cell_size();
        let mut raster = RasterImage::blank(PAGE_W as u32, PAGE_H as u32);
        for (i, fill) in self.pages[page_index].iter().enumerate() {
            if let Some(rgb) = fill {
                let (row, col) = (i as u32 / COLS, i as u32 % COLS);
                raster.fill_rect(&Rect::new(col as f32 * w, row as f32 * h, w, h), *rgb);
            }
        }
        Ok(raster)
    }

    fn extract_text(&self, page_index: usize, _scale: f32) -> Result<Vec<TextRun>, CatalogError> {
        let (w, h) = Self::cell_size();
        Ok((0..self.pages[page_index].len())
            .map(|i| {
                let (row, col) = (i as u32 / COLS, i as u32 % COLS);
                let caption_y = row as f32 * h + h * 0.85;
                make_run(&self.caption, col as f32 * w + 12.0, PAGE_H - caption_y, 14.0)
            })
            .collect())
    }
}

fn scenario_source() -> SyntheticCatalog {
    let gray = Some([128, 128, 128]);
    let tinted = Some([90, 110, 140]);
    SyntheticCatalog {
        pages: vec![
            vec![gray, None, gray, tinted, gray, gray],
            vec![gray, tinted, gray, None, gray, gray],
        ],
        caption: DOWNLIGHT_CAPTION.to_string(),
    }
}

/// One image placement on a synthetic PDF page, in PDF user space
struct PdfImage {
    rect: [f32; 4],
    native: (u32, u32),
    gray: u8,
}

/// One text run on a synthetic PDF page (baseline, bottom-up)
struct PdfText {
    x: f32,
    y: f32,
    size: f32,
    text: &'static str,
}

/// Build a PDF with one page per entry, each holding raw DeviceGray image
/// XObjects and Helvetica text
fn build_pdf(media: (f32, f32), pages: Vec<(Vec<PdfImage>, Vec<PdfText>)>) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids: Vec<Object> = Vec::new();
    for (images, texts) in pages {
        let mut xobjects = lopdf::Dictionary::new();
        let mut operations = Vec::new();

        for (i, image) in images.iter().enumerate() {
            let (w, h) = image.native;
            let stream = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => w as i64,
                    "Height" => h as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                vec![image.gray; (w * h) as usize],
            );
            let name = format!("Im{}", i);
            xobjects.set(name.as_bytes().to_vec(), doc.add_object(stream));

            let [x, y, rw, rh] = image.rect;
            operations.push(Operation::new("q", vec![]));
            operations.push(Operation::new(
                "cm",
                vec![
                    rw.into(),
                    0.into(),
                    0.into(),
                    rh.into(),
                    x.into(),
                    y.into(),
                ],
            ));
            operations.push(Operation::new("Do", vec![Object::Name(name.into_bytes())]));
            operations.push(Operation::new("Q", vec![]));
        }

        for text in &texts {
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), text.size.into()]));
            operations.push(Operation::new("Td", vec![text.x.into(), text.y.into()]));
            operations.push(Operation::new(
                "Tj",
                vec![Object::string_literal(text.text)],
            ));
            operations.push(Operation::new("ET", vec![]));
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), media.0.into(), media.1.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).expect("save pdf");
    buffer
}

/// A 300x200 pt page with a 2x3 grid: gray photos in every cell except
/// `blank`, and a caption in each cell's bottom strip
fn grid_pdf_page(blank: Option<usize>, caption: &'static str) -> (Vec<PdfImage>, Vec<PdfText>) {
    let mut images = Vec::new();
    let mut texts = Vec::new();
    for i in 0..6usize {
        let (row, col) = ((i / 3) as f32, (i % 3) as f32);
        if Some(i) != blank {
            // top-down photo area y in [row*100+5, row*100+70)
            images.push(PdfImage {
                rect: [col * 100.0 + 5.0, 200.0 - (row * 100.0 + 70.0), 90.0, 65.0],
                native: (4, 4),
                gray: 128,
            });
        }
        texts.push(PdfText {
            x: col * 100.0 + 5.0,
            y: 200.0 - (row * 100.0 + 90.0),
            size: 8.0,
            text: caption,
        });
    }
    (images, texts)
}

fn unit_scale_config() -> ExtractionConfig {
    ExtractionConfig {
        render_scale: 1.0,
        ..Default::default()
    }
}

// ============================================================================
// Configuration Tests
// ============================================================================

#[test]
fn test_config_documented_defaults() {
    let config = ExtractionConfig::default();
    assert_eq!((config.rows, config.cols), (2, 3));
    assert_eq!(config.max_pages, 5);
    assert!((config.min_brightness - 5.0).abs() < 0.001);
    assert!((config.max_brightness - 250.0).abs() < 0.001);
    assert_eq!(config.layout, LayoutMode::Grid);
    assert!(!config.parallel_pages);
}

#[test]
fn test_zero_grid_is_rejected_before_processing() {
    let err = extract_catalog(b"%PDF-1.5 whatever", &ExtractionConfig::with_grid(0, 3)).unwrap_err();
    assert!(matches!(err, CatalogError::InvalidConfiguration(_)));

    let err = CatalogExtractor::new(ExtractionConfig::with_grid(3, 0)).err().unwrap();
    assert!(matches!(err, CatalogError::InvalidConfiguration(_)));
}

#[test]
fn test_config_from_json_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"rows": 4, "cols": 2, "parallel_pages": true}}"#).unwrap();
    let json = std::fs::read_to_string(file.path()).unwrap();
    let config = ExtractionConfig::from_json(&json).unwrap();
    assert_eq!((config.rows, config.cols), (4, 2));
    assert!(config.parallel_pages);
    assert_eq!(config.max_pages, 5);
}

// ============================================================================
// Grid Segmenter Tests
// ============================================================================

#[test]
fn test_grid_cell_counts() {
    for rows in 1..5 {
        for cols in 1..5 {
            let cells = segment(600.0, 400.0, rows, cols).unwrap();
            assert_eq!(cells.len(), (rows * cols) as usize);
        }
    }
}

#[test]
fn test_grid_covers_page() {
    let cells = segment(600.0, 400.0, 2, 3).unwrap();
    let total: f32 = cells.iter().map(|c| c.bounds.area()).sum();
    assert!((total - 600.0 * 400.0).abs() < 1.0);
    assert_eq!(cells[0].bounds, Rect::new(0.0, 0.0, 200.0, 200.0));
    assert_eq!(cells[5].bounds, Rect::new(400.0, 200.0, 200.0, 200.0));
}

// ============================================================================
// Cell Classifier Tests
// ============================================================================

#[test]
fn test_white_cell_excluded_gray_included() {
    let band = BrightnessBand::default();
    assert!(band.is_blank(&RasterImage::blank(10, 10)));
    assert!(!band.is_blank(&RasterImage::filled(10, 10, [128, 128, 128])));
    assert!(band.is_blank(&RasterImage::filled(10, 10, [2, 2, 2])));
}

// ============================================================================
// Text Association Tests
// ============================================================================

#[test]
fn test_flip_assigns_runs_to_correct_row() {
    // bottom-up y = 50 is near the bottom of a 400 px page: row 1
    let runs = to_top_down(&[make_run("bottom row", 20.0, 50.0, 10.0)], 400.0);
    let cells = segment(600.0, 400.0, 2, 3).unwrap();
    assert!(runs_in_rect(&runs, &cells[0].bounds).is_empty());
    assert_eq!(runs_in_rect(&runs, &cells[3].bounds).len(), 1);
}

#[test]
fn test_group_into_lines_same_line() {
    let runs = vec![
        make_run("LED", 10.0, 100.0, 12.0),
        make_run("Spot", 50.0, 103.0, 12.0),
        make_run("12W", 10.0, 160.0, 9.0),
    ];
    let lines = group_into_lines(&runs, 25.0);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].text(), "LED Spot");
}

// ============================================================================
// Field Extraction Tests
// ============================================================================

#[test]
fn test_category_inference() {
    let config = ExtractionConfig::default();
    let fields = |text: &str, index: usize| {
        extract_fields(&[make_run(text, 0.0, 0.0, 12.0)], index, &config, &LargestFontTitle)
    };

    assert_eq!(fields("스팟 조명", 1).categories.product_type, ProductType::Spotlight);
    assert_eq!(fields("SPOT lamp", 1).categories.product_type, ProductType::Spotlight);
    assert_eq!(fields("LED 22W", 1).categories.watt, "22W");
    assert_eq!(fields("IP65 outdoor", 1).categories.ip, "IP65");

    let defaults = fields("plain lamp", 4);
    assert_eq!(defaults.categories.product_type, ProductType::Spotlight);
    assert_eq!(defaults.categories.watt, "9W");
    assert_eq!(defaults.categories.cct, "3700K");
    assert_eq!(defaults.categories.ip, "IP20");
}

#[test]
fn test_field_extraction_deterministic() {
    let config = ExtractionConfig::default();
    let runs = vec![
        make_run("Track Light", 0.0, 10.0, 16.0),
        make_run("30W", 0.0, 30.0, 9.0),
        make_run("black", 0.0, 50.0, 9.0),
    ];
    let a = extract_fields(&runs, 9, &config, &LargestFontTitle);
    let b = extract_fields(&runs, 9, &config, &LargestFontTitle);
    assert_eq!(a, b);
    assert_eq!(a.name, "Track Light");
    assert_eq!(a.specs, "30W\nblack");
}

// ============================================================================
// Catalog Builder Tests
// ============================================================================

#[test]
fn test_watt_values_sorted_distinct() {
    let result = CatalogExtractor::new(ExtractionConfig::default())
        .unwrap()
        .extract_source(&scenario_source())
        .unwrap();
    assert_eq!(result.catalog.settings.categories.watt.values, vec!["10W"]);

    let mixed = build_catalog(
        result
            .catalog
            .products()
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, mut p)| {
                p.categories.watt = format!("{}W", 5 + i % 3);
                p
            })
            .collect(),
    );
    assert_eq!(
        mixed.settings.categories.watt.values,
        vec!["5W", "6W", "7W"]
    );
}

#[test]
fn test_catalog_json_shape() {
    let catalog = extract_catalog(b"garbage", &ExtractionConfig::default()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&catalog.to_json().unwrap()).unwrap();
    assert_eq!(json["settings"]["categories"]["productType"]["label"], "제품 타입");
    assert_eq!(json["settings"]["categories"]["productType"]["values"][0], "ALL");
    assert_eq!(json["settings"]["tableColumns"][4]["id"], "cri");
    assert_eq!(json["products"]["product_0"]["productNumber"], "LAMP_0001");
    assert!(json["products"]["product_11"].is_object());
    assert!(json["products"]["product_12"].is_null());
}

// ============================================================================
// End-to-End Pipeline Tests
// ============================================================================

#[test]
fn test_two_page_grid_scenario() {
    let result = CatalogExtractor::new(ExtractionConfig::default())
        .unwrap()
        .extract_source(&scenario_source())
        .unwrap();

    assert_eq!(result.stage, Stage::Done);
    assert_eq!(result.pages_processed, 2);
    assert_eq!(result.cells_visited, 12);
    assert_eq!(result.cells_skipped_blank, 2);

    let products = result.catalog.products();
    assert_eq!(products.len(), 10);
    for (i, product) in products.iter().enumerate() {
        assert_eq!(product.product_number, format!("PROD_{:04}", i + 1));
        assert_eq!(product.name, DOWNLIGHT_CAPTION);
        assert_eq!(product.categories.product_type, ProductType::Downlight);
        assert_eq!(product.categories.watt, "10W");
        assert_eq!(product.categories.cct, "3000K");
        assert_eq!(product.categories.ip, "IP44");
        assert!(product.thumbnail.starts_with("data:image/jpeg;base64,"));
        assert_eq!(product.detail_images, vec![product.thumbnail.clone()]);
    }
}

#[test]
fn test_parallel_matches_sequential() {
    let sequential = CatalogExtractor::new(ExtractionConfig::default())
        .unwrap()
        .extract_source(&scenario_source())
        .unwrap();
    let parallel = CatalogExtractor::new(ExtractionConfig {
        parallel_pages: true,
        ..Default::default()
    })
    .unwrap()
    .extract_source(&scenario_source())
    .unwrap();
    assert_eq!(sequential.catalog, parallel.catalog);
    assert_eq!(parallel.cells_skipped_blank, 2);
}

#[test]
fn test_cancellation_between_pages() {
    let token = CancelToken::new();
    token.cancel();
    let err = CatalogExtractor::new(ExtractionConfig::default())
        .unwrap()
        .with_cancel_token(token)
        .extract_source(&scenario_source())
        .unwrap_err();
    assert!(matches!(err, CatalogError::Cancelled));
}

#[test]
fn test_unparsable_bytes_give_sample_catalog() {
    let result = process_catalog_mem(b"this is not a pdf", &ExtractionConfig::default()).unwrap();
    assert!(result.is_fallback());
    assert!(result.fallback_reason.is_some());

    let products = result.catalog.products();
    assert_eq!(products.len(), 12);
    assert_eq!(products[0].name, "매입형 LED 1");
    assert_eq!(products[0].categories.product_type, ProductType::Downlight);
    assert_eq!(products[4].categories.product_type, ProductType::Spotlight);
    assert_eq!(products[4].categories.watt, "9W");
    assert!(products[0].thumbnail.starts_with("data:image/svg+xml;base64,"));
}

// ============================================================================
// PDF Round-Trip Tests
// ============================================================================

#[test]
fn test_pdf_grid_extraction() {
    let pdf = build_pdf(
        (300.0, 200.0),
        vec![grid_pdf_page(Some(4), "Track 12W 4000K IP65")],
    );
    let result = process_catalog_mem(&pdf, &unit_scale_config()).unwrap();

    assert_eq!(result.stage, Stage::Done);
    assert_eq!(result.cells_skipped_blank, 1);
    let products = result.catalog.products();
    assert_eq!(products.len(), 5);
    assert_eq!(products[4].product_number, "PROD_0005");
    for product in products {
        assert_eq!(product.name, "Track 12W 4000K IP65");
        assert_eq!(product.categories.product_type, ProductType::Tracklight);
        assert_eq!(product.categories.watt, "12W");
        assert_eq!(product.categories.cct, "4000K");
        assert_eq!(product.categories.ip, "IP65");
    }
}

#[test]
fn test_pdf_page_cap() {
    let pages = (0..3)
        .map(|_| grid_pdf_page(None, DOWNLIGHT_CAPTION))
        .collect();
    let pdf = build_pdf((300.0, 200.0), pages);
    let config = ExtractionConfig {
        max_pages: 2,
        ..unit_scale_config()
    };
    let result = process_catalog_mem(&pdf, &config).unwrap();
    assert_eq!(result.pages_processed, 2);
    assert_eq!(result.products_count, 12);
}

#[test]
fn test_pdf_without_photos_falls_back() {
    let pdf = build_pdf(
        (300.0, 200.0),
        vec![(
            Vec::new(),
            vec![PdfText {
                x: 20.0,
                y: 20.0,
                size: 10.0,
                text: "Text only",
            }],
        )],
    );
    let result = process_catalog_mem(&pdf, &unit_scale_config()).unwrap();
    assert!(result.is_fallback());
    assert_eq!(result.cells_skipped_blank, 6);
    assert_eq!(result.products_count, 12);
}

#[test]
fn test_pdf_oversized_media_box_is_rendered_within_limit() {
    let pdf = build_pdf((1.0e9, 1.0e9), vec![(Vec::new(), Vec::new())]);

    let source = LopdfPageSource::load_mem(&pdf).unwrap();
    assert!(matches!(
        source.render(0, 3.0),
        Err(CatalogError::Render { page: 1, .. })
    ));

    let config = ExtractionConfig {
        max_render_pixels: 10_000,
        ..Default::default()
    };
    let result = process_catalog_mem(&pdf, &config).unwrap();
    assert!(result.is_fallback());
    assert_eq!(result.pages_processed, 1);
    assert_eq!(result.cells_skipped_blank, 6);
}

#[test]
fn test_pdf_single_pass_analysis_matches_separate_calls() {
    let pdf = build_pdf((300.0, 200.0), vec![grid_pdf_page(Some(2), DOWNLIGHT_CAPTION)]);
    let source = LopdfPageSource::load_mem(&pdf).unwrap();

    let analysis = source.analyze(0, 1.0, true).unwrap();
    assert_eq!(analysis.raster, source.render(0, 1.0).unwrap());
    assert_eq!(analysis.runs, source.extract_text(0, 1.0).unwrap());
    let bounds: Vec<Rect> = source
        .placed_images(0, 1.0)
        .unwrap()
        .iter()
        .map(|p| p.bounds)
        .collect();
    assert_eq!(analysis.placed.len(), 5);
    assert_eq!(
        analysis.placed.iter().map(|p| p.bounds).collect::<Vec<_>>(),
        bounds
    );

    assert!(source.analyze(0, 1.0, false).unwrap().placed.is_empty());
}

#[test]
fn test_pdf_extraction_deterministic() {
    let pdf = build_pdf((300.0, 200.0), vec![grid_pdf_page(Some(0), DOWNLIGHT_CAPTION)]);
    let a = extract_catalog(&pdf, &unit_scale_config()).unwrap();
    let b = extract_catalog(&pdf, &unit_scale_config()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
}

#[test]
fn test_pdf_embedded_image_layout() {
    let pdf = build_pdf(
        (400.0, 400.0),
        vec![(
            vec![
                PdfImage {
                    rect: [100.0, 150.0, 200.0, 200.0],
                    native: (200, 200),
                    gray: 128,
                },
                // too small to be a product photo
                PdfImage {
                    rect: [10.0, 10.0, 40.0, 40.0],
                    native: (40, 40),
                    gray: 60,
                },
            ],
            vec![PdfText {
                x: 110.0,
                y: 120.0,
                size: 12.0,
                text: "Track 9W 2700K",
            }],
        )],
    );
    let config = ExtractionConfig {
        layout: LayoutMode::EmbeddedImages,
        ..unit_scale_config()
    };
    let result = process_catalog_mem(&pdf, &config).unwrap();
    assert_eq!(result.stage, Stage::Done);

    let products = result.catalog.products();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].name, "Track 9W 2700K");
    assert_eq!(products[0].categories.product_type, ProductType::Tracklight);
    assert_eq!(products[0].categories.cct, "2700K");
}

#[test]
fn test_extract_catalog_file() {
    let pdf = build_pdf((300.0, 200.0), vec![grid_pdf_page(None, DOWNLIGHT_CAPTION)]);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&pdf).unwrap();

    let catalog = extract_catalog_file(file.path(), &unit_scale_config()).unwrap();
    assert_eq!(catalog.len(), 6);
    assert_eq!(catalog.get("product_5").unwrap().product_number, "PROD_0006");
}

#[test]
fn test_missing_file_is_io_error() {
    let err = extract_catalog_file("/nonexistent/catalog.pdf", &ExtractionConfig::default())
        .unwrap_err();
    assert!(matches!(err, CatalogError::Io(_)));
}
