use catalog_extract::associate::{runs_in_rect, to_top_down};
use catalog_extract::classify::BrightnessBand;
use catalog_extract::{ExtractionConfig, GridLayout, LopdfPageSource, PageSource};
use std::env;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: debug_cells <pdf_path> [rows]x[cols]");
        std::process::exit(1);
    }

    let mut config = ExtractionConfig::default();
    if let Some((r, c)) = args.get(2).and_then(|s| s.split_once('x')) {
        config.rows = r.parse().unwrap_or(config.rows);
        config.cols = c.parse().unwrap_or(config.cols);
    }

    let source = LopdfPageSource::load(&args[1]).expect("Failed to open PDF");
    let grid = GridLayout::from_config(&config).expect("Invalid grid");
    let band = BrightnessBand::from_config(&config);
    let pages = source.page_count().min(config.max_pages as usize);

    for page in 0..pages {
        let analysis = source
            .analyze(page, config.render_scale, false)
            .expect("Failed to render");
        let raster = analysis.raster;
        let runs = to_top_down(&analysis.runs, raster.height() as f32);

        println!(
            "=== PAGE {} ({}x{} px, {} runs) ===",
            page + 1,
            raster.width(),
            raster.height(),
            runs.len()
        );
        for cell in grid.cells(raster.width() as f32, raster.height() as f32) {
            let r = cell.image_region;
            let class = band.classify(&raster.crop(&r));
            println!(
                "  ({}, {}) x={:7.1} y={:7.1} w={:7.1} h={:7.1} brightness={:6.1} {}",
                cell.row,
                cell.col,
                r.x,
                r.y,
                r.width,
                r.height,
                class.brightness(),
                if class.is_candidate() { "candidate" } else { "blank" }
            );
            for run in runs_in_rect(&runs, &cell.text_target()) {
                println!("      fs={:5.1} text={:?}", run.font_weight, run.text);
            }
        }
        println!();
    }
}
