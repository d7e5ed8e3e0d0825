//! CLI tool for PDF catalog to product JSON extraction

use catalog_extract::{process_catalog, ExtractionConfig, LayoutMode, TitleStrategy};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    /// Fixed rows x columns grid
    Grid,
    /// One product per placed image
    Embedded,
}

#[derive(Clone, Copy, ValueEnum)]
enum Title {
    Largest,
    Topmost,
    Caption,
}

#[derive(Parser)]
#[command(
    name = "catalog-extract",
    version,
    about = "Extract structured product records from a PDF product catalog"
)]
struct Cli {
    /// Path to the catalog PDF
    pdf_file: PathBuf,

    /// JSON configuration file; flags override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Grid rows per page
    #[arg(long)]
    rows: Option<u32>,

    /// Grid columns per page
    #[arg(long)]
    cols: Option<u32>,

    /// Pages beyond this count are ignored
    #[arg(long)]
    max_pages: Option<u32>,

    #[arg(long, value_enum)]
    layout: Option<Layout>,

    /// Product name heuristic
    #[arg(long, value_enum)]
    title: Option<Title>,

    /// Extract pages concurrently
    #[arg(long)]
    parallel: bool,

    /// Write the catalog JSON to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Print a processing summary to stderr
    #[arg(long)]
    summary: bool,
}

fn load_config(cli: &Cli) -> Result<ExtractionConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ExtractionConfig::from_json(&fs::read_to_string(path)?)?,
        None => ExtractionConfig::default(),
    };
    if let Some(rows) = cli.rows {
        config.rows = rows;
    }
    if let Some(cols) = cli.cols {
        config.cols = cols;
    }
    if let Some(max_pages) = cli.max_pages {
        config.max_pages = max_pages;
    }
    if let Some(layout) = cli.layout {
        config.layout = match layout {
            Layout::Grid => LayoutMode::Grid,
            Layout::Embedded => LayoutMode::EmbeddedImages,
        };
    }
    if let Some(title) = cli.title {
        config.title_strategy = match title {
            Title::Largest => TitleStrategy::LargestFont,
            Title::Topmost => TitleStrategy::Topmost,
            Title::Caption => TitleStrategy::CaptionLines,
        };
    }
    if cli.parallel {
        config.parallel_pages = true;
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    let result = process_catalog(&cli.pdf_file, &config)?;
    let json = result.catalog.to_json()?;

    match &cli.output {
        Some(path) => {
            fs::write(path, &json)?;
            eprintln!("Catalog written to: {}", path.display());
        }
        None => println!("{}", json),
    }

    if cli.summary {
        eprintln!("Catalog Extraction Summary");
        eprintln!("==========================");
        eprintln!("File: {}", cli.pdf_file.display());
        eprintln!("Stage: {:?}", result.stage);
        eprintln!("Pages processed: {}", result.pages_processed);
        eprintln!("Cells visited: {}", result.cells_visited);
        eprintln!("Cells skipped (blank): {}", result.cells_skipped_blank);
        eprintln!("Cells failed: {}", result.cells_failed);
        eprintln!("Products: {}", result.products_count);
        eprintln!("Images: {}", result.images_count);
        eprintln!("Processing time: {}ms", result.processing_time_ms);
        if let Some(reason) = &result.fallback_reason {
            eprintln!("Fallback: {}", reason);
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
