use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;

use price_list_ocr::{Config, OutputFormat};

#[derive(Parser, Debug)]
#[command(
    name = "price-list-ocr",
    version,
    about = "Rebuild price-list tables from OCR results"
)]
struct Cli {
    /// OCR result files (JSON with rec_texts/rec_boxes), in output order
    #[arg(value_name = "OCR_JSON", required_unless_present = "serve")]
    inputs: Vec<PathBuf>,

    /// Per-image cut positions ({"lines": {"img.jpg": [120, 680]}, "line_gap": 6.5})
    #[arg(long = "lines")]
    lines: Option<PathBuf>,

    /// Cut positions used for images without their own (e.g. 120,680,800)
    #[arg(long = "cuts", value_delimiter = ',')]
    cuts: Option<Vec<f64>>,

    /// Maximum vertical gap between fragments of one line
    #[arg(long = "line-gap")]
    line_gap: Option<f64>,

    /// Reference catalog of brands and models (JSON)
    #[arg(long = "catalog")]
    catalog: Option<PathBuf>,

    /// Output format: json or tsv
    #[arg(long = "format", default_value = "json")]
    format: String,

    /// Write the table to a file instead of stdout
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Parallel page workers (0 = one per CPU)
    #[arg(long = "workers")]
    workers: Option<usize>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Run the HTTP server instead of processing files
    #[arg(long = "serve")]
    serve: bool,

    /// Server bind address
    #[arg(long = "addr", default_value = "127.0.0.1:8787")]
    addr: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    price_list_ocr::logging::init(cli.verbose)?;

    if cli.serve {
        let mut settings = price_list_ocr::settings::load_settings(cli.read_settings.as_deref())?;
        if let Some(path) = cli.catalog.as_deref() {
            settings.catalog_path = Some(path.display().to_string());
        }
        return price_list_ocr::server::run_server(settings, cli.addr).await;
    }

    let format: OutputFormat = cli.format.parse()?;
    let output = price_list_ocr::run(Config {
        inputs: cli.inputs,
        lines_path: cli.lines,
        cuts: cli.cuts,
        line_gap: cli.line_gap,
        catalog_path: cli.catalog,
        format,
        workers: cli.workers,
        settings_path: cli.read_settings,
    })
    .await?;

    for failure in output.failures() {
        eprintln!(
            "{}: {}",
            failure.id,
            failure.error.as_deref().unwrap_or("failed")
        );
    }
    write_output(cli.output.as_deref(), &output.rendered)
}

fn write_output(path: Option<&Path>, rendered: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("failed to write output: {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}
