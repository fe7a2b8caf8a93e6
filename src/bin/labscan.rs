//! Lab report extraction CLI
//!
//! # Usage
//!
//! ```bash
//! labscan report1.png report2.jpg
//! labscan --grid report.png
//! labscan --dataset ./samples --output results.json
//! ```
//!
//! Each image prints a JSON `LabTestResponse` (`is_success`, `lab_tests`,
//! `error`). `--grid` prints the reconstructed table grid instead.
//! OCR language and page segmentation mode default to `LABSCAN_OCR_LANG` /
//! `LABSCAN_OCR_PSM`, then `eng` / 6.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use labscan::config::{OcrSettings, APP_NAME};
use labscan::pipeline::batch::process_dataset;
use labscan::pipeline::extraction::BundledTesseract;
use labscan::pipeline::structuring::LabTestResponse;
use labscan::LabReportProcessor;

/// Command line arguments.
#[derive(Parser)]
#[command(name = APP_NAME, version)]
#[command(about = "Extract structured lab test results from lab report images")]
struct Args {
    /// Lab report images
    #[arg(required_unless_present = "dataset")]
    images: Vec<PathBuf>,

    /// Process every PNG in this directory instead
    #[arg(long, conflicts_with = "images")]
    dataset: Option<PathBuf>,

    /// Write the dataset report here instead of stdout
    #[arg(short, long, requires = "dataset")]
    output: Option<PathBuf>,

    /// Print the reconstructed table grid instead of lab tests
    #[arg(long)]
    grid: bool,

    /// Tesseract language code (e.g. 'eng', 'eng+fra')
    #[arg(long)]
    lang: Option<String>,

    /// Tesseract page segmentation mode (0-13)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=13))]
    psm: Option<u8>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    labscan::init_tracing();
    let args = Args::parse();

    let mut settings = OcrSettings::from_env();
    if let Some(lang) = args.lang {
        settings.language = lang;
    }
    if let Some(psm) = args.psm {
        settings.page_segmentation_mode = psm;
    }

    let processor = LabReportProcessor::new(Box::new(BundledTesseract::new(settings)?));

    if let Some(dir) = args.dataset {
        let report = process_dataset(&dir, &processor)?;
        match args.output {
            Some(path) => report.write_report(&path)?,
            None => println!("{}", serde_json::to_string_pretty(&report)?),
        }
        return Ok(());
    }

    for path in &args.images {
        info!(image = %path.display(), "Reading image");
        let image = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                error!(image = %path.display(), error = %e, "Invalid image file");
                let response = LabTestResponse::failure(format!("Invalid image file: {e}"));
                println!("{}", serde_json::to_string_pretty(&response)?);
                continue;
            }
        };

        if args.grid {
            match processor.extract_table_grid(&image) {
                Ok(grid) => println!("{}", serde_json::to_string_pretty(&grid)?),
                Err(e) => error!(image = %path.display(), error = %e, "Grid reconstruction failed"),
            }
            continue;
        }

        let response = match processor.extract_lab_tests(&image) {
            Ok(lab_tests) => LabTestResponse::success(lab_tests),
            Err(e) => {
                error!(image = %path.display(), error = %e, "Error processing lab report");
                LabTestResponse::failure(e)
            }
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
    }

    Ok(())
}
