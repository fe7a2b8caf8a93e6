//! Run the processor over every PNG report in a directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pipeline::extraction::ExtractionError;
use crate::pipeline::processor::LabReportProcessor;
use crate::pipeline::structuring::LabTestRecord;

/// Lab tests found in one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileLabTests {
    pub file: String,
    pub lab_tests: Vec<LabTestRecord>,
}

/// Outcome of a directory run. Files that could not be decoded or processed
/// are not listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub processed_files: usize,
    pub results: Vec<FileLabTests>,
}

impl DatasetReport {
    /// Write the report as pretty-printed JSON.
    pub fn write_report(&self, path: &Path) -> Result<(), ExtractionError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), files = self.processed_files, "Dataset report written");
        Ok(())
    }
}

/// Process every `*.png` directly inside `dir`, in file-name order.
///
/// Fails only when the directory itself cannot be read.
pub fn process_dataset(
    dir: &Path,
    processor: &LabReportProcessor,
) -> Result<DatasetReport, ExtractionError> {
    let files = list_png_files(dir)?;
    info!(dir = %dir.display(), files = files.len(), "Processing dataset");

    let mut report = DatasetReport::default();

    for path in files {
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let image = match image::open(&path) {
            Ok(img) => img,
            Err(e) => {
                warn!(file = %file, error = %e, "Failed to read image");
                continue;
            }
        };

        match processor.extract_lab_tests(&image) {
            Ok(lab_tests) => report.results.push(FileLabTests { file, lab_tests }),
            Err(e) => warn!(file = %file, error = %e, "Error processing file"),
        }
    }

    report.processed_files = report.results.len();
    Ok(report)
}

fn list_png_files(dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "png"))
        .collect();
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::MockOcrEngine;
    use image::{Rgb, RgbImage};

    fn write_blank_png(dir: &Path, name: &str) {
        RgbImage::from_pixel(64, 48, Rgb([255, 255, 255]))
            .save(dir.join(name))
            .unwrap();
    }

    fn processor(text: &str) -> LabReportProcessor {
        LabReportProcessor::new(Box::new(MockOcrEngine::new(text)))
    }

    #[test]
    fn processes_png_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_blank_png(dir.path(), "b_report.png");
        write_blank_png(dir.path(), "a_report.png");
        std::fs::write(dir.path().join("notes.txt"), "Glucose: 95").unwrap();

        let report = process_dataset(dir.path(), &processor("Glucose: 95 (70-110)")).unwrap();

        assert_eq!(report.processed_files, 2);
        assert_eq!(report.results[0].file, "a_report.png");
        assert_eq!(report.results[1].file, "b_report.png");
        assert_eq!(report.results[0].lab_tests.len(), 1);
        assert_eq!(report.results[0].lab_tests[0].name, "Glucose");
    }

    #[test]
    fn undecodable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_blank_png(dir.path(), "good.png");
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();

        let report = process_dataset(dir.path(), &processor("")).unwrap();
        assert_eq!(report.processed_files, 1);
        assert_eq!(report.results[0].file, "good.png");
        assert!(report.results[0].lab_tests.is_empty());
    }

    #[test]
    fn failed_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_blank_png(dir.path(), "page.png");

        let failing = LabReportProcessor::new(Box::new(MockOcrEngine::failing()));
        let report = process_dataset(dir.path(), &failing).unwrap();
        assert_eq!(report.processed_files, 0);
        assert!(report.results.is_empty());
    }

    #[test]
    fn empty_directory_gives_empty_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = process_dataset(dir.path(), &processor("")).unwrap();
        assert_eq!(report, DatasetReport::default());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            process_dataset(&missing, &processor("")),
            Err(ExtractionError::Io(_))
        ));
    }

    #[test]
    fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        write_blank_png(dir.path(), "one.png");
        let report = process_dataset(dir.path(), &processor("TSH: 2.5")).unwrap();

        let out = dir.path().join("report.json");
        report.write_report(&out).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json["processed_files"], 1);
        assert_eq!(json["results"][0]["file"], "one.png");
        assert_eq!(json["results"][0]["lab_tests"][0]["test_name"], "TSH");
        assert_eq!(json["results"][0]["lab_tests"][0]["bio_reference_range"], "N/A");
    }
}
