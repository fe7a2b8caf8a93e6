//! Lab report orchestrator.
//!
//! Single entry point that drives the full pipeline for one page image:
//! deskew → binarize → OCR → parse, with two fallbacks when the full-page
//! text yields nothing:
//! 1. table regions: crop, re-OCR as word boxes, rebuild lines and grid
//! 2. full-page word boxes rebuilt into lines and re-parsed
//!
//! The OCR engine is injected (`OcrEngine` trait) so the orchestrator is
//! fully testable with mock implementations.

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::pipeline::extraction::{
    crop_to_region, deskew_image, detect_table_regions, lines_to_text, preprocess_image,
    sanitize_ocr_text, validate_image, ColumnDetector, ExtractionError, LayoutReconstructor,
    OcrEngine, TableGrid,
};
use crate::pipeline::structuring::{dedupe_by_name, LabTestParser, LabTestRecord};

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Turns lab report images into lab test records.
///
/// Holds no per-document state; one instance can serve many threads.
pub struct LabReportProcessor {
    ocr: Box<dyn OcrEngine>,
    parser: LabTestParser,
    layout: LayoutReconstructor,
}

impl LabReportProcessor {
    pub fn new(ocr: Box<dyn OcrEngine>) -> Self {
        Self {
            ocr,
            parser: LabTestParser::new(),
            layout: LayoutReconstructor::default(),
        }
    }

    /// Swap the column heuristic used for grid reconstruction.
    pub fn with_column_detector(mut self, detector: Box<dyn ColumnDetector>) -> Self {
        self.layout = LayoutReconstructor::new(detector);
        self
    }

    /// Extract every lab test from a report image.
    ///
    /// OCR failures in one stage are logged and the next stage is tried.
    /// Fails with `OcrUnavailable` only when every OCR call failed; a page
    /// where nothing was recognized is an empty `Ok`.
    pub fn extract_lab_tests(
        &self,
        image: &DynamicImage,
    ) -> Result<Vec<LabTestRecord>, ExtractionError> {
        validate_image(image)?;
        info!(
            size = format!("{}x{}", image.width(), image.height()),
            "Processing lab report"
        );

        let deskewed = deskew_image(image)?;
        let processed = preprocess_image(&deskewed)?;
        let mut ocr_calls = OcrCalls::default();

        // Step 1: full-page text
        match self.ocr.recognize_text(&processed) {
            Ok(text) => {
                ocr_calls.succeeded();
                let records = self.parser.parse_text(&sanitize_ocr_text(&text));
                if !records.is_empty() {
                    info!(count = records.len(), "Lab tests extracted from full-page text");
                    return Ok(records);
                }
            }
            Err(e) => {
                warn!(error = %e, "Full-page OCR failed, trying table regions");
                ocr_calls.failed(e);
            }
        }

        // Step 2: table regions
        let mut records = self.extract_from_regions(&deskewed, &mut ocr_calls);

        // Step 3: full-page word boxes rebuilt into lines
        if records.is_empty() {
            debug!("Attempting line reconstruction on full page");
            match self.ocr.recognize_words(&processed) {
                Ok(words) => {
                    ocr_calls.succeeded();
                    let lines = self.layout.lines(&words);
                    records = self.parser.parse_text(&sanitize_ocr_text(&lines_to_text(&lines)));
                }
                Err(e) => {
                    warn!(error = %e, "Full-page word recognition failed");
                    ocr_calls.failed(e);
                }
            }
        }

        if let Some(error) = ocr_calls.into_total_failure() {
            return Err(error);
        }

        let unique = dedupe_by_name(records);
        info!(count = unique.len(), "Lab report processed");
        Ok(unique)
    }

    /// Reconstruct the page's table grid from OCR word boxes.
    pub fn extract_table_grid(&self, image: &DynamicImage) -> Result<TableGrid, ExtractionError> {
        let deskewed = deskew_image(image)?;
        let processed = preprocess_image(&deskewed)?;
        let words = self.ocr.recognize_words(&processed)?;
        Ok(self.layout.reconstruct(&words))
    }

    fn extract_from_regions(
        &self,
        page: &DynamicImage,
        ocr_calls: &mut OcrCalls,
    ) -> Vec<LabTestRecord> {
        let regions = detect_table_regions(page);
        let mut records = Vec::new();

        for (i, region) in regions.iter().enumerate() {
            info!(
                region = i + 1,
                total = regions.len(),
                bbox = ?region.bbox,
                "Processing table region"
            );

            let crop = crop_to_region(page, &region.bbox);
            let processed = match preprocess_image(&crop) {
                Ok(p) => p,
                Err(e) => {
                    warn!(region = i + 1, error = %e, "Skipping unusable table region");
                    continue;
                }
            };

            match self.ocr.recognize_words(&processed) {
                Ok(words) => {
                    ocr_calls.succeeded();
                    let lines = self.layout.lines(&words);
                    let grid = self.layout.grid_from_lines(&lines);
                    let text = sanitize_ocr_text(&lines_to_text(&lines));
                    records.extend(self.parser.extract(&text, Some(&grid)));
                }
                Err(e) => {
                    warn!(region = i + 1, error = %e, "Word recognition failed, using region text");
                    ocr_calls.failed(e);
                    match self.ocr.recognize_text(&processed) {
                        Ok(text) => {
                            ocr_calls.succeeded();
                            records.extend(self.parser.parse_text(&sanitize_ocr_text(&text)));
                        }
                        Err(e) => {
                            warn!(region = i + 1, error = %e, "Region OCR failed");
                            ocr_calls.failed(e);
                        }
                    }
                }
            }
        }

        records
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Tally of OCR outcomes for one document.
#[derive(Default)]
struct OcrCalls {
    succeeded: usize,
    last_error: Option<ExtractionError>,
}

impl OcrCalls {
    fn succeeded(&mut self) {
        self.succeeded += 1;
    }

    fn failed(&mut self, error: ExtractionError) {
        self.last_error = Some(error);
    }

    /// The last error, when no call succeeded.
    fn into_total_failure(self) -> Option<ExtractionError> {
        if self.succeeded > 0 {
            return None;
        }
        self.last_error.map(|e| match e {
            ExtractionError::OcrUnavailable(msg) => {
                ExtractionError::OcrUnavailable(format!("every OCR attempt failed: {msg}"))
            }
            other => other,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use image::{GrayImage, Luma, RgbImage};
    use imageproc::drawing::draw_hollow_rect_mut;
    use imageproc::rect::Rect;

    use super::*;
    use crate::pipeline::extraction::{BoundingBox, Column, Line, MockOcrEngine, WordBox};
    use crate::pipeline::structuring::TestValue;

    // -- Scripted OCR: successive text results, optional word failure ------

    struct ScriptedOcr {
        texts: Mutex<VecDeque<String>>,
        words: Option<Vec<WordBox>>,
        text_calls: AtomicUsize,
        word_calls: AtomicUsize,
    }

    impl ScriptedOcr {
        fn new(texts: &[&str], words: Option<Vec<WordBox>>) -> Self {
            Self {
                texts: Mutex::new(texts.iter().map(|t| t.to_string()).collect()),
                words,
                text_calls: AtomicUsize::new(0),
                word_calls: AtomicUsize::new(0),
            }
        }
    }

    impl OcrEngine for ScriptedOcr {
        fn recognize_text(&self, _image: &GrayImage) -> Result<String, ExtractionError> {
            self.text_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.texts.lock().unwrap().pop_front().unwrap_or_default())
        }

        fn recognize_words(&self, _image: &GrayImage) -> Result<Vec<WordBox>, ExtractionError> {
            self.word_calls.fetch_add(1, Ordering::SeqCst);
            self.words
                .clone()
                .ok_or_else(|| ExtractionError::OcrUnavailable("scripted word failure".into()))
        }
    }

    impl OcrEngine for std::sync::Arc<ScriptedOcr> {
        fn recognize_text(&self, image: &GrayImage) -> Result<String, ExtractionError> {
            self.as_ref().recognize_text(image)
        }

        fn recognize_words(&self, image: &GrayImage) -> Result<Vec<WordBox>, ExtractionError> {
            self.as_ref().recognize_words(image)
        }
    }

    // -- Images -------------------------------------------------------------

    fn blank_page() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 220, image::Rgb([255, 255, 255])))
    }

    fn page_with_table() -> DynamicImage {
        let mut img = GrayImage::from_pixel(320, 220, Luma([255]));
        draw_hollow_rect_mut(&mut img, Rect::at(40, 50).of_size(200, 100), Luma([0]));
        draw_hollow_rect_mut(&mut img, Rect::at(41, 51).of_size(198, 98), Luma([0]));
        DynamicImage::ImageLuma8(img)
    }

    fn word(text: &str, x: u32, y: u32) -> WordBox {
        WordBox::new(text, 0.9, BoundingBox::new(x, y, 8 * text.len() as u32, 14))
    }

    // -- Tests --------------------------------------------------------------

    #[test]
    fn blank_page_yields_no_records() {
        let processor = LabReportProcessor::new(Box::new(MockOcrEngine::new("")));
        let records = processor.extract_lab_tests(&blank_page()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn zero_pixel_image_is_rejected() {
        let processor = LabReportProcessor::new(Box::new(MockOcrEngine::new("")));
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(
            processor.extract_lab_tests(&empty),
            Err(ExtractionError::InvalidInput(_))
        ));
    }

    #[test]
    fn full_page_text_is_parsed() {
        let ocr = MockOcrEngine::new("Hemoglobin: 14.2 (12.0-16.0)\nWBC: 11000 (4000-11000)");
        let processor = LabReportProcessor::new(Box::new(ocr));
        let records = processor.extract_lab_tests(&blank_page()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Hemoglobin");
        assert_eq!(records[1].value, TestValue::Number(11000.0));
    }

    #[test]
    fn ocr_noise_is_sanitized_before_parsing() {
        let ocr = MockOcrEngine::new("Glucose\x0c: 95 (70-110)\r\n");
        let processor = LabReportProcessor::new(Box::new(ocr));
        let records = processor.extract_lab_tests(&blank_page()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Glucose");
    }

    #[test]
    fn region_text_is_used_when_region_words_fail() {
        let ocr = std::sync::Arc::new(ScriptedOcr::new(&["", "Sodium: 150 (135-145)"], None));
        let processor = LabReportProcessor::new(Box::new(ocr.clone()));
        let records = processor.extract_lab_tests(&page_with_table()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Sodium");
        assert!(records[0].out_of_range);
        assert_eq!(ocr.text_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn region_words_are_rebuilt_into_lines() {
        let words = vec![
            word("Potassium:", 10, 10),
            word("4.1", 100, 11),
            word("(3.5-5.1)", 140, 9),
        ];
        let ocr = std::sync::Arc::new(ScriptedOcr::new(&[""], Some(words)));
        let processor = LabReportProcessor::new(Box::new(ocr.clone()));
        let records = processor.extract_lab_tests(&page_with_table()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Potassium");
        assert_eq!(records[0].range, "3.5-5.1");
        // Region words succeeded, so the full-page word pass is skipped.
        assert_eq!(ocr.word_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn full_page_words_are_last_resort() {
        let words = vec![word("TSH:", 10, 10), word("2.5", 60, 12)];
        let ocr = MockOcrEngine::new("").with_words(words);
        let processor = LabReportProcessor::new(Box::new(ocr));
        let records = processor.extract_lab_tests(&blank_page()).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "TSH");
        assert_eq!(records[0].range, "N/A");
    }

    #[test]
    fn every_ocr_failure_is_an_error() {
        let processor = LabReportProcessor::new(Box::new(MockOcrEngine::failing()));
        assert!(matches!(
            processor.extract_lab_tests(&blank_page()),
            Err(ExtractionError::OcrUnavailable(_))
        ));
        assert!(matches!(
            processor.extract_lab_tests(&page_with_table()),
            Err(ExtractionError::OcrUnavailable(_))
        ));
    }

    #[test]
    fn partial_ocr_failure_is_not_an_error() {
        let ocr = MockOcrEngine::new("no lab values here").with_word_failure();
        let processor = LabReportProcessor::new(Box::new(ocr));
        let records = processor.extract_lab_tests(&page_with_table()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn table_grid_is_reconstructed() {
        let words = vec![word("Glucose", 10, 10), word("Urea", 11, 40)];
        let processor = LabReportProcessor::new(Box::new(MockOcrEngine::new("").with_words(words)));
        let grid = processor.extract_table_grid(&blank_page()).unwrap();
        assert_eq!(grid.rows, vec![vec!["Urea".to_string()]]);
    }

    #[test]
    fn table_grid_propagates_ocr_failure() {
        let processor = LabReportProcessor::new(Box::new(MockOcrEngine::failing()));
        assert!(processor.extract_table_grid(&blank_page()).is_err());
    }

    #[test]
    fn custom_column_detector_is_used() {
        struct OneWideColumn;
        impl ColumnDetector for OneWideColumn {
            fn detect_columns(&self, _lines: &[Line]) -> Vec<Column> {
                vec![Column::new(0.0, 10_000.0)]
            }
        }

        let words = vec![word("Iron", 300, 10)];
        let processor = LabReportProcessor::new(Box::new(MockOcrEngine::new("").with_words(words)))
            .with_column_detector(Box::new(OneWideColumn));
        let grid = processor.extract_table_grid(&blank_page()).unwrap();
        assert_eq!(grid.rows, vec![vec!["Iron".to_string()]]);
    }
}
