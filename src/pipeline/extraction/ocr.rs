use image::GrayImage;

use super::types::{BoundingBox, OcrEngine, WordBox};
use super::ExtractionError;

/// Bundled Tesseract OCR engine (via leptess).
/// Only available when compiled with the `tesseract` feature flag.
///
/// A fresh Tesseract handle is created per call: handles are not `Sync`, and
/// one page never needs more than two recognitions.
#[cfg(feature = "tesseract")]
pub struct BundledTesseract {
    settings: crate::config::OcrSettings,
}

#[cfg(feature = "tesseract")]
impl BundledTesseract {
    /// Build from settings and check once that the language data loads.
    pub fn new(settings: crate::config::OcrSettings) -> Result<Self, ExtractionError> {
        let engine = Self { settings };
        engine.handle()?;
        tracing::info!(
            language = %engine.settings.language,
            psm = engine.settings.page_segmentation_mode,
            "Tesseract initialized"
        );
        Ok(engine)
    }

    fn handle(&self) -> Result<leptess::LepTess, ExtractionError> {
        let mut tess = leptess::LepTess::new(None, &self.settings.language)
            .map_err(|e| ExtractionError::OcrUnavailable(format!("Tesseract init: {e:?}")))?;
        tess.set_variable(
            leptess::Variable::TesseditPagesegMode,
            &self.settings.page_segmentation_mode.to_string(),
        )
        .map_err(|e| ExtractionError::OcrUnavailable(format!("Tesseract config: {e:?}")))?;
        Ok(tess)
    }

    fn load(&self, image: &GrayImage) -> Result<leptess::LepTess, ExtractionError> {
        let png = encode_png(image)?;
        let mut tess = self.handle()?;
        tess.set_image_from_mem(&png)
            .map_err(|e| ExtractionError::OcrUnavailable(format!("Tesseract image load: {e:?}")))?;
        Ok(tess)
    }
}

#[cfg(feature = "tesseract")]
impl OcrEngine for BundledTesseract {
    fn recognize_text(&self, image: &GrayImage) -> Result<String, ExtractionError> {
        let mut tess = self.load(image)?;
        tess.get_utf8_text()
            .map_err(|e| ExtractionError::OcrUnavailable(format!("Tesseract text: {e:?}")))
    }

    fn recognize_words(&self, image: &GrayImage) -> Result<Vec<WordBox>, ExtractionError> {
        let mut tess = self.load(image)?;
        let tsv = tess
            .get_tsv_text(0)
            .map_err(|e| ExtractionError::OcrUnavailable(format!("Tesseract TSV: {e:?}")))?;
        Ok(parse_tsv_words(&tsv))
    }
}

/// Encode a grayscale image as PNG bytes (leptess loads from memory).
pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>, ExtractionError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(bytes)
}

/// Mock OCR engine for unit testing without Tesseract.
///
/// Returns the configured text and word boxes for every image. Either call
/// can be made to fail to exercise fallback paths.
#[derive(Debug, Clone, Default)]
pub struct MockOcrEngine {
    pub text: String,
    pub words: Vec<WordBox>,
    pub fail_text: bool,
    pub fail_words: bool,
}

impl MockOcrEngine {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Self::default()
        }
    }

    pub fn with_words(mut self, words: Vec<WordBox>) -> Self {
        self.words = words;
        self
    }

    /// Both recognition calls fail.
    pub fn failing() -> Self {
        Self {
            fail_text: true,
            fail_words: true,
            ..Self::default()
        }
    }

    /// Only word-level recognition fails.
    pub fn with_word_failure(mut self) -> Self {
        self.fail_words = true;
        self
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize_text(&self, _image: &GrayImage) -> Result<String, ExtractionError> {
        if self.fail_text {
            return Err(ExtractionError::OcrUnavailable("mock text failure".into()));
        }
        Ok(self.text.clone())
    }

    fn recognize_words(&self, _image: &GrayImage) -> Result<Vec<WordBox>, ExtractionError> {
        if self.fail_words {
            return Err(ExtractionError::OcrUnavailable("mock word failure".into()));
        }
        Ok(self.words.clone())
    }
}

/// Parse Tesseract TSV output into word boxes.
/// TSV columns: level page_num block_num par_num line_num word_num left top width height conf text
/// Level 5 = individual word entries. Confidence is 0-100, scaled to 0.0-1.0.
/// Words Tesseract could not score (conf -1) and blank words are dropped.
pub fn parse_tsv_words(tsv: &str) -> Vec<WordBox> {
    let mut results = Vec::new();

    for line in tsv.lines().skip(1) {
        // Skip header row
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        // Level 5 = word
        let level: i32 = match fields[0].parse() {
            Ok(l) => l,
            Err(_) => continue,
        };
        if level != 5 {
            continue;
        }

        let conf: f32 = match fields[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };
        if conf < 0.0 {
            continue;
        }

        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }

        let Some(bbox) = parse_bounding_box(fields[6], fields[7], fields[8], fields[9]) else {
            continue;
        };

        results.push(WordBox::new(word, conf / 100.0, bbox));
    }

    results
}

/// Parse bounding box coordinates from TSV string fields.
fn parse_bounding_box(left: &str, top: &str, width: &str, height: &str) -> Option<BoundingBox> {
    Some(BoundingBox {
        x: left.trim().parse().ok()?,
        y: top.trim().parse().ok()?,
        width: width.trim().parse().ok()?,
        height: height.trim().parse().ok()?,
    })
}
