use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Axis-aligned pixel rectangle on the page image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge (`x + width`).
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge (`y + height`).
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Smallest box covering both `self` and `other`.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BoundingBox {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

/// A single recognized token with its confidence (0.0-1.0) and position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordBox {
    pub text: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl WordBox {
    pub fn new(text: &str, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            bbox,
        }
    }
}

/// Image sub-rectangle that geometrically looks like a table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TableRegion {
    pub bbox: BoundingBox,
    /// Polygon area of the contour that produced the region.
    pub area: f64,
}

/// OCR engine abstraction (allows mocking for tests).
///
/// Both calls receive the already preprocessed grayscale page or region.
/// Engine failures surface as `ExtractionError::OcrUnavailable`.
pub trait OcrEngine: Send + Sync {
    fn recognize_text(&self, image: &GrayImage) -> Result<String, ExtractionError>;

    fn recognize_words(&self, image: &GrayImage) -> Result<Vec<WordBox>, ExtractionError>;
}
