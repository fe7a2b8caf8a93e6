pub mod types;
pub mod sanitize;
pub mod preprocess;
pub mod ocr;
pub mod table_detect;
pub mod column_detect;
pub mod layout;

pub use types::*;
pub use sanitize::*;
pub use preprocess::*;
pub use ocr::*;
pub use table_detect::*;
pub use column_detect::*;
pub use layout::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid image input: {0}")]
    InvalidInput(String),

    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
