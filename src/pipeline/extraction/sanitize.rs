/// Sanitize raw OCR text before it reaches the field extractor.
///
/// Normalizes line endings and strips control characters (form feeds,
/// NULs, ...). Tabs and newlines are kept: both carry table structure.
/// Line layout is otherwise untouched, blank lines included.
pub fn sanitize_ocr_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}
