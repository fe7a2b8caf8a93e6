//! Keyword and template tables shared by the extraction strategies.
//!
//! All tables are compiled once and never mutated.

use std::sync::LazyLock;

use regex::Regex;

/// Header keywords naming the test-name column (matched on lowercased text).
pub static NAME_HEADER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"test\s*name").unwrap(),
        Regex::new(r"parameter").unwrap(),
        Regex::new(r"investigation").unwrap(),
        Regex::new(r"lab\s*test").unwrap(),
    ]
});

/// Header keywords naming the value column.
pub static VALUE_HEADER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"result").unwrap(),
        Regex::new(r"value").unwrap(),
        Regex::new(r"reading").unwrap(),
    ]
});

/// Header keywords naming the reference-range column.
pub static RANGE_HEADER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"reference\s*range").unwrap(),
        Regex::new(r"normal\s*range").unwrap(),
        Regex::new(r"bio\s*reference").unwrap(),
        Regex::new(r"expected\s*range").unwrap(),
    ]
});

/// Free-text layouts, each capturing (name, value, optional range):
/// 1. `Name: Value (Range)`
/// 2. `Name Value Range`
/// 3. `Name....Value....Range`
/// 4. `Name Result: Value Range`
pub static TEMPLATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"([A-Za-z0-9\s\-\+/]+)\s*:\s*([0-9\.]+)\s*(?:\(([0-9\.<>\-\s]+)\))?").unwrap(),
        Regex::new(r"([A-Za-z0-9\s\-\+/]+)\s+([0-9\.]+)\s+([0-9\.<>\-\s]+)").unwrap(),
        Regex::new(r"([A-Za-z0-9\s\-\+/]+)\.{2,}\s*([0-9\.]+)\.{2,}\s*([0-9\.<>\-\s]+)").unwrap(),
        Regex::new(r"([A-Za-z0-9\s\-\+/]+)\s+Result\s*:\s*([0-9\.]+)\s+([0-9\.<>\-\s]+)").unwrap(),
    ]
});

/// Analyte names recognized anywhere in a line, then a generic
/// `label:` / `label=` prefix. Group 1 is the name in every pattern.
pub static ANALYTE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(
            r"(Hemoglobin|WBC|RBC|Platelets|Glucose|Cholesterol|HDL|LDL|Triglycerides|Sodium|Potassium|Chloride|Calcium|Magnesium|Creatinine|BUN|ALT|AST|Bilirubin|Albumin|ALP|HbA1c)",
        )
        .unwrap(),
        Regex::new(r"(TSH|T3|T4|Vitamin D|B12|Folate|Iron|Ferritin)").unwrap(),
        Regex::new(r"([A-Za-z][A-Za-z\s\-]+)\s*[:=]").unwrap(),
    ]
});

/// First number in a text fragment.
pub static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*)").unwrap());

/// `low-high` with a hyphen or en-dash.
pub static DASH_RANGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.?\d*\s*[-–]\s*\d+\.?\d*)").unwrap());

/// Whether any pattern matches `text`.
pub fn matches_any(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

/// Column role a header cell announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRole {
    Name,
    Value,
    Range,
}

/// Role of one header cell. Name keywords win over value keywords, which win
/// over range keywords.
pub fn header_role(cell: &str) -> Option<HeaderRole> {
    let cell = cell.to_lowercase();
    if matches_any(&NAME_HEADER_PATTERNS, &cell) {
        Some(HeaderRole::Name)
    } else if matches_any(&VALUE_HEADER_PATTERNS, &cell) {
        Some(HeaderRole::Value)
    } else if matches_any(&RANGE_HEADER_PATTERNS, &cell) {
        Some(HeaderRole::Range)
    } else {
        None
    }
}

/// A line announcing both a name column and a value column.
pub fn is_header_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    matches_any(&NAME_HEADER_PATTERNS, &lower) && matches_any(&VALUE_HEADER_PATTERNS, &lower)
}
