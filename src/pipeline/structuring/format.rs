use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{LabTestRecord, RawLabTest, TestValue};

static TRAILING_PARENTHETICAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)\s*$").unwrap());

static TRAILING_RESULT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*-\s*Result\s*$").unwrap());

static LESS_THAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*=?\s*(\d+\.?\d*)").unwrap());

static GREATER_THAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s*=?\s*(\d+\.?\d*)").unwrap());

static UNIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-zA-Z/%]+").unwrap());

/// Range used when nothing could be parsed. Every finite value except 0.0
/// falls outside it.
pub const UNPARSED_RANGE: (f64, f64) = (0.0, 0.0);

/// Collapse whitespace runs and drop a trailing `(...)` or `- Result`.
pub fn clean_test_name(name: &str) -> String {
    let collapsed = name.split_whitespace().collect::<Vec<_>>().join(" ");
    let without_paren = TRAILING_PARENTHETICAL.replace(&collapsed, "");
    let without_suffix = TRAILING_RESULT_SUFFIX.replace(&without_paren, "");
    without_suffix.trim().to_string()
}

/// Reference range as `(min, max)`.
///
/// - `"3.5-5.5"` -> (3.5, 5.5)
/// - `"< 200"`, `"<=200"` -> (-inf, 200)
/// - `"> 40"`, `">=40"` -> (40, +inf)
/// - anything else -> (0.0, 0.0)
pub fn parse_reference_range(range: &str) -> (f64, f64) {
    let range = range.trim();
    let has_comparator = range.contains('<') || range.contains('>');

    if range.contains('-') && !has_comparator {
        let parts: Vec<&str> = range.split('-').collect();
        if let [low, high] = parts.as_slice() {
            if let (Ok(low), Ok(high)) = (low.trim().parse::<f64>(), high.trim().parse::<f64>()) {
                return (low, high);
            }
        }
    }

    if range.contains('<') {
        if let Some(max) = first_capture_f64(&LESS_THAN, range) {
            return (f64::NEG_INFINITY, max);
        }
    }

    if range.contains('>') {
        if let Some(min) = first_capture_f64(&GREATER_THAN, range) {
            return (min, f64::INFINITY);
        }
    }

    UNPARSED_RANGE
}

fn first_capture_f64(pattern: &Regex, text: &str) -> Option<f64> {
    pattern.captures(text)?.get(1)?.as_str().parse().ok()
}

/// First letter/`/`/`%` run of the raw range text, or empty.
pub fn extract_unit(range: &str) -> String {
    UNIT.find(range)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Inclusive bounds; infinite bounds never trigger.
pub fn is_out_of_range(value: f64, (min, max): (f64, f64)) -> bool {
    (min.is_finite() && value < min) || (max.is_finite() && value > max)
}

/// Turn raw strings into a typed record.
pub fn format_lab_test(name: &str, value: &str, range: &str) -> LabTestRecord {
    let value = match value.trim().parse::<f64>() {
        Ok(v) => TestValue::Number(v),
        Err(_) => TestValue::Text(value.to_string()),
    };

    let out_of_range = value
        .as_f64()
        .map(|v| is_out_of_range(v, parse_reference_range(range)))
        .unwrap_or(false);

    LabTestRecord {
        name: clean_test_name(name),
        value,
        range: range.to_string(),
        unit: extract_unit(range),
        out_of_range,
    }
}

pub fn format_raw(raw: &RawLabTest) -> LabTestRecord {
    format_lab_test(&raw.name, &raw.value, &raw.range)
}

/// Drop records whose name was already seen; the first occurrence wins.
pub fn dedupe_by_name(records: Vec<LabTestRecord>) -> Vec<LabTestRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| seen.insert(r.name.clone()))
        .collect()
}
