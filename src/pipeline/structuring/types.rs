use serde::{Deserialize, Serialize};

/// One lab test as a strategy found it, before formatting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLabTest {
    pub name: String,
    pub value: String,
    pub range: String,
}

impl RawLabTest {
    pub fn new(name: &str, value: &str, range: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            range: range.to_string(),
        }
    }
}

/// Numeric when the reported value parses as a float, raw text otherwise
/// ("Positive", "Reactive", ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestValue {
    Number(f64),
    Text(String),
}

impl TestValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TestValue::Number(v) => Some(*v),
            TestValue::Text(_) => None,
        }
    }
}

/// A formatted lab test, serialized with the public output field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTestRecord {
    #[serde(rename = "test_name")]
    pub name: String,
    #[serde(rename = "test_value")]
    pub value: TestValue,
    /// Reference range exactly as read from the report (`N/A` when absent).
    #[serde(rename = "bio_reference_range")]
    pub range: String,
    #[serde(rename = "test_unit")]
    pub unit: String,
    #[serde(rename = "lab_test_out_of_range")]
    pub out_of_range: bool,
}

/// Result envelope for one processed report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTestResponse {
    pub is_success: bool,
    #[serde(default)]
    pub lab_tests: Vec<LabTestRecord>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl LabTestResponse {
    pub fn success(lab_tests: Vec<LabTestRecord>) -> Self {
        Self {
            is_success: true,
            lab_tests,
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            is_success: false,
            lab_tests: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Extraction strategies, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Delimited rows under a recognized header line.
    Tabular,
    /// Free-text `Name: Value (Range)` style templates.
    Templates,
    /// Known analyte names or `label:` prefixes, value on the same or next line.
    Aggressive,
    /// Cells of a reconstructed table grid.
    Grid,
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExtractionStrategy::Tabular => "tabular",
            ExtractionStrategy::Templates => "templates",
            ExtractionStrategy::Aggressive => "aggressive",
            ExtractionStrategy::Grid => "grid",
        };
        f.write_str(name)
    }
}

/// What one strategy produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyOutcome {
    NoMatch,
    Matched {
        strategy: ExtractionStrategy,
        tests: Vec<RawLabTest>,
    },
}

impl StrategyOutcome {
    /// `Matched` when `tests` is non-empty.
    pub fn from_tests(strategy: ExtractionStrategy, tests: Vec<RawLabTest>) -> Self {
        if tests.is_empty() {
            StrategyOutcome::NoMatch
        } else {
            StrategyOutcome::Matched { strategy, tests }
        }
    }

    /// Keep a match, otherwise run the next strategy.
    pub fn or_else(self, next: impl FnOnce() -> StrategyOutcome) -> StrategyOutcome {
        match self {
            StrategyOutcome::NoMatch => next(),
            matched => matched,
        }
    }

    pub fn strategy(&self) -> Option<ExtractionStrategy> {
        match self {
            StrategyOutcome::NoMatch => None,
            StrategyOutcome::Matched { strategy, .. } => Some(*strategy),
        }
    }

    pub fn into_tests(self) -> Vec<RawLabTest> {
        match self {
            StrategyOutcome::NoMatch => Vec::new(),
            StrategyOutcome::Matched { tests, .. } => tests,
        }
    }
}
