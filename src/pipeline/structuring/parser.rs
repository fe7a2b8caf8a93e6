//! Multi-strategy lab test extraction.
//!
//! Strategies run in a fixed priority order and the first one that finds
//! anything wins:
//! 1. Tabular: delimited rows under a recognized header line
//! 2. Templates: four free-text layouts, all applied, results combined
//! 3. Aggressive: analyte vocabulary or `label:` prefix, value nearby
//! 4. Grid: cells of a reconstructed table (only when a grid is supplied)
//!
//! Every entry point formats the winning strategy's output and drops
//! duplicate names.

use tracing::debug;

use super::format::{dedupe_by_name, format_raw};
use super::patterns::{
    header_role, is_header_line, matches_any, HeaderRole, ANALYTE_PATTERNS, DASH_RANGE_PATTERN,
    NAME_HEADER_PATTERNS, NUMBER_PATTERN, TEMPLATE_PATTERNS,
};
use super::types::{ExtractionStrategy, LabTestRecord, RawLabTest, StrategyOutcome};
use crate::pipeline::extraction::TableGrid;

/// Range recorded when the report shows none.
pub const MISSING_RANGE: &str = "N/A";

/// Text counts as delimited when a delimiter appears more than this many
/// times per line on average.
const DELIMITER_DENSITY: f64 = 1.5;

/// A comma-separated header has at most this many commas; more is prose.
const MAX_HEADER_COMMAS: usize = 5;

const POSITIONAL_NAME: usize = 0;
const POSITIONAL_VALUE: usize = 1;
const POSITIONAL_RANGE: usize = 2;

/// Stateless lab test extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabTestParser;

impl LabTestParser {
    pub fn new() -> Self {
        Self
    }

    // ═══════════════════════════════════════════════════════════
    // Entry points
    // ═══════════════════════════════════════════════════════════

    /// Tabular, then templates, then aggressive.
    pub fn parse_text(&self, text: &str) -> Vec<LabTestRecord> {
        let outcome = self
            .tabular(text)
            .or_else(|| self.templates(text))
            .or_else(|| self.aggressive(text));
        finish(outcome)
    }

    /// Grid strategy only.
    pub fn parse_grid(&self, grid: &TableGrid) -> Vec<LabTestRecord> {
        finish(self.grid(grid))
    }

    /// Text strategies, then the grid when one is supplied.
    pub fn extract(&self, text: &str, grid: Option<&TableGrid>) -> Vec<LabTestRecord> {
        let outcome = self
            .tabular(text)
            .or_else(|| self.templates(text))
            .or_else(|| self.aggressive(text))
            .or_else(|| grid.map_or(StrategyOutcome::NoMatch, |g| self.grid(g)));
        finish(outcome)
    }

    // ═══════════════════════════════════════════════════════════
    // Strategy 1: tabular text
    // ═══════════════════════════════════════════════════════════

    pub fn tabular(&self, text: &str) -> StrategyOutcome {
        if !is_tabular(text) {
            return StrategyOutcome::NoMatch;
        }

        let lines: Vec<&str> = text.split('\n').collect();
        let mut header_seen = false;

        for (i, line) in lines.iter().enumerate() {
            if !is_header_line(line) {
                continue;
            }
            header_seen = true;

            for delimiter in header_delimiters(line) {
                let roles = ColumnRoles::from_cells(line.split(delimiter));
                let Some(layout) = roles.named_layout() else {
                    continue;
                };
                let tests = delimited_rows(&lines[i + 1..], delimiter, &layout);
                if !tests.is_empty() {
                    return StrategyOutcome::from_tests(ExtractionStrategy::Tabular, tests);
                }
            }
        }

        if header_seen {
            return StrategyOutcome::NoMatch;
        }

        StrategyOutcome::from_tests(ExtractionStrategy::Tabular, positional_tab_rows(&lines))
    }

    // ═══════════════════════════════════════════════════════════
    // Strategy 2: free-text templates
    // ═══════════════════════════════════════════════════════════

    pub fn templates(&self, text: &str) -> StrategyOutcome {
        let mut tests = Vec::new();

        for pattern in TEMPLATE_PATTERNS.iter() {
            for caps in pattern.captures_iter(text) {
                let name = caps.get(1).map_or("", |m| m.as_str().trim());
                let value = caps.get(2).map_or("", |m| m.as_str().trim());
                let range = caps
                    .get(3)
                    .map(|m| m.as_str())
                    .filter(|r| !r.is_empty())
                    .map_or(MISSING_RANGE, str::trim);

                if name.is_empty() || value.is_empty() {
                    continue;
                }
                tests.push(RawLabTest::new(name, value, range));
            }
        }

        StrategyOutcome::from_tests(ExtractionStrategy::Templates, tests)
    }

    // ═══════════════════════════════════════════════════════════
    // Strategy 3: aggressive line scan
    // ═══════════════════════════════════════════════════════════

    pub fn aggressive(&self, text: &str) -> StrategyOutcome {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut tests = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let Some(name_match) = ANALYTE_PATTERNS
                .iter()
                .find_map(|p| p.captures(line).and_then(|c| c.get(1)))
            else {
                continue;
            };

            let next_line = lines.get(i + 1).copied().filter(|l| !l.trim().is_empty());

            let Some(value) = first_number(&line[name_match.end()..])
                .or_else(|| next_line.and_then(first_number))
            else {
                continue;
            };

            let range = first_dash_range(line)
                .or_else(|| next_line.and_then(first_dash_range))
                .unwrap_or(MISSING_RANGE);

            tests.push(RawLabTest::new(name_match.as_str().trim(), value, range));
        }

        StrategyOutcome::from_tests(ExtractionStrategy::Aggressive, tests)
    }

    // ═══════════════════════════════════════════════════════════
    // Strategy 4: reconstructed grid
    // ═══════════════════════════════════════════════════════════

    pub fn grid(&self, grid: &TableGrid) -> StrategyOutcome {
        let Some(first_row) = grid.rows.first().filter(|row| !row.is_empty()) else {
            return StrategyOutcome::NoMatch;
        };

        let roles = ColumnRoles::from_cells(first_row.iter().map(String::as_str));
        let (layout, skip_header) = match roles.named_layout() {
            Some(layout) => (layout, true),
            None => (ColumnLayout::positional(first_row.len()), roles.any()),
        };

        let tests: Vec<RawLabTest> = grid
            .rows
            .iter()
            .skip(usize::from(skip_header))
            .filter_map(|row| layout.pick(row.as_slice()))
            .collect();

        StrategyOutcome::from_tests(ExtractionStrategy::Grid, tests)
    }
}

// ═══════════════════════════════════════════════════════════
// Helpers
// ═══════════════════════════════════════════════════════════

fn finish(outcome: StrategyOutcome) -> Vec<LabTestRecord> {
    match outcome.strategy() {
        Some(strategy) => debug!(strategy = %strategy, "Extraction strategy matched"),
        None => debug!("No extraction strategy matched"),
    }
    let records = outcome.into_tests().iter().map(format_raw).collect();
    dedupe_by_name(records)
}

/// Header line present, or `|` / tab / `,` dense enough to be a delimiter.
pub fn is_tabular(text: &str) -> bool {
    let lines: Vec<&str> = text.split('\n').collect();
    if lines.iter().any(|l| is_header_line(l)) {
        return true;
    }

    let threshold = lines.len() as f64 * DELIMITER_DENSITY;
    ['|', '\t', ','].iter().any(|&d| {
        let count: usize = lines.iter().map(|l| l.matches(d).count()).sum();
        count as f64 > threshold
    })
}

/// Delimiters worth trying on a header line, in priority order.
fn header_delimiters(line: &str) -> Vec<char> {
    let commas = line.matches(',').count();
    let mut candidates = vec!['|', '\t'];
    if (1..=MAX_HEADER_COMMAS).contains(&commas) {
        candidates.push(',');
    }
    candidates.into_iter().filter(|&d| line.contains(d)).collect()
}

fn delimited_rows(lines: &[&str], delimiter: char, layout: &ColumnLayout) -> Vec<RawLabTest> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .filter_map(|l| {
            let cells: Vec<&str> = l.split(delimiter).map(str::trim).collect();
            layout.pick(cells.as_slice())
        })
        .collect()
}

/// Tab-separated rows without a header: name, value, range by position.
fn positional_tab_rows(lines: &[&str]) -> Vec<RawLabTest> {
    let layout = ColumnLayout {
        name: POSITIONAL_NAME,
        value: POSITIONAL_VALUE,
        range: Some(POSITIONAL_RANGE),
        range_required: false,
    };

    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .filter_map(|l| {
            let cells: Vec<&str> = l.split('\t').map(str::trim).collect();
            if cells.len() < 2 {
                return None;
            }
            if matches_any(&NAME_HEADER_PATTERNS, &cells[POSITIONAL_NAME].to_lowercase()) {
                return None;
            }
            layout.pick(cells.as_slice())
        })
        .collect()
}

fn first_number(text: &str) -> Option<&str> {
    NUMBER_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

fn first_dash_range(text: &str) -> Option<&str> {
    DASH_RANGE_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Column indices announced by a header row. Later cells overwrite earlier
/// ones with the same role.
#[derive(Debug, Default)]
struct ColumnRoles {
    name: Option<usize>,
    value: Option<usize>,
    range: Option<usize>,
}

impl ColumnRoles {
    fn from_cells<'a>(cells: impl Iterator<Item = &'a str>) -> Self {
        let mut roles = Self::default();
        for (j, cell) in cells.enumerate() {
            match header_role(cell.trim()) {
                Some(HeaderRole::Name) => roles.name = Some(j),
                Some(HeaderRole::Value) => roles.value = Some(j),
                Some(HeaderRole::Range) => roles.range = Some(j),
                None => {}
            }
        }
        roles
    }

    fn any(&self) -> bool {
        self.name.is_some() || self.value.is_some() || self.range.is_some()
    }

    /// Layout when both the name and value columns were found.
    fn named_layout(&self) -> Option<ColumnLayout> {
        Some(ColumnLayout {
            name: self.name?,
            value: self.value?,
            range: self.range,
            range_required: true,
        })
    }
}

/// Where name, value and range sit in a row.
#[derive(Debug)]
struct ColumnLayout {
    name: usize,
    value: usize,
    range: Option<usize>,
    /// Rows too short to hold the range column are skipped.
    range_required: bool,
}

impl ColumnLayout {
    /// Name 0, value 1, and range 2 when the header row is wide enough.
    fn positional(width: usize) -> Self {
        Self {
            name: POSITIONAL_NAME,
            value: POSITIONAL_VALUE,
            range: (width > POSITIONAL_RANGE).then_some(POSITIONAL_RANGE),
            range_required: true,
        }
    }

    fn widest(&self) -> usize {
        let widest = self.name.max(self.value);
        match self.range {
            Some(range) if self.range_required => widest.max(range),
            _ => widest,
        }
    }

    fn pick<S: AsRef<str>>(&self, cells: &[S]) -> Option<RawLabTest> {
        if cells.len() <= self.widest() {
            return None;
        }
        let name = cells[self.name].as_ref().trim();
        let value = cells[self.value].as_ref().trim();
        if name.is_empty() || value.is_empty() {
            return None;
        }
        let range = self
            .range
            .and_then(|r| cells.get(r))
            .map_or(MISSING_RANGE, |r| r.as_ref().trim());
        Some(RawLabTest::new(name, value, range))
    }
}
