//! Rebuild reading order from OCR word boxes.
//!
//! Word boxes -> text lines (y clustering) -> column boundaries
//! (`ColumnDetector`) -> a row/column grid of cell strings.

use serde::Serialize;
use tracing::debug;

use super::column_detect::{Column, ColumnDetector, HistogramColumnDetector};
use super::types::{BoundingBox, WordBox};

/// Fraction of a line's first box height tolerated as vertical drift.
const LINE_Y_TOLERANCE_RATIO: f64 = 0.5;

/// Horizontal slack (px) when matching a line's left edge to a column.
const COLUMN_MATCH_SLACK: f64 = 10.0;

// ═══════════════════════════════════════════════════════════
// Lines
// ═══════════════════════════════════════════════════════════

/// Word boxes sharing a baseline, left to right.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub words: Vec<WordBox>,
    pub bbox: BoundingBox,
    pub text: String,
}

impl Line {
    fn from_words(mut words: Vec<WordBox>) -> Option<Self> {
        words.sort_by_key(|w| w.bbox.x);
        let first = words.first()?.bbox;
        let bbox = words.iter().fold(first, |acc, w| acc.union(&w.bbox));
        let text = words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Some(Self { words, bbox, text })
    }
}

/// Cluster word boxes into text lines.
///
/// Boxes are taken top to bottom (stable on equal y). The first box of a line
/// fixes its reference y and tolerance (half its height); later boxes join
/// while their y stays within that tolerance of the reference.
pub fn group_lines(words: &[WordBox]) -> Vec<Line> {
    let mut sorted: Vec<&WordBox> = words.iter().collect();
    sorted.sort_by_key(|w| w.bbox.y);

    let mut lines = Vec::new();
    let mut current: Vec<WordBox> = Vec::new();
    let mut reference_y = 0.0;
    let mut tolerance = 0.0;

    for word in sorted {
        let y = word.bbox.y as f64;
        if !current.is_empty() && (y - reference_y).abs() <= tolerance {
            current.push(word.clone());
            continue;
        }
        if let Some(line) = Line::from_words(std::mem::take(&mut current)) {
            lines.push(line);
        }
        reference_y = y;
        tolerance = LINE_Y_TOLERANCE_RATIO * word.bbox.height as f64;
        current.push(word.clone());
    }
    if let Some(line) = Line::from_words(current) {
        lines.push(line);
    }

    lines
}

/// Line texts joined with newlines, in reading order.
pub fn lines_to_text(lines: &[Line]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

// ═══════════════════════════════════════════════════════════
// Grid
// ═══════════════════════════════════════════════════════════

/// Rows x columns of cell text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TableGrid {
    pub rows: Vec<Vec<String>>,
}

impl TableGrid {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Place lines into cells.
///
/// Each line goes to the first column accepting its left edge (+/-10 px)
/// and overwrites that cell of the row in progress. A line that fits no column
/// closes the current row if it holds anything. The last non-empty row is
/// kept.
pub fn build_grid(lines: &[Line], columns: &[Column]) -> TableGrid {
    let mut grid = TableGrid::default();
    if columns.is_empty() {
        return grid;
    }

    let mut row = vec![String::new(); columns.len()];
    for line in lines {
        let left = line.bbox.x as f64;
        match columns.iter().position(|c| c.accepts(left, COLUMN_MATCH_SLACK)) {
            Some(col) => row[col] = line.text.trim().to_string(),
            None => {
                if row.iter().any(|cell| !cell.is_empty()) {
                    let blank = vec![String::new(); columns.len()];
                    grid.rows.push(std::mem::replace(&mut row, blank));
                }
            }
        }
    }
    if row.iter().any(|cell| !cell.is_empty()) {
        grid.rows.push(row);
    }

    grid
}

// ═══════════════════════════════════════════════════════════
// Reconstructor
// ═══════════════════════════════════════════════════════════

/// Lines and grid reconstruction with a pluggable column heuristic.
pub struct LayoutReconstructor {
    detector: Box<dyn ColumnDetector>,
}

impl Default for LayoutReconstructor {
    fn default() -> Self {
        Self::new(Box::new(HistogramColumnDetector::default()))
    }
}

impl LayoutReconstructor {
    pub fn new(detector: Box<dyn ColumnDetector>) -> Self {
        Self { detector }
    }

    pub fn lines(&self, words: &[WordBox]) -> Vec<Line> {
        group_lines(words)
    }

    pub fn columns(&self, lines: &[Line]) -> Vec<Column> {
        self.detector.detect_columns(lines)
    }

    /// Words -> lines -> columns -> grid.
    pub fn reconstruct(&self, words: &[WordBox]) -> TableGrid {
        let lines = self.lines(words);
        self.grid_from_lines(&lines)
    }

    pub fn grid_from_lines(&self, lines: &[Line]) -> TableGrid {
        let columns = self.columns(lines);
        let grid = build_grid(lines, &columns);
        debug!(
            lines = lines.len(),
            columns = columns.len(),
            rows = grid.row_count(),
            "Table grid reconstructed"
        );
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(text: &str, x: u32, y: u32, w: u32, h: u32) -> WordBox {
        WordBox::new(text, 0.9, BoundingBox::new(x, y, w, h))
    }

    #[test]
    fn words_on_one_baseline_form_one_line() {
        let words = vec![
            word("14.2", 200, 101, 40, 20),
            word("Hemoglobin", 10, 100, 120, 20),
            word("g/dL", 260, 98, 40, 20),
        ];
        let lines = group_lines(&words);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Hemoglobin 14.2 g/dL");
        assert_eq!(lines[0].bbox, BoundingBox::new(10, 98, 290, 23));
    }

    #[test]
    fn distant_rows_split() {
        let words = vec![
            word("Sodium", 10, 100, 80, 20),
            word("140", 200, 100, 30, 20),
            word("Potassium", 10, 130, 100, 20),
            word("4.1", 200, 131, 30, 20),
        ];
        let lines = group_lines(&words);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Sodium 140");
        assert_eq!(lines[1].text, "Potassium 4.1");
    }

    #[test]
    fn tolerance_is_fixed_by_first_box() {
        // A tall box joining later does not widen the tolerance.
        let words = vec![
            word("a", 0, 100, 10, 10),
            word("b", 20, 104, 10, 60),
            word("c", 40, 108, 10, 10),
        ];
        let lines = group_lines(&words);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "a b");
        assert_eq!(lines[1].text, "c");
    }

    #[test]
    fn line_bbox_contains_every_word() {
        let words = vec![
            word("x", 50, 10, 5, 12),
            word("y", 5, 12, 20, 14),
            word("z", 90, 11, 30, 9),
        ];
        for line in group_lines(&words) {
            for w in &line.words {
                assert!(line.bbox.contains(&w.bbox));
            }
        }
    }

    #[test]
    fn grouping_is_deterministic() {
        let words = vec![
            word("Urea", 10, 50, 50, 18),
            word("30", 150, 52, 20, 18),
            word("mg/dL", 190, 50, 50, 18),
            word("Creatinine", 10, 80, 90, 18),
            word("1.0", 150, 79, 20, 18),
        ];
        assert_eq!(group_lines(&words), group_lines(&words));
    }

    #[test]
    fn empty_input_gives_no_lines() {
        assert!(group_lines(&[]).is_empty());
        assert_eq!(lines_to_text(&[]), "");
    }

    #[test]
    fn lines_to_text_joins_with_newlines() {
        let words = vec![
            word("Glucose:", 10, 10, 60, 12),
            word("95", 80, 10, 20, 12),
            word("HDL:", 10, 40, 40, 12),
        ];
        assert_eq!(lines_to_text(&group_lines(&words)), "Glucose: 95\nHDL:");
    }

    #[test]
    fn grid_flushes_row_on_unassigned_line() {
        let words = vec![
            word("Glucose", 10, 10, 60, 12),
            word("250", 200, 40, 30, 12),
            word("note", 500, 70, 40, 12),
            word("HDL", 12, 100, 30, 12),
        ];
        let lines = group_lines(&words);
        let columns = vec![Column::new(10.0, 150.0), Column::new(200.0, 300.0)];
        let grid = build_grid(&lines, &columns);

        assert_eq!(
            grid.rows,
            vec![
                vec!["Glucose".to_string(), "250".to_string()],
                vec!["HDL".to_string(), String::new()],
            ]
        );
    }

    #[test]
    fn line_at_end_plus_slack_goes_to_next_column() {
        let lines = group_lines(&[word("val", 209, 10, 30, 12)]);
        let columns = vec![Column::new(10.0, 199.0), Column::new(200.0, 400.0)];
        let grid = build_grid(&lines, &columns);
        assert_eq!(grid.rows, vec![vec![String::new(), "val".to_string()]]);
    }

    #[test]
    fn grid_cells_are_overwritten_within_a_row() {
        let words = vec![word("first", 10, 10, 40, 12), word("second", 11, 40, 40, 12)];
        let lines = group_lines(&words);
        let grid = build_grid(&lines, &[Column::new(10.0, 100.0)]);
        assert_eq!(grid.rows, vec![vec!["second".to_string()]]);
    }

    #[test]
    fn no_columns_no_grid() {
        let lines = group_lines(&[word("alone", 10, 10, 40, 12)]);
        assert!(build_grid(&lines, &[]).is_empty());
    }

    #[test]
    fn reconstructor_uses_injected_detector() {
        struct FixedColumns;
        impl ColumnDetector for FixedColumns {
            fn detect_columns(&self, _lines: &[Line]) -> Vec<Column> {
                vec![Column::new(0.0, 1000.0)]
            }
        }

        let words = vec![word("TSH", 10, 10, 40, 12), word("2.5", 80, 10, 20, 12)];
        let grid = LayoutReconstructor::new(Box::new(FixedColumns)).reconstruct(&words);
        assert_eq!(grid.rows, vec![vec!["TSH 2.5".to_string()]]);
    }

    #[test]
    fn default_reconstructor_builds_grid() {
        let words = vec![word("Iron", 10, 10, 40, 12)];
        let grid = LayoutReconstructor::default().reconstruct(&words);
        assert_eq!(grid.rows, vec![vec!["Iron".to_string()]]);
    }
}
