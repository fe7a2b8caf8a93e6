use serde::Serialize;
use tracing::debug;

use super::layout::Line;

/// Number of histogram bins over the horizontal span of a table.
pub const HISTOGRAM_BINS: usize = 20;

/// A bin must hold more than this many line starts to be a peak.
const MIN_PEAK_COUNT: usize = 1;

/// If no detected start lies within this distance of the leftmost line, one is
/// added there.
const LEFT_EDGE_SLACK: f64 = 20.0;

/// Half-open horizontal interval `[start, end)` in page pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Column {
    pub start: f64,
    pub end: f64,
}

impl Column {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Whether `x` falls inside `[start - slack, end + slack)`.
    pub fn accepts(&self, x: f64, slack: f64) -> bool {
        x >= self.start - slack && x < self.end + slack
    }
}

/// Column boundary strategy (allows swapping the heuristic).
pub trait ColumnDetector: Send + Sync {
    /// Left-to-right, non-overlapping columns for a set of lines.
    fn detect_columns(&self, lines: &[Line]) -> Vec<Column>;
}

/// Column starts from peaks in a histogram of line left edges.
///
/// Lines that start at the same x (within a bin) vote for a column. Works on
/// ruled and unruled tables alike because it only looks at where text begins.
#[derive(Debug, Clone, Copy)]
pub struct HistogramColumnDetector {
    pub bins: usize,
}

impl Default for HistogramColumnDetector {
    fn default() -> Self {
        Self {
            bins: HISTOGRAM_BINS,
        }
    }
}

impl ColumnDetector for HistogramColumnDetector {
    fn detect_columns(&self, lines: &[Line]) -> Vec<Column> {
        if lines.is_empty() || self.bins == 0 {
            return Vec::new();
        }

        let lefts: Vec<f64> = lines.iter().map(|l| l.bbox.x as f64).collect();
        let lo = lefts.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = lines
            .iter()
            .map(|l| l.bbox.right() as f64)
            .fold(f64::NEG_INFINITY, f64::max);

        if hi <= lo {
            return vec![Column::new(lo, hi)];
        }

        let counts = histogram(&lefts, lo, hi, self.bins);
        let bin_width = (hi - lo) / self.bins as f64;

        let mut starts: Vec<f64> = (0..self.bins)
            .filter(|&i| is_peak(&counts, i))
            .map(|i| lo + i as f64 * bin_width)
            .collect();

        if !starts.iter().any(|s| (s - lo).abs() <= LEFT_EDGE_SLACK) {
            starts.insert(0, lo);
        }

        let columns: Vec<Column> = starts
            .iter()
            .enumerate()
            .map(|(i, &start)| match starts.get(i + 1) {
                Some(&next) => Column::new(start, next - 1.0),
                None => Column::new(start, hi),
            })
            .collect();

        debug!(
            lines = lines.len(),
            columns = columns.len(),
            starts = ?starts,
            "Columns detected"
        );

        columns
    }
}

/// Equal-width bins over `[lo, hi]`; `hi` itself lands in the last bin.
fn histogram(values: &[f64], lo: f64, hi: f64, bins: usize) -> Vec<usize> {
    let mut counts = vec![0usize; bins];
    let width = (hi - lo) / bins as f64;
    for &v in values {
        if v < lo || v > hi {
            continue;
        }
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    counts
}

/// Strictly above both neighbours (missing neighbours count as 0) and above
/// the minimum peak count.
fn is_peak(counts: &[usize], i: usize) -> bool {
    let c = counts[i];
    let left = if i == 0 { 0 } else { counts[i - 1] };
    let right = counts.get(i + 1).copied().unwrap_or(0);
    c > MIN_PEAK_COUNT && c > left && c > right
}
