//! Online Statistics Accumulator - per-column numeric summaries.
//!
//! `Stats` keeps min/max current in O(1) as values arrive and retains every
//! parsed sample; mean, standard deviation, and percentiles are recomputed
//! from the retained sample on each `snapshot` call. Memory is O(n) in the
//! number of parseable cells, traded for exact percentiles.

use serde::Serialize;

/// Summary statistics for one numeric column.
///
/// All derived fields are `None` when `count == 0`. When `count > 0`,
/// `min <= p25 <= p50 <= p75 <= max`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStats {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub p25: Option<f64>,
    pub p50: Option<f64>,
    pub p75: Option<f64>,
}

impl ColumnStats {
    fn empty() -> Self {
        Self {
            count: 0,
            min: None,
            max: None,
            mean: None,
            median: None,
            std_dev: None,
            p25: None,
            p50: None,
            p75: None,
        }
    }
}

/// Running collector of numeric samples for one column.
#[derive(Debug, Default)]
pub struct Stats {
    values: Vec<f64>,
    min: Option<f64>,
    max: Option<f64>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw cell. Values that do not parse as a float are ignored
    /// and leave the accumulator untouched.
    pub fn update(&mut self, raw: &str) {
        let val: f64 = match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => return,
        };

        self.values.push(val);

        // First value initializes both extremes; ties keep the first seen.
        match self.min {
            Some(min) if val >= min => {}
            _ => self.min = Some(val),
        }
        match self.max {
            Some(max) if val <= max => {}
            _ => self.max = Some(val),
        }
    }

    /// Number of successfully parsed values.
    pub fn count(&self) -> u64 {
        self.values.len() as u64
    }

    /// Compute the current summary. Idempotent; does not mutate state.
    pub fn snapshot(&self) -> ColumnStats {
        if self.values.is_empty() {
            return ColumnStats::empty();
        }

        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        // Population variance, not the sample-corrected form.
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let p50 = percentile(&sorted, 50.0);

        ColumnStats {
            count: sorted.len() as u64,
            min: self.min,
            max: self.max,
            mean: Some(mean),
            median: Some(p50),
            std_dev: Some(variance.sqrt()),
            p25: Some(percentile(&sorted, 25.0)),
            p50: Some(p50),
            p75: Some(percentile(&sorted, 75.0)),
        }
    }
}

/// Quantile by linear interpolation between adjacent order statistics.
/// `sorted` must be ascending and non-empty.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
    }
}
