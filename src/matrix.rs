//! In-memory range query results.

use crate::labels::LabelSet;

/// A single data point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Sample value; NaN and infinities are kept as-is
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A labeled series of samples. Samples are not required to be sorted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub labels: LabelSet,
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    pub fn new(labels: LabelSet, samples: Vec<Sample>) -> Self {
        Self { labels, samples }
    }
}

/// Result of a range query: independent series in no particular order.
pub type Matrix = Vec<TimeSeries>;

/// Total number of samples across all series of a matrix.
pub fn sample_count(matrix: &Matrix) -> usize {
    matrix.iter().map(|s| s.samples.len()).sum()
}
