//! In-memory staging area of a write session

use super::SeriesRef;
use crate::labels::{format_labels, LabelSet};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// A series held in the head
#[derive(Debug)]
pub struct MemSeries {
    pub labels: LabelSet,
    /// Samples keyed by timestamp, so reads come out time-ordered
    pub samples: BTreeMap<i64, f64>,
}

/// Series and samples committed to a session but not yet flushed.
#[derive(Debug)]
pub struct Head {
    /// Series by ref; ref N lives at index N - 1
    series: Vec<MemSeries>,
    /// Label set to ref
    index: BTreeMap<LabelSet, SeriesRef>,
    /// Maximum span between the oldest and newest sample
    range_ms: i64,
    /// Total sample count
    sample_count: usize,
    min_time: i64,
    max_time: i64,
}

impl Head {
    /// Create an empty head accepting samples spanning at most `range_ms`.
    pub fn new(range_ms: i64) -> Self {
        Self {
            series: Vec::new(),
            index: BTreeMap::new(),
            range_ms,
            sample_count: 0,
            min_time: i64::MAX,
            max_time: i64::MIN,
        }
    }

    /// Ref of the series with these labels, creating it if needed.
    pub fn get_or_create(&mut self, labels: &LabelSet) -> SeriesRef {
        if let Some(series_ref) = self.index.get(labels) {
            return *series_ref;
        }
        self.series.push(MemSeries {
            labels: labels.clone(),
            samples: BTreeMap::new(),
        });
        let series_ref = self.series.len() as SeriesRef;
        self.index.insert(labels.clone(), series_ref);
        series_ref
    }

    /// Ref to use for an append: `series_ref` when it matches `labels`,
    /// otherwise a lookup by labels.
    pub fn resolve_ref(&mut self, series_ref: SeriesRef, labels: &LabelSet) -> SeriesRef {
        match self.get(series_ref) {
            Some(series) if &series.labels == labels => series_ref,
            _ => self.get_or_create(labels),
        }
    }

    pub fn get(&self, series_ref: SeriesRef) -> Option<&MemSeries> {
        let idx = usize::try_from(series_ref).ok()?.checked_sub(1)?;
        self.series.get(idx)
    }

    /// Check that a sample can be inserted without changing the head.
    pub fn check(&self, series_ref: SeriesRef, timestamp: i64, value: f64) -> Result<()> {
        let series = self
            .get(series_ref)
            .ok_or_else(|| Error::Storage(format!("unknown series ref {}", series_ref)))?;

        if let Some(existing) = series.samples.get(&timestamp) {
            if existing.to_bits() != value.to_bits() {
                return Err(Error::DuplicateSample {
                    labels: format_labels(&series.labels),
                    timestamp,
                });
            }
        }

        if self.sample_count > 0 {
            let min = self.min_time.min(timestamp);
            let max = self.max_time.max(timestamp);
            if max - min >= self.range_ms {
                return Err(Error::Storage(format!(
                    "sample at {} outside head range [{}, {}] (block range {}ms)",
                    timestamp, self.min_time, self.max_time, self.range_ms
                )));
            }
        }
        Ok(())
    }

    /// Insert a sample. Returns false when an identical sample was already
    /// present.
    pub fn insert(&mut self, series_ref: SeriesRef, timestamp: i64, value: f64) -> Result<bool> {
        self.check(series_ref, timestamp, value)?;

        let idx = (series_ref - 1) as usize;
        if self.series[idx].samples.insert(timestamp, value).is_some() {
            return Ok(false);
        }
        self.sample_count += 1;
        self.min_time = self.min_time.min(timestamp);
        self.max_time = self.max_time.max(timestamp);
        Ok(true)
    }

    /// Series with at least one sample, ordered by label set.
    pub fn series(&self) -> impl Iterator<Item = &MemSeries> {
        self.index
            .values()
            .filter_map(|series_ref| self.get(*series_ref))
            .filter(|series| !series.samples.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn series_count(&self) -> usize {
        self.series().count()
    }

    /// Oldest sample timestamp, if any
    pub fn min_time(&self) -> Option<i64> {
        (!self.is_empty()).then_some(self.min_time)
    }

    /// Newest sample timestamp, if any
    pub fn max_time(&self) -> Option<i64> {
        (!self.is_empty()).then_some(self.max_time)
    }

    /// Drop all series and samples.
    pub fn clear(&mut self) {
        self.series.clear();
        self.index.clear();
        self.sample_count = 0;
        self.min_time = i64::MAX;
        self.max_time = i64::MIN;
    }
}
