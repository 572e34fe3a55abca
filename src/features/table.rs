//! Feature rows and the per-instrument table that holds them.

use crate::labeling::LabelStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared feature vector. Windows overlap by `window_length - 1` rows, so rows
/// are shared instead of copied.
pub type FeatureVec = Arc<Vec<f64>>;

/// One instrument at one timestamp, after feature computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Instrument the row belongs to
    pub instrument_id: String,
    /// Observation time (minute-floored when configured)
    pub timestamp: DateTime<Utc>,
    /// Causal features in schema order
    pub features: FeatureVec,
    /// Forward return, absent when the future point does not exist
    pub label: Option<f64>,
}

impl FeatureRow {
    /// Feature value by index.
    #[inline]
    pub fn feature(&self, index: usize) -> Option<f64> {
        self.features.get(index).copied()
    }

    /// Whether the row carries a label.
    #[inline]
    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }
}

/// Feature rows grouped by instrument, each group in chronological order.
///
/// Instruments iterate in lexicographic order, so concatenating groups is
/// reproducible.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    feature_names: Vec<String>,
    groups: BTreeMap<String, Vec<FeatureRow>>,
}

impl FeatureTable {
    /// Create an empty table for the given feature names.
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            groups: BTreeMap::new(),
        }
    }

    /// Insert (or replace) the rows of one instrument.
    pub fn insert(&mut self, instrument: impl Into<String>, rows: Vec<FeatureRow>) {
        self.groups.insert(instrument.into(), rows);
    }

    /// Feature names in vector order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Instruments in iteration order.
    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Rows of one instrument (empty if unknown).
    pub fn rows(&self, instrument: &str) -> &[FeatureRow] {
        self.groups.get(instrument).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All groups.
    pub fn groups(&self) -> &BTreeMap<String, Vec<FeatureRow>> {
        &self.groups
    }

    /// Number of instruments (including ones with zero rows).
    pub fn instrument_count(&self) -> usize {
        self.groups.len()
    }

    /// Total rows across instruments.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Whether the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every label present, instruments in order.
    pub fn labels(&self) -> Vec<f64> {
        self.groups
            .values()
            .flatten()
            .filter_map(|r| r.label)
            .collect()
    }

    /// Distribution of labels across the table.
    pub fn label_stats(&self) -> LabelStats {
        LabelStats::from_labels(&self.labels())
    }
}
