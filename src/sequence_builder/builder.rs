//! Sequence types and the streaming per-instrument builder.

use crate::error::{ForecastError, Result};
use crate::features::{FeatureConfig, FeatureRow, FeatureVec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Configuration for window construction.
///
/// # Example
///
/// ```
/// use return_forecast::sequence_builder::SequenceConfig;
///
/// let config = SequenceConfig::new(20, 1).with_feature_count(9);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Rows per window
    pub window_length: usize,

    /// Rows between consecutive window starts (1 = sliding window)
    pub stride: usize,

    /// Features per row
    pub feature_count: usize,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            window_length: 20,
            stride: 1,
            feature_count: 9,
        }
    }
}

impl SequenceConfig {
    /// Create a configuration with the default feature count.
    pub fn new(window_length: usize, stride: usize) -> Self {
        Self {
            window_length,
            stride,
            ..Self::default()
        }
    }

    /// Derive the feature count from a feature configuration.
    pub fn from_feature_config(window_length: usize, features: &FeatureConfig) -> Self {
        Self::new(window_length, 1).with_feature_count(features.feature_count())
    }

    /// Set the feature count.
    pub fn with_feature_count(mut self, feature_count: usize) -> Self {
        self.feature_count = feature_count;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.window_length == 0 {
            return Err("window_length must be > 0".to_string());
        }
        if self.stride == 0 {
            return Err("stride must be > 0".to_string());
        }
        if self.feature_count == 0 {
            return Err("feature_count must be > 0".to_string());
        }
        Ok(())
    }
}

/// One model input: `window_length` consecutive rows of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    /// Instrument every row belongs to
    pub instrument_id: String,

    /// Feature vectors, oldest first: `features[step][feature]`
    pub features: Vec<FeatureVec>,

    /// Timestamp of the first row
    pub start_timestamp: DateTime<Utc>,

    /// Timestamp of the last row
    pub end_timestamp: DateTime<Utc>,

    /// Forward return of the last row (absent at inference time)
    pub label: Option<f64>,
}

impl Sequence {
    /// Build a window from consecutive rows.
    ///
    /// # Errors
    ///
    /// `LeakageGuardViolation` if the rows span more than one instrument.
    pub fn from_rows(rows: &[FeatureRow]) -> Result<Self> {
        let (first, last) = match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(ForecastError::schema("cannot build an empty sequence")),
        };
        if let Some(foreign) = rows.iter().find(|r| r.instrument_id != first.instrument_id) {
            return Err(ForecastError::leakage(format!(
                "window spans instruments '{}' and '{}'",
                first.instrument_id, foreign.instrument_id
            )));
        }

        Ok(Self {
            instrument_id: first.instrument_id.clone(),
            features: rows.iter().map(|r| FeatureVec::clone(&r.features)).collect(),
            start_timestamp: first.timestamp,
            end_timestamp: last.timestamp,
            label: last.label,
        })
    }

    /// Number of rows in the window.
    pub fn length(&self) -> usize {
        self.features.len()
    }

    /// Features per row.
    pub fn feature_count(&self) -> usize {
        self.features.first().map_or(0, |f| f.len())
    }

    /// Row-major flattened copy `[length * feature_count]`.
    pub fn as_flat(&self) -> Vec<f64> {
        let mut flat = Vec::with_capacity(self.length() * self.feature_count());
        for step in &self.features {
            flat.extend_from_slice(step);
        }
        flat
    }
}

/// Streaming window buffer for a single instrument.
///
/// Holds the most recent `window_length` rows; [`SequenceBuilder::latest`]
/// returns them as a [`Sequence`] once the buffer is full.
#[derive(Debug, Clone)]
pub struct SequenceBuilder {
    config: SequenceConfig,
    instrument_id: Option<String>,
    buffer: VecDeque<FeatureRow>,
    total_pushed: u64,
}

impl SequenceBuilder {
    /// Create a builder.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate.
    pub fn new(config: SequenceConfig) -> Result<Self> {
        config.validate().map_err(ForecastError::invalid_config)?;
        Ok(Self {
            buffer: VecDeque::with_capacity(config.window_length),
            config,
            instrument_id: None,
            total_pushed: 0,
        })
    }

    /// Push the next row.
    ///
    /// # Errors
    ///
    /// - `LeakageGuardViolation` if the row belongs to another instrument
    /// - `Schema` if its feature count differs from the configuration
    pub fn push(&mut self, row: FeatureRow) -> Result<()> {
        if row.features.len() != self.config.feature_count {
            return Err(ForecastError::schema(format!(
                "feature count mismatch: expected {}, got {}",
                self.config.feature_count,
                row.features.len()
            )));
        }
        match &self.instrument_id {
            Some(id) if *id != row.instrument_id => {
                return Err(ForecastError::leakage(format!(
                    "row for '{}' pushed into window buffer of '{id}'",
                    row.instrument_id
                )));
            }
            Some(_) => {}
            None => self.instrument_id = Some(row.instrument_id.clone()),
        }

        if self.buffer.len() == self.config.window_length {
            self.buffer.pop_front();
        }
        self.buffer.push_back(row);
        self.total_pushed += 1;
        Ok(())
    }

    /// Whether a full window is buffered.
    pub fn is_ready(&self) -> bool {
        self.buffer.len() == self.config.window_length
    }

    /// The most recent full window, if any.
    pub fn latest(&self) -> Option<Sequence> {
        if !self.is_ready() {
            return None;
        }
        let rows: Vec<FeatureRow> = self.buffer.iter().cloned().collect();
        Sequence::from_rows(&rows).ok()
    }

    /// Rows currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Rows pushed since creation or the last reset.
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    /// Clear the buffer and forget the instrument.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.instrument_id = None;
        self.total_pushed = 0;
    }
}
