//! Batch windowing over a feature table.

use super::{Sequence, SequenceBuilder, SequenceConfig};
use crate::error::{ForecastError, Result};
use crate::features::{FeatureRow, FeatureTable};
use log::debug;

/// Which windows an instrument contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    /// Windows `[i, i+W)` for every `i` with `i + W < len`; each carries the
    /// label of its last row, which must be present.
    Training,
    /// Every complete window `[i, i+W)` with `i + W <= len`; the last one ends
    /// at the most recent row. Labels are optional.
    Inference,
}

/// Slices per-instrument feature rows into fixed-length sequences.
#[derive(Debug, Clone)]
pub struct Windower {
    config: SequenceConfig,
}

impl Windower {
    /// Create a windower.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate.
    pub fn new(config: SequenceConfig) -> Result<Self> {
        config.validate().map_err(ForecastError::invalid_config)?;
        Ok(Self { config })
    }

    /// Configuration in use.
    pub fn config(&self) -> &SequenceConfig {
        &self.config
    }

    /// Window every instrument of a table, concatenated in instrument order.
    ///
    /// Within an instrument, sequences are emitted in chronological order.
    pub fn window_table(&self, table: &FeatureTable, mode: WindowMode) -> Result<Vec<Sequence>> {
        let mut sequences = Vec::new();
        for (instrument, rows) in table.groups() {
            let windows = self.window_instrument(instrument, rows, mode)?;
            debug!(
                "{instrument}: {} rows -> {} windows",
                rows.len(),
                windows.len()
            );
            sequences.extend(windows);
        }
        Ok(sequences)
    }

    /// Window one instrument's chronologically ordered rows.
    ///
    /// Fewer than `window_length` rows yield no sequences.
    ///
    /// # Errors
    ///
    /// - `LeakageGuardViolation` if a row belongs to another instrument, or a
    ///   training window ends on an unlabeled row
    /// - `Schema` if a row's feature count differs from the configuration
    pub fn window_instrument(
        &self,
        instrument: &str,
        rows: &[FeatureRow],
        mode: WindowMode,
    ) -> Result<Vec<Sequence>> {
        self.check_rows(instrument, rows)?;

        let w = self.config.window_length;
        let starts = match mode {
            WindowMode::Training => rows.len().saturating_sub(w),
            WindowMode::Inference => (rows.len() + 1).saturating_sub(w),
        };

        let mut sequences = Vec::with_capacity(starts.div_ceil(self.config.stride));
        for start in (0..starts).step_by(self.config.stride) {
            let sequence = Sequence::from_rows(&rows[start..start + w])?;
            if mode == WindowMode::Training && sequence.label.is_none() {
                return Err(ForecastError::leakage(format!(
                    "training window of '{instrument}' ending at {} has no label",
                    sequence.end_timestamp
                )));
            }
            sequences.push(sequence);
        }
        Ok(sequences)
    }

    /// The single most recent complete window of an instrument.
    ///
    /// # Errors
    ///
    /// `InsufficientHistory` when fewer than `window_length` rows are available.
    pub fn latest(&self, instrument: &str, rows: &[FeatureRow]) -> Result<Sequence> {
        let w = self.config.window_length;
        if rows.len() < w {
            return Err(ForecastError::InsufficientHistory {
                instrument: instrument.to_string(),
                required: w,
                available: rows.len(),
            });
        }
        self.check_rows(instrument, rows)?;

        let mut builder = SequenceBuilder::new(self.config.clone())?;
        for row in &rows[rows.len() - w..] {
            builder.push(row.clone())?;
        }
        builder.latest().ok_or(ForecastError::InsufficientHistory {
            instrument: instrument.to_string(),
            required: w,
            available: rows.len(),
        })
    }

    fn check_rows(&self, instrument: &str, rows: &[FeatureRow]) -> Result<()> {
        for row in rows {
            if row.instrument_id != instrument {
                return Err(ForecastError::leakage(format!(
                    "row for '{}' in window input of '{instrument}'",
                    row.instrument_id
                )));
            }
            if row.features.len() != self.config.feature_count {
                return Err(ForecastError::schema(format!(
                    "{instrument}: expected {} features per row, got {}",
                    self.config.feature_count,
                    row.features.len()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn rows(instrument: &str, n: usize) -> Vec<FeatureRow> {
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| FeatureRow {
                instrument_id: instrument.to_string(),
                timestamp: base + Duration::minutes(i as i64),
                features: Arc::new(vec![i as f64]),
                label: Some(i as f64),
            })
            .collect()
    }

    fn windower(w: usize) -> Windower {
        Windower::new(SequenceConfig::new(w, 1).with_feature_count(1)).unwrap()
    }

    #[test]
    fn test_training_window_count_and_labels() {
        let seqs = windower(20)
            .window_instrument("BTC", &rows("BTC", 25), WindowMode::Training)
            .unwrap();
        assert_eq!(seqs.len(), 5);
        for (i, seq) in seqs.iter().enumerate() {
            assert_eq!(seq.features[0][0], i as f64);
            assert_eq!(seq.features[19][0], (i + 19) as f64);
            assert_eq!(seq.label, Some((i + 19) as f64));
        }
    }

    #[test]
    fn test_inference_includes_final_window() {
        let seqs = windower(20)
            .window_instrument("BTC", &rows("BTC", 25), WindowMode::Inference)
            .unwrap();
        assert_eq!(seqs.len(), 6);
        assert_eq!(seqs.last().unwrap().features[19][0], 24.0);
    }

    #[test]
    fn test_short_instrument_contributes_nothing() {
        let w = windower(20);
        assert!(w
            .window_instrument("BTC", &rows("BTC", 19), WindowMode::Inference)
            .unwrap()
            .is_empty());
        assert!(w
            .window_instrument("BTC", &rows("BTC", 20), WindowMode::Training)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_stride() {
        let w = Windower::new(SequenceConfig::new(3, 2).with_feature_count(1)).unwrap();
        let seqs = w
            .window_instrument("BTC", &rows("BTC", 8), WindowMode::Training)
            .unwrap();
        let starts: Vec<f64> = seqs.iter().map(|s| s.features[0][0]).collect();
        assert_eq!(starts, vec![0.0, 2.0, 4.0]);
    }

    #[test]
    fn test_unlabeled_training_window_is_rejected() {
        let mut input = rows("BTC", 5);
        input[3].label = None;
        let err = windower(3)
            .window_instrument("BTC", &input, WindowMode::Training)
            .unwrap_err();
        assert!(matches!(err, ForecastError::LeakageGuardViolation { .. }));
    }

    #[test]
    fn test_latest() {
        let w = windower(20);
        let seq = w.latest("BTC", &rows("BTC", 30)).unwrap();
        assert_eq!(seq.features[0][0], 10.0);
        assert_eq!(seq.features[19][0], 29.0);

        let err = w.latest("BTC", &rows("BTC", 7)).unwrap_err();
        match err {
            ForecastError::InsufficientHistory {
                required,
                available,
                ..
            } => {
                assert_eq!(required, 20);
                assert_eq!(available, 7);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
