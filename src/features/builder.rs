//! Per-instrument feature computation.

use super::{FeatureConfig, FeatureRow, FeatureTable, SpacingPolicy, VolatilitySource};
use crate::error::{ForecastError, Result};
use crate::labeling::forward_returns;
use crate::observation::{floor_to_minute, ObservationRow, ObservationTable};
use crate::preprocessing::rolling::{pct_change, trailing_std};
use crate::schema::FeatureSchema;
use crate::validation::spacing_violations;
use chrono::{DateTime, Timelike, Utc};
use log::{debug, warn};
use rayon::prelude::*;
use std::f64::consts::PI;
use std::sync::Arc;

/// Whether rows without a forward label are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMode {
    /// Drop rows without a label (the last `horizon` rows of each instrument)
    Training,
    /// Keep unlabeled rows; only the input features must be present
    Inference,
}

/// Computes [`FeatureRow`]s from raw observations.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureConfig,
    schema: FeatureSchema,
}

impl FeatureBuilder {
    /// Create a builder.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate.
    pub fn new(config: FeatureConfig) -> Result<Self> {
        config.validate().map_err(ForecastError::invalid_config)?;
        let schema = FeatureSchema::from_config(&config);
        Ok(Self { config, schema })
    }

    /// Configuration in use.
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Schema of the produced feature vectors.
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Feature names in vector order.
    pub fn feature_names(&self) -> Vec<String> {
        self.schema.owned_names()
    }

    /// Build a labeled table for training.
    pub fn build(&self, table: &ObservationTable) -> Result<FeatureTable> {
        self.build_with_mode(table, BuildMode::Training)
    }

    /// Build a table, grouping by instrument and computing groups in parallel.
    ///
    /// The first failing instrument (in instrument order) fails the batch. Use
    /// [`crate::batch::BatchProcessor`] to collect per-instrument errors instead.
    pub fn build_with_mode(&self, table: &ObservationTable, mode: BuildMode) -> Result<FeatureTable> {
        let groups = table.group_by_instrument();

        let built: Vec<(String, Result<Vec<FeatureRow>>)> = groups
            .par_iter()
            .map(|(instrument, rows)| (instrument.clone(), self.build_instrument(instrument, rows, mode)))
            .collect();

        let mut output = FeatureTable::new(self.feature_names());
        for (instrument, rows) in built {
            output.insert(instrument, rows?);
        }
        Ok(output)
    }

    /// Compute features for one instrument's rows.
    ///
    /// Rows may arrive in any order; they are stably sorted by timestamp first.
    /// An instrument with too few rows yields an empty vector, not an error.
    ///
    /// # Errors
    ///
    /// - `LeakageGuardViolation` if a row belongs to another instrument
    /// - `Schema` on out-of-domain close, volume or sentiment
    /// - `IrregularSpacing` when the spacing policy is `Reject` and a gap is found
    pub fn build_instrument(
        &self,
        instrument: &str,
        rows: &[ObservationRow],
        mode: BuildMode,
    ) -> Result<Vec<FeatureRow>> {
        if let Some(foreign) = rows.iter().find(|r| r.instrument_id != instrument) {
            return Err(ForecastError::leakage(format!(
                "row for '{}' passed to feature computation of '{instrument}'",
                foreign.instrument_id
            )));
        }

        let mut ordered: Vec<&ObservationRow> = rows.iter().collect();
        ordered.sort_by_key(|r| r.timestamp);

        let mut sentiment = Vec::with_capacity(ordered.len());
        for row in &ordered {
            row.check_domain()?;
            sentiment.push(row.sentiment.to_numeric()?);
        }

        let timestamps: Vec<DateTime<Utc>> = ordered
            .iter()
            .map(|r| {
                if self.config.floor_to_minute {
                    floor_to_minute(r.timestamp)
                } else {
                    r.timestamp
                }
            })
            .collect();
        self.check_spacing(instrument, &timestamps)?;

        let closes: Vec<f64> = ordered.iter().map(|r| r.close).collect();
        let vol_input: Vec<f64> = match self.config.volatility_source {
            VolatilitySource::Close => closes.clone(),
            VolatilitySource::Volume => ordered.iter().map(|r| r.volume).collect(),
        };

        let labels = forward_returns(&closes, self.config.horizon);
        let returns: Vec<Vec<Option<f64>>> = self
            .config
            .return_windows
            .iter()
            .map(|&n| pct_change(&closes, n))
            .collect();
        let volatility: Vec<Vec<Option<f64>>> = self
            .config
            .volatility_windows
            .iter()
            .map(|&n| trailing_std(&vol_input, n))
            .collect();

        let feature_count = self.schema.total_count();
        let mut output = Vec::with_capacity(ordered.len());
        let mut dropped = 0usize;

        for i in 0..ordered.len() {
            let label = labels[i];
            if mode == BuildMode::Training && label.is_none() {
                dropped += 1;
                continue;
            }

            let mut features = Vec::with_capacity(feature_count);
            features.push(Some(sentiment[i]));
            features.extend(returns.iter().map(|series| series[i]));
            features.extend(volatility.iter().map(|series| series[i]));
            let (sin_hour, cos_hour) = hour_encoding(&timestamps[i]);
            features.push(Some(sin_hour));
            features.push(Some(cos_hour));

            let complete: Option<Vec<f64>> = features
                .into_iter()
                .map(|f| f.filter(|v| v.is_finite()))
                .collect();
            match complete {
                Some(values) => output.push(FeatureRow {
                    instrument_id: instrument.to_string(),
                    timestamp: timestamps[i],
                    features: Arc::new(values),
                    label,
                }),
                None => dropped += 1,
            }
        }

        debug!(
            "{instrument}: {} rows -> {} feature rows ({dropped} dropped)",
            ordered.len(),
            output.len()
        );
        Ok(output)
    }

    fn check_spacing(&self, instrument: &str, timestamps: &[DateTime<Utc>]) -> Result<()> {
        let expected = match (self.config.spacing_policy, self.config.expected_spacing_secs) {
            (SpacingPolicy::Ignore, _) | (_, None) => return Ok(()),
            (_, Some(expected)) => expected,
        };

        let violations = spacing_violations(timestamps, expected);
        let Some(&(index, gap_secs)) = violations.first() else {
            return Ok(());
        };

        match self.config.spacing_policy {
            SpacingPolicy::Reject => Err(ForecastError::IrregularSpacing {
                instrument: instrument.to_string(),
                index,
                gap_secs,
                expected_secs: expected,
            }),
            _ => {
                let max_gap = violations.iter().map(|v| v.1).max().unwrap_or(gap_secs);
                warn!(
                    "{}",
                    self.spacing_warning(instrument, violations.len(), index, max_gap, expected)
                );
                Ok(())
            }
        }
    }

    /// Warning for irregular rows; the label still spans `horizon` rows, not seconds.
    fn spacing_warning(
        &self,
        instrument: &str,
        count: usize,
        index: usize,
        max_gap: i64,
        expected: i64,
    ) -> String {
        let horizon = self.config.horizon;
        format!(
            "{instrument}: {count} spacing violations (first at row {index}, max gap {max_gap}s, expected {expected}s); \
             label horizon is {horizon} rows, nominally {}s",
            horizon as i64 * expected
        )
    }
}

/// `(sin, cos)` of the hour-of-day angle.
pub(crate) fn hour_encoding(ts: &DateTime<Utc>) -> (f64, f64) {
    let angle = 2.0 * PI * ts.hour() as f64 / 24.0;
    (angle.sin(), angle.cos())
}
