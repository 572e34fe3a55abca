//! Serve-time forecasting.
//!
//! [`InferenceAdapter`] reruns exactly the training-time feature contract on a
//! fresh slice of raw rows: feature computation (labels optional), windowing,
//! the frozen scaler, then the frozen model. Nothing is refit.
//!
//! [`ForecastService`] owns the live adapter. A retraining job builds a new
//! adapter and [`ForecastService::publish`]es it; readers clone the `Arc`
//! under a short read lock and run inference without holding it.
//!
//! ```ignore
//! let service = ForecastService::new();
//! service.publish(InferenceAdapter::load("scaler.json", "model.ckpt")?);
//!
//! match service.forecast("BTC", &rows)? {
//!     ForecastOutcome::Forecast(f) => println!("{}: {:+.5}", f.instrument_id, f.value),
//!     ForecastOutcome::Unavailable { reason, .. } => println!("no forecast: {reason}"),
//! }
//! ```

use crate::error::{ForecastError, Result};
use crate::features::{BuildMode, FeatureBuilder, FeatureRow};
use crate::metrics::EvaluationMetrics;
use crate::model::{LstmEncoder, ModelCheckpoint, SequenceEncoder};
use crate::observation::ObservationRow;
use crate::preprocessing::ScalerParameters;
use crate::schema::ArtifactFingerprint;
use crate::sequence_builder::{Sequence, SequenceConfig, WindowMode, Windower};
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// One point forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Instrument forecast
    pub instrument_id: String,
    /// Timestamp of the last row of the input window
    pub timestamp: DateTime<Utc>,
    /// Forecast forward return
    pub value: f64,
}

/// A forecast, or the reason none could be made.
///
/// Keeps "no prediction" distinct from a forecast of exactly 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForecastOutcome {
    /// A forecast was produced
    Forecast(Forecast),
    /// No forecast; the instrument can be retried with more data
    Unavailable {
        /// Instrument requested
        instrument_id: String,
        /// Human-readable reason
        reason: String,
    },
}

impl ForecastOutcome {
    /// Whether a forecast is present.
    pub fn is_available(&self) -> bool {
        matches!(self, ForecastOutcome::Forecast(_))
    }

    /// The forecast, if any.
    pub fn forecast(&self) -> Option<&Forecast> {
        match self {
            ForecastOutcome::Forecast(f) => Some(f),
            ForecastOutcome::Unavailable { .. } => None,
        }
    }
}

/// Forecasts and metrics over the labeled windows of a slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// One forecast per labeled window
    pub forecasts: Vec<Forecast>,
    /// Labels aligned with `forecasts`
    pub labels: Vec<f64>,
    /// Metrics over the pairs
    pub metrics: EvaluationMetrics,
}

/// Frozen scaler + frozen model + the feature contract they share.
#[derive(Debug, Clone)]
pub struct InferenceAdapter<E = LstmEncoder> {
    features: FeatureBuilder,
    windower: Windower,
    scaler: ScalerParameters,
    checkpoint: ModelCheckpoint<E>,
}

impl<E: SequenceEncoder> InferenceAdapter<E> {
    /// Pair scaler parameters with a checkpoint.
    ///
    /// # Errors
    ///
    /// `ConfigurationMismatch` if the two artifacts (or the checkpoint's
    /// feature configuration) disagree on feature names or window length.
    pub fn new(scaler: ScalerParameters, checkpoint: ModelCheckpoint<E>) -> Result<Self> {
        scaler
            .fingerprint
            .ensure_matches(&checkpoint.fingerprint, "scaler vs checkpoint")?;

        let features = FeatureBuilder::new(checkpoint.feature_config.clone())?;
        let window_length = checkpoint.fingerprint.window_length;
        ArtifactFingerprint::new(features.feature_names(), window_length)
            .ensure_matches(&checkpoint.fingerprint, "feature config vs checkpoint")?;

        if checkpoint.regressor.input_size() != scaler.feature_count() {
            return Err(ForecastError::mismatch(format!(
                "model expects {} features, scaler has {}",
                checkpoint.regressor.input_size(),
                scaler.feature_count()
            )));
        }

        let windower = Windower::new(SequenceConfig::from_feature_config(
            window_length,
            &checkpoint.feature_config,
        ))?;

        Ok(Self {
            features,
            windower,
            scaler,
            checkpoint,
        })
    }

    /// Load both artifacts from disk and pair them.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(scaler_path: P, checkpoint_path: Q) -> Result<Self> {
        let scaler = ScalerParameters::load_json(scaler_path)?;
        let checkpoint = ModelCheckpoint::load(checkpoint_path)?;
        let adapter = Self::new(scaler, checkpoint)?;
        info!(
            "Loaded inference artifacts: epoch {}, window {}, {} features",
            adapter.checkpoint.epoch,
            adapter.window_length(),
            adapter.scaler.feature_count()
        );
        Ok(adapter)
    }

    /// Shared feature contract.
    pub fn fingerprint(&self) -> &ArtifactFingerprint {
        &self.checkpoint.fingerprint
    }

    /// Rows per input window.
    pub fn window_length(&self) -> usize {
        self.checkpoint.fingerprint.window_length
    }

    /// The frozen checkpoint.
    pub fn checkpoint(&self) -> &ModelCheckpoint<E> {
        &self.checkpoint
    }

    /// The frozen scaler parameters.
    pub fn scaler(&self) -> &ScalerParameters {
        &self.scaler
    }

    /// Forecast the most recent window of an instrument.
    ///
    /// `rows` may be in any order and must all belong to `instrument`.
    ///
    /// # Errors
    ///
    /// `InsufficientHistory` when fewer than `window_length` valid feature rows
    /// can be computed; `Schema` on malformed rows.
    pub fn forecast_latest(&self, instrument: &str, rows: &[ObservationRow]) -> Result<Forecast> {
        let feature_rows = self.feature_rows(instrument, rows)?;
        let window = self.windower.latest(instrument, &feature_rows)?;
        let mut forecasts = self.forecast_sequences(&[window])?;
        forecasts.pop().ok_or_else(|| ForecastError::InsufficientHistory {
            instrument: instrument.to_string(),
            required: self.window_length(),
            available: feature_rows.len(),
        })
    }

    /// Forecast every complete window of an instrument, oldest first.
    pub fn forecast_windows(&self, instrument: &str, rows: &[ObservationRow]) -> Result<Vec<Forecast>> {
        let feature_rows = self.feature_rows(instrument, rows)?;
        let windows = self
            .windower
            .window_instrument(instrument, &feature_rows, WindowMode::Inference)?;
        if windows.is_empty() {
            return Err(self.insufficient(instrument, feature_rows.len()));
        }
        self.forecast_sequences(&windows)
    }

    /// Forecast the windows whose label is already known and score them.
    pub fn evaluate(&self, instrument: &str, rows: &[ObservationRow]) -> Result<Evaluation> {
        let feature_rows = self.feature_rows(instrument, rows)?;
        let labeled: Vec<FeatureRow> = feature_rows
            .into_iter()
            .filter(FeatureRow::is_labeled)
            .collect();
        let windows = self
            .windower
            .window_instrument(instrument, &labeled, WindowMode::Training)?;
        if windows.is_empty() {
            return Err(self.insufficient(instrument, labeled.len()));
        }

        let labels: Vec<f64> = windows.iter().filter_map(|w| w.label).collect();
        let forecasts = self.forecast_sequences(&windows)?;
        let values: Vec<f64> = forecasts.iter().map(|f| f.value).collect();
        let metrics = EvaluationMetrics::compute(&values, &labels)?;
        Ok(Evaluation {
            forecasts,
            labels,
            metrics,
        })
    }

    /// Like [`Self::forecast_latest`], with recoverable errors turned into
    /// [`ForecastOutcome::Unavailable`].
    pub fn forecast_outcome(&self, instrument: &str, rows: &[ObservationRow]) -> Result<ForecastOutcome> {
        match self.forecast_latest(instrument, rows) {
            Ok(forecast) => Ok(ForecastOutcome::Forecast(forecast)),
            Err(e) if e.is_recoverable() => {
                debug!("Forecast unavailable for {instrument}: {e}");
                Ok(ForecastOutcome::Unavailable {
                    instrument_id: instrument.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Scale already-built windows and run the model.
    pub fn forecast_sequences(&self, windows: &[Sequence]) -> Result<Vec<Forecast>> {
        let scaled = self.scaler.transform_all(windows)?;
        let values = self.checkpoint.regressor.predict(&scaled)?;
        Ok(windows
            .iter()
            .zip(values)
            .map(|(w, value)| Forecast {
                instrument_id: w.instrument_id.clone(),
                timestamp: w.end_timestamp,
                value,
            })
            .collect())
    }

    fn feature_rows(&self, instrument: &str, rows: &[ObservationRow]) -> Result<Vec<FeatureRow>> {
        let feature_rows = self
            .features
            .build_instrument(instrument, rows, BuildMode::Inference)?;
        if feature_rows.len() < self.window_length() {
            return Err(self.insufficient(instrument, feature_rows.len()));
        }
        Ok(feature_rows)
    }

    fn insufficient(&self, instrument: &str, available: usize) -> ForecastError {
        ForecastError::InsufficientHistory {
            instrument: instrument.to_string(),
            required: self.window_length(),
            available,
        }
    }
}

/// Holder of the live adapter, replaced atomically on publish.
#[derive(Debug)]
pub struct ForecastService<E = LstmEncoder> {
    live: RwLock<Option<Arc<InferenceAdapter<E>>>>,
}

impl<E> Default for ForecastService<E> {
    fn default() -> Self {
        Self {
            live: RwLock::new(None),
        }
    }
}

impl<E: SequenceEncoder> ForecastService<E> {
    /// Create a service with no model published.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a service serving `adapter`.
    pub fn with_adapter(adapter: InferenceAdapter<E>) -> Self {
        Self {
            live: RwLock::new(Some(Arc::new(adapter))),
        }
    }

    /// Swap in a new adapter; returns the previous one.
    ///
    /// In-flight requests keep the adapter they started with.
    pub fn publish(&self, adapter: InferenceAdapter<E>) -> Option<Arc<InferenceAdapter<E>>> {
        let epoch = adapter.checkpoint().epoch;
        let previous = self.live.write().replace(Arc::new(adapter));
        info!("Published model from epoch {epoch} (replaced: {})", previous.is_some());
        previous
    }

    /// The live adapter, if any.
    pub fn current(&self) -> Option<Arc<InferenceAdapter<E>>> {
        self.live.read().clone()
    }

    /// Whether a model is published.
    pub fn is_ready(&self) -> bool {
        self.live.read().is_some()
    }

    /// Forecast the latest window of an instrument with the live adapter.
    ///
    /// # Errors
    ///
    /// Only non-recoverable errors; missing model, short history and schema
    /// problems come back as [`ForecastOutcome::Unavailable`].
    pub fn forecast(&self, instrument: &str, rows: &[ObservationRow]) -> Result<ForecastOutcome> {
        match self.current() {
            Some(adapter) => adapter.forecast_outcome(instrument, rows),
            None => Ok(ForecastOutcome::Unavailable {
                instrument_id: instrument.to_string(),
                reason: "no model published".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureConfig;
    use crate::model::{ModelConfig, SequenceRegressor};
    use chrono::{Duration, TimeZone};

    fn feature_config() -> FeatureConfig {
        FeatureConfig::default()
            .with_horizon(2)
            .with_return_windows(vec![2, 3])
            .with_volatility_windows(vec![2, 3])
    }

    fn artifacts(window_length: usize) -> (ScalerParameters, ModelCheckpoint) {
        let feature_config = feature_config();
        let fingerprint = ArtifactFingerprint::new(feature_config.feature_names(), window_length);
        let model_config = ModelConfig {
            hidden_size: 4,
            ..ModelConfig::default()
        };
        let scaler = ScalerParameters {
            fingerprint: fingerprint.clone(),
            mean: vec![0.0; 7],
            std: vec![1.0; 7],
            sequences_seen: 1,
        };
        let checkpoint = ModelCheckpoint {
            regressor: SequenceRegressor::lstm(&model_config, 7, 1).unwrap(),
            fingerprint,
            feature_config,
            model_config,
            epoch: 1,
            val_loss: 0.1,
        };
        (scaler, checkpoint)
    }

    fn rows(n: usize) -> Vec<ObservationRow> {
        let base = Utc.with_ymd_and_hms(2025, 2, 1, 9, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                ObservationRow::new(
                    "BTC",
                    base + Duration::minutes(i as i64),
                    100.0 + (i as f64 * 0.7).sin(),
                    5.0,
                    0.2,
                )
            })
            .collect()
    }

    fn adapter(window_length: usize) -> InferenceAdapter {
        let (scaler, checkpoint) = artifacts(window_length);
        InferenceAdapter::new(scaler, checkpoint).unwrap()
    }

    #[test]
    fn test_latest_forecast_uses_most_recent_row() {
        let input = rows(15);
        let forecast = adapter(5).forecast_latest("BTC", &input).unwrap();
        assert_eq!(forecast.timestamp, input[14].timestamp);
        assert!(forecast.value.is_finite());
    }

    #[test]
    fn test_reversed_input_gives_same_forecast() {
        let input = rows(15);
        let mut reversed = input.clone();
        reversed.reverse();
        let a = adapter(5);
        assert_eq!(
            a.forecast_latest("BTC", &input).unwrap(),
            a.forecast_latest("BTC", &reversed).unwrap()
        );
    }

    #[test]
    fn test_insufficient_history() {
        // 3 warm-up rows are dropped: 7 rows -> 4 feature rows < 5
        let err = adapter(5).forecast_latest("BTC", &rows(7)).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientHistory {
                required: 5,
                available: 4,
                ..
            }
        ));

        let outcome = adapter(5).forecast_outcome("BTC", &rows(7)).unwrap();
        assert!(!outcome.is_available());
    }

    #[test]
    fn test_forecast_windows_count() {
        // 15 rows -> 12 feature rows -> 8 windows of 5
        let forecasts = adapter(5).forecast_windows("BTC", &rows(15)).unwrap();
        assert_eq!(forecasts.len(), 8);
    }

    #[test]
    fn test_evaluate_uses_labeled_windows() {
        // 12 feature rows, the last 2 unlabeled -> 10 labeled -> 5 training windows
        let evaluation = adapter(5).evaluate("BTC", &rows(15)).unwrap();
        assert_eq!(evaluation.forecasts.len(), 5);
        assert_eq!(evaluation.metrics.count, 5);
    }

    #[test]
    fn test_mismatched_artifacts_rejected() {
        let (scaler, _) = artifacts(5);
        let (_, checkpoint) = artifacts(6);
        assert!(matches!(
            InferenceAdapter::new(scaler, checkpoint),
            Err(ForecastError::ConfigurationMismatch { .. })
        ));

        let (mut scaler, checkpoint) = artifacts(5);
        scaler.fingerprint.feature_names.swap(1, 2);
        assert!(matches!(
            InferenceAdapter::new(scaler, checkpoint),
            Err(ForecastError::ConfigurationMismatch { .. })
        ));
    }

    #[test]
    fn test_service_publish_and_swap() {
        let service: ForecastService = ForecastService::new();
        let outcome = service.forecast("BTC", &rows(15)).unwrap();
        assert_eq!(
            outcome,
            ForecastOutcome::Unavailable {
                instrument_id: "BTC".to_string(),
                reason: "no model published".to_string(),
            }
        );

        assert!(service.publish(adapter(5)).is_none());
        let held = service.current().unwrap();
        assert!(service.forecast("BTC", &rows(15)).unwrap().is_available());

        let previous = service.publish(adapter(6)).unwrap();
        assert!(Arc::ptr_eq(&previous, &held));
        assert_eq!(held.window_length(), 5);
        assert_eq!(service.current().unwrap().window_length(), 6);
    }
}
