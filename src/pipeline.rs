//! End-to-end training pipeline.
//!
//! # Architecture
//!
//! ```text
//! ObservationTable ─► FeatureBuilder ─► FeatureTable ─► Windower ─► Vec<Sequence>
//!                      (per instrument,                  (per instrument,
//!                       rayon)                            training mode)
//!                                                               │
//!                                                               ▼
//!                              Splitter (chronological 80/20, val carved from the 80)
//!                                                               │
//!                                                               ▼
//!                        StandardScaler::fit(train) ─► transform(train, val, test)
//!                                                               │
//!                                                               ▼
//!                           Trainer::fit (early stopping, best checkpoint)
//!                                                               │
//!                                                               ▼
//!                          TrainingReport (history, test metrics, artifacts)
//! ```
//!
//! The scaler sees the training partition only. Validation and test are
//! transformed with the frozen parameters.
//!
//! # Example
//!
//! ```ignore
//! use return_forecast::prelude::*;
//!
//! let table = ObservationTable::from_csv_path("observations.csv")?;
//! let pipeline = Pipeline::from_config(PipelineConfig::default())?;
//! let report = pipeline.train(&table)?;
//!
//! println!("{}", report.summary());
//! report.save_artifacts("artifacts/")?;
//! let adapter = report.into_adapter()?;
//! ```

use crate::batch::{BatchConfig, BatchProcessor};
use crate::config::PipelineConfig;
use crate::error::{ForecastError, Result};
use crate::features::{BuildMode, FeatureBuilder, FeatureTable};
use crate::inference::{Forecast, InferenceAdapter};
use crate::labeling::LabelStats;
use crate::metrics::EvaluationMetrics;
use crate::model::{ModelCheckpoint, SequenceRegressor};
use crate::observation::{ObservationRow, ObservationTable};
use crate::preprocessing::{ScalerParameters, StandardScaler};
use crate::schema::ArtifactFingerprint;
use crate::sequence_builder::{WindowMode, Windower};
use crate::split::{DatasetSplit, Splitter};
use crate::training::{StopSignal, Trainer, TrainingContract, TrainingHistory};
use crate::validation::{ObservationValidator, ValidationConfig};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the scaler artifact inside an artifact directory.
pub const SCALER_FILE: &str = "scaler.json";

/// File name of the checkpoint artifact inside an artifact directory.
pub const CHECKPOINT_FILE: &str = "model.ckpt";

/// Partition sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    /// Training windows
    pub train: usize,
    /// Validation windows
    pub validation: usize,
    /// Test windows
    pub test: usize,
}

impl SplitSizes {
    fn of(split: &DatasetSplit) -> Self {
        Self {
            train: split.train.len(),
            validation: split.validation.len(),
            test: split.test.len(),
        }
    }
}

/// An instrument left out of a run, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedInstrument {
    /// Instrument that was dropped
    pub instrument_id: String,
    /// Error that dropped it
    pub reason: String,
}

/// Windows split and scaled, ready for training or export.
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    /// Feature rows the windows were built from
    pub features: FeatureTable,
    /// Scaled partitions
    pub split: DatasetSplit,
    /// Parameters fitted on the training partition
    pub scaler: ScalerParameters,
    /// Feature contract
    pub fingerprint: ArtifactFingerprint,
    /// Label distribution over all labeled feature rows
    pub label_stats: LabelStats,
    /// Instruments dropped by a recoverable error
    pub skipped: Vec<SkippedInstrument>,
}

impl PreparedDataset {
    /// Partition sizes.
    pub fn sizes(&self) -> SplitSizes {
        SplitSizes::of(&self.split)
    }
}

/// Everything a training run produced.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Per-epoch losses and stopping state
    pub history: TrainingHistory,
    /// Best checkpoint
    pub checkpoint: ModelCheckpoint,
    /// Frozen scaler
    pub scaler: ScalerParameters,
    /// Metrics on the held-out test partition (None if it was empty)
    pub test_metrics: Option<EvaluationMetrics>,
    /// Forecasts for the test partition, in split order
    pub test_forecasts: Vec<Forecast>,
    /// Partition sizes
    pub split_sizes: SplitSizes,
    /// Label distribution
    pub label_stats: LabelStats,
    /// Instruments dropped before training
    pub skipped: Vec<SkippedInstrument>,
}

/// Paths written by [`TrainingReport::save_artifacts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Scaler JSON
    pub scaler: PathBuf,
    /// Model checkpoint
    pub checkpoint: PathBuf,
}

impl ArtifactPaths {
    /// Artifact paths inside `dir`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            scaler: dir.join(SCALER_FILE),
            checkpoint: dir.join(CHECKPOINT_FILE),
        }
    }
}

impl TrainingReport {
    /// Write the scaler and checkpoint into `dir` (created if missing).
    pub fn save_artifacts<P: AsRef<Path>>(&self, dir: P) -> Result<ArtifactPaths> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| ForecastError::io(dir, e))?;
        let paths = ArtifactPaths::in_dir(dir);
        self.scaler.save_json(&paths.scaler)?;
        self.checkpoint.save(&paths.checkpoint)?;
        info!("Saved artifacts to {}", dir.display());
        Ok(paths)
    }

    /// Build a serving adapter from the in-memory artifacts.
    pub fn into_adapter(self) -> Result<InferenceAdapter> {
        InferenceAdapter::new(self.scaler, self.checkpoint)
    }

    /// One-paragraph human-readable summary.
    pub fn summary(&self) -> String {
        let (up, flat, down) = self.label_stats.class_balance();
        let mut out = format!(
            "windows: train {} / validation {} / test {}\n\
             epochs: {} (best {} at val loss {:.6}{}{})\n\
             labels: {} rows, mean {:+.6}, up {:.1}% flat {:.1}% down {:.1}%",
            self.split_sizes.train,
            self.split_sizes.validation,
            self.split_sizes.test,
            self.history.epochs_run(),
            self.history.best_epoch,
            self.history.best_val_loss,
            if self.history.stopped_early { ", stopped early" } else { "" },
            if self.history.cancelled { ", cancelled" } else { "" },
            self.label_stats.total,
            self.label_stats.mean,
            up * 100.0,
            flat * 100.0,
            down * 100.0,
        );
        if !self.skipped.is_empty() {
            let ids: Vec<&str> = self.skipped.iter().map(|s| s.instrument_id.as_str()).collect();
            out.push_str(&format!("\nskipped: {}", ids.join(", ")));
        }
        if let Some(metrics) = &self.test_metrics {
            out.push('\n');
            out.push_str(&format!("test: {metrics}"));
        }
        out
    }
}

/// Orchestrates feature building, windowing, splitting, scaling and training.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    features: FeatureBuilder,
    windower: Windower,
    splitter: Splitter,
    stop: StopSignal,
}

impl Pipeline {
    /// Build a pipeline from a validated configuration.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        config.validate().map_err(ForecastError::invalid_config)?;
        Ok(Self {
            features: FeatureBuilder::new(config.features.clone())?,
            windower: Windower::new(config.sequence.clone())?,
            splitter: Splitter::new(config.split.clone())?,
            stop: StopSignal::new(),
            config,
        })
    }

    /// Share a stop signal with another thread; checked once per epoch.
    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop = signal;
        self
    }

    /// Clone of the stop signal.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Configuration in use.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Feature builder in use.
    pub fn feature_builder(&self) -> &FeatureBuilder {
        &self.features
    }

    /// Feature contract of this pipeline.
    pub fn fingerprint(&self) -> ArtifactFingerprint {
        ArtifactFingerprint::new(
            self.features.feature_names(),
            self.config.sequence.window_length,
        )
    }

    /// Run the observation validator over one instrument's rows.
    ///
    /// Warnings (duplicates, gaps) are logged; the first error becomes a
    /// `Schema` error naming the instrument.
    pub fn validate_instrument(&self, instrument: &str, rows: &[ObservationRow]) -> Result<()> {
        let validator = ObservationValidator::with_config(ValidationConfig {
            expected_spacing_secs: self.config.features.expected_spacing_secs,
            ..ValidationConfig::default()
        });

        let result = validator.validate_instrument(rows);
        for warning in result.warnings() {
            warn!("{instrument}: {warning}");
        }
        match result.errors().into_iter().next() {
            Some(error) => Err(ForecastError::schema(format!("{instrument}: {error}"))),
            None => Ok(()),
        }
    }

    /// Validate and build training features per instrument.
    ///
    /// Instruments failing with a recoverable error are dropped and returned
    /// alongside the table. Fails only on a fatal error, or when every
    /// instrument was dropped.
    pub fn build_features(
        &self,
        table: &ObservationTable,
    ) -> Result<(FeatureTable, Vec<SkippedInstrument>)> {
        let mut output = BatchProcessor::new(BatchConfig::new()).run(table, |instrument, rows| {
            self.validate_instrument(instrument, rows)?;
            self.features.build_instrument(instrument, rows, BuildMode::Training)
        })?;

        let mut errors = std::mem::take(&mut output.errors);
        if output.results.is_empty() {
            if let Some(first) = errors.drain(..).next() {
                return Err(first.error);
            }
        }

        let skipped: Vec<SkippedInstrument> = errors
            .into_iter()
            .map(|e| SkippedInstrument {
                instrument_id: e.instrument_id,
                reason: e.error.to_string(),
            })
            .collect();
        if !skipped.is_empty() {
            warn!(
                "Training without {} instrument(s): {}",
                skipped.len(),
                skipped
                    .iter()
                    .map(|s| s.instrument_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok((output.into_feature_table(self.features.feature_names()), skipped))
    }

    /// Validate, compute features, window, split and scale.
    ///
    /// # Errors
    ///
    /// - `Schema`/`IrregularSpacing` only when no instrument survives validation
    ///   and feature computation
    /// - `Training` if no labeled window can be built or the training partition is empty
    pub fn prepare(&self, table: &ObservationTable) -> Result<PreparedDataset> {
        let (features, skipped) = self.build_features(table)?;
        let label_stats = features.label_stats();
        let sequences = self.windower.window_table(&features, WindowMode::Training)?;
        if sequences.is_empty() {
            return Err(ForecastError::training(format!(
                "no labeled windows of length {} could be built from {} feature rows",
                self.config.sequence.window_length,
                features.len()
            )));
        }

        let split = self.splitter.split(sequences);
        let fingerprint = self.fingerprint();
        let mut scaler = StandardScaler::new(fingerprint.clone());
        scaler.fit(&split.train)?;
        let scaled = DatasetSplit {
            train: scaler.transform(&split.train)?,
            validation: scaler.transform(&split.validation)?,
            test: scaler.transform(&split.test)?,
        };
        let scaler = scaler
            .parameters()
            .cloned()
            .ok_or_else(|| ForecastError::training("scaler was not fitted"))?;

        let prepared = PreparedDataset {
            features,
            split: scaled,
            scaler,
            fingerprint,
            label_stats,
            skipped,
        };
        let sizes = prepared.sizes();
        info!(
            "Prepared dataset: {} instruments, {} feature rows, windows {}/{}/{}",
            prepared.features.instrument_count(),
            prepared.features.len(),
            sizes.train,
            sizes.validation,
            sizes.test
        );
        Ok(prepared)
    }

    /// Prepare `table` and train a model on it.
    pub fn train(&self, table: &ObservationTable) -> Result<TrainingReport> {
        let prepared = self.prepare(table)?;
        self.train_prepared(prepared)
    }

    /// Train on an already prepared dataset.
    pub fn train_prepared(&self, prepared: PreparedDataset) -> Result<TrainingReport> {
        let split_sizes = prepared.sizes();
        let model = SequenceRegressor::lstm(
            &self.config.model,
            prepared.fingerprint.feature_count,
            self.config.training.seed,
        )?;
        let trainer = Trainer::new(self.config.training.clone())?.with_stop_signal(self.stop.clone());
        let contract = TrainingContract {
            fingerprint: prepared.fingerprint.clone(),
            feature_config: self.config.features.clone(),
            model_config: self.config.model.clone(),
        };

        let outcome = trainer.fit(
            model,
            &prepared.split.train,
            &prepared.split.validation,
            &contract,
        )?;

        let test = &prepared.split.test;
        let (test_metrics, test_forecasts) = if test.is_empty() {
            (None, Vec::new())
        } else {
            let values = outcome.checkpoint.regressor.predict(test)?;
            let labels: Vec<f64> = test.iter().filter_map(|s| s.label).collect();
            let metrics = EvaluationMetrics::compute(&values, &labels)?;
            info!("Test evaluation: {metrics}");
            let forecasts = test
                .iter()
                .zip(values)
                .map(|(s, value)| Forecast {
                    instrument_id: s.instrument_id.clone(),
                    timestamp: s.end_timestamp,
                    value,
                })
                .collect();
            (Some(metrics), forecasts)
        };

        Ok(TrainingReport {
            history: outcome.history,
            checkpoint: outcome.checkpoint,
            scaler: prepared.scaler,
            test_metrics,
            test_forecasts,
            split_sizes,
            label_stats: prepared.label_stats,
            skipped: prepared.skipped,
        })
    }
}
