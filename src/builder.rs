//! Fluent builder for pipeline configuration.
//!
//! # Quick Start
//!
//! ```ignore
//! use return_forecast::PipelineBuilder;
//!
//! let pipeline = PipelineBuilder::new()
//!     .horizon(60)
//!     .return_windows(&[5, 15, 30])
//!     .window(20)
//!     .epochs(50)
//!     .build()?;
//!
//! let report = pipeline.train(&table)?;
//! ```
//!
//! # Feature Count Reference
//!
//! The feature count follows the window lists:
//!
//! | Features | Count |
//! |----------|-------|
//! | sentiment | 1 |
//! | `ret_n` per return window | `len(return_windows)` |
//! | `vol_n` per volatility window | `len(volatility_windows)` |
//! | hour sin/cos | 2 |
//!
//! The defaults (`{5,15,30}` for both) give 9.

use crate::config::{ExperimentMetadata, PipelineConfig};
use crate::error::{ForecastError, Result};
use crate::features::{FeatureConfig, SpacingPolicy, VolatilitySource};
use crate::model::ModelConfig;
use crate::pipeline::Pipeline;
use crate::sequence_builder::SequenceConfig;
use crate::split::{SplitConfig, ValidationCarve};
use crate::training::TrainingConfig;
use std::path::PathBuf;

/// Fluent builder for [`PipelineConfig`] and [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    features: FeatureConfig,
    window_length: usize,
    split: SplitConfig,
    model: ModelConfig,
    training: TrainingConfig,
    metadata: Option<ExperimentMetadata>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            features: defaults.features,
            window_length: defaults.sequence.window_length,
            split: defaults.split,
            model: defaults.model,
            training: defaults.training,
            metadata: None,
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: PipelineConfig) -> Self {
        Self {
            features: config.features,
            window_length: config.sequence.window_length,
            split: config.split,
            model: config.model,
            training: config.training,
            metadata: config.metadata,
        }
    }

    // =========================================================================
    // Features
    // =========================================================================

    /// Label horizon in row-steps.
    pub fn horizon(mut self, steps: usize) -> Self {
        self.features.horizon = steps;
        self
    }

    /// Momentum lookbacks.
    pub fn return_windows(mut self, windows: &[usize]) -> Self {
        self.features.return_windows = windows.to_vec();
        self
    }

    /// Volatility lookbacks.
    pub fn volatility_windows(mut self, windows: &[usize]) -> Self {
        self.features.volatility_windows = windows.to_vec();
        self
    }

    /// Series the volatility features are computed on.
    pub fn volatility_source(mut self, source: VolatilitySource) -> Self {
        self.features.volatility_source = source;
        self
    }

    /// Expected row spacing and what to do when it is violated.
    pub fn spacing(mut self, expected_secs: Option<i64>, policy: SpacingPolicy) -> Self {
        self.features.expected_spacing_secs = expected_secs;
        self.features.spacing_policy = policy;
        self
    }

    /// Whether timestamps are floored to the minute.
    pub fn floor_to_minute(mut self, enabled: bool) -> Self {
        self.features.floor_to_minute = enabled;
        self
    }

    // =========================================================================
    // Windowing and split
    // =========================================================================

    /// Rows per model input.
    pub fn window(mut self, window_length: usize) -> Self {
        self.window_length = window_length;
        self
    }

    /// Train and validation fractions.
    pub fn split_fractions(mut self, train: f64, validation: f64) -> Self {
        self.split.train_fraction = train;
        self.split.validation_fraction = validation;
        self
    }

    /// How validation is carved out of the training pool.
    pub fn validation_carve(mut self, carve: ValidationCarve) -> Self {
        self.split.carve = carve;
        self
    }

    /// Seed for the validation carve and the training loop.
    pub fn seed(mut self, seed: u64) -> Self {
        self.split.seed = seed;
        self.training.seed = seed;
        self
    }

    // =========================================================================
    // Model and training
    // =========================================================================

    /// Recurrent hidden units per layer.
    pub fn hidden_size(mut self, hidden: usize) -> Self {
        self.model.hidden_size = hidden;
        self
    }

    /// Stacked recurrent layers.
    pub fn depth(mut self, depth: usize) -> Self {
        self.model.depth = depth;
        self
    }

    /// Dropout rate on the encoder output.
    pub fn dropout(mut self, rate: f64) -> Self {
        self.model.dropout = rate;
        self
    }

    /// Maximum epochs.
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.training.epochs = epochs;
        self
    }

    /// Mini-batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.training.batch_size = size;
        self
    }

    /// Optimizer learning rate.
    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.training.learning_rate = lr;
        self
    }

    /// Early-stopping patience.
    pub fn patience(mut self, patience: usize) -> Self {
        self.training.patience = patience;
        self
    }

    /// Where the best checkpoint is written during training.
    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.training.checkpoint_path = Some(path.into());
        self
    }

    /// Attach experiment metadata.
    pub fn experiment(mut self, metadata: ExperimentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Number of features the current settings produce.
    pub fn feature_count(&self) -> usize {
        self.features.feature_count()
    }

    /// Produce a validated configuration.
    pub fn build_config(self) -> Result<PipelineConfig> {
        let sequence = SequenceConfig::from_feature_config(self.window_length, &self.features);
        let config = PipelineConfig {
            features: self.features,
            sequence,
            split: self.split,
            model: self.model,
            training: self.training,
            metadata: self.metadata,
        };
        config.validate().map_err(ForecastError::invalid_config)?;
        Ok(config)
    }

    /// Produce a pipeline.
    pub fn build(self) -> Result<Pipeline> {
        Pipeline::from_config(self.build_config()?)
    }
}
