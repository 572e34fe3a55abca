//! Pipeline configuration management.
//!
//! One serializable struct for every stage (features, windowing, split,
//! model, training) so an experiment can be reproduced from a single file.
//!
//! # Example
//!
//! ```ignore
//! use return_forecast::config::PipelineConfig;
//!
//! let config = PipelineConfig::default();
//! config.save_toml("experiment.toml")?;
//!
//! let loaded = PipelineConfig::load_toml("experiment.toml")?;
//! let pipeline = Pipeline::from_config(loaded)?;
//! ```

use crate::error::{ForecastError, Result};
use crate::features::FeatureConfig;
use crate::model::ModelConfig;
use crate::sequence_builder::SequenceConfig;
use crate::split::SplitConfig;
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Unified pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Feature computation
    pub features: FeatureConfig,

    /// Windowing; `feature_count` must match `features`
    pub sequence: SequenceConfig,

    /// Chronological split and validation carve
    #[serde(default)]
    pub split: SplitConfig,

    /// Model architecture
    #[serde(default)]
    pub model: ModelConfig,

    /// Training loop
    #[serde(default)]
    pub training: TrainingConfig,

    /// Experiment metadata (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExperimentMetadata>,
}

/// Experiment metadata for tracking and reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    /// Experiment name
    pub name: String,

    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Creation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Tags
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl ExperimentMetadata {
    /// Metadata with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            created_at: None,
            version: None,
            tags: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let features = FeatureConfig::default();
        let sequence = SequenceConfig::from_feature_config(20, &features);
        Self {
            features,
            sequence,
            split: SplitConfig::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            metadata: None,
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach experiment metadata.
    pub fn with_metadata(mut self, metadata: ExperimentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Replace the feature configuration; the sequence feature count follows.
    pub fn with_features(mut self, config: FeatureConfig) -> Self {
        self.sequence.feature_count = config.feature_count();
        self.features = config;
        self
    }

    /// Replace the sequence configuration.
    pub fn with_sequence(mut self, config: SequenceConfig) -> Self {
        self.sequence = config;
        self
    }

    /// Replace the split configuration.
    pub fn with_split(mut self, config: SplitConfig) -> Self {
        self.split = config;
        self
    }

    /// Replace the model configuration.
    pub fn with_model(mut self, config: ModelConfig) -> Self {
        self.model = config;
        self
    }

    /// Replace the training configuration.
    pub fn with_training(mut self, config: TrainingConfig) -> Self {
        self.training = config;
        self
    }

    /// Validate every stage and their cross-stage consistency.
    pub fn validate(&self) -> std::result::Result<(), String> {
        self.features.validate()?;
        self.sequence.validate()?;
        self.split.validate()?;
        self.model.validate()?;
        self.training.validate()?;

        let expected = self.features.feature_count();
        if self.sequence.feature_count != expected {
            return Err(format!(
                "Feature count mismatch: sequence expects {}, feature config produces {} ({:?})",
                self.sequence.feature_count,
                expected,
                self.features.feature_names()
            ));
        }

        Ok(())
    }

    /// Save as TOML.
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string).map_err(|e| ForecastError::io(path, e))
    }

    /// Load from TOML and validate.
    pub fn load_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ForecastError::io(path, e))?;
        let config: PipelineConfig = toml::from_str(&contents)?;
        config.validate().map_err(ForecastError::invalid_config)?;
        Ok(config)
    }

    /// Save as pretty JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json_string = serde_json::to_string_pretty(self)?;
        fs::write(path, json_string).map_err(|e| ForecastError::io(path, e))
    }

    /// Load from JSON and validate.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ForecastError::io(path, e))?;
        let config: PipelineConfig = serde_json::from_str(&contents)?;
        config.validate().map_err(ForecastError::invalid_config)?;
        Ok(config)
    }
}
