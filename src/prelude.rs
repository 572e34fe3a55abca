//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```ignore
//! use return_forecast::prelude::*;
//!
//! let pipeline = Pipeline::from_config(PipelineConfig::default())?;
//! let report = pipeline.train(&table)?;
//! ```
//!
//! # What's Included
//!
//! ## Core Pipeline
//! - [`Pipeline`], [`PipelineConfig`], [`PipelineBuilder`], [`TrainingReport`]
//!
//! ## Data
//! - [`ObservationRow`], [`ObservationTable`], [`SentimentInput`]
//! - [`FeatureBuilder`], [`FeatureConfig`], [`FeatureTable`]
//! - [`Windower`], [`Sequence`], [`SequenceConfig`]
//!
//! ## Model
//! - [`SequenceRegressor`], [`ModelConfig`], [`ModelCheckpoint`], [`TrainingConfig`]
//!
//! ## Serving
//! - [`InferenceAdapter`], [`ForecastService`], [`Forecast`], [`ForecastOutcome`]
//!
//! ## Errors
//! - [`ForecastError`], [`Result`]

pub use crate::builder::PipelineBuilder;
pub use crate::config::{ExperimentMetadata, PipelineConfig};
pub use crate::error::{ForecastError, Result};
pub use crate::features::{BuildMode, FeatureBuilder, FeatureConfig, FeatureRow, FeatureTable};
pub use crate::inference::{Forecast, ForecastOutcome, ForecastService, InferenceAdapter};
pub use crate::metrics::EvaluationMetrics;
pub use crate::model::{ModelCheckpoint, ModelConfig, SequenceRegressor};
pub use crate::observation::{ObservationRow, ObservationTable, SentimentInput};
pub use crate::pipeline::{Pipeline, TrainingReport};
pub use crate::preprocessing::ScalerParameters;
pub use crate::sequence_builder::{Sequence, SequenceConfig, WindowMode, Windower};
pub use crate::split::{SplitConfig, ValidationCarve};
pub use crate::training::{StopSignal, TrainingConfig};
