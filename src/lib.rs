//! Return Forecast
//!
//! Per-instrument feature windowing and recurrent sequence regression for
//! short-horizon crypto return forecasts.
//!
//! # Overview
//!
//! Timestamped per-coin observations (close, volume, sentiment) become causal
//! features and a forward-return label, are cut into fixed-length windows that
//! never cross instruments, split chronologically, standardized with
//! training-only statistics, and fed to a recurrent regressor trained with
//! early stopping. The same feature contract is replayed at serve time.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Return Forecast                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  observation/     - Raw rows, sentiment forms, CSV loader       │
//! │  validation/      - Domain, ordering and spacing checks         │
//! │  schema/          - Feature names, order and fingerprints       │
//! │  features/        - Causal features + forward label             │
//! │  labeling/        - Forward returns and label statistics        │
//! │  sequence_builder/- Per-instrument windowing                    │
//! │  split/           - Chronological train/val/test                │
//! │  preprocessing/   - Rolling stats, training-only scaler         │
//! │  model/           - LSTM encoder, dense head, Adam, checkpoints │
//! │  training/        - Epoch loop with early stopping              │
//! │  inference/       - Serve-time adapter and forecast service     │
//! │  batch/           - Parallel per-instrument processing          │
//! │  pipeline/        - End-to-end orchestration                    │
//! │  export/          - NumPy export for external training          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use return_forecast::prelude::*;
//!
//! let table = ObservationTable::from_csv_path("observations.csv")?;
//! let report = PipelineBuilder::new()
//!     .window(20)
//!     .checkpoint_path("artifacts/model.ckpt")
//!     .build()?
//!     .train(&table)?;
//!
//! let service = ForecastService::new();
//! service.publish(report.into_adapter()?);
//! let outcome = service.forecast("BTC", table.group_by_instrument()["BTC"].as_slice())?;
//! ```

pub mod batch;
pub mod builder;
pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod inference;
pub mod labeling;
pub mod metrics;
pub mod model;
pub mod observation;
pub mod pipeline;
pub mod prelude;
pub mod preprocessing;
pub mod schema;
pub mod sequence_builder;
pub mod split;
pub mod training;
pub mod validation;

// Re-exports - Errors
pub use error::{ForecastError, Result};

// Re-exports - Observations
pub use observation::{ObservationRow, ObservationTable, SentimentInput};

// Re-exports - Schema
pub use schema::{ArtifactFingerprint, FeatureCategory, FeatureDef, FeatureSchema};

// Re-exports - Config
pub use builder::PipelineBuilder;
pub use config::{ExperimentMetadata, PipelineConfig};

// Re-exports - Features
pub use features::{
    BuildMode, FeatureBuilder, FeatureConfig, FeatureRow, FeatureTable, SpacingPolicy,
    VolatilitySource,
};

// Re-exports - Labeling
pub use labeling::{Direction, LabelStats};

// Re-exports - Sequence Building
pub use sequence_builder::{Sequence, SequenceBuilder, SequenceConfig, WindowMode, Windower};

// Re-exports - Split and Scaling
pub use preprocessing::{ScalerParameters, StandardScaler};
pub use split::{DatasetSplit, SplitConfig, Splitter, ValidationCarve};

// Re-exports - Model and Training
pub use metrics::EvaluationMetrics;
pub use model::{LstmEncoder, ModelCheckpoint, ModelConfig, SequenceEncoder, SequenceRegressor};
pub use training::{EarlyStopping, StopSignal, StoppingState, Trainer, TrainingConfig};

// Re-exports - Inference
pub use inference::{Forecast, ForecastOutcome, ForecastService, InferenceAdapter};

// Re-exports - Batch
pub use batch::{BatchConfig, BatchProcessor, CancellationToken, ErrorMode};

// Re-exports - Pipeline
pub use export::DatasetExporter;
pub use pipeline::{Pipeline, PreparedDataset, SkippedInstrument, TrainingReport};

// Re-exports - Validation
pub use validation::{ObservationValidator, ValidationConfig, ValidationLevel, ValidationResult};
