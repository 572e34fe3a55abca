//! Error types for the forecasting pipeline.
//!
//! Errors fall into two propagation classes:
//!
//! - **Recoverable** (`Schema`, `InsufficientHistory`, `IrregularSpacing`):
//!   scoped to one batch or one instrument. Callers report them per instrument and keep going.
//! - **Fatal** (everything else): the current training run or artifact load is
//!   aborted. A half-trained checkpoint is never published.
//!
//! `LeakageGuardViolation` signals a programming error (refitting the scaler,
//! fitting on non-training data, or building a window that spans instruments).

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Missing or malformed required columns, or out-of-domain values.
    #[error("Schema error: {message}")]
    Schema {
        /// Description of the schema problem
        message: String,
    },

    /// Fewer usable feature rows than one window requires.
    #[error(
        "Insufficient history for {instrument}: need {required} valid feature rows, have {available}"
    )]
    InsufficientHistory {
        /// Instrument the request was made for
        instrument: String,
        /// Rows required (the window length)
        required: usize,
        /// Valid feature rows available
        available: usize,
    },

    /// Internal invariant broken: scaler refit or cross-instrument window.
    #[error("Leakage guard violation: {message}")]
    LeakageGuardViolation {
        /// Which invariant was broken
        message: String,
    },

    /// Scaler and checkpoint artifacts were produced under different contracts.
    #[error("Configuration mismatch: {message}")]
    ConfigurationMismatch {
        /// Description of the mismatch
        message: String,
    },

    /// Configuration failed validation.
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the invalid setting
        message: String,
    },

    /// Consecutive rows are not spaced as the horizon assumes.
    #[error(
        "Irregular spacing for {instrument} at row {index}: gap {gap_secs}s, expected {expected_secs}s"
    )]
    IrregularSpacing {
        /// Instrument with the gap
        instrument: String,
        /// Row index (within the instrument) where the gap ends
        index: usize,
        /// Observed gap in seconds
        gap_secs: i64,
        /// Expected spacing in seconds
        expected_secs: i64,
    },

    /// The training loop could not produce a usable model.
    #[error("Training error: {message}")]
    Training {
        /// Description of the failure
        message: String,
    },

    /// The cooperative stop signal fired before a checkpoint existed.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O failure on an artifact path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization failure.
    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// Binary checkpoint (de)serialization failure.
    #[error("Checkpoint encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    /// CSV parsing failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// NumPy export failure.
    #[error("NumPy write error: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),

    /// Tensor shape failure.
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl ForecastError {
    /// Build a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Build an invalid-config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Build a leakage guard violation.
    pub fn leakage(message: impl Into<String>) -> Self {
        Self::LeakageGuardViolation {
            message: message.into(),
        }
    }

    /// Build a configuration mismatch error.
    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::ConfigurationMismatch {
            message: message.into(),
        }
    }

    /// Build a training error.
    pub fn training(message: impl Into<String>) -> Self {
        Self::Training {
            message: message.into(),
        }
    }

    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error is scoped to one instrument/batch and can be reported
    /// without aborting the surrounding run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Schema { .. } | Self::InsufficientHistory { .. } | Self::IrregularSpacing { .. }
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ForecastError>;
