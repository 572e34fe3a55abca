//! Causal feature computation per instrument.
//!
//! For each instrument, rows are ordered by timestamp and turned into
//! [`FeatureRow`]s holding:
//!
//! - `sentiment_numeric`
//! - `ret_{n}m = close[i] / close[i-n] - 1` for each return window
//! - `vol_{n}m`: trailing sample std of close (or volume) for each volatility window
//! - `sin_hour`, `cos_hour`: `sin/cos(2π·hour/24)`
//!
//! plus the forward label `return_60m` (see [`crate::labeling`]).
//!
//! Every feature uses only rows at or before its own timestamp. Rows with any
//! missing feature are dropped; in training mode rows without a label are
//! dropped as well. Nothing is imputed.
//!
//! # Usage
//!
//! ```ignore
//! use return_forecast::features::{FeatureBuilder, FeatureConfig};
//!
//! let builder = FeatureBuilder::new(FeatureConfig::default())?;
//! let table = builder.build(&observations)?;
//! for instrument in table.instruments() {
//!     println!("{instrument}: {} rows", table.rows(instrument).len());
//! }
//! ```

mod builder;
mod table;

pub use builder::{BuildMode, FeatureBuilder};
pub use table::{FeatureRow, FeatureTable, FeatureVec};

use serde::{Deserialize, Serialize};

/// Series the volatility features roll over.
///
/// One definition per deployment; the choice is part of the feature contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilitySource {
    /// Trailing std of close prices
    #[default]
    Close,
    /// Trailing std of traded volume
    Volume,
}

impl VolatilitySource {
    /// Column the source reads.
    pub fn column_name(&self) -> &'static str {
        match self {
            VolatilitySource::Close => "close",
            VolatilitySource::Volume => "volume",
        }
    }
}

/// What to do when consecutive rows are not spaced as the horizon assumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpacingPolicy {
    /// Do not check spacing
    Ignore,
    /// Log a warning and continue
    #[default]
    Warn,
    /// Fail the instrument with `IrregularSpacing`
    Reject,
}

/// Configuration for feature computation.
///
/// # Feature Count
///
/// `1 + return_windows.len() + volatility_windows.len() + 2`, which is 9 with
/// the default windows.
///
/// # Example
///
/// ```
/// use return_forecast::features::{FeatureConfig, VolatilitySource};
///
/// let config = FeatureConfig::default()
///     .with_horizon(30)
///     .with_volatility_source(VolatilitySource::Volume);
/// assert_eq!(config.feature_count(), 9);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Label horizon in row-steps
    pub horizon: usize,

    /// Momentum lookbacks in row-steps
    pub return_windows: Vec<usize>,

    /// Volatility lookbacks in row-steps
    pub volatility_windows: Vec<usize>,

    /// Series the volatility features roll over
    #[serde(default)]
    pub volatility_source: VolatilitySource,

    /// Spacing the horizon assumes between consecutive rows (None = unchecked)
    #[serde(default)]
    pub expected_spacing_secs: Option<i64>,

    /// Reaction to spacing violations
    #[serde(default)]
    pub spacing_policy: SpacingPolicy,

    /// Truncate timestamps to minute resolution before computing features
    #[serde(default)]
    pub floor_to_minute: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            horizon: 60,
            return_windows: vec![5, 15, 30],
            volatility_windows: vec![5, 15, 30],
            volatility_source: VolatilitySource::Close,
            expected_spacing_secs: Some(60),
            spacing_policy: SpacingPolicy::Warn,
            floor_to_minute: true,
        }
    }
}

impl FeatureConfig {
    /// Set the label horizon.
    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = horizon;
        self
    }

    /// Set the momentum lookbacks.
    pub fn with_return_windows(mut self, windows: Vec<usize>) -> Self {
        self.return_windows = windows;
        self
    }

    /// Set the volatility lookbacks.
    pub fn with_volatility_windows(mut self, windows: Vec<usize>) -> Self {
        self.volatility_windows = windows;
        self
    }

    /// Set the volatility source.
    pub fn with_volatility_source(mut self, source: VolatilitySource) -> Self {
        self.volatility_source = source;
        self
    }

    /// Set the spacing policy.
    pub fn with_spacing_policy(mut self, policy: SpacingPolicy) -> Self {
        self.spacing_policy = policy;
        self
    }

    /// Set the expected row spacing.
    pub fn with_expected_spacing_secs(mut self, secs: Option<i64>) -> Self {
        self.expected_spacing_secs = secs;
        self
    }

    /// Enable or disable minute flooring.
    pub fn with_floor_to_minute(mut self, enabled: bool) -> Self {
        self.floor_to_minute = enabled;
        self
    }

    /// Number of features per row.
    pub fn feature_count(&self) -> usize {
        1 + self.return_windows.len() + self.volatility_windows.len() + 2
    }

    /// Feature names in vector order.
    pub fn feature_names(&self) -> Vec<String> {
        crate::schema::FeatureSchema::from_config(self).owned_names()
    }

    /// Longest lookback any feature needs.
    pub fn max_lookback(&self) -> usize {
        self.return_windows
            .iter()
            .chain(self.volatility_windows.iter())
            .copied()
            .max()
            .unwrap_or(0)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.horizon == 0 {
            return Err("horizon must be > 0".to_string());
        }
        if self.return_windows.is_empty() {
            return Err("return_windows must not be empty".to_string());
        }
        if self.return_windows.contains(&0) {
            return Err("return windows must be > 0".to_string());
        }
        if self.volatility_windows.iter().any(|&n| n < 2) {
            return Err(
                "volatility windows must be >= 2 (sample std needs two points)".to_string(),
            );
        }
        if has_duplicates(&self.return_windows) || has_duplicates(&self.volatility_windows) {
            return Err("window lists must not contain duplicates".to_string());
        }
        if let Some(secs) = self.expected_spacing_secs {
            if secs <= 0 {
                return Err(format!("expected_spacing_secs must be > 0, got {secs}"));
            }
        }
        Ok(())
    }
}

fn has_duplicates(values: &[usize]) -> bool {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).any(|w| w[0] == w[1])
}
