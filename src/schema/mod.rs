//! Feature Schema Module
//!
//! Names and orders the columns of the feature vector so the training run and
//! the serving path agree on the exact feature contract.
//!
//! The default schema has 9 causal features plus the forward label:
//!
//! | Index | Name | Category |
//! |-------|------|----------|
//! | 0 | `sentiment_numeric` | Sentiment |
//! | 1-3 | `ret_5m`, `ret_15m`, `ret_30m` | Momentum |
//! | 4-6 | `vol_5m`, `vol_15m`, `vol_30m` | Volatility |
//! | 7-8 | `sin_hour`, `cos_hour` | Calendar |
//!
//! # Example
//!
//! ```
//! use return_forecast::schema::{FeatureCategory, FeatureSchema};
//! use return_forecast::FeatureConfig;
//!
//! let schema = FeatureSchema::from_config(&FeatureConfig::default());
//! assert_eq!(schema.total_count(), 9);
//! assert_eq!(schema.get_feature("vol_15m").unwrap().index, 5);
//! assert_eq!(schema.get_feature("ret_30m").unwrap().category, FeatureCategory::Momentum);
//! ```

mod feature_def;
mod fingerprint;

pub use feature_def::{FeatureCategory, FeatureDef, FeatureSchema};
pub use fingerprint::ArtifactFingerprint;

/// Current schema version
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Name of the forward-return label column
pub const LABEL_NAME: &str = "return_60m";
