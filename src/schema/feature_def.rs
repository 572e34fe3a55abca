//! Feature definitions and schema types.
//!
//! - `FeatureCategory`: Enum of feature families
//! - `FeatureDef`: Metadata for a single feature column
//! - `FeatureSchema`: Ordered collection of feature definitions

use crate::features::FeatureConfig;
use serde::{Deserialize, Serialize};

/// Feature family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureCategory {
    /// News sentiment mapped to `[-1, 1]`
    Sentiment,

    /// Percent change of close over n row-steps
    Momentum,

    /// Trailing standard deviation over n row-steps
    Volatility,

    /// Cyclical hour-of-day encoding
    Calendar,
}

/// Definition of a single feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDef {
    /// Unique feature name (e.g., "ret_5m", "sin_hour")
    pub name: String,

    /// Index in the feature vector
    pub index: usize,

    /// Feature category
    pub category: FeatureCategory,

    /// Human-readable description
    pub description: String,

    /// Lookback in row-steps (None for point-in-time features)
    pub lookback: Option<usize>,
}

impl FeatureDef {
    /// Create a new feature definition.
    pub fn new(
        name: impl Into<String>,
        index: usize,
        category: FeatureCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            category,
            description: description.into(),
            lookback: None,
        }
    }

    /// Set the lookback.
    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = Some(lookback);
        self
    }
}

/// Feature schema containing all feature definitions in vector order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSchema {
    /// Schema version
    pub version: String,

    /// All feature definitions
    features: Vec<FeatureDef>,
}

impl FeatureSchema {
    /// Create a new empty schema.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            features: Vec::new(),
        }
    }

    /// Build the schema produced by a feature configuration.
    pub fn from_config(config: &FeatureConfig) -> Self {
        let mut schema = Self::new(super::SCHEMA_VERSION);
        let mut next = 0;

        schema.add_feature(FeatureDef::new(
            "sentiment_numeric",
            next,
            FeatureCategory::Sentiment,
            "News sentiment in [-1, 1]",
        ));
        next += 1;

        for &n in &config.return_windows {
            schema.add_feature(
                FeatureDef::new(
                    format!("ret_{n}m"),
                    next,
                    FeatureCategory::Momentum,
                    format!("close[i] / close[i-{n}] - 1"),
                )
                .with_lookback(n),
            );
            next += 1;
        }

        for &n in &config.volatility_windows {
            schema.add_feature(
                FeatureDef::new(
                    format!("vol_{n}m"),
                    next,
                    FeatureCategory::Volatility,
                    format!(
                        "Trailing {n}-row sample std of {}",
                        config.volatility_source.column_name()
                    ),
                )
                .with_lookback(n),
            );
            next += 1;
        }

        schema.add_feature(FeatureDef::new(
            "sin_hour",
            next,
            FeatureCategory::Calendar,
            "sin(2*pi*hour/24)",
        ));
        schema.add_feature(FeatureDef::new(
            "cos_hour",
            next + 1,
            FeatureCategory::Calendar,
            "cos(2*pi*hour/24)",
        ));

        schema
    }

    fn add_feature(&mut self, feature: FeatureDef) {
        self.features.push(feature);
    }

    /// Get the total number of features.
    pub fn total_count(&self) -> usize {
        self.features.len()
    }

    /// Get a feature by name.
    pub fn get_feature(&self, name: &str) -> Option<&FeatureDef> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Feature names in vector order.
    pub fn feature_names(&self) -> Vec<&str> {
        let mut features: Vec<&FeatureDef> = self.features.iter().collect();
        features.sort_by_key(|f| f.index);
        features.into_iter().map(|f| f.name.as_str()).collect()
    }

    /// Owned feature names in vector order.
    pub fn owned_names(&self) -> Vec<String> {
        self.feature_names().into_iter().map(String::from).collect()
    }
}
