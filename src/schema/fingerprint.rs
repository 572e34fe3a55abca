//! Contract shared by the scaler and checkpoint artifacts.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Feature contract an artifact was produced under.
///
/// Scaler parameters and model weights are only meaningful together when
/// their fingerprints are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFingerprint {
    /// Feature names in vector order
    pub feature_names: Vec<String>,
    /// Rows per input window
    pub window_length: usize,
    /// Features per row
    pub feature_count: usize,
}

impl ArtifactFingerprint {
    /// Create a fingerprint from feature names and window length.
    pub fn new(feature_names: Vec<String>, window_length: usize) -> Self {
        let feature_count = feature_names.len();
        Self {
            feature_names,
            window_length,
            feature_count,
        }
    }

    /// Fail with `ConfigurationMismatch` unless `other` describes the same contract.
    pub fn ensure_matches(&self, other: &ArtifactFingerprint, context: &str) -> Result<()> {
        if self.window_length != other.window_length {
            return Err(ForecastError::mismatch(format!(
                "{context}: window length {} vs {}",
                self.window_length, other.window_length
            )));
        }
        if self.feature_count != other.feature_count || self.feature_names != other.feature_names {
            return Err(ForecastError::mismatch(format!(
                "{context}: features {:?} vs {:?}",
                self.feature_names, other.feature_names
            )));
        }
        Ok(())
    }
}
