//! Per-feature standardization fit on training sequences only.
//!
//! ```text
//! x' = (x - mean[j]) / std[j]
//! ```
//!
//! `mean` and `std` (population, ddof = 0) are computed per feature column
//! across every window position of every training sequence. A zero standard
//! deviation is stored as 1.
//!
//! A [`StandardScaler`] fits exactly once. Any further `fit` call fails with
//! `LeakageGuardViolation`, so validation, test and inference data can only
//! ever be transformed with parameters learned from the training partition.

use crate::error::{ForecastError, Result};
use crate::schema::ArtifactFingerprint;
use crate::sequence_builder::Sequence;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Threshold below which a column is treated as constant.
const MIN_STD: f64 = 1e-8;

/// Fitted per-column statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParameters {
    /// Feature contract the parameters were fit under
    pub fingerprint: ArtifactFingerprint,
    /// Column means
    pub mean: Vec<f64>,
    /// Column standard deviations (never zero)
    pub std: Vec<f64>,
    /// Sequences the parameters were fit on
    pub sequences_seen: usize,
}

impl ScalerParameters {
    /// Number of feature columns.
    pub fn feature_count(&self) -> usize {
        self.mean.len()
    }

    /// Standardize one feature vector.
    pub fn transform_vector(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.feature_count() {
            return Err(ForecastError::mismatch(format!(
                "scaler fit on {} features, input has {}",
                self.feature_count(),
                features.len()
            )));
        }
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(x, (m, s))| (x - m) / s)
            .collect())
    }

    /// Standardize every row of a sequence.
    pub fn transform_sequence(&self, sequence: &Sequence) -> Result<Sequence> {
        let features = sequence
            .features
            .iter()
            .map(|row| self.transform_vector(row).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Sequence {
            features,
            ..sequence.clone()
        })
    }

    /// Standardize a batch of sequences.
    pub fn transform_all(&self, sequences: &[Sequence]) -> Result<Vec<Sequence>> {
        sequences
            .iter()
            .map(|s| self.transform_sequence(s))
            .collect()
    }

    /// Write parameters as JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| ForecastError::io(path, e))?;
        info!(
            "Saved scaler parameters ({} features) to {}",
            self.feature_count(),
            path.display()
        );
        Ok(())
    }

    /// Read parameters from JSON.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| ForecastError::io(path, e))?;
        let params: Self = serde_json::from_str(&json)?;
        params.check_consistency()?;
        Ok(params)
    }

    fn check_consistency(&self) -> Result<()> {
        if self.mean.len() != self.std.len() || self.mean.len() != self.fingerprint.feature_count
        {
            return Err(ForecastError::mismatch(format!(
                "scaler has {} means, {} stds, fingerprint says {} features",
                self.mean.len(),
                self.std.len(),
                self.fingerprint.feature_count
            )));
        }
        if self.std.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(ForecastError::schema("scaler std must be finite and > 0"));
        }
        Ok(())
    }
}

/// Fit-once standardizer.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    fingerprint: ArtifactFingerprint,
    params: Option<ScalerParameters>,
}

impl StandardScaler {
    /// Create an unfitted scaler for a feature contract.
    pub fn new(fingerprint: ArtifactFingerprint) -> Self {
        Self {
            fingerprint,
            params: None,
        }
    }

    /// Wrap parameters loaded from disk. The scaler is already fitted.
    pub fn from_parameters(params: ScalerParameters) -> Self {
        Self {
            fingerprint: params.fingerprint.clone(),
            params: Some(params),
        }
    }

    /// Whether parameters exist.
    pub fn is_fitted(&self) -> bool {
        self.params.is_some()
    }

    /// Fitted parameters, if any.
    pub fn parameters(&self) -> Option<&ScalerParameters> {
        self.params.as_ref()
    }

    /// Fit on training sequences.
    ///
    /// # Errors
    ///
    /// - `LeakageGuardViolation` if the scaler is already fitted
    /// - `Training` if `train` is empty
    /// - `Schema` if a row's width differs from the fingerprint
    pub fn fit(&mut self, train: &[Sequence]) -> Result<&ScalerParameters> {
        if self.params.is_some() {
            return Err(ForecastError::leakage(
                "scaler is already fitted; refitting on other data is not allowed",
            ));
        }
        if train.is_empty() {
            return Err(ForecastError::training("cannot fit scaler on an empty training set"));
        }

        let width = self.fingerprint.feature_count;
        let mut count = 0usize;
        let mut sum = vec![0.0; width];
        for row in train.iter().flat_map(|s| s.features.iter()) {
            if row.len() != width {
                return Err(ForecastError::schema(format!(
                    "expected {width} features per row, got {}",
                    row.len()
                )));
            }
            for (acc, x) in sum.iter_mut().zip(row.iter()) {
                *acc += x;
            }
            count += 1;
        }
        let mean: Vec<f64> = sum.iter().map(|s| s / count as f64).collect();

        let mut sq = vec![0.0; width];
        for row in train.iter().flat_map(|s| s.features.iter()) {
            for ((acc, x), m) in sq.iter_mut().zip(row.iter()).zip(&mean) {
                *acc += (x - m) * (x - m);
            }
        }
        let std: Vec<f64> = sq
            .iter()
            .map(|s| {
                let std = (s / count as f64).sqrt();
                if std < MIN_STD {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        info!(
            "Fitted scaler on training partition: {} sequences, {count} rows, {width} features",
            train.len()
        );
        Ok(self.params.insert(ScalerParameters {
            fingerprint: self.fingerprint.clone(),
            mean,
            std,
            sequences_seen: train.len(),
        }))
    }

    /// Transform sequences with the fitted parameters.
    ///
    /// # Errors
    ///
    /// `LeakageGuardViolation` if called before `fit`.
    pub fn transform(&self, sequences: &[Sequence]) -> Result<Vec<Sequence>> {
        self.params
            .as_ref()
            .ok_or_else(|| ForecastError::leakage("transform called before fit"))?
            .transform_all(sequences)
    }
}
