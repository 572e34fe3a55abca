//! Forecast evaluation metrics.
//!
//! Directional accuracy compares sign buckets with zero as its own bucket:
//! a forecast of exactly 0 only matches a label of exactly 0. A tiny positive
//! label against a zero forecast counts as a miss.

use crate::error::{ForecastError, Result};
use crate::labeling::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Mean squared error.
pub fn mse(forecasts: &[f64], labels: &[f64]) -> f64 {
    if forecasts.is_empty() {
        return 0.0;
    }
    forecasts
        .iter()
        .zip(labels)
        .map(|(f, y)| (f - y) * (f - y))
        .sum::<f64>()
        / forecasts.len() as f64
}

/// Root mean squared error.
pub fn rmse(forecasts: &[f64], labels: &[f64]) -> f64 {
    mse(forecasts, labels).sqrt()
}

/// Mean absolute error.
pub fn mae(forecasts: &[f64], labels: &[f64]) -> f64 {
    if forecasts.is_empty() {
        return 0.0;
    }
    forecasts
        .iter()
        .zip(labels)
        .map(|(f, y)| (f - y).abs())
        .sum::<f64>()
        / forecasts.len() as f64
}

/// Fraction of examples whose forecast and label fall in the same sign bucket.
pub fn directional_accuracy(forecasts: &[f64], labels: &[f64]) -> f64 {
    if forecasts.is_empty() {
        return 0.0;
    }
    let hits = forecasts
        .iter()
        .zip(labels)
        .filter(|(f, y)| Direction::of(**f) == Direction::of(**y))
        .count();
    hits as f64 / forecasts.len() as f64
}

/// Metrics over one evaluation set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Examples evaluated
    pub count: usize,
    /// Mean squared error
    pub mse: f64,
    /// Root mean squared error
    pub rmse: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Sign agreement rate
    pub directional_accuracy: f64,
}

impl EvaluationMetrics {
    /// Compute all metrics.
    ///
    /// # Errors
    ///
    /// `Schema` if the slices differ in length or are empty.
    pub fn compute(forecasts: &[f64], labels: &[f64]) -> Result<Self> {
        if forecasts.len() != labels.len() {
            return Err(ForecastError::schema(format!(
                "{} forecasts for {} labels",
                forecasts.len(),
                labels.len()
            )));
        }
        if forecasts.is_empty() {
            return Err(ForecastError::schema("no examples to evaluate"));
        }
        let mse = mse(forecasts, labels);
        Ok(Self {
            count: forecasts.len(),
            mse,
            rmse: mse.sqrt(),
            mae: mae(forecasts, labels),
            directional_accuracy: directional_accuracy(forecasts, labels),
        })
    }
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} rmse={:.6} mae={:.6} dir_acc={:.3}",
            self.count, self.rmse, self.mae, self.directional_accuracy
        )
    }
}
