//! Forward-return labels.
//!
//! The regression target for row `i` of an instrument's series is
//!
//! ```text
//! return_h[i] = close[i + h] / close[i] - 1
//! ```
//!
//! where `h` is the horizon in row-steps (60 by default, one hour at minute
//! resolution). The last `h` rows of every series have no future point and
//! therefore no label.
//!
//! [`Direction`] buckets a return by sign. Zero is its own bucket, which is
//! what directional accuracy compares.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sign bucket of a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Negative return
    Down = -1,

    /// Exactly zero
    Flat = 0,

    /// Positive return
    Up = 1,
}

impl Direction {
    /// Bucket a value by sign. NaN maps to `Flat`.
    #[inline]
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            Direction::Up
        } else if value < 0.0 {
            Direction::Down
        } else {
            Direction::Flat
        }
    }

    /// Integer representation: -1, 0, 1.
    #[inline]
    pub fn as_int(&self) -> i8 {
        *self as i8
    }

    /// Create from integer representation.
    pub fn from_int(value: i8) -> Option<Self> {
        match value {
            -1 => Some(Direction::Down),
            0 => Some(Direction::Flat),
            1 => Some(Direction::Up),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "Up"),
            Direction::Flat => write!(f, "Flat"),
            Direction::Down => write!(f, "Down"),
        }
    }
}

/// Forward return over `horizon` row-steps for every position of `closes`.
///
/// `None` for the last `horizon` positions.
pub fn forward_returns(closes: &[f64], horizon: usize) -> Vec<Option<f64>> {
    (0..closes.len())
        .map(|i| closes.get(i + horizon).map(|future| future / closes[i] - 1.0))
        .collect()
}

/// Summary of a label distribution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelStats {
    /// Number of labels
    pub total: usize,

    /// Labels > 0
    pub up_count: usize,

    /// Labels < 0
    pub down_count: usize,

    /// Labels == 0
    pub flat_count: usize,

    /// Mean return
    pub mean: f64,

    /// Sample standard deviation of returns
    pub std: f64,

    /// Smallest return
    pub min: f64,

    /// Largest return
    pub max: f64,
}

impl LabelStats {
    /// Compute statistics over a set of labels.
    pub fn from_labels(labels: &[f64]) -> Self {
        if labels.is_empty() {
            return Self::default();
        }

        let mut stats = Self {
            total: labels.len(),
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            ..Self::default()
        };

        for &label in labels {
            match Direction::of(label) {
                Direction::Up => stats.up_count += 1,
                Direction::Down => stats.down_count += 1,
                Direction::Flat => stats.flat_count += 1,
            }
            stats.min = stats.min.min(label);
            stats.max = stats.max.max(label);
        }

        let n = labels.len() as f64;
        stats.mean = labels.iter().sum::<f64>() / n;
        if labels.len() > 1 {
            let var = labels
                .iter()
                .map(|l| (l - stats.mean).powi(2))
                .sum::<f64>()
                / (n - 1.0);
            stats.std = var.sqrt();
        }
        stats
    }

    /// Fractions (up, flat, down), each in `[0, 1]`.
    pub fn class_balance(&self) -> (f64, f64, f64) {
        if self.total == 0 {
            return (0.0, 0.0, 0.0);
        }
        let total = self.total as f64;
        (
            self.up_count as f64 / total,
            self.flat_count as f64 / total,
            self.down_count as f64 / total,
        )
    }

    /// Most frequent direction.
    pub fn majority_direction(&self) -> Direction {
        if self.up_count >= self.down_count && self.up_count >= self.flat_count {
            Direction::Up
        } else if self.down_count >= self.flat_count {
            Direction::Down
        } else {
            Direction::Flat
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
