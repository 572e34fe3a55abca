//! Trailing window statistics over a single instrument's series.
//!
//! Uses Welford's algorithm with add/remove so each step is O(1) regardless
//! of window length.
//!
//! **Sample variance** (ddof = 1):
//! ```text
//! variance = M2 / (n - 1)
//! ```
//!
//! A window holding a single point has no sample deviation; it reports `None`.
//! Windows shorter than the configured length (the first rows of a series)
//! report from the points available, so `vol_n[1]` is defined.
//!
//! # Example
//!
//! ```
//! use return_forecast::preprocessing::RollingStd;
//!
//! let mut rolling = RollingStd::new(3);
//! assert_eq!(rolling.push(1.0), None);
//! assert!(rolling.push(2.0).is_some());
//! ```

use std::collections::VecDeque;

/// Trailing sample standard deviation with minimum period 1.
#[derive(Debug, Clone)]
pub struct RollingStd {
    window: usize,
    values: VecDeque<f64>,
    mean: f64,
    m2: f64,
}

impl RollingStd {
    /// Create an estimator over the trailing `window` points.
    ///
    /// A zero window is treated as 1.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            values: VecDeque::with_capacity(window),
            mean: 0.0,
            m2: 0.0,
        }
    }

    /// Push the next value and return the current trailing deviation.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        if self.values.len() == self.window {
            if let Some(old) = self.values.pop_front() {
                self.remove(old);
            }
        }
        self.values.push_back(value);
        self.add(value);
        self.std()
    }

    /// Current sample standard deviation, `None` with fewer than two points.
    pub fn std(&self) -> Option<f64> {
        let n = self.values.len();
        if n < 2 {
            return None;
        }
        let variance = (self.m2 / (n - 1) as f64).max(0.0);
        Some(variance.sqrt())
    }

    /// Number of points in the window.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no point has been pushed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Clear all state.
    pub fn reset(&mut self) {
        self.values.clear();
        self.mean = 0.0;
        self.m2 = 0.0;
    }

    fn add(&mut self, value: f64) {
        let n = self.values.len() as f64;
        let delta = value - self.mean;
        self.mean += delta / n;
        self.m2 += delta * (value - self.mean);
    }

    fn remove(&mut self, value: f64) {
        let n = self.values.len() as f64;
        if n == 0.0 {
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        let old_mean = self.mean;
        self.mean = ((n + 1.0) * old_mean - value) / n;
        self.m2 -= (value - old_mean) * (value - self.mean);
        if self.m2 < 0.0 {
            self.m2 = 0.0;
        }
    }
}

/// Trailing sample std for every position of `values`.
pub fn trailing_std(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut rolling = RollingStd::new(window);
    values.iter().map(|&v| rolling.push(v)).collect()
}

/// Percent change over `n` steps: `values[i] / values[i - n] - 1`.
///
/// `None` for the first `n` positions.
pub fn pct_change(values: &[f64], n: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i < n {
                None
            } else {
                Some(values[i] / values[i - n] - 1.0)
            }
        })
        .collect()
}
