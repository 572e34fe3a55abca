//! Inverted dropout.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Zeroes each unit with probability `rate` during training and scales the
/// survivors by `1 / (1 - rate)`. Inference is the identity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dropout {
    rate: f64,
}

impl Dropout {
    /// Create a dropout layer. The rate is clamped to `[0, 1)`.
    pub fn new(rate: f64) -> Self {
        Self {
            rate: rate.clamp(0.0, 0.999),
        }
    }

    /// Drop probability.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Sample a training mask of length `len`, `None` when the rate is 0.
    pub fn sample_mask(&self, len: usize, rng: &mut StdRng) -> Option<Array1<f64>> {
        if self.rate == 0.0 {
            return None;
        }
        let keep = 1.0 - self.rate;
        Some(Array1::from_shape_fn(len, |_| {
            if rng.gen::<f64>() < keep {
                1.0 / keep
            } else {
                0.0
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_mask_values_and_expectation() {
        let dropout = Dropout::new(0.3);
        let mut rng = StdRng::seed_from_u64(3);
        let mask = dropout.sample_mask(10_000, &mut rng).unwrap();
        assert!(mask
            .iter()
            .all(|&m| m == 0.0 || (m - 1.0 / 0.7).abs() < 1e-12));
        let mean = mask.mean().unwrap();
        assert!((mean - 1.0).abs() < 0.05, "mean {mean}");
    }

    #[test]
    fn test_zero_rate_has_no_mask() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(Dropout::new(0.0).sample_mask(4, &mut rng).is_none());
    }
}
