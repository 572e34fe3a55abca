//! Fully connected output projection.

use super::Adam;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// Linear layer `y = W·x + b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    /// Weights `[out × in]`
    weights: Array2<f64>,
    /// Biases `[out]`
    biases: Array1<f64>,
}

impl Dense {
    /// Create a layer with Xavier/Glorot uniform initialization.
    pub fn new(input_size: usize, output_size: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (input_size + output_size).max(1) as f64).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);
        Self {
            weights: Array2::from_shape_fn((output_size, input_size), |_| dist.sample(rng)),
            biases: Array1::zeros(output_size),
        }
    }

    /// Input width.
    pub fn input_size(&self) -> usize {
        self.weights.ncols()
    }

    /// Output width.
    pub fn output_size(&self) -> usize {
        self.weights.nrows()
    }

    /// Forward pass.
    pub fn forward(&self, x: ArrayView1<'_, f64>) -> Array1<f64> {
        self.weights.dot(&x) + &self.biases
    }

    /// Gradients `(dW, db, dx)` for input `x` and upstream `dy`.
    pub fn backward(
        &self,
        x: ArrayView1<'_, f64>,
        dy: ArrayView1<'_, f64>,
    ) -> (Array2<f64>, Array1<f64>, Array1<f64>) {
        let dw = dy.insert_axis(Axis(1)).dot(&x.insert_axis(Axis(0)));
        let dx = self.weights.t().dot(&dy);
        (dw, dy.to_owned(), dx)
    }

    /// Zeroed `(dW, db)` accumulators.
    pub fn zero_gradients(&self) -> (Array2<f64>, Array1<f64>) {
        (
            Array2::zeros(self.weights.raw_dim()),
            Array1::zeros(self.biases.raw_dim()),
        )
    }

    /// Apply accumulated gradients. Returns the next free optimizer slot.
    pub fn apply(
        &mut self,
        dw: &Array2<f64>,
        db: &Array1<f64>,
        scale: f64,
        optimizer: &mut Adam,
        slot: usize,
    ) -> usize {
        optimizer.update(slot, &mut self.weights, dw, scale);
        optimizer.update(slot + 1, &mut self.biases, db, scale);
        slot + 2
    }

    /// Number of trainable scalars.
    pub fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}
