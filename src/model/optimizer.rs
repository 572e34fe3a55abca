//! Adam (adaptive moment estimation).
//!
//! ```text
//! m = β1·m + (1-β1)·g
//! v = β2·v + (1-β2)·g²
//! θ -= lr · m̂ / (sqrt(v̂) + ε)      m̂ = m/(1-β1^t), v̂ = v/(1-β2^t)
//! ```
//!
//! Moments are kept per parameter tensor ("slot"). Callers call
//! [`Adam::next_step`] once per mini-batch and then [`Adam::update`] for every
//! tensor in a fixed slot order.

use ndarray::{Array, Dimension};
use serde::{Deserialize, Serialize};

/// Adam optimizer state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adam {
    /// Learning rate
    pub learning_rate: f64,
    /// First-moment decay
    pub beta1: f64,
    /// Second-moment decay
    pub beta2: f64,
    /// Numerical floor in the denominator
    pub epsilon: f64,
    t: i32,
    moments: Vec<(Vec<f64>, Vec<f64>)>,
}

impl Adam {
    /// Create an optimizer with the usual betas.
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            moments: Vec::new(),
        }
    }

    /// Override the moment decays.
    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> Self {
        self.beta1 = beta1;
        self.beta2 = beta2;
        self
    }

    /// Advance the timestep. Call once per mini-batch, before the updates.
    pub fn next_step(&mut self) {
        self.t = self.t.saturating_add(1);
    }

    /// Steps taken so far.
    pub fn step_count(&self) -> i32 {
        self.t
    }

    /// Update one parameter tensor in place. `grads` must have the same shape.
    pub fn update<D: Dimension>(
        &mut self,
        slot: usize,
        params: &mut Array<f64, D>,
        grads: &Array<f64, D>,
        scale: f64,
    ) {
        if self.moments.len() <= slot {
            self.moments.resize_with(slot + 1, Default::default);
        }
        let (m, v) = &mut self.moments[slot];
        if m.len() != params.len() {
            *m = vec![0.0; params.len()];
            *v = vec![0.0; params.len()];
        }

        let t = self.t.max(1);
        let bias1 = 1.0 - self.beta1.powi(t);
        let bias2 = 1.0 - self.beta2.powi(t);

        for (((p, g), m), v) in params
            .iter_mut()
            .zip(grads.iter())
            .zip(m.iter_mut())
            .zip(v.iter_mut())
        {
            let g = g * scale;
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let m_hat = *m / bias1;
            let v_hat = *v / bias2;
            *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    /// Forget all moments.
    pub fn reset(&mut self) {
        self.t = 0;
        self.moments.clear();
    }
}
