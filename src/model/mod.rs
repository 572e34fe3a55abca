//! Sequence regression model.
//!
//! ```text
//! window [T × F] ──► SequenceEncoder ──► h_T [H] ──► Dropout ──► Dense ──► forecast
//! ```
//!
//! The encoder is a trait so the recurrent cell can be swapped for another
//! encoder without touching the pipeline. [`LstmEncoder`] is the one
//! implementation. Gradients are computed analytically (backpropagation
//! through time) and applied with [`Adam`].

mod checkpoint;
mod dense;
mod dropout;
mod encoder;
mod lstm;
mod optimizer;
mod regressor;

pub use checkpoint::ModelCheckpoint;
pub use dense::Dense;
pub use dropout::Dropout;
pub use encoder::SequenceEncoder;
pub use lstm::{LstmEncoder, LstmLayer};
pub use optimizer::Adam;
pub use regressor::SequenceRegressor;

use serde::{Deserialize, Serialize};

/// Architecture hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hidden width of each recurrent layer
    pub hidden_size: usize,

    /// Number of stacked recurrent layers
    pub depth: usize,

    /// Dropout rate on the final hidden state (training only)
    pub dropout: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_size: 64,
            depth: 1,
            dropout: 0.3,
        }
    }
}

impl ModelConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.hidden_size == 0 {
            return Err("hidden_size must be > 0".to_string());
        }
        if self.depth == 0 {
            return Err("depth must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(format!("dropout must be in [0, 1), got {}", self.dropout));
        }
        Ok(())
    }
}
