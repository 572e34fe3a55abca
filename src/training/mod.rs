//! Mini-batch training with early stopping.
//!
//! The loop is the only stateful region of the pipeline: the best validation
//! loss and the best checkpoint are owned by the single thread running
//! [`Trainer::fit`]. Optimizer steps are strictly sequential.
//!
//! ```text
//! for epoch in 1..=epochs:
//!     stop signal set?      → end (best checkpoint so far)
//!     shuffle train, step over mini-batches
//!     v = validation MSE
//!     early_stopping.observe(v):
//!         Improving  → checkpoint
//!         Plateau(k) → continue
//!         Stopped    → end
//! reload best checkpoint
//! ```

mod early_stopping;
mod trainer;

pub use early_stopping::{EarlyStopping, StoppingState};
pub use trainer::{EpochRecord, Trainer, TrainingContract, TrainingHistory, TrainingOutcome};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Training loop hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Maximum epochs
    pub epochs: usize,

    /// Mini-batch size
    pub batch_size: usize,

    /// Adam learning rate
    pub learning_rate: f64,

    /// Consecutive non-improving epochs before stopping
    pub patience: usize,

    /// Seed for weight init, dropout and shuffling
    pub seed: u64,

    /// Where the best checkpoint is written on every improvement
    /// (None = keep it in memory only)
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.001,
            patience: 5,
            seed: 42,
            checkpoint_path: None,
        }
    }
}

impl TrainingConfig {
    /// Set the epoch cap.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the patience.
    pub fn with_patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    /// Set the checkpoint path.
    pub fn with_checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.epochs == 0 {
            return Err("epochs must be > 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be > 0".to_string());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(format!(
                "learning_rate must be finite and > 0, got {}",
                self.learning_rate
            ));
        }
        if self.patience == 0 {
            return Err("patience must be > 0".to_string());
        }
        Ok(())
    }
}

/// Cooperative stop request, checked once per epoch boundary.
///
/// Clones share the same flag, so the signal can be handed to another thread
/// and set from there.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    /// Create an unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Clear the signal. Only call when nothing is running.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }
}
