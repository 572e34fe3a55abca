//! Chronological train/validation/test partitioning.
//!
//! The test partition is always the chronological tail: `split = floor(0.8 N)`,
//! `[0, split)` is the train pool and `[split, N)` is test. The validation set
//! is `floor(0.1 × |pool|)` sequences carved from the pool, either by seeded
//! shuffle or by taking the pool's tail. Validation only drives early stopping,
//! so a shuffled carve does not leak test data.

use crate::error::{ForecastError, Result};
use crate::sequence_builder::Sequence;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// How the validation subset is chosen from the train pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCarve {
    /// Seeded random subset of the pool
    #[default]
    Shuffled,
    /// Last `val_size` sequences of the pool
    Tail,
}

/// Partition fractions and carve strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of all sequences in the train pool
    pub train_fraction: f64,

    /// Fraction of the train pool held out for validation
    pub validation_fraction: f64,

    /// Validation carve strategy
    #[serde(default)]
    pub carve: ValidationCarve,

    /// Seed for the shuffled carve
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
            validation_fraction: 0.1,
            carve: ValidationCarve::Shuffled,
            seed: 42,
        }
    }
}

impl SplitConfig {
    /// Set the carve strategy.
    pub fn with_carve(mut self, carve: ValidationCarve) -> Self {
        self.carve = carve;
        self
    }

    /// Set the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(format!(
                "train_fraction must be in (0, 1), got {}",
                self.train_fraction
            ));
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(format!(
                "validation_fraction must be in [0, 1), got {}",
                self.validation_fraction
            ));
        }
        Ok(())
    }
}

/// The three partitions, each in chronological emission order.
#[derive(Debug, Clone, Default)]
pub struct DatasetSplit {
    /// Sequences the scaler and model are fit on
    pub train: Vec<Sequence>,
    /// Early-stopping signal
    pub validation: Vec<Sequence>,
    /// Held-out evaluation
    pub test: Vec<Sequence>,
}

impl DatasetSplit {
    /// Total sequences across partitions.
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }
}

/// Partitions sequences chronologically.
#[derive(Debug, Clone)]
pub struct Splitter {
    config: SplitConfig,
}

impl Splitter {
    /// Create a splitter.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate.
    pub fn new(config: SplitConfig) -> Result<Self> {
        config.validate().map_err(ForecastError::invalid_config)?;
        Ok(Self { config })
    }

    /// Split sequences given in emission order.
    pub fn split(&self, sequences: Vec<Sequence>) -> DatasetSplit {
        let n = sequences.len();
        let split = (self.config.train_fraction * n as f64).floor() as usize;

        let mut pool = sequences;
        let test = pool.split_off(split);
        let val_size = (self.config.validation_fraction * pool.len() as f64).floor() as usize;

        let mut held_out = vec![false; pool.len()];
        match self.config.carve {
            ValidationCarve::Tail => {
                let start = pool.len() - val_size;
                held_out[start..].iter_mut().for_each(|h| *h = true);
            }
            ValidationCarve::Shuffled => {
                let mut indices: Vec<usize> = (0..pool.len()).collect();
                let mut rng = StdRng::seed_from_u64(self.config.seed);
                indices.shuffle(&mut rng);
                for &i in &indices[..val_size] {
                    held_out[i] = true;
                }
            }
        }

        let mut train = Vec::with_capacity(pool.len() - val_size);
        let mut validation = Vec::with_capacity(val_size);
        for (sequence, is_val) in pool.into_iter().zip(held_out) {
            if is_val {
                validation.push(sequence);
            } else {
                train.push(sequence);
            }
        }

        debug!(
            "Split {n} sequences: train {}, validation {}, test {} ({:?} carve)",
            train.len(),
            validation.len(),
            test.len(),
            self.config.carve
        );
        DatasetSplit {
            train,
            validation,
            test,
        }
    }
}
