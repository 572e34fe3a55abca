//! Encoder + dropout + linear head.

use super::{Adam, Dense, Dropout, LstmEncoder, ModelConfig, SequenceEncoder};
use crate::error::{ForecastError, Result};
use crate::sequence_builder::Sequence;
use ndarray::{arr1, Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// One prepared training example: `[T × F]` input and its target.
pub type Example = (Array2<f64>, f64);

/// Maps a window to a single scalar forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRegressor<E = LstmEncoder> {
    encoder: E,
    dropout: Dropout,
    head: Dense,
}

impl SequenceRegressor<LstmEncoder> {
    /// Build an LSTM regressor with weights drawn from `seed`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the model configuration does not validate.
    pub fn lstm(config: &ModelConfig, input_size: usize, seed: u64) -> Result<Self> {
        config.validate().map_err(ForecastError::invalid_config)?;
        let mut rng = StdRng::seed_from_u64(seed);
        let encoder = LstmEncoder::new(input_size, config.hidden_size, config.depth, &mut rng);
        Ok(Self::new(encoder, config.dropout, &mut rng))
    }
}

impl<E: SequenceEncoder> SequenceRegressor<E> {
    /// Wrap an encoder with dropout and a one-output head.
    pub fn new(encoder: E, dropout: f64, rng: &mut StdRng) -> Self {
        let head = Dense::new(encoder.output_size(), 1, rng);
        Self {
            encoder,
            dropout: Dropout::new(dropout),
            head,
        }
    }

    /// The encoder.
    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Features expected per step.
    pub fn input_size(&self) -> usize {
        self.encoder.input_size()
    }

    /// Number of trainable scalars.
    pub fn parameter_count(&self) -> usize {
        self.encoder.parameter_count() + self.head.parameter_count()
    }

    /// Convert a window to a `[T × F]` matrix.
    ///
    /// # Errors
    ///
    /// `ConfigurationMismatch` if the feature count differs from the encoder's.
    pub fn to_input(&self, sequence: &Sequence) -> Result<Array2<f64>> {
        if sequence.feature_count() != self.input_size() {
            return Err(ForecastError::mismatch(format!(
                "model expects {} features per step, sequence has {}",
                self.input_size(),
                sequence.feature_count()
            )));
        }
        Ok(Array2::from_shape_vec(
            (sequence.length(), sequence.feature_count()),
            sequence.as_flat(),
        )?)
    }

    /// Convert labeled windows to training examples.
    ///
    /// # Errors
    ///
    /// `Training` if a window has no label.
    pub fn prepare(&self, sequences: &[Sequence]) -> Result<Vec<Example>> {
        sequences
            .iter()
            .map(|s| {
                let label = s.label.ok_or_else(|| {
                    ForecastError::training(format!(
                        "window of '{}' ending at {} has no label",
                        s.instrument_id, s.end_timestamp
                    ))
                })?;
                Ok((self.to_input(s)?, label))
            })
            .collect()
    }

    /// Forecast one prepared input (dropout disabled).
    pub fn predict_input(&self, input: ArrayView2<'_, f64>) -> f64 {
        let hidden = self.encoder.encode(input);
        self.head.forward(hidden.view())[0]
    }

    /// Forecast every window, in order.
    pub fn predict(&self, sequences: &[Sequence]) -> Result<Vec<f64>> {
        let inputs = sequences
            .iter()
            .map(|s| self.to_input(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(inputs
            .par_iter()
            .map(|x| self.predict_input(x.view()))
            .collect())
    }

    /// Mean squared error over prepared examples (dropout disabled).
    pub fn loss(&self, examples: &[Example]) -> f64 {
        if examples.is_empty() {
            return 0.0;
        }
        let total: f64 = examples
            .par_iter()
            .map(|(x, y)| {
                let err = self.predict_input(x.view()) - y;
                err * err
            })
            .collect::<Vec<f64>>()
            .iter()
            .sum();
        total / examples.len() as f64
    }

    /// One optimizer step on a mini-batch. Returns the batch MSE measured
    /// during the forward pass (with dropout active).
    pub fn train_batch(&mut self, batch: &[&Example], optimizer: &mut Adam, rng: &mut StdRng) -> f64 {
        if batch.is_empty() {
            return 0.0;
        }

        let mut enc_grads = self.encoder.zero_gradients();
        let (mut head_dw, mut head_db) = self.head.zero_gradients();
        let mut loss = 0.0;

        for (x, y) in batch.iter().map(|e| (&e.0, e.1)) {
            let (hidden, cache) = self.encoder.encode_with_cache(x.view());
            let mask = self.dropout.sample_mask(hidden.len(), rng);
            let dropped: Array1<f64> = match &mask {
                Some(m) => &hidden * m,
                None => hidden,
            };

            let pred = self.head.forward(dropped.view())[0];
            let err = pred - y;
            loss += err * err;

            let dy = arr1(&[2.0 * err]);
            let (dw, db, dh) = self.head.backward(dropped.view(), dy.view());
            head_dw += &dw;
            head_db += &db;

            let dh = match &mask {
                Some(m) => dh * m,
                None => dh,
            };
            self.encoder.backward(&cache, dh.view(), &mut enc_grads);
        }

        let scale = 1.0 / batch.len() as f64;
        optimizer.next_step();
        let slot = self
            .encoder
            .apply_gradients(&enc_grads, scale, optimizer, 0);
        self.head.apply(&head_dw, &head_db, scale, optimizer, slot);

        loss * scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn config() -> ModelConfig {
        ModelConfig {
            hidden_size: 8,
            depth: 1,
            dropout: 0.0,
        }
    }

    fn sequence(values: &[[f64; 2]], label: f64) -> Sequence {
        let ts = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Sequence {
            instrument_id: "BTC".to_string(),
            features: values.iter().map(|v| Arc::new(v.to_vec())).collect(),
            start_timestamp: ts,
            end_timestamp: ts,
            label: Some(label),
        }
    }

    #[test]
    fn test_deterministic_construction() {
        let a = SequenceRegressor::lstm(&config(), 2, 42).unwrap();
        let b = SequenceRegressor::lstm(&config(), 2, 42).unwrap();
        let c = SequenceRegressor::lstm(&config(), 2, 43).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_feature_count_mismatch() {
        let model = SequenceRegressor::lstm(&config(), 3, 42).unwrap();
        let err = model
            .predict(&[sequence(&[[1.0, 2.0]], 0.0)])
            .unwrap_err();
        assert!(matches!(err, ForecastError::ConfigurationMismatch { .. }));
    }

    #[test]
    fn test_unlabeled_window_cannot_be_prepared() {
        let model = SequenceRegressor::lstm(&config(), 2, 42).unwrap();
        let mut seq = sequence(&[[1.0, 2.0]], 0.0);
        seq.label = None;
        assert!(matches!(
            model.prepare(&[seq]),
            Err(ForecastError::Training { .. })
        ));
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut model = SequenceRegressor::lstm(&config(), 2, 42).unwrap();
        // target is the mean of the first feature
        let sequences: Vec<Sequence> = (0..16)
            .map(|k| {
                let a = (k as f64 - 8.0) / 8.0;
                sequence(&[[a, 0.5], [a, -0.5], [a, 0.0]], a * 0.5)
            })
            .collect();
        let examples = model.prepare(&sequences).unwrap();
        let batch: Vec<&Example> = examples.iter().collect();

        let before = model.loss(&examples);
        let mut adam = Adam::new(0.01);
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..200 {
            model.train_batch(&batch, &mut adam, &mut rng);
        }
        let after = model.loss(&examples);
        assert!(after < before * 0.5, "before {before}, after {after}");
    }

    #[test]
    fn test_prediction_ignores_dropout() {
        let config = ModelConfig {
            dropout: 0.5,
            ..config()
        };
        let model = SequenceRegressor::lstm(&config, 2, 42).unwrap();
        let seqs = [sequence(&[[0.1, 0.2], [0.3, 0.4]], 0.0)];
        assert_eq!(model.predict(&seqs).unwrap(), model.predict(&seqs).unwrap());
    }
}
