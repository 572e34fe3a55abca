//! The training loop.

use super::{EarlyStopping, StopSignal, StoppingState, TrainingConfig};
use crate::error::{ForecastError, Result};
use crate::features::FeatureConfig;
use crate::model::{Adam, LstmEncoder, ModelCheckpoint, ModelConfig, SequenceEncoder, SequenceRegressor};
use crate::schema::ArtifactFingerprint;
use crate::sequence_builder::Sequence;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

type Example = (ndarray::Array2<f64>, f64);

/// Losses and state after one epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch
    pub epoch: usize,
    /// Mean training loss (dropout active)
    pub train_loss: f64,
    /// Validation loss
    pub val_loss: f64,
    /// Early-stopping state after this epoch
    pub state: StoppingState,
}

/// Per-epoch record of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Completed epochs in order
    pub epochs: Vec<EpochRecord>,
    /// Epoch of the restored checkpoint
    pub best_epoch: usize,
    /// Validation loss of the restored checkpoint
    pub best_val_loss: f64,
    /// Whether `Stopped` was reached before the epoch cap
    pub stopped_early: bool,
    /// Whether the stop signal ended the run
    pub cancelled: bool,
}

impl TrainingHistory {
    /// Number of completed epochs.
    pub fn epochs_run(&self) -> usize {
        self.epochs.len()
    }
}

/// Result of [`Trainer::fit`]: the restored best checkpoint and the history.
#[derive(Debug, Clone)]
pub struct TrainingOutcome<E = LstmEncoder> {
    /// Best-validation checkpoint (reloaded from disk when a path is configured)
    pub checkpoint: ModelCheckpoint<E>,
    /// What happened each epoch
    pub history: TrainingHistory,
}

/// The contract a checkpoint is stamped with.
#[derive(Debug, Clone)]
pub struct TrainingContract {
    /// Feature contract
    pub fingerprint: ArtifactFingerprint,
    /// Feature computation settings
    pub feature_config: FeatureConfig,
    /// Architecture
    pub model_config: ModelConfig,
}

/// One epoch of work and one checkpoint write, as seen by the loop.
trait EpochDriver {
    /// Train one epoch; return `(train_loss, val_loss)`.
    fn run_epoch(&mut self, epoch: usize) -> Result<(f64, f64)>;

    /// Persist the current weights as the new best.
    fn checkpoint(&mut self, epoch: usize, val_loss: f64) -> Result<()>;
}

struct RegressorDriver<'a, E> {
    model: SequenceRegressor<E>,
    optimizer: Adam,
    rng: StdRng,
    train: Vec<Example>,
    monitor: Vec<Example>,
    order: Vec<usize>,
    batch_size: usize,
    contract: &'a TrainingContract,
    config: &'a TrainingConfig,
    best: Option<ModelCheckpoint<E>>,
}

impl<E: SequenceEncoder> EpochDriver for RegressorDriver<'_, E> {
    fn run_epoch(&mut self, _epoch: usize) -> Result<(f64, f64)> {
        self.order.shuffle(&mut self.rng);

        let mut total = 0.0;
        for chunk in self.order.chunks(self.batch_size) {
            let batch: Vec<&Example> = chunk.iter().map(|&i| &self.train[i]).collect();
            let loss = self
                .model
                .train_batch(&batch, &mut self.optimizer, &mut self.rng);
            total += loss * chunk.len() as f64;
        }

        let train_loss = total / self.train.len() as f64;
        let val_loss = self.model.loss(&self.monitor);
        Ok((train_loss, val_loss))
    }

    fn checkpoint(&mut self, epoch: usize, val_loss: f64) -> Result<()> {
        let checkpoint = ModelCheckpoint {
            fingerprint: self.contract.fingerprint.clone(),
            feature_config: self.contract.feature_config.clone(),
            model_config: self.contract.model_config.clone(),
            epoch,
            val_loss,
            regressor: self.model.clone(),
        };
        if let Some(path) = &self.config.checkpoint_path {
            checkpoint.save(path)?;
        }
        self.best = Some(checkpoint);
        Ok(())
    }
}

/// Runs the epoch loop with early stopping.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
    stop: StopSignal,
}

impl Trainer {
    /// Create a trainer.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate.
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate().map_err(ForecastError::invalid_config)?;
        Ok(Self {
            config,
            stop: StopSignal::new(),
        })
    }

    /// Use an externally owned stop signal.
    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop = signal;
        self
    }

    /// Handle to the stop signal.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Configuration in use.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `model` and return the best-validation checkpoint.
    ///
    /// With an empty validation set the training loss is monitored instead.
    ///
    /// # Errors
    ///
    /// - `Training` on an empty training set or a non-finite loss
    /// - `Cancelled` if the stop signal fires before the first epoch completes
    /// - I/O and encoding errors from checkpoint writes
    pub fn fit<E: SequenceEncoder>(
        &self,
        model: SequenceRegressor<E>,
        train: &[Sequence],
        validation: &[Sequence],
        contract: &TrainingContract,
    ) -> Result<TrainingOutcome<E>> {
        if train.is_empty() {
            return Err(ForecastError::training("training set is empty"));
        }

        let train_examples = model.prepare(train)?;
        let monitor = if validation.is_empty() {
            warn!("Validation set is empty; early stopping monitors training loss");
            train_examples.clone()
        } else {
            model.prepare(validation)?
        };

        info!(
            "Starting training: {} train / {} validation windows, {} parameters, {} epochs, batch {}",
            train_examples.len(),
            validation.len(),
            model.parameter_count(),
            self.config.epochs,
            self.config.batch_size
        );

        let mut driver = RegressorDriver {
            order: (0..train_examples.len()).collect(),
            model,
            optimizer: Adam::new(self.config.learning_rate),
            rng: StdRng::seed_from_u64(self.config.seed.wrapping_add(1)),
            train: train_examples,
            monitor,
            batch_size: self.config.batch_size,
            contract,
            config: &self.config,
            best: None,
        };

        let history = self.drive(&mut driver)?;

        let checkpoint = match (&self.config.checkpoint_path, driver.best) {
            (Some(path), _) => ModelCheckpoint::load(path)?,
            (None, Some(best)) => best,
            (None, None) => return Err(ForecastError::training("no checkpoint was produced")),
        };
        info!(
            "Restored best checkpoint: epoch {} (val loss {:.6}) after {} epochs",
            checkpoint.epoch,
            checkpoint.val_loss,
            history.epochs_run()
        );

        Ok(TrainingOutcome {
            checkpoint,
            history,
        })
    }

    fn drive<D: EpochDriver>(&self, driver: &mut D) -> Result<TrainingHistory> {
        let mut early_stopping = EarlyStopping::new(self.config.patience);
        let mut epochs = Vec::new();
        let mut cancelled = false;

        for epoch in 1..=self.config.epochs {
            if self.stop.is_stopped() {
                info!("Stop signal received before epoch {epoch}");
                cancelled = true;
                break;
            }

            let (train_loss, val_loss) = driver.run_epoch(epoch)?;
            if !train_loss.is_finite() || !val_loss.is_finite() {
                return Err(ForecastError::training(format!(
                    "non-finite loss at epoch {epoch}: train {train_loss}, validation {val_loss}"
                )));
            }

            let state = early_stopping.observe(epoch, val_loss);
            info!("Epoch {epoch}: train {train_loss:.6}, validation {val_loss:.6} [{state}]");
            if state == StoppingState::Improving {
                driver.checkpoint(epoch, val_loss)?;
            }

            epochs.push(EpochRecord {
                epoch,
                train_loss,
                val_loss,
                state,
            });

            if state == StoppingState::Stopped {
                info!(
                    "Early stopping at epoch {epoch} (best {:?}, patience {})",
                    early_stopping.best_epoch(),
                    early_stopping.patience()
                );
                break;
            }
        }

        let best_epoch = match early_stopping.best_epoch() {
            Some(epoch) => epoch,
            None if cancelled => return Err(ForecastError::Cancelled),
            None => return Err(ForecastError::training("no epoch improved on +inf")),
        };

        Ok(TrainingHistory {
            epochs,
            best_epoch,
            best_val_loss: early_stopping.best_loss(),
            stopped_early: early_stopping.should_stop(),
            cancelled,
        })
    }
}
