//! Early stopping, metrics and checkpoint persistence.

use chrono::{Duration, TimeZone, Utc};
use return_forecast::features::FeatureRow;
use return_forecast::metrics::{directional_accuracy, rmse, EvaluationMetrics};
use return_forecast::model::{ModelCheckpoint, ModelConfig, SequenceRegressor};
use return_forecast::training::{
    EarlyStopping, StopSignal, StoppingState, Trainer, TrainingConfig, TrainingContract,
};
use return_forecast::{ArtifactFingerprint, FeatureConfig, ForecastError, Sequence};
use std::sync::Arc;

// ============================================================================
// Early stopping
// ============================================================================

#[test]
fn test_early_stopping_reference_sequence() {
    let losses = [0.5, 0.4, 0.41, 0.42, 0.43, 0.44];
    let mut es = EarlyStopping::new(5);
    let states: Vec<StoppingState> = losses
        .iter()
        .enumerate()
        .map(|(i, &loss)| es.observe(i + 1, loss))
        .collect();

    assert_eq!(
        states,
        vec![
            StoppingState::Improving,
            StoppingState::Improving,
            StoppingState::Plateau(1),
            StoppingState::Plateau(2),
            StoppingState::Plateau(3),
            StoppingState::Plateau(4),
        ]
    );
    assert_eq!(es.best_epoch(), Some(2));
    assert!((es.best_loss() - 0.4).abs() < 1e-15);
    assert!(!es.should_stop());

    // The fifth consecutive non-improvement is terminal
    assert_eq!(es.observe(7, 0.45), StoppingState::Stopped);
    assert!(es.should_stop());
    assert_eq!(es.best_epoch(), Some(2));
}

#[test]
fn test_state_display() {
    assert_eq!(StoppingState::Improving.to_string(), "IMPROVING");
    assert_eq!(StoppingState::Plateau(3).to_string(), "PLATEAU(3)");
    assert_eq!(StoppingState::Stopped.to_string(), "STOPPED");
}

// ============================================================================
// Metrics
// ============================================================================

#[test]
fn test_directional_accuracy_sign_agreement() {
    let labels = [0.01, -0.02, 0.005, -0.3, 0.07];
    let same_sign = [0.2, -0.001, 1.0, -0.5, 0.0001];
    assert_eq!(directional_accuracy(&same_sign, &labels), 1.0);

    let flipped: Vec<f64> = same_sign.iter().map(|f| -f).collect();
    assert_eq!(directional_accuracy(&flipped, &labels), 0.0);
}

#[test]
fn test_zero_is_its_own_bucket() {
    assert_eq!(directional_accuracy(&[0.0, 0.0], &[0.0, 1e-9]), 0.5);
}

#[test]
fn test_evaluation_metrics() {
    let metrics = EvaluationMetrics::compute(&[1.0, 2.0], &[0.0, 4.0]).unwrap();
    assert_eq!(metrics.count, 2);
    assert!((metrics.mse - 2.5).abs() < 1e-12);
    assert!((metrics.rmse - 2.5f64.sqrt()).abs() < 1e-12);
    assert!((metrics.rmse - rmse(&[1.0, 2.0], &[0.0, 4.0])).abs() < 1e-15);
    assert!((metrics.mae - 1.5).abs() < 1e-12);

    assert!(EvaluationMetrics::compute(&[1.0], &[1.0, 2.0]).is_err());
}

// ============================================================================
// Training and checkpoints
// ============================================================================

fn feature_config() -> FeatureConfig {
    FeatureConfig::default()
        .with_return_windows(vec![2])
        .with_volatility_windows(vec![2])
}

fn contract(window_length: usize) -> TrainingContract {
    let feature_config = feature_config();
    TrainingContract {
        fingerprint: ArtifactFingerprint::new(feature_config.feature_names(), window_length),
        feature_config,
        model_config: ModelConfig {
            hidden_size: 6,
            depth: 1,
            dropout: 0.1,
        },
    }
}

fn windows(n: usize, window_length: usize) -> Vec<Sequence> {
    let base = Utc.with_ymd_and_hms(2025, 3, 3, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let rows: Vec<FeatureRow> = (0..window_length)
                .map(|t| {
                    let x = (i + t) as f64 * 0.2;
                    FeatureRow {
                        instrument_id: "BTC".to_string(),
                        timestamp: base + Duration::minutes((i * window_length + t) as i64),
                        features: Arc::new(vec![x.sin(), x.cos(), (2.0 * x).sin(), 0.5, -0.5]),
                        label: Some(0.1 * (x + 0.4).sin()),
                    }
                })
                .collect();
            Sequence::from_rows(&rows).unwrap()
        })
        .collect()
}

#[test]
fn test_checkpoint_round_trip_gives_identical_forecasts() {
    let contract = contract(6);
    let checkpoint = ModelCheckpoint {
        regressor: SequenceRegressor::lstm(&contract.model_config, 5, 11).unwrap(),
        fingerprint: contract.fingerprint.clone(),
        feature_config: contract.feature_config.clone(),
        model_config: contract.model_config.clone(),
        epoch: 4,
        val_loss: 0.02,
    };

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.ckpt");
    checkpoint.save(&path).unwrap();
    let loaded: ModelCheckpoint = ModelCheckpoint::load(&path).unwrap();

    let inputs = windows(8, 6);
    let before = checkpoint.regressor.predict(&inputs).unwrap();
    let after = loaded.regressor.predict(&inputs).unwrap();
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.to_bits(), b.to_bits());
    }
}

#[test]
fn test_fit_restores_best_checkpoint_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("best.ckpt");
    let config = TrainingConfig::default()
        .with_epochs(6)
        .with_patience(2)
        .with_checkpoint_path(&path);
    let contract = contract(6);
    let model = SequenceRegressor::lstm(&contract.model_config, 5, 3).unwrap();

    let outcome = Trainer::new(config)
        .unwrap()
        .fit(model, &windows(24, 6), &windows(6, 6), &contract)
        .unwrap();

    assert!(path.exists());
    let history = &outcome.history;
    assert!(history.epochs_run() >= 1 && history.epochs_run() <= 6);
    assert_eq!(outcome.checkpoint.epoch, history.best_epoch);
    let best = history
        .epochs
        .iter()
        .map(|r| r.val_loss)
        .fold(f64::INFINITY, f64::min);
    assert_eq!(outcome.checkpoint.val_loss, best);

    let on_disk: ModelCheckpoint = ModelCheckpoint::load(&path).unwrap();
    assert_eq!(on_disk, outcome.checkpoint);
}

#[test]
fn test_seeded_training_is_reproducible() {
    let contract = contract(4);
    let train = windows(16, 4);
    let validation = windows(4, 4);
    let run = || {
        let model = SequenceRegressor::lstm(&contract.model_config, 5, 5).unwrap();
        Trainer::new(TrainingConfig::default().with_epochs(3))
            .unwrap()
            .fit(model, &train, &validation, &contract)
            .unwrap()
    };
    let a = run();
    let b = run();
    assert_eq!(a.history, b.history);
    assert_eq!(a.checkpoint, b.checkpoint);
}

#[test]
fn test_stop_signal_before_first_epoch() {
    let contract = contract(4);
    let signal = StopSignal::new();
    signal.stop();
    let trainer = Trainer::new(TrainingConfig::default())
        .unwrap()
        .with_stop_signal(signal);
    let model = SequenceRegressor::lstm(&contract.model_config, 5, 1).unwrap();
    assert!(matches!(
        trainer.fit(model, &windows(8, 4), &windows(2, 4), &contract),
        Err(ForecastError::Cancelled)
    ));
}

#[test]
fn test_empty_training_set_is_an_error() {
    let contract = contract(4);
    let model = SequenceRegressor::lstm(&contract.model_config, 5, 1).unwrap();
    assert!(matches!(
        Trainer::new(TrainingConfig::default())
            .unwrap()
            .fit(model, &[], &windows(2, 4), &contract),
        Err(ForecastError::Training { .. })
    ));
}
