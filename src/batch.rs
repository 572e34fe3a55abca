//! Parallel per-instrument processing.
//!
//! Instruments share no mutable state, so feature building and inference fan
//! out over a local rayon pool, one task per instrument group.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      BatchProcessor                       │
//! │  ┌─────────────────────────────────────────────────────┐  │
//! │  │                  Rayon Thread Pool                  │  │
//! │  │                                                     │  │
//! │  │   Thread 1          Thread 2          Thread N      │  │
//! │  │   ┌───────┐         ┌───────┐         ┌───────┐     │  │
//! │  │   │  BTC  │         │  ETH  │         │  SOL  │     │  │
//! │  │   └───┬───┘         └───┬───┘         └───┬───┘     │  │
//! │  │       ▼                 ▼                 ▼         │  │
//! │  │  InstrumentResult  InstrumentResult  InstrumentError │  │
//! │  └──────────────────────────┬──────────────────────────┘  │
//! │                             ▼                             │
//! │                        BatchOutput                        │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Error handling
//!
//! Recoverable errors (`Schema`, `InsufficientHistory`, `IrregularSpacing`)
//! are always reported per instrument and never abort the batch. Other
//! errors abort under [`ErrorMode::FailFast`] and are collected under
//! [`ErrorMode::CollectErrors`].
//!
//! # Example
//!
//! ```ignore
//! use return_forecast::batch::{BatchConfig, BatchProcessor, ErrorMode};
//!
//! let processor = BatchProcessor::new(
//!     BatchConfig::new().with_threads(8).with_error_mode(ErrorMode::CollectErrors),
//! );
//! let output = processor.forecast(&adapter, &table)?;
//! for result in output.iter() {
//!     println!("{}: {:?}", result.instrument_id, result.output);
//! }
//! for err in output.iter_errors() {
//!     eprintln!("{}: {}", err.instrument_id, err.error);
//! }
//! ```

use crate::error::{ForecastError, Result};
use crate::features::{BuildMode, FeatureBuilder, FeatureRow, FeatureTable};
use crate::inference::{ForecastOutcome, InferenceAdapter};
use crate::model::SequenceEncoder;
use crate::observation::{ObservationRow, ObservationTable};
use log::{info, warn};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Configuration
// ============================================================================

/// How non-recoverable per-instrument failures are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Abort the batch on the first non-recoverable error (default).
    #[default]
    FailFast,

    /// Keep going and collect every error.
    CollectErrors,
}

/// Token for cancelling batch processing from another thread.
///
/// Instruments already in flight finish; no new ones start.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Reset the token. Only call when no batch is running.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Configuration for batch processing.
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// Worker threads (`None` = rayon default)
    pub num_threads: Option<usize>,

    /// How non-recoverable errors are handled
    pub error_mode: ErrorMode,

    /// Stack size per worker thread in bytes
    pub stack_size: Option<usize>,
}

impl BatchConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads. Zero means the rayon default.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = (threads > 0).then_some(threads);
        self
    }

    /// Set the error handling mode.
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    /// Set a custom stack size per thread.
    pub fn with_stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Configured threads or rayon's default.
    pub fn effective_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(rayon::current_num_threads)
    }
}

// ============================================================================
// Results
// ============================================================================

/// Successful output for one instrument.
#[derive(Debug, Clone)]
pub struct InstrumentResult<T> {
    /// Instrument processed
    pub instrument_id: String,

    /// Operation output
    pub output: T,

    /// Time spent on this instrument
    pub elapsed: Duration,
}

/// Failure for one instrument.
#[derive(Debug)]
pub struct InstrumentError {
    /// Instrument that failed
    pub instrument_id: String,

    /// Underlying error
    pub error: ForecastError,
}

impl InstrumentError {
    /// Whether the error is scoped to this instrument.
    pub fn is_recoverable(&self) -> bool {
        self.error.is_recoverable()
    }
}

/// Counts and timing of a finished batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSummary {
    /// Instruments processed successfully
    pub succeeded: usize,

    /// Instruments that failed
    pub failed: usize,

    /// Instruments skipped after cancellation
    pub skipped: usize,

    /// Wall-clock time
    pub elapsed: Duration,

    /// Worker threads used
    pub threads_used: usize,
}

/// Aggregated per-instrument results, ordered by instrument id.
#[derive(Debug)]
pub struct BatchOutput<T> {
    /// Successful instruments
    pub results: Vec<InstrumentResult<T>>,

    /// Failed instruments
    pub errors: Vec<InstrumentError>,

    /// Wall-clock time
    pub elapsed: Duration,

    /// Worker threads used
    pub threads_used: usize,

    /// Whether cancellation stopped the batch early
    pub was_cancelled: bool,

    /// Instruments never started because of cancellation
    pub skipped_count: usize,
}

impl<T> BatchOutput<T> {
    /// Number of successful instruments.
    pub fn successful_count(&self) -> usize {
        self.results.len()
    }

    /// Number of failed instruments.
    pub fn failed_count(&self) -> usize {
        self.errors.len()
    }

    /// Whether every instrument succeeded.
    pub fn all_successful(&self) -> bool {
        self.errors.is_empty() && self.skipped_count == 0
    }

    /// Iterate over successful results.
    pub fn iter(&self) -> impl Iterator<Item = &InstrumentResult<T>> {
        self.results.iter()
    }

    /// Iterate over errors.
    pub fn iter_errors(&self) -> impl Iterator<Item = &InstrumentError> {
        self.errors.iter()
    }

    /// Output for one instrument, if it succeeded.
    pub fn get(&self, instrument: &str) -> Option<&T> {
        self.results
            .iter()
            .find(|r| r.instrument_id == instrument)
            .map(|r| &r.output)
    }

    /// Counts and timing.
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            succeeded: self.successful_count(),
            failed: self.failed_count(),
            skipped: self.skipped_count,
            elapsed: self.elapsed,
            threads_used: self.threads_used,
        }
    }
}

impl BatchOutput<Vec<FeatureRow>> {
    /// Collect successful instruments into one feature table.
    pub fn into_feature_table(self, feature_names: Vec<String>) -> FeatureTable {
        let mut table = FeatureTable::new(feature_names);
        for result in self.results {
            table.insert(result.instrument_id, result.output);
        }
        table
    }
}

// ============================================================================
// Progress Reporting
// ============================================================================

/// Progress snapshot passed to callbacks.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Instrument about to be processed
    pub current_instrument: String,

    /// Index of that instrument (0-based, instrument order)
    pub current_index: usize,

    /// Instruments in the batch
    pub total: usize,

    /// Completed so far
    pub completed: usize,

    /// Failed so far
    pub failed: usize,

    /// Time since the batch started
    pub elapsed: Duration,
}

impl ProgressInfo {
    /// Completion percentage (0.0 to 100.0).
    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed + self.failed) as f64 / self.total as f64 * 100.0
        }
    }
}

/// Progress callbacks. Called from worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called before an instrument is processed.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called once the batch finishes.
    fn on_complete(&self, summary: &BatchSummary);
}

/// Progress reporter that writes through the `log` facade.
#[derive(Debug, Default)]
pub struct LoggingProgress;

impl ProgressCallback for LoggingProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        log::debug!(
            "Processing {} ({}/{}, {:.1}%)",
            info.current_instrument,
            info.current_index + 1,
            info.total,
            info.percent_complete()
        );
    }

    fn on_complete(&self, summary: &BatchSummary) {
        info!(
            "Batch complete: {} succeeded, {} failed, {} skipped in {:?}",
            summary.succeeded, summary.failed, summary.skipped, summary.elapsed
        );
    }
}

// ============================================================================
// Batch Processor
// ============================================================================

/// Runs one operation per instrument on a local rayon pool.
#[derive(Default)]
pub struct BatchProcessor {
    config: BatchConfig,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
    cancellation_token: CancellationToken,
}

impl std::fmt::Debug for BatchProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchProcessor")
            .field("config", &self.config)
            .field("has_progress_callback", &self.progress_callback.is_some())
            .field("cancelled", &self.cancellation_token.is_cancelled())
            .finish()
    }
}

impl BatchProcessor {
    /// Create a processor.
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config,
            progress_callback: None,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Set a progress callback.
    pub fn with_progress_callback(mut self, callback: Box<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(Arc::from(callback));
        self
    }

    /// Share a cancellation token with another thread.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Clone of the cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Batch configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Build feature rows for every instrument of `table`.
    pub fn build_features(
        &self,
        builder: &FeatureBuilder,
        table: &ObservationTable,
        mode: BuildMode,
    ) -> Result<BatchOutput<Vec<FeatureRow>>> {
        self.run(table, |instrument, rows| {
            builder.build_instrument(instrument, rows, mode)
        })
    }

    /// Forecast the latest window of every instrument of `table`.
    ///
    /// Short or malformed instruments come back as
    /// [`ForecastOutcome::Unavailable`] results, not errors.
    pub fn forecast<E: SequenceEncoder>(
        &self,
        adapter: &InferenceAdapter<E>,
        table: &ObservationTable,
    ) -> Result<BatchOutput<ForecastOutcome>> {
        self.run(table, |instrument, rows| {
            adapter.forecast_outcome(instrument, rows)
        })
    }

    /// Apply `op` to every instrument group of `table`.
    pub fn run<T, F>(&self, table: &ObservationTable, op: F) -> Result<BatchOutput<T>>
    where
        T: Send,
        F: Fn(&str, &[ObservationRow]) -> Result<T> + Sync,
    {
        let start = Instant::now();
        let groups: Vec<(String, Vec<ObservationRow>)> =
            table.group_by_instrument().into_iter().collect();
        let total = groups.len();
        let threads_used = self.config.effective_threads();

        let completed = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let aborted = AtomicBool::new(false);

        enum Processed<T> {
            Success(InstrumentResult<T>),
            Error(InstrumentError),
            Skipped,
        }

        // Local pool so different processors can use different thread counts.
        let mut pool_builder = rayon::ThreadPoolBuilder::new().num_threads(threads_used);
        if let Some(stack_size) = self.config.stack_size {
            pool_builder = pool_builder.stack_size(stack_size);
        }
        let pool = pool_builder.build().map_err(|e| {
            ForecastError::invalid_config(format!("failed to create thread pool: {e}"))
        })?;

        let fail_fast = self.config.error_mode == ErrorMode::FailFast;
        let processed: Vec<Processed<T>> = pool.install(|| {
            groups
                .par_iter()
                .enumerate()
                .map(|(index, (instrument, rows))| {
                    if self.cancellation_token.is_cancelled() || aborted.load(Ordering::Relaxed) {
                        return Processed::Skipped;
                    }

                    if let Some(ref callback) = self.progress_callback {
                        callback.on_progress(&ProgressInfo {
                            current_instrument: instrument.clone(),
                            current_index: index,
                            total,
                            completed: completed.load(Ordering::Relaxed),
                            failed: failed.load(Ordering::Relaxed),
                            elapsed: start.elapsed(),
                        });
                    }

                    let instrument_start = Instant::now();
                    match op(instrument, rows) {
                        Ok(output) => {
                            completed.fetch_add(1, Ordering::Relaxed);
                            Processed::Success(InstrumentResult {
                                instrument_id: instrument.clone(),
                                output,
                                elapsed: instrument_start.elapsed(),
                            })
                        }
                        Err(error) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            if fail_fast && !error.is_recoverable() {
                                aborted.store(true, Ordering::Relaxed);
                            }
                            Processed::Error(InstrumentError {
                                instrument_id: instrument.clone(),
                                error,
                            })
                        }
                    }
                })
                .collect()
        });

        let mut results = Vec::new();
        let mut errors = Vec::new();
        let mut skipped_count = 0usize;
        for item in processed {
            match item {
                Processed::Success(result) => results.push(result),
                Processed::Error(err) => {
                    if fail_fast && !err.is_recoverable() {
                        return Err(err.error);
                    }
                    warn!("Instrument {} failed: {}", err.instrument_id, err.error);
                    errors.push(err);
                }
                Processed::Skipped => skipped_count += 1,
            }
        }

        let output = BatchOutput {
            results,
            errors,
            elapsed: start.elapsed(),
            threads_used,
            was_cancelled: self.cancellation_token.is_cancelled(),
            skipped_count,
        };

        if let Some(ref callback) = self.progress_callback {
            callback.on_complete(&output.summary());
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureConfig;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn table(instruments: &[(&str, usize)]) -> ObservationTable {
        let base = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut rows = Vec::new();
        for (id, n) in instruments {
            for i in 0..*n {
                rows.push(ObservationRow::new(
                    *id,
                    base + ChronoDuration::minutes(i as i64),
                    50.0 + i as f64,
                    1.0,
                    0.0,
                ));
            }
        }
        ObservationTable::new(rows)
    }

    fn builder() -> FeatureBuilder {
        FeatureBuilder::new(
            FeatureConfig::default()
                .with_horizon(2)
                .with_return_windows(vec![2])
                .with_volatility_windows(vec![2]),
        )
        .unwrap()
    }

    #[test]
    fn test_batch_config_builder() {
        let config = BatchConfig::new()
            .with_threads(3)
            .with_error_mode(ErrorMode::CollectErrors)
            .with_stack_size(4 * 1024 * 1024);
        assert_eq!(config.effective_threads(), 3);
        assert_eq!(config.error_mode, ErrorMode::CollectErrors);
        assert_eq!(config.stack_size, Some(4 * 1024 * 1024));
        assert_eq!(BatchConfig::new().with_threads(0).num_threads, None);
    }

    #[test]
    fn test_error_mode_default() {
        assert_eq!(ErrorMode::default(), ErrorMode::FailFast);
    }

    #[test]
    fn test_build_features_per_instrument() {
        let processor = BatchProcessor::new(BatchConfig::new().with_threads(2));
        let output = processor
            .build_features(&builder(), &table(&[("ETH", 10), ("BTC", 12)]), BuildMode::Training)
            .unwrap();

        assert!(output.all_successful());
        let ids: Vec<&str> = output.iter().map(|r| r.instrument_id.as_str()).collect();
        assert_eq!(ids, vec!["BTC", "ETH"]);
        // 2 warm-up rows and 2 unlabeled rows dropped
        assert_eq!(output.get("BTC").map(Vec::len), Some(8));
        assert_eq!(output.get("ETH").map(Vec::len), Some(6));

        let names = builder().feature_names();
        let features = output.into_feature_table(names);
        assert_eq!(features.instrument_count(), 2);
        assert_eq!(features.len(), 14);
    }

    #[test]
    fn test_recoverable_errors_do_not_abort() {
        let processor = BatchProcessor::new(BatchConfig::new().with_threads(2));
        let output = processor
            .run(&table(&[("BTC", 3), ("ETH", 3)]), |instrument, _| {
                if instrument == "BTC" {
                    Err(ForecastError::schema("bad close"))
                } else {
                    Ok(1)
                }
            })
            .unwrap();
        assert_eq!(output.successful_count(), 1);
        assert_eq!(output.failed_count(), 1);
        assert!(output.errors[0].is_recoverable());
    }

    #[test]
    fn test_fail_fast_on_fatal_error() {
        let processor = BatchProcessor::new(BatchConfig::new().with_threads(1));
        let result = processor.run(&table(&[("BTC", 3), ("ETH", 3)]), |instrument, _| {
            if instrument == "BTC" {
                Err(ForecastError::leakage("cross-instrument window"))
            } else {
                Ok(())
            }
        });
        assert!(matches!(
            result,
            Err(ForecastError::LeakageGuardViolation { .. })
        ));

        let collecting = BatchProcessor::new(
            BatchConfig::new()
                .with_threads(1)
                .with_error_mode(ErrorMode::CollectErrors),
        );
        let output = collecting
            .run(&table(&[("BTC", 3), ("ETH", 3)]), |instrument, _| {
                if instrument == "BTC" {
                    Err(ForecastError::leakage("cross-instrument window"))
                } else {
                    Ok(())
                }
            })
            .unwrap();
        assert_eq!(output.failed_count(), 1);
        assert_eq!(output.successful_count(), 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        let processor =
            BatchProcessor::new(BatchConfig::new().with_threads(2)).with_cancellation_token(token.clone());
        token.cancel();

        let output = processor.run(&table(&[("BTC", 3), ("ETH", 3)]), |_, _| Ok(())).unwrap();
        assert!(output.was_cancelled);
        assert_eq!(output.skipped_count, 2);
        assert_eq!(output.successful_count(), 0);
        assert!(!output.all_successful());
    }

    #[test]
    fn test_progress_info_percent() {
        let info = ProgressInfo {
            current_instrument: "BTC".to_string(),
            current_index: 1,
            total: 4,
            completed: 1,
            failed: 1,
            elapsed: Duration::from_secs(1),
        };
        assert!((info.percent_complete() - 50.0).abs() < 1e-12);
    }
}
