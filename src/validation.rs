//! Observation and feature validation.
//!
//! Checks that run before feature computation so bad rows are reported instead
//! of silently producing garbage features:
//!
//! 1. **Domains**: positive close, non-negative volume, finite values
//! 2. **Timestamp ordering**: strictly increasing per instrument, duplicates flagged
//! 3. **Spacing**: gaps against the spacing the label horizon assumes
//! 4. **Feature vectors**: NaN/Inf detection
//!
//! # Usage
//!
//! ```ignore
//! use return_forecast::validation::{ObservationValidator, ValidationConfig};
//!
//! let validator = ObservationValidator::with_config(ValidationConfig::default());
//! let result = validator.validate_instrument(&rows);
//! if result.has_errors() {
//!     for err in result.errors() {
//!         eprintln!("{err}");
//!     }
//! }
//! ```

use crate::observation::ObservationRow;
use chrono::{DateTime, Utc};
use std::fmt;

/// Validation result for a single check.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    /// Data is valid
    Valid,
    /// Data has minor issues (warnings)
    Warning(String),
    /// Data has serious issues (errors)
    Error(String),
}

impl ValidationLevel {
    /// Check if this result indicates valid data.
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationLevel::Valid)
    }

    /// Check if this result is a warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, ValidationLevel::Warning(_))
    }

    /// Check if this result is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, ValidationLevel::Error(_))
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationLevel::Valid => write!(f, "Valid"),
            ValidationLevel::Warning(msg) => write!(f, "Warning: {msg}"),
            ValidationLevel::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

/// Aggregated validation result.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    results: Vec<(String, ValidationLevel)>,
}

impl ValidationResult {
    /// Create a new empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validation result.
    pub fn add(&mut self, check_name: &str, level: ValidationLevel) {
        self.results.push((check_name.to_string(), level));
    }

    /// Check if all validations passed (no errors or warnings).
    pub fn is_valid(&self) -> bool {
        self.results.iter().all(|(_, level)| level.is_valid())
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|(_, level)| level.is_error())
    }

    /// Check if there are any warnings.
    pub fn has_warnings(&self) -> bool {
        self.results.iter().any(|(_, level)| level.is_warning())
    }

    /// All warnings, prefixed with their check name.
    pub fn warnings(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|(name, level)| match level {
                ValidationLevel::Warning(msg) => Some(format!("{name}: {msg}")),
                _ => None,
            })
            .collect()
    }

    /// All errors, prefixed with their check name.
    pub fn errors(&self) -> Vec<String> {
        self.results
            .iter()
            .filter_map(|(name, level)| match level {
                ValidationLevel::Error(msg) => Some(format!("{name}: {msg}")),
                _ => None,
            })
            .collect()
    }

    /// Get all results.
    pub fn all_results(&self) -> &[(String, ValidationLevel)] {
        &self.results
    }

    /// Get the number of checks performed.
    pub fn check_count(&self) -> usize {
        self.results.len()
    }

    /// Get the number of passed checks.
    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|(_, l)| l.is_valid()).count()
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passed = self.passed_count();
        let total = self.check_count();
        writeln!(f, "Validation: {passed}/{total} checks passed")?;

        for (name, level) in &self.results {
            if !level.is_valid() {
                writeln!(f, "  - {name}: {level}")?;
            }
        }

        Ok(())
    }
}

/// Configuration for observation validation.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Expected spacing between consecutive rows, in seconds (None = skip)
    pub expected_spacing_secs: Option<i64>,

    /// Report duplicate timestamps as errors instead of warnings
    pub duplicates_are_errors: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            expected_spacing_secs: Some(60),
            duplicates_are_errors: false,
        }
    }
}

/// Validator for one instrument's observation rows.
#[derive(Debug, Clone, Default)]
pub struct ObservationValidator {
    config: ValidationConfig,
}

impl ObservationValidator {
    /// Create a new validator with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a validator with custom configuration.
    pub fn with_config(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate rows of a single instrument, expected in chronological order.
    pub fn validate_instrument(&self, rows: &[ObservationRow]) -> ValidationResult {
        let mut result = ValidationResult::new();

        self.validate_domains(rows, &mut result);

        let timestamps: Vec<DateTime<Utc>> = rows.iter().map(|r| r.timestamp).collect();
        let ts_result = validate_timestamps(&timestamps, self.config.expected_spacing_secs);
        for (name, level) in ts_result.results {
            let level = match level {
                ValidationLevel::Warning(msg)
                    if self.config.duplicates_are_errors && name == "duplicate_timestamps" =>
                {
                    ValidationLevel::Error(msg)
                }
                other => other,
            };
            result.add(&name, level);
        }

        result
    }

    fn validate_domains(&self, rows: &[ObservationRow], result: &mut ValidationResult) {
        let bad_close = rows
            .iter()
            .position(|r| !r.close.is_finite() || r.close <= 0.0);
        match bad_close {
            Some(i) => result.add(
                "close_domain",
                ValidationLevel::Error(format!(
                    "close must be > 0 (row {i}: {})",
                    rows[i].close
                )),
            ),
            None => result.add("close_domain", ValidationLevel::Valid),
        }

        let bad_volume = rows
            .iter()
            .position(|r| !r.volume.is_finite() || r.volume < 0.0);
        match bad_volume {
            Some(i) => result.add(
                "volume_domain",
                ValidationLevel::Error(format!(
                    "volume must be >= 0 (row {i}: {})",
                    rows[i].volume
                )),
            ),
            None => result.add("volume_domain", ValidationLevel::Valid),
        }
    }
}

/// Validate timestamp ordering and spacing.
///
/// Duplicates are a warning (order among equal timestamps is ingestion order);
/// a decreasing timestamp is an error. When `expected_spacing_secs` is set,
/// any gap that differs from it is reported as a warning with the largest gap.
pub fn validate_timestamps(
    timestamps: &[DateTime<Utc>],
    expected_spacing_secs: Option<i64>,
) -> ValidationResult {
    let mut result = ValidationResult::new();

    if timestamps.is_empty() {
        result.add(
            "timestamps",
            ValidationLevel::Warning("No timestamps to validate".to_string()),
        );
        return result;
    }

    let mut monotonic = true;
    let mut duplicates = 0usize;
    for i in 1..timestamps.len() {
        if timestamps[i] < timestamps[i - 1] {
            monotonic = false;
            result.add(
                "timestamp_ordering",
                ValidationLevel::Error(format!(
                    "Non-monotonic timestamp at index {}: {} < {}",
                    i,
                    timestamps[i],
                    timestamps[i - 1]
                )),
            );
            break;
        }
        if timestamps[i] == timestamps[i - 1] {
            duplicates += 1;
        }
    }

    if monotonic {
        result.add("timestamp_ordering", ValidationLevel::Valid);
    }

    if duplicates > 0 {
        result.add(
            "duplicate_timestamps",
            ValidationLevel::Warning(format!("{duplicates} duplicate timestamps")),
        );
    }

    if let Some(expected) = expected_spacing_secs {
        match spacing_violations(timestamps, expected).iter().max_by_key(|v| v.1) {
            Some((index, gap)) => result.add(
                "timestamp_gaps",
                ValidationLevel::Warning(format!(
                    "Irregular spacing: max gap {gap}s at index {index} (expected {expected}s)"
                )),
            ),
            None => result.add("timestamp_gaps", ValidationLevel::Valid),
        }
    }

    result
}

/// Indices (and gap in seconds) where consecutive timestamps are not
/// `expected_secs` apart.
pub fn spacing_violations(timestamps: &[DateTime<Utc>], expected_secs: i64) -> Vec<(usize, i64)> {
    timestamps
        .windows(2)
        .enumerate()
        .filter_map(|(i, pair)| {
            let gap = (pair[1] - pair[0]).num_seconds();
            (gap != expected_secs).then_some((i + 1, gap))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn minutes(offsets: &[i64]) -> Vec<DateTime<Utc>> {
        let base = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        offsets
            .iter()
            .map(|m| base + Duration::minutes(*m))
            .collect()
    }

    #[test]
    fn test_regular_minute_series_is_valid() {
        let result = validate_timestamps(&minutes(&[0, 1, 2, 3]), Some(60));
        assert!(result.is_valid(), "{result}");
    }

    #[test]
    fn test_gap_is_warning() {
        let result = validate_timestamps(&minutes(&[0, 1, 5, 6]), Some(60));
        assert!(result.has_warnings());
        assert!(!result.has_errors());
        assert!(result.warnings()[0].contains("240s"));
    }

    #[test]
    fn test_non_monotonic_is_error() {
        let result = validate_timestamps(&minutes(&[0, 2, 1]), None);
        assert!(result.has_errors());
    }

    #[test]
    fn test_duplicate_timestamps() {
        let result = validate_timestamps(&minutes(&[0, 1, 1, 2]), None);
        assert!(result.has_warnings());
        assert!(!result.has_errors());
    }

    #[test]
    fn test_spacing_violations_indices() {
        let v = spacing_violations(&minutes(&[0, 1, 3, 4, 10]), 60);
        assert_eq!(v, vec![(2, 120), (4, 360)]);
    }

    #[test]
    fn test_validate_instrument_domains() {
        let ts = minutes(&[0, 1]);
        let rows = vec![
            ObservationRow::new("BTC", ts[0], 100.0, 1.0, 0.0),
            ObservationRow::new("BTC", ts[1], -1.0, 1.0, 0.0),
        ];
        let result = ObservationValidator::new().validate_instrument(&rows);
        assert!(result.has_errors());
        assert!(result.errors()[0].contains("close"));
    }
}
