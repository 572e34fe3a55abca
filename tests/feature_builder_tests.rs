//! Feature computation properties over whole observation tables.

use chrono::{DateTime, Duration, TimeZone, Utc};
use return_forecast::features::{BuildMode, FeatureBuilder, FeatureConfig, SpacingPolicy};
use return_forecast::preprocessing::{pct_change, trailing_std};
use return_forecast::{ForecastError, ObservationRow, ObservationTable, VolatilitySource};

const EPS: f64 = 1e-12;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 6, 0, 0).unwrap()
}

fn close_at(i: usize) -> f64 {
    100.0 + i as f64 * 0.25 + (i as f64 * 0.3).sin()
}

fn rows(instrument: &str, n: usize) -> Vec<ObservationRow> {
    (0..n)
        .map(|i| {
            ObservationRow::new(
                instrument,
                base() + Duration::minutes(i as i64),
                close_at(i),
                1_000.0 + i as f64,
                0.25,
            )
        })
        .collect()
}

// ============================================================================
// Label trimming and undefined prefixes
// ============================================================================

#[test]
fn test_labeled_row_count_is_len_minus_horizon() {
    let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();
    for n in [81usize, 100, 150] {
        let features = builder
            .build_with_mode(&ObservationTable::new(rows("BTC", n)), BuildMode::Inference)
            .unwrap();

        // Inference mode keeps unlabeled rows; only the 30-row momentum prefix is dropped.
        let all = features.rows("BTC");
        assert_eq!(all.len(), n - 30);

        // Rows 30..n-60 are labeled; the last 60 are not.
        let labeled = all.iter().filter(|r| r.is_labeled()).count();
        assert_eq!(labeled, (n - 60).saturating_sub(30));
        assert!(all.iter().rev().take(60).all(|r| !r.is_labeled()));

        let closes: Vec<f64> = (0..n).map(close_at).collect();
        let labels = return_forecast::labeling::forward_returns(&closes, 60);
        assert_eq!(labels.iter().filter(|l| l.is_some()).count(), n - 60);
    }
}

#[test]
fn test_training_mode_drops_unlabeled_and_prefix_rows() {
    let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();
    let features = builder.build(&ObservationTable::new(rows("BTC", 120))).unwrap();

    let btc = features.rows("BTC");
    assert_eq!(btc.len(), 30);
    assert!(btc.iter().all(|r| r.is_labeled()));

    // First surviving row is index 30
    let first = &btc[0];
    assert_eq!(first.timestamp, base() + Duration::minutes(30));
    let ret_30 = first.feature(3).unwrap();
    assert!((ret_30 - (close_at(30) / close_at(0) - 1.0)).abs() < EPS);
    let label = first.label.unwrap();
    assert!((label - (close_at(90) / close_at(30) - 1.0)).abs() < EPS);
}

#[test]
fn test_momentum_prefix_is_exactly_n_rows() {
    let closes: Vec<f64> = (0..40).map(close_at).collect();
    for n in [5usize, 15, 30] {
        let series = pct_change(&closes, n);
        assert!(series[..n].iter().all(Option::is_none), "ret_{n}m prefix");
        assert!(series[n..].iter().all(Option::is_some), "ret_{n}m body");
    }
}

#[test]
fn test_volatility_uses_minimum_period() {
    let closes: Vec<f64> = (0..40).map(close_at).collect();
    for n in [5usize, 15, 30] {
        let series = trailing_std(&closes, n);
        // A single point has no sample deviation; from row 1 on it is defined.
        assert!(series[0].is_none());
        assert!(series[1..].iter().all(Option::is_some));
    }

    // Row 1 of vol_5 is the sample std of the first two closes.
    let series = trailing_std(&closes, 5);
    let mean = (closes[0] + closes[1]) / 2.0;
    let expected = (((closes[0] - mean).powi(2) + (closes[1] - mean).powi(2)) / 1.0).sqrt();
    assert!((series[1].unwrap() - expected).abs() < 1e-9);
}

// ============================================================================
// Ordering, grouping, encodings
// ============================================================================

#[test]
fn test_input_order_does_not_matter() {
    let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();
    let mut interleaved = Vec::new();
    for (a, b) in rows("BTC", 100).into_iter().zip(rows("ETH", 100)) {
        interleaved.push(b);
        interleaved.push(a);
    }
    let mut reversed = interleaved.clone();
    reversed.reverse();

    let forward = builder.build(&ObservationTable::new(interleaved)).unwrap();
    let backward = builder.build(&ObservationTable::new(reversed)).unwrap();
    assert_eq!(forward, backward);
    assert_eq!(forward.instruments().collect::<Vec<_>>(), vec!["BTC", "ETH"]);

    let alone = builder.build(&ObservationTable::new(rows("BTC", 100))).unwrap();
    assert_eq!(forward.rows("BTC"), alone.rows("BTC"));
}

#[test]
fn test_hour_encoding() {
    let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();
    let features = builder.build(&ObservationTable::new(rows("BTC", 120))).unwrap();
    // 06:30 -> hour 6 -> angle π/2
    let row = &features.rows("BTC")[0];
    assert!((row.feature(7).unwrap() - 1.0).abs() < EPS);
    assert!(row.feature(8).unwrap().abs() < EPS);
}

#[test]
fn test_labeled_sentiment_input() {
    let config = FeatureConfig::default()
        .with_horizon(1)
        .with_return_windows(vec![1])
        .with_volatility_windows(vec![2]);
    let builder = FeatureBuilder::new(config).unwrap();
    let table = ObservationTable::new(
        (0..5)
            .map(|i| {
                ObservationRow::with_label(
                    "SOL",
                    base() + Duration::minutes(i),
                    20.0 + i as f64,
                    3.0,
                    "Negative",
                    0.8,
                )
            })
            .collect(),
    );
    let features = builder.build(&table).unwrap();
    assert_eq!(features.rows("SOL").len(), 3);
    assert!(features
        .rows("SOL")
        .iter()
        .all(|r| (r.feature(0).unwrap() + 0.8).abs() < EPS));
}

#[test]
fn test_volume_volatility_source() {
    let config = FeatureConfig::default().with_volatility_source(VolatilitySource::Volume);
    let builder = FeatureBuilder::new(config).unwrap();
    let features = builder.build(&ObservationTable::new(rows("BTC", 100))).unwrap();
    // Volume rises by exactly 1 per row: sample std over 5 points of 0..4 is sqrt(2.5)
    let vol_5 = features.rows("BTC")[0].feature(4).unwrap();
    assert!((vol_5 - 2.5f64.sqrt()).abs() < 1e-9);
}

#[test]
fn test_short_instrument_yields_no_rows() {
    let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();
    let mut input = rows("BTC", 100);
    input.extend(rows("DOGE", 40));
    let features = builder.build(&ObservationTable::new(input)).unwrap();
    assert!(features.rows("DOGE").is_empty());
    assert_eq!(features.rows("BTC").len(), 10);
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_out_of_domain_values_are_schema_errors() {
    let builder = FeatureBuilder::new(FeatureConfig::default()).unwrap();

    let mut bad_close = rows("BTC", 10);
    bad_close[4].close = 0.0;
    assert!(matches!(
        builder.build(&ObservationTable::new(bad_close)),
        Err(ForecastError::Schema { .. })
    ));

    let mut bad_label = rows("BTC", 10);
    let ts = bad_label[2].timestamp;
    bad_label[2] = ObservationRow::with_label("BTC", ts, 100.0, 1.0, "bullish", 0.5);
    assert!(matches!(
        builder.build(&ObservationTable::new(bad_label)),
        Err(ForecastError::Schema { .. })
    ));
}

#[test]
fn test_spacing_policy_reject() {
    let config = FeatureConfig::default().with_spacing_policy(SpacingPolicy::Reject);
    let builder = FeatureBuilder::new(config).unwrap();
    let mut input = rows("BTC", 10);
    input.remove(5);

    let err = builder.build(&ObservationTable::new(input)).unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(
        err,
        ForecastError::IrregularSpacing {
            index: 5,
            gap_secs: 120,
            expected_secs: 60,
            ..
        }
    ));
}

#[test]
fn test_timestamps_floored_to_minute() {
    let builder = FeatureBuilder::new(
        FeatureConfig::default()
            .with_horizon(1)
            .with_return_windows(vec![1])
            .with_volatility_windows(vec![2]),
    )
    .unwrap();
    let input: Vec<ObservationRow> = (0..4)
        .map(|i| {
            ObservationRow::new(
                "BTC",
                base() + Duration::minutes(i) + Duration::seconds(37),
                10.0 + i as f64,
                1.0,
                0.0,
            )
        })
        .collect();
    let features = builder.build(&ObservationTable::new(input)).unwrap();
    assert_eq!(features.rows("BTC")[0].timestamp, base() + Duration::minutes(1));
}
