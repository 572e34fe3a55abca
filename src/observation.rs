//! Raw observation rows and the tabular feed they arrive in.
//!
//! An [`ObservationRow`] is one instrument at one timestamp. Rows are immutable
//! once ingested; everything downstream derives new values from them.
//!
//! Sentiment arrives in one of two forms:
//!
//! - a numeric score already in `[-1, 1]`
//! - a categorical label (`positive` / `neutral` / `negative`) plus a
//!   classifier confidence, mapped to `{+1, 0, -1} × confidence`
//!
//! # CSV layout
//!
//! | Column | Required | Notes |
//! |--------|----------|-------|
//! | `coin` or `instrument_id` | yes | instrument identifier |
//! | `timestamp` | yes | RFC 3339, `%Y-%m-%d %H:%M:%S` (UTC) or epoch seconds |
//! | `close` | yes | > 0 |
//! | `volume` | yes | >= 0 |
//! | `sentiment_numeric` / `sentiment_num` | one form required | in `[-1, 1]` |
//! | `sentiment_label` + `sentiment_score` | one form required | label + confidence |

use crate::error::{ForecastError, Result};
use ahash::AHashMap;
use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Sentiment as supplied by the upstream classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SentimentInput {
    /// Pre-computed numeric sentiment in `[-1, 1]`.
    Numeric(f64),
    /// Categorical label plus classifier confidence.
    Labeled {
        /// `positive`, `neutral` or `negative` (case-insensitive)
        label: String,
        /// Classifier confidence in `[0, 1]`
        score: f64,
    },
}

impl SentimentInput {
    /// Resolve to the numeric form.
    ///
    /// # Errors
    ///
    /// `Schema` when the label is unknown or the value leaves `[-1, 1]`.
    pub fn to_numeric(&self) -> Result<f64> {
        let value = match self {
            SentimentInput::Numeric(v) => *v,
            SentimentInput::Labeled { label, score } => {
                let sign = match label.trim().to_ascii_lowercase().as_str() {
                    "positive" => 1.0,
                    "neutral" => 0.0,
                    "negative" => -1.0,
                    other => {
                        return Err(ForecastError::schema(format!(
                            "unknown sentiment label '{other}'"
                        )))
                    }
                };
                if !(0.0..=1.0).contains(score) {
                    return Err(ForecastError::schema(format!(
                        "sentiment score {score} outside [0, 1]"
                    )));
                }
                sign * score
            }
        };

        if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
            return Err(ForecastError::schema(format!(
                "sentiment value {value} outside [-1, 1]"
            )));
        }
        Ok(value)
    }
}

/// One instrument observed at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    /// Instrument identifier (e.g. a coin symbol)
    pub instrument_id: String,
    /// Observation time
    pub timestamp: DateTime<Utc>,
    /// Close price (> 0)
    pub close: f64,
    /// Traded volume (>= 0)
    pub volume: f64,
    /// Sentiment in either supported form
    pub sentiment: SentimentInput,
}

impl ObservationRow {
    /// Create a row with numeric sentiment.
    pub fn new(
        instrument_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        close: f64,
        volume: f64,
        sentiment_numeric: f64,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            timestamp,
            close,
            volume,
            sentiment: SentimentInput::Numeric(sentiment_numeric),
        }
    }

    /// Create a row with label + confidence sentiment.
    pub fn with_label(
        instrument_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        close: f64,
        volume: f64,
        label: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            timestamp,
            close,
            volume,
            sentiment: SentimentInput::Labeled {
                label: label.into(),
                score,
            },
        }
    }

    /// Check price/volume domains.
    pub fn check_domain(&self) -> Result<()> {
        if !self.close.is_finite() || self.close <= 0.0 {
            return Err(ForecastError::schema(format!(
                "{} at {}: close must be > 0, got {}",
                self.instrument_id, self.timestamp, self.close
            )));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(ForecastError::schema(format!(
                "{} at {}: volume must be >= 0, got {}",
                self.instrument_id, self.timestamp, self.volume
            )));
        }
        Ok(())
    }
}

/// Truncate a timestamp to the start of its minute.
pub fn floor_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Unordered table of observation rows, as handed over by the ingestion layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationTable {
    rows: Vec<ObservationRow>,
}

impl ObservationTable {
    /// Wrap a vector of rows.
    pub fn new(rows: Vec<ObservationRow>) -> Self {
        Self { rows }
    }

    /// All rows in ingestion order.
    pub fn rows(&self) -> &[ObservationRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row.
    pub fn push(&mut self, row: ObservationRow) {
        self.rows.push(row);
    }

    /// Group rows by instrument, each group sorted by timestamp ascending.
    ///
    /// The sort is stable, so duplicate timestamps keep their ingestion order.
    /// Instruments come back in lexicographic order, which fixes the
    /// concatenation order used by the chronological split.
    pub fn group_by_instrument(&self) -> BTreeMap<String, Vec<ObservationRow>> {
        let mut groups: BTreeMap<String, Vec<ObservationRow>> = BTreeMap::new();
        for row in &self.rows {
            groups
                .entry(row.instrument_id.clone())
                .or_default()
                .push(row.clone());
        }
        for rows in groups.values_mut() {
            rows.sort_by_key(|r| r.timestamp);
        }
        groups
    }

    /// Load a table from a CSV file.
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ForecastError::io(path, e))?;
        Self::from_csv_reader(file)
    }

    /// Load a table from any CSV source.
    ///
    /// # Errors
    ///
    /// - `Schema` when required columns are absent, a record is ragged or
    ///   a cell cannot be parsed
    /// - `Csv` when the underlying reader fails
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let headers = csv_reader
            .headers()
            .map_err(|e| csv_error(e, 1))?
            .clone();
        let columns = ColumnIndex::resolve(&headers)?;

        let mut rows = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|e| csv_error(e, line + 2))?;
            rows.push(columns.parse_record(&record, line + 2)?);
        }

        Ok(Self { rows })
    }
}

/// Malformed records are schema problems; reader failures stay `Csv`.
fn csv_error(e: csv::Error, line: usize) -> ForecastError {
    if e.is_io_error() {
        ForecastError::Csv(e)
    } else {
        ForecastError::schema(format!("line {line}: {e}"))
    }
}

impl From<Vec<ObservationRow>> for ObservationTable {
    fn from(rows: Vec<ObservationRow>) -> Self {
        Self::new(rows)
    }
}

enum SentimentColumns {
    Numeric(usize),
    Labeled { label: usize, score: usize },
}

struct ColumnIndex {
    instrument: usize,
    timestamp: usize,
    close: usize,
    volume: usize,
    sentiment: SentimentColumns,
}

impl ColumnIndex {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let lookup: AHashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_ascii_lowercase(), i))
            .collect();

        let find = |names: &[&str]| names.iter().find_map(|n| lookup.get(*n).copied());

        let mut missing = Vec::new();
        let instrument = find(&["instrument_id", "coin", "symbol"]);
        if instrument.is_none() {
            missing.push("instrument_id|coin");
        }
        let timestamp = find(&["timestamp"]);
        if timestamp.is_none() {
            missing.push("timestamp");
        }
        let close = find(&["close"]);
        if close.is_none() {
            missing.push("close");
        }
        let volume = find(&["volume"]);
        if volume.is_none() {
            missing.push("volume");
        }

        let sentiment = match (
            find(&["sentiment_numeric", "sentiment_num"]),
            find(&["sentiment_label", "sentiment"]),
            find(&["sentiment_score"]),
        ) {
            (Some(idx), _, _) => Some(SentimentColumns::Numeric(idx)),
            (None, Some(label), Some(score)) => Some(SentimentColumns::Labeled { label, score }),
            _ => {
                missing.push("sentiment_numeric|sentiment_label+sentiment_score");
                None
            }
        };

        match (instrument, timestamp, close, volume, sentiment) {
            (Some(instrument), Some(timestamp), Some(close), Some(volume), Some(sentiment)) => {
                Ok(Self {
                    instrument,
                    timestamp,
                    close,
                    volume,
                    sentiment,
                })
            }
            _ => Err(ForecastError::schema(format!(
                "missing required columns: {}",
                missing.join(", ")
            ))),
        }
    }

    fn parse_record(&self, record: &csv::StringRecord, line: usize) -> Result<ObservationRow> {
        let cell = |idx: usize, name: &str| {
            record
                .get(idx)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ForecastError::schema(format!("line {line}: empty {name}")))
        };
        let number = |idx: usize, name: &str| -> Result<f64> {
            let raw = cell(idx, name)?;
            raw.parse::<f64>().map_err(|_| {
                ForecastError::schema(format!("line {line}: {name} '{raw}' is not a number"))
            })
        };

        let sentiment = match self.sentiment {
            SentimentColumns::Numeric(idx) => {
                SentimentInput::Numeric(number(idx, "sentiment_numeric")?)
            }
            SentimentColumns::Labeled { label, score } => SentimentInput::Labeled {
                label: cell(label, "sentiment_label")?.to_string(),
                score: number(score, "sentiment_score")?,
            },
        };

        Ok(ObservationRow {
            instrument_id: cell(self.instrument, "instrument_id")?.to_string(),
            timestamp: parse_timestamp(cell(self.timestamp, "timestamp")?).ok_or_else(|| {
                ForecastError::schema(format!("line {line}: unparseable timestamp"))
            })?,
            close: number(self.close, "close")?,
            volume: number(self.volume, "volume")?,
            sentiment,
        })
    }
}

/// Parse the timestamp formats the feed is known to produce.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 10, minute, 0).unwrap()
    }

    #[test]
    fn test_sentiment_label_mapping() {
        let pos = SentimentInput::Labeled {
            label: "Positive".to_string(),
            score: 0.8,
        };
        let neu = SentimentInput::Labeled {
            label: "neutral".to_string(),
            score: 0.9,
        };
        let neg = SentimentInput::Labeled {
            label: "negative".to_string(),
            score: 0.5,
        };
        assert_eq!(pos.to_numeric().unwrap(), 0.8);
        assert_eq!(neu.to_numeric().unwrap(), 0.0);
        assert_eq!(neg.to_numeric().unwrap(), -0.5);
    }

    #[test]
    fn test_sentiment_rejects_unknown_label_and_range() {
        let bad = SentimentInput::Labeled {
            label: "bullish".to_string(),
            score: 0.5,
        };
        assert!(matches!(bad.to_numeric(), Err(ForecastError::Schema { .. })));
        assert!(SentimentInput::Numeric(1.5).to_numeric().is_err());
        assert!(SentimentInput::Numeric(f64::NAN).to_numeric().is_err());
    }

    #[test]
    fn test_group_by_instrument_sorts_each_group() {
        let table = ObservationTable::new(vec![
            ObservationRow::new("ETH", ts(2), 3.0, 1.0, 0.0),
            ObservationRow::new("BTC", ts(1), 2.0, 1.0, 0.0),
            ObservationRow::new("ETH", ts(0), 1.0, 1.0, 0.0),
            ObservationRow::new("BTC", ts(0), 1.0, 1.0, 0.0),
        ]);

        let groups = table.group_by_instrument();
        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(keys, vec!["BTC".to_string(), "ETH".to_string()]);
        assert_eq!(groups["ETH"][0].timestamp, ts(0));
        assert_eq!(groups["ETH"][1].timestamp, ts(2));
    }

    #[test]
    fn test_csv_numeric_sentiment() {
        let data = "coin,timestamp,close,volume,sentiment_num\n\
                    BTC,2025-05-01 10:00:00,100.0,5.0,0.25\n\
                    BTC,2025-05-01T10:01:00Z,101.0,6.0,-0.5\n";
        let table = ObservationTable::from_csv_reader(data.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].close, 101.0);
        assert_eq!(table.rows()[1].timestamp, ts(1));
    }

    #[test]
    fn test_csv_label_sentiment() {
        let data = "instrument_id,timestamp,close,volume,sentiment_label,sentiment_score\n\
                    ETH,2025-05-01 10:00:00,10.0,1.0,negative,0.7\n";
        let table = ObservationTable::from_csv_reader(data.as_bytes()).unwrap();
        assert_eq!(table.rows()[0].sentiment.to_numeric().unwrap(), -0.7);
    }

    #[test]
    fn test_csv_missing_columns_is_schema_error() {
        let data = "coin,timestamp,volume\nBTC,2025-05-01 10:00:00,1.0\n";
        let err = ObservationTable::from_csv_reader(data.as_bytes()).unwrap_err();
        match err {
            ForecastError::Schema { message } => {
                assert!(message.contains("close"));
                assert!(message.contains("sentiment"));
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_csv_short_record_is_schema_error() {
        let data = "coin,timestamp,close,volume,sentiment_num\n\
                    BTC,2025-05-01 10:00:00,100.0,5.0,0.25\n\
                    BTC,2025-05-01 10:01:00,101\n";
        let err = ObservationTable::from_csv_reader(data.as_bytes()).unwrap_err();
        assert!(err.is_recoverable());
        match err {
            ForecastError::Schema { message } => assert!(message.starts_with("line 3"), "{message}"),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_floor_to_minute() {
        let raw = Utc.with_ymd_and_hms(2025, 5, 1, 10, 3, 41).unwrap();
        assert_eq!(floor_to_minute(raw), ts(3));
    }

    #[test]
    fn test_domain_check() {
        assert!(ObservationRow::new("BTC", ts(0), 0.0, 1.0, 0.0)
            .check_domain()
            .is_err());
        assert!(ObservationRow::new("BTC", ts(0), 1.0, -1.0, 0.0)
            .check_domain()
            .is_err());
        assert!(ObservationRow::new("BTC", ts(0), 1.0, 0.0, 0.0)
            .check_domain()
            .is_ok());
    }
}
