//! NumPy export of prepared datasets.
//!
//! Writes the scaled partitions for training outside this crate:
//!
//! ```text
//! output_dir/
//! ├── X_train.npy     [N_train, T, F] float64
//! ├── y_train.npy     [N_train]       float64
//! ├── X_val.npy       [N_val, T, F]
//! ├── y_val.npy       [N_val]
//! ├── X_test.npy      [N_test, T, F]
//! ├── y_test.npy      [N_test]
//! ├── scaler.json     frozen scaler parameters
//! └── metadata.json   feature names, shapes, label stats
//! ```

use crate::error::{ForecastError, Result};
use crate::labeling::LabelStats;
use crate::pipeline::{PreparedDataset, SCALER_FILE};
use crate::schema::{LABEL_NAME, SCHEMA_VERSION};
use crate::sequence_builder::Sequence;
use log::info;
use ndarray::{Array1, Array3};
use ndarray_npy::WriteNpyExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    /// Feature schema version
    pub schema_version: String,
    /// Name of the label column
    pub label_name: String,
    /// Feature names in column order
    pub feature_names: Vec<String>,
    /// Rows per window (T)
    pub window_length: usize,
    /// Features per row (F)
    pub feature_count: usize,
    /// Training windows
    pub n_train: usize,
    /// Validation windows
    pub n_val: usize,
    /// Test windows
    pub n_test: usize,
    /// Instruments in the source table
    pub instruments: Vec<String>,
    /// Label distribution
    pub label_stats: LabelStats,
    /// Export time (RFC 3339)
    pub exported_at: String,
}

/// Files written by one export.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    /// Every file written
    pub files: Vec<PathBuf>,
    /// Metadata as written
    pub metadata: ExportMetadata,
}

/// Writes a [`PreparedDataset`] as NumPy arrays.
#[derive(Debug, Clone)]
pub struct DatasetExporter {
    output_dir: PathBuf,
}

impl DatasetExporter {
    /// Exporter writing into `output_dir` (created on export).
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    /// Output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write all partitions, the scaler and the metadata.
    pub fn export(&self, dataset: &PreparedDataset) -> Result<ExportSummary> {
        fs::create_dir_all(&self.output_dir).map_err(|e| ForecastError::io(&self.output_dir, e))?;

        let window_length = dataset.fingerprint.window_length;
        let feature_count = dataset.fingerprint.feature_count;
        let mut files = Vec::new();
        for (name, sequences) in [
            ("train", &dataset.split.train),
            ("val", &dataset.split.validation),
            ("test", &dataset.split.test),
        ] {
            let (x, y) = to_arrays(sequences, window_length, feature_count)?;
            files.push(self.write_array(&format!("X_{name}.npy"), &x)?);
            files.push(self.write_array(&format!("y_{name}.npy"), &y)?);
        }

        let scaler_path = self.output_dir.join(SCALER_FILE);
        dataset.scaler.save_json(&scaler_path)?;
        files.push(scaler_path);

        let metadata = ExportMetadata {
            schema_version: SCHEMA_VERSION.to_string(),
            label_name: LABEL_NAME.to_string(),
            feature_names: dataset.fingerprint.feature_names.clone(),
            window_length,
            feature_count,
            n_train: dataset.split.train.len(),
            n_val: dataset.split.validation.len(),
            n_test: dataset.split.test.len(),
            instruments: dataset.features.instruments().map(str::to_string).collect(),
            label_stats: dataset.label_stats.clone(),
            exported_at: chrono::Utc::now().to_rfc3339(),
        };
        let metadata_path = self.output_dir.join("metadata.json");
        let file = File::create(&metadata_path).map_err(|e| ForecastError::io(&metadata_path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &metadata)?;
        files.push(metadata_path);

        info!(
            "Exported dataset to {} (train {}, val {}, test {})",
            self.output_dir.display(),
            metadata.n_train,
            metadata.n_val,
            metadata.n_test
        );
        Ok(ExportSummary { files, metadata })
    }

    fn write_array<A: WriteNpyExt>(&self, file_name: &str, array: &A) -> Result<PathBuf> {
        let path = self.output_dir.join(file_name);
        let file = File::create(&path).map_err(|e| ForecastError::io(&path, e))?;
        array.write_npy(BufWriter::new(file))?;
        Ok(path)
    }
}

/// Stack windows into `[N, T, F]` inputs and `[N]` labels.
///
/// # Errors
///
/// `Training` if a window is unlabeled; `Shape` if a window has the wrong shape.
pub fn to_arrays(
    sequences: &[Sequence],
    window_length: usize,
    feature_count: usize,
) -> Result<(Array3<f64>, Array1<f64>)> {
    let mut flat = Vec::with_capacity(sequences.len() * window_length * feature_count);
    let mut labels = Vec::with_capacity(sequences.len());
    for sequence in sequences {
        let label = sequence.label.ok_or_else(|| {
            ForecastError::training(format!(
                "unlabeled window for {} ending {}",
                sequence.instrument_id, sequence.end_timestamp
            ))
        })?;
        flat.extend(sequence.as_flat());
        labels.push(label);
    }

    let x = Array3::from_shape_vec((sequences.len(), window_length, feature_count), flat)?;
    Ok((x, Array1::from_vec(labels)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureConfig;
    use crate::observation::{ObservationRow, ObservationTable};
    use crate::config::PipelineConfig;
    use crate::pipeline::Pipeline;
    use crate::sequence_builder::SequenceConfig;
    use chrono::{Duration, TimeZone, Utc};
    use ndarray_npy::ReadNpyExt;
    use std::sync::Arc;

    fn prepared() -> PreparedDataset {
        let features = FeatureConfig::default()
            .with_horizon(2)
            .with_return_windows(vec![2])
            .with_volatility_windows(vec![2]);
        let config = PipelineConfig::default()
            .with_sequence(SequenceConfig::from_feature_config(4, &features))
            .with_features(features);
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let rows = (0..24)
            .map(|i| {
                ObservationRow::new(
                    "ETH",
                    base + Duration::minutes(i),
                    10.0 + (i as f64).sqrt(),
                    2.0,
                    0.1,
                )
            })
            .collect();
        Pipeline::from_config(config)
            .unwrap()
            .prepare(&ObservationTable::new(rows))
            .unwrap()
    }

    #[test]
    fn test_export_writes_all_files() {
        let dataset = prepared();
        let dir = tempfile::tempdir().unwrap();
        let summary = DatasetExporter::new(dir.path().join("out")).export(&dataset).unwrap();

        assert_eq!(summary.files.len(), 8);
        for file in &summary.files {
            assert!(file.exists(), "{} missing", file.display());
        }

        // 24 rows - 2 warm-up - 2 unlabeled = 20 rows -> 16 windows -> pool 12, test 4
        assert_eq!(summary.metadata.n_train + summary.metadata.n_val, 12);
        assert_eq!(summary.metadata.n_test, 4);
        assert_eq!(summary.metadata.feature_count, 5);
        assert_eq!(summary.metadata.instruments, vec!["ETH".to_string()]);
    }

    #[test]
    fn test_array_shapes_and_values() {
        let dataset = prepared();
        let dir = tempfile::tempdir().unwrap();
        DatasetExporter::new(dir.path()).export(&dataset).unwrap();

        let file = File::open(dir.path().join("X_test.npy")).unwrap();
        let x: Array3<f64> = Array3::read_npy(file).unwrap();
        assert_eq!(x.shape(), &[4, 4, 5]);
        assert_eq!(x[[0, 0, 0]], dataset.split.test[0].features[0][0]);

        let file = File::open(dir.path().join("y_test.npy")).unwrap();
        let y: Array1<f64> = Array1::read_npy(file).unwrap();
        let expected: Vec<f64> = dataset.split.test.iter().map(|s| s.label.unwrap()).collect();
        assert_eq!(y.to_vec(), expected);
    }

    #[test]
    fn test_unlabeled_window_rejected() {
        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let sequence = Sequence {
            instrument_id: "BTC".to_string(),
            features: vec![Arc::new(vec![1.0, 2.0])],
            start_timestamp: ts,
            end_timestamp: ts,
            label: None,
        };
        assert!(matches!(
            to_arrays(&[sequence], 1, 2),
            Err(ForecastError::Training { .. })
        ));
    }
}
