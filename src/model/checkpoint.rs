//! Persisted best-validation model.

use super::{LstmEncoder, ModelConfig, SequenceEncoder, SequenceRegressor};
use crate::error::{ForecastError, Result};
use crate::features::FeatureConfig;
use crate::schema::ArtifactFingerprint;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Weights at the epoch with the lowest validation loss, plus the contract
/// they were trained under.
///
/// Encoded with bincode, so a save/load round trip reproduces every weight
/// bit-for-bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCheckpoint<E = LstmEncoder> {
    /// Feature contract
    pub fingerprint: ArtifactFingerprint,
    /// Feature computation settings needed to rebuild inputs at serve time
    pub feature_config: FeatureConfig,
    /// Architecture
    pub model_config: ModelConfig,
    /// 1-based epoch the weights come from
    pub epoch: usize,
    /// Validation loss at that epoch
    pub val_loss: f64,
    /// The model
    pub regressor: SequenceRegressor<E>,
}

impl<E: SequenceEncoder> ModelCheckpoint<E> {
    /// Write the checkpoint atomically: encode to `<path>.tmp`, then rename.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let tmp = temp_path(path);

        let file = File::create(&tmp).map_err(|e| ForecastError::io(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)?;
        writer.flush().map_err(|e| ForecastError::io(&tmp, e))?;
        drop(writer);

        fs::rename(&tmp, path).map_err(|e| ForecastError::io(path, e))?;
        debug!(
            "Wrote checkpoint {} (epoch {}, val loss {:.6})",
            path.display(),
            self.epoch,
            self.val_loss
        );
        Ok(())
    }

    /// Read a checkpoint.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ForecastError::io(path, e))?;
        let checkpoint: Self = bincode::deserialize_from(BufReader::new(file))?;

        let expected = checkpoint.feature_config.feature_names();
        if checkpoint.fingerprint.feature_names != expected
            || checkpoint.regressor.input_size() != checkpoint.fingerprint.feature_count
        {
            return Err(ForecastError::mismatch(format!(
                "checkpoint {} is internally inconsistent: fingerprint {:?}, features {:?}, model input {}",
                path.display(),
                checkpoint.fingerprint.feature_names,
                expected,
                checkpoint.regressor.input_size()
            )));
        }
        info!("Loaded checkpoint {} (epoch {})", path.display(), checkpoint.epoch);
        Ok(checkpoint)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
