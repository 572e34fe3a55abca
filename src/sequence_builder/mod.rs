//! Fixed-length windows over per-instrument feature rows.
//!
//! # Architecture
//!
//! - **SequenceConfig**: window length, stride and feature count
//! - **Sequence**: one window plus the label of its last row
//! - **SequenceBuilder**: streaming buffer for a single instrument
//! - **Windower**: slices a whole [`crate::features::FeatureTable`]
//!
//! Windows never span two instruments. The label of a window is the
//! `return_60m` already stored on the window's final row, so feature rows and
//! targets cannot drift by one.
//!
//! # Example
//!
//! ```ignore
//! use return_forecast::sequence_builder::{SequenceConfig, WindowMode, Windower};
//!
//! let windower = Windower::new(SequenceConfig::new(20, 1).with_feature_count(9))?;
//! let sequences = windower.window_table(&table, WindowMode::Training)?;
//! ```

mod builder;
mod windower;

pub use crate::features::FeatureVec;
pub use builder::{Sequence, SequenceBuilder, SequenceConfig};
pub use windower::{WindowMode, Windower};
