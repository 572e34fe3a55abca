//! Numeric preprocessing shared by training and inference.
//!
//! - **Rolling statistics**: trailing sample standard deviation (Welford's
//!   algorithm with removal) and n-step percent change
//! - **Scaling**: per-feature standardization fit once on the training
//!   partition and applied unchanged everywhere else

pub mod rolling;
pub mod scaler;

pub use rolling::{pct_change, trailing_std, RollingStd};
pub use scaler::{ScalerParameters, StandardScaler};
