//! Degraded-Mode Fallback
//!
//! Provides a bounded RUL estimate when the regressor's weights are not
//! loaded, so the service keeps answering with reduced accuracy.

mod estimator;

pub use estimator::{FallbackConfig, FallbackEstimator};

use thiserror::Error;

/// Errors building a fallback estimator
#[derive(Debug, Error, PartialEq)]
pub enum FallbackError {
    #[error("Invalid fallback range: [{min_rul}, {max_rul}]")]
    InvalidRange { min_rul: f64, max_rul: f64 },
}
