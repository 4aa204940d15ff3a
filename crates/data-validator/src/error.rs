//! Validation Error Types

use thiserror::Error;

/// Errors while validating a model input tensor
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Tensor shape differs from the model's input shape
    #[error("Invalid tensor shape: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// NaN or infinite value
    #[error("Non-finite value {value} at row {row}, column {col}")]
    NonFinite { row: usize, col: usize, value: f32 },
}

/// Errors while loading or applying a scaler
#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("Failed to read scaler artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed scaler artifact: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scaler bounds have {min_len} minimums and {max_len} maximums")]
    BoundsLength { min_len: usize, max_len: usize },

    #[error("Scaler was fit on {actual} features, pipeline produces {expected}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("Scaler feature order differs at position {position}: expected '{expected}', found '{found}'")]
    FeatureOrder {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("Invalid scaler bounds: {0}")]
    InvalidBounds(String),
}
