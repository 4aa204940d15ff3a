//! Sequence Tensor Validator

use crate::error::ValidationError;
use ndarray::ArrayView2;
use tracing::debug;

/// Checks that a tensor matches the model's input contract
#[derive(Debug, Clone, Copy)]
pub struct SequenceValidator {
    rows: usize,
    cols: usize,
}

impl SequenceValidator {
    /// Create a validator for `(rows, cols)` tensors
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Expected tensor shape
    pub fn expected_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Validate shape, then finiteness of every element
    pub fn validate(&self, tensor: ArrayView2<'_, f32>) -> Result<(), ValidationError> {
        let actual = tensor.dim();
        if actual != self.expected_shape() {
            return Err(ValidationError::ShapeMismatch {
                expected: self.expected_shape(),
                actual,
            });
        }

        if let Some(((row, col), &value)) = tensor.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(ValidationError::NonFinite { row, col, value });
        }

        debug!(rows = actual.0, cols = actual.1, "Tensor validation passed");
        Ok(())
    }
}
