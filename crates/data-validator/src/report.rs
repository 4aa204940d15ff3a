//! Tensor Inspection Report

use crate::validator::SequenceValidator;
use ndarray::ArrayView2;
use serde::Serialize;

/// Diagnostic summary of a model input tensor
#[derive(Debug, Clone, Serialize)]
pub struct TensorReport {
    pub shape: (usize, usize),
    pub expected_shape: (usize, usize),
    pub has_nan: bool,
    pub has_inf: bool,
    /// Min over finite values (0.0 if none)
    pub min: f32,
    /// Max over finite values (0.0 if none)
    pub max: f32,
    /// Mean over finite values (0.0 if none)
    pub mean: f64,
    pub valid: bool,
    /// Validation failure message, if any
    pub error: Option<String>,
}

impl TensorReport {
    /// Inspect a tensor against a validator's contract
    pub fn inspect(tensor: ArrayView2<'_, f32>, validator: &SequenceValidator) -> Self {
        let mut has_nan = false;
        let mut has_inf = false;
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut finite = 0usize;

        for &v in tensor.iter() {
            if v.is_nan() {
                has_nan = true;
            } else if v.is_infinite() {
                has_inf = true;
            } else {
                min = min.min(v);
                max = max.max(v);
                sum += f64::from(v);
                finite += 1;
            }
        }

        let (min, max, mean) = if finite == 0 {
            (0.0, 0.0, 0.0)
        } else {
            (min, max, sum / finite as f64)
        };

        let result = validator.validate(tensor);

        Self {
            shape: tensor.dim(),
            expected_shape: validator.expected_shape(),
            has_nan,
            has_inf,
            min,
            max,
            mean,
            valid: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_report_statistics() {
        let validator = SequenceValidator::new(2, 2);
        let tensor = array![[0.0f32, 1.0], [2.0, 5.0]];
        let report = TensorReport::inspect(tensor.view(), &validator);

        assert!(report.valid);
        assert!(!report.has_nan && !report.has_inf);
        assert_eq!(report.min, 0.0);
        assert_eq!(report.max, 5.0);
        assert!((report.mean - 2.0).abs() < 1e-9);
        assert!(report.error.is_none());
    }

    #[test]
    fn test_report_flags_non_finite() {
        let validator = SequenceValidator::new(2, 2);
        let tensor = array![[f32::NAN, 1.0], [f32::INFINITY, 3.0]];
        let report = TensorReport::inspect(tensor.view(), &validator);

        assert!(!report.valid);
        assert!(report.has_nan);
        assert!(report.has_inf);
        assert_eq!(report.min, 1.0);
        assert_eq!(report.max, 3.0);
        assert!(report.error.is_some());
    }
}
