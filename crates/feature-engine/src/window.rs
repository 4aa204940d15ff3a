//! Fixed-Length Sequence Windowing
//!
//! Histories longer than the window keep their most recent rows; shorter
//! histories are right-aligned with leading zero rows.

use crate::features::{FeatureVector, FEATURE_DIMENSION};
use ndarray::{s, Array2, ArrayView2};
use tracing::debug;

/// Number of cycles fed to the regressor
pub const SEQUENCE_LENGTH: usize = 50;

/// Model input tensor of shape `(length, FEATURE_DIMENSION)`, oldest row first
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    data: Array2<f32>,
    /// Leading zero rows standing in for missing history
    padded_rows: usize,
    /// Whether any row skipped scaling
    unscaled: bool,
    /// Zero-filled fields across the distinct source vectors
    defaulted_fields: usize,
}

impl Sequence {
    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array2<f32> {
        self.data
    }

    /// `(rows, features)`
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn padded_rows(&self) -> usize {
        self.padded_rows
    }

    /// Rows that carry recorded history
    pub fn history_rows(&self) -> ArrayView2<'_, f32> {
        self.data.slice(s![self.padded_rows.., ..])
    }

    pub fn is_unscaled(&self) -> bool {
        self.unscaled
    }

    pub fn defaulted_fields(&self) -> usize {
        self.defaulted_fields
    }
}

/// Assembles feature histories into fixed-length sequences
#[derive(Debug, Clone, Copy)]
pub struct SequenceWindower {
    length: usize,
}

impl Default for SequenceWindower {
    fn default() -> Self {
        Self::new(SEQUENCE_LENGTH)
    }
}

impl SequenceWindower {
    /// Create a windower producing `length` rows
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Window an ascending-cycle history
    pub fn window(&self, history: &[FeatureVector]) -> Sequence {
        let take = history.len().min(self.length);
        let recent = &history[history.len() - take..];
        let padded_rows = self.length - take;

        let mut data = Array2::<f32>::zeros((self.length, FEATURE_DIMENSION));
        for (row, vector) in recent.iter().enumerate() {
            data.row_mut(padded_rows + row)
                .iter_mut()
                .zip(vector.values.iter())
                .for_each(|(dst, &v)| *dst = v);
        }

        debug!(
            available = history.len(),
            padded_rows, "Windowed feature history"
        );

        Sequence {
            data,
            padded_rows,
            unscaled: recent.iter().any(|v| !v.scaled),
            defaulted_fields: recent.iter().map(|v| v.defaulted_count()).sum(),
        }
    }

    /// Repeat one vector across every row (no history available)
    pub fn replicate(&self, vector: &FeatureVector) -> Sequence {
        let mut data = Array2::<f32>::zeros((self.length, FEATURE_DIMENSION));
        for mut row in data.rows_mut() {
            row.iter_mut()
                .zip(vector.values.iter())
                .for_each(|(dst, &v)| *dst = v);
        }

        Sequence {
            data,
            padded_rows: 0,
            unscaled: !vector.scaled,
            defaulted_fields: vector.defaulted_count(),
        }
    }
}
