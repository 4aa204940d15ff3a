//! Min-Max Feature Scaling
//!
//! Replays the per-feature affine transform fitted at training time:
//! `x * scale + offset`, where `scale = (hi - lo) / (max - min)` and
//! `offset = lo - min * scale`. A zero-width feature uses unit scale.

use crate::error::ScalerError;
use ndarray::{ArrayView1, ArrayView2, ArrayViewMut2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Per-feature transform applied identically to every input row
pub trait FeatureScaler: Send + Sync {
    /// Number of features the scaler was fit on
    fn n_features(&self) -> usize;

    /// Names of the fitted features, in order, if recorded
    fn feature_names(&self) -> Option<&[String]>;

    /// Scale one row in place
    fn transform_row(&self, row: &mut [f32]);

    /// Scale every row of a `(samples, features)` matrix in place
    fn transform(&self, mut matrix: ArrayViewMut2<'_, f32>) {
        for mut row in matrix.axis_iter_mut(Axis(0)) {
            let mut owned = row.to_vec();
            self.transform_row(&mut owned);
            row.assign(&ArrayView1::from(&owned[..]));
        }
    }

    /// Confirm the scaler was fit on `expected`, in that order
    fn check_features(&self, expected: &[&str]) -> Result<(), ScalerError> {
        if self.n_features() != expected.len() {
            return Err(ScalerError::FeatureCount {
                expected: expected.len(),
                actual: self.n_features(),
            });
        }

        if let Some(names) = self.feature_names() {
            if names.len() != expected.len() {
                return Err(ScalerError::FeatureCount {
                    expected: expected.len(),
                    actual: names.len(),
                });
            }
            if let Some((position, (found, want))) = names
                .iter()
                .zip(expected)
                .enumerate()
                .find(|(_, (found, want))| found.as_str() != **want)
            {
                return Err(ScalerError::FeatureOrder {
                    position,
                    expected: want.to_string(),
                    found: found.clone(),
                });
            }
        } else {
            debug!("Scaler carries no feature names, order check skipped");
        }
        Ok(())
    }
}

/// Serialized form of a fitted scaler
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScalerArtifact {
    #[serde(alias = "data_min_")]
    data_min: Vec<f64>,
    #[serde(alias = "data_max_")]
    data_max: Vec<f64>,
    #[serde(default = "default_feature_range")]
    feature_range: (f64, f64),
    #[serde(default, alias = "feature_names_in_")]
    feature_names: Option<Vec<String>>,
}

fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

/// Min-max scaler with bounds fixed at fit time
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    data_min: Vec<f64>,
    data_max: Vec<f64>,
    feature_range: (f64, f64),
    feature_names: Option<Vec<String>>,
    scale: Vec<f64>,
    offset: Vec<f64>,
}

impl MinMaxScaler {
    /// Create a scaler from explicit bounds
    pub fn new(
        data_min: Vec<f64>,
        data_max: Vec<f64>,
        feature_range: (f64, f64),
    ) -> Result<Self, ScalerError> {
        if data_min.len() != data_max.len() {
            return Err(ScalerError::BoundsLength {
                min_len: data_min.len(),
                max_len: data_max.len(),
            });
        }
        if feature_range.0 >= feature_range.1 {
            return Err(ScalerError::InvalidBounds(format!(
                "feature range {:?} is empty",
                feature_range
            )));
        }
        if let Some(i) = (0..data_min.len())
            .find(|&i| !data_min[i].is_finite() || !data_max[i].is_finite() || data_min[i] > data_max[i])
        {
            return Err(ScalerError::InvalidBounds(format!(
                "feature {} has min {} and max {}",
                i, data_min[i], data_max[i]
            )));
        }

        let (lo, hi) = feature_range;
        let scale: Vec<f64> = data_min
            .iter()
            .zip(&data_max)
            .map(|(min, max)| {
                let range = max - min;
                if range == 0.0 {
                    hi - lo
                } else {
                    (hi - lo) / range
                }
            })
            .collect();
        let offset = data_min
            .iter()
            .zip(&scale)
            .map(|(min, s)| lo - min * s)
            .collect();

        Ok(Self {
            data_min,
            data_max,
            feature_range,
            feature_names: None,
            scale,
            offset,
        })
    }

    /// Fit bounds column-wise over a `(samples, features)` matrix
    pub fn fit(data: ArrayView2<'_, f64>) -> Result<Self, ScalerError> {
        if data.nrows() == 0 {
            return Err(ScalerError::InvalidBounds("cannot fit on zero rows".to_string()));
        }
        let data_min = data
            .axis_iter(Axis(1))
            .map(|col| col.iter().copied().fold(f64::INFINITY, f64::min))
            .collect();
        let data_max = data
            .axis_iter(Axis(1))
            .map(|col| col.iter().copied().fold(f64::NEG_INFINITY, f64::max))
            .collect();
        Self::new(data_min, data_max, default_feature_range())
    }

    /// Attach the fitted feature names
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = Some(names);
        self
    }

    /// Parse a JSON scaler artifact
    pub fn from_json(json: &str) -> Result<Self, ScalerError> {
        let artifact: ScalerArtifact = serde_json::from_str(json)?;
        let scaler = Self::new(artifact.data_min, artifact.data_max, artifact.feature_range)?;
        Ok(match artifact.feature_names {
            Some(names) => scaler.with_feature_names(names),
            None => scaler,
        })
    }

    /// Load a JSON scaler artifact from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScalerError> {
        let path = path.as_ref();
        let scaler = Self::from_json(&std::fs::read_to_string(path)?)?;
        info!(
            path = %path.display(),
            features = scaler.n_features(),
            named = scaler.feature_names.is_some(),
            "Scaler loaded"
        );
        Ok(scaler)
    }

    /// Serialize to the artifact format
    pub fn to_json(&self) -> Result<String, ScalerError> {
        let artifact = ScalerArtifact {
            data_min: self.data_min.clone(),
            data_max: self.data_max.clone(),
            feature_range: self.feature_range,
            feature_names: self.feature_names.clone(),
        };
        Ok(serde_json::to_string_pretty(&artifact)?)
    }

    pub fn data_min(&self) -> &[f64] {
        &self.data_min
    }

    pub fn data_max(&self) -> &[f64] {
        &self.data_max
    }
}

impl FeatureScaler for MinMaxScaler {
    fn n_features(&self) -> usize {
        self.data_min.len()
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn transform_row(&self, row: &mut [f32]) {
        for ((value, scale), offset) in row.iter_mut().zip(&self.scale).zip(&self.offset) {
            *value = (f64::from(*value) * scale + offset) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use proptest::prelude::*;

    #[test]
    fn test_minmax_maps_bounds() {
        let scaler = MinMaxScaler::new(vec![0.0, 10.0], vec![100.0, 20.0], (0.0, 1.0)).unwrap();

        let mut row = [50.0f32, 15.0];
        scaler.transform_row(&mut row);
        assert!((row[0] - 0.5).abs() < 1e-6);
        assert!((row[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_range_uses_unit_scale() {
        let scaler = MinMaxScaler::new(vec![100.0], vec![100.0], (0.0, 1.0)).unwrap();
        let mut row = [100.0f32];
        scaler.transform_row(&mut row);
        assert_eq!(row[0], 0.0);

        let mut row = [101.0f32];
        scaler.transform_row(&mut row);
        assert!((row[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fit_and_matrix_transform() {
        let data = array![[1.0, -5.0], [3.0, 5.0], [2.0, 0.0]];
        let scaler = MinMaxScaler::fit(data.view()).unwrap();
        assert_eq!(scaler.data_min(), &[1.0, -5.0]);
        assert_eq!(scaler.data_max(), &[3.0, 5.0]);

        let mut matrix = data.mapv(|v| v as f32);
        scaler.transform(matrix.view_mut());
        assert_eq!(matrix, array![[0.0f32, 0.0], [1.0, 1.0], [0.5, 0.5]]);
    }

    #[test]
    fn test_custom_feature_range() {
        let scaler = MinMaxScaler::new(vec![0.0], vec![10.0], (-1.0, 1.0)).unwrap();
        let mut row = [0.0f32];
        scaler.transform_row(&mut row);
        assert!((row[0] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(matches!(
            MinMaxScaler::new(vec![0.0, 1.0], vec![1.0], (0.0, 1.0)),
            Err(ScalerError::BoundsLength { .. })
        ));
        assert!(matches!(
            MinMaxScaler::new(vec![2.0], vec![1.0], (0.0, 1.0)),
            Err(ScalerError::InvalidBounds(_))
        ));
        assert!(matches!(
            MinMaxScaler::new(vec![0.0], vec![1.0], (1.0, 1.0)),
            Err(ScalerError::InvalidBounds(_))
        ));
    }

    #[test]
    fn test_json_artifact_with_sklearn_names() {
        let json = r#"{
            "data_min_": [0.0, 1.0],
            "data_max_": [2.0, 3.0],
            "feature_names_in_": ["sensor_measurement_2", "op_setting_1"]
        }"#;
        let scaler = MinMaxScaler::from_json(json).unwrap();
        assert_eq!(scaler.n_features(), 2);
        assert!(scaler.check_features(&["sensor_measurement_2", "op_setting_1"]).is_ok());

        match scaler.check_features(&["op_setting_1", "sensor_measurement_2"]) {
            Err(ScalerError::FeatureOrder { position, .. }) => assert_eq!(position, 0),
            other => panic!("expected FeatureOrder, got {other:?}"),
        }
        assert!(matches!(
            scaler.check_features(&["a"]),
            Err(ScalerError::FeatureCount { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_load_round_trips_artifact() {
        let scaler = MinMaxScaler::new(vec![0.0, 1.0], vec![4.0, 2.0], (0.0, 1.0))
            .unwrap()
            .with_feature_names(vec!["a".into(), "b".into()]);
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), scaler.to_json().unwrap()).unwrap();

        let loaded = MinMaxScaler::load(file.path()).unwrap();
        assert_eq!(loaded.data_max(), &[4.0, 2.0]);
        assert_eq!(loaded.feature_names().unwrap(), &["a".to_string(), "b".to_string()]);
    }

    proptest! {
        #[test]
        fn prop_fit_bounds_map_to_unit_interval(
            columns in proptest::collection::vec(
                (-1.0e3f64..1.0e3, 1.0f64..1.0e4),
                1..17,
            ),
        ) {
            let mins: Vec<f64> = columns.iter().map(|(min, _)| *min).collect();
            let maxs: Vec<f64> = columns.iter().map(|(min, width)| min + width).collect();
            let mut data = Array2::<f64>::zeros((2, columns.len()));
            for (i, (min, max)) in mins.iter().zip(&maxs).enumerate() {
                data[[0, i]] = *min;
                data[[1, i]] = *max;
            }
            let scaler = MinMaxScaler::fit(data.view()).unwrap();

            let mut low: Vec<f32> = mins.iter().map(|v| *v as f32).collect();
            let mut high: Vec<f32> = maxs.iter().map(|v| *v as f32).collect();
            scaler.transform_row(&mut low);
            scaler.transform_row(&mut high);

            // f32 inputs lose precision relative to the f64 bounds
            for (l, h) in low.iter().zip(&high) {
                prop_assert!(l.abs() < 1e-2, "transform(min) = {}", l);
                prop_assert!((h - 1.0).abs() < 1e-2, "transform(max) = {}", h);
            }
        }
    }
}
