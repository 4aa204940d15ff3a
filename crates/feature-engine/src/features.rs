//! Feature Vector Assembly

use data_validator::{FeatureScaler, ScalerError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use telemetry::SensorFrame;
use tracing::{debug, info, warn};

/// Number of features in the vector (14 sensors + 2 settings)
pub const FEATURE_DIMENSION: usize = 16;

/// Sensors kept, 1-based, in output order
pub const SELECTED_SENSORS: [usize; 14] = [2, 3, 4, 7, 8, 9, 11, 12, 13, 14, 15, 17, 20, 21];

/// Operational settings kept, 1-based, in output order
pub const SELECTED_SETTINGS: [usize; 2] = [1, 2];

/// Sensors that carry no degradation signal
pub const DROPPED_SENSORS: [usize; 7] = [1, 5, 6, 10, 16, 18, 19];

pub const DROPPED_SETTINGS: [usize; 1] = [3];

/// Column names in output order, as recorded by the training scaler
pub const FEATURE_NAMES: [&str; FEATURE_DIMENSION] = [
    "sensor_measurement_2",
    "sensor_measurement_3",
    "sensor_measurement_4",
    "sensor_measurement_7",
    "sensor_measurement_8",
    "sensor_measurement_9",
    "sensor_measurement_11",
    "sensor_measurement_12",
    "sensor_measurement_13",
    "sensor_measurement_14",
    "sensor_measurement_15",
    "sensor_measurement_17",
    "sensor_measurement_20",
    "sensor_measurement_21",
    "op_setting_1",
    "op_setting_2",
];

/// Feature vector for ML inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    /// Selected sensors (ascending) then selected settings (ascending)
    pub values: [f32; FEATURE_DIMENSION],
    /// Fields that were absent from the source and zero-filled
    pub defaulted: [bool; FEATURE_DIMENSION],
    /// Whether the scaler transform was applied
    pub scaled: bool,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            values: [0.0; FEATURE_DIMENSION],
            defaulted: [false; FEATURE_DIMENSION],
            scaled: false,
        }
    }
}

impl FeatureVector {
    /// Number of zero-filled fields
    pub fn defaulted_count(&self) -> usize {
        self.defaulted.iter().filter(|&&d| d).count()
    }

    /// Names of the zero-filled fields
    pub fn defaulted_fields(&self) -> Vec<&'static str> {
        FEATURE_NAMES
            .iter()
            .zip(self.defaulted)
            .filter_map(|(name, d)| d.then_some(*name))
            .collect()
    }
}

/// Raw key/value reading supplied by a caller, possibly partial
///
/// Accepts either named fields (`sensor_measurement_7`, `op_setting_1`, or the
/// short `sensor_7` / `setting_1`) or positional arrays
/// `{"sensors": [..21], "settings": [..3]}`. Unrelated keys are ignored; a
/// known field that is null or not numeric counts as missing. Numeric strings
/// are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPayload {
    Arrays {
        sensors: Vec<f64>,
        #[serde(default)]
        settings: Vec<f64>,
    },
    Fields(BTreeMap<String, Value>),
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl Default for RawPayload {
    fn default() -> Self {
        RawPayload::Fields(BTreeMap::new())
    }
}

impl RawPayload {
    /// Sensor measurement by 1-based index
    pub fn sensor(&self, index: usize) -> Option<f64> {
        match self {
            RawPayload::Arrays { sensors, .. } => index.checked_sub(1).and_then(|i| sensors.get(i)).copied(),
            RawPayload::Fields(fields) => fields
                .get(&format!("sensor_measurement_{}", index))
                .and_then(numeric)
                .or_else(|| fields.get(&format!("sensor_{}", index)).and_then(numeric)),
        }
    }

    /// Operational setting by 1-based index
    pub fn setting(&self, index: usize) -> Option<f64> {
        match self {
            RawPayload::Arrays { settings, .. } => index.checked_sub(1).and_then(|i| settings.get(i)).copied(),
            RawPayload::Fields(fields) => fields
                .get(&format!("op_setting_{}", index))
                .and_then(numeric)
                .or_else(|| fields.get(&format!("setting_{}", index)).and_then(numeric)),
        }
    }

    /// Whether the payload carries no readings at all
    pub fn is_empty(&self) -> bool {
        match self {
            RawPayload::Arrays { sensors, settings } => sensors.is_empty() && settings.is_empty(),
            RawPayload::Fields(fields) => fields.is_empty(),
        }
    }
}

/// Selects, orders and scales raw telemetry into [`FeatureVector`]s
#[derive(Clone, Default)]
pub struct FeaturePipeline {
    scaler: Option<Arc<dyn FeatureScaler>>,
}

impl std::fmt::Debug for FeaturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeaturePipeline")
            .field("scaling", &self.is_scaling())
            .finish()
    }
}

impl FeaturePipeline {
    /// Pipeline that passes values through unscaled
    pub fn unscaled() -> Self {
        Self { scaler: None }
    }

    /// Pipeline with a training-time scaler; its feature layout must match
    pub fn with_scaler(scaler: Arc<dyn FeatureScaler>) -> Result<Self, ScalerError> {
        scaler.check_features(&FEATURE_NAMES)?;
        info!(features = scaler.n_features(), "Feature pipeline scaling enabled");
        Ok(Self {
            scaler: Some(scaler),
        })
    }

    /// Whether a scaler is applied
    pub fn is_scaling(&self) -> bool {
        self.scaler.is_some()
    }

    /// Features of a recorded frame
    pub fn extract_frame(&self, frame: &SensorFrame) -> FeatureVector {
        let vector = self.assemble(|i| frame.sensor(i), |i| frame.setting(i));
        debug_assert_eq!(vector.defaulted_count(), 0);
        vector
    }

    /// Features of a caller payload; absent fields become 0.0 and are flagged
    pub fn extract_payload(&self, payload: &RawPayload) -> FeatureVector {
        let vector = self.assemble(|i| payload.sensor(i), |i| payload.setting(i));
        if vector.defaulted_count() > 0 {
            warn!(
                defaulted = vector.defaulted_count(),
                fields = ?vector.defaulted_fields(),
                "Payload missing fields, zero-filled"
            );
        }
        vector
    }

    /// Features of every frame, preserving order
    pub fn extract_history(&self, frames: &[SensorFrame]) -> Vec<FeatureVector> {
        debug!("Extracting features for {} frames", frames.len());
        frames.iter().map(|f| self.extract_frame(f)).collect()
    }

    fn assemble(
        &self,
        sensor: impl Fn(usize) -> Option<f64>,
        setting: impl Fn(usize) -> Option<f64>,
    ) -> FeatureVector {
        let mut vector = FeatureVector::default();

        let lookups = SELECTED_SENSORS
            .iter()
            .map(|&i| sensor(i))
            .chain(SELECTED_SETTINGS.iter().map(|&i| setting(i)));

        for (idx, raw) in lookups.enumerate() {
            match raw {
                Some(v) => vector.values[idx] = v as f32,
                None => vector.defaulted[idx] = true,
            }
        }

        if let Some(scaler) = &self.scaler {
            scaler.transform_row(&mut vector.values);
            vector.scaled = true;
        }

        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_validator::MinMaxScaler;
    use proptest::prelude::*;

    fn indexed_frame() -> SensorFrame {
        let mut frame = SensorFrame::zeroed(1, 1);
        for i in 0..21 {
            frame.sensors[i] = (i + 1) as f64;
        }
        frame.settings = [101.0, 102.0, 103.0];
        frame
    }

    fn identity_scaler() -> MinMaxScaler {
        MinMaxScaler::new(vec![0.0; FEATURE_DIMENSION], vec![1.0; FEATURE_DIMENSION], (0.0, 1.0))
            .unwrap()
            .with_feature_names(FEATURE_NAMES.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_selection_order() {
        let vector = FeaturePipeline::unscaled().extract_frame(&indexed_frame());

        let expected: Vec<f32> = SELECTED_SENSORS
            .iter()
            .map(|&i| i as f32)
            .chain([101.0, 102.0])
            .collect();
        assert_eq!(vector.values.to_vec(), expected);
        assert_eq!(vector.defaulted_count(), 0);
        assert!(!vector.scaled);
    }

    #[test]
    fn test_names_match_selection() {
        for (name, &i) in FEATURE_NAMES.iter().zip(SELECTED_SENSORS.iter()) {
            assert_eq!(*name, format!("sensor_measurement_{}", i));
        }
        assert_eq!(FEATURE_NAMES[14], "op_setting_1");
        assert_eq!(FEATURE_NAMES[15], "op_setting_2");
        assert!(SELECTED_SENSORS.iter().all(|i| !DROPPED_SENSORS.contains(i)));
        assert_eq!(SELECTED_SENSORS.len() + DROPPED_SENSORS.len(), telemetry::SENSOR_COUNT);
    }

    #[test]
    fn test_partial_payload_is_zero_filled_and_flagged() {
        let payload: RawPayload = serde_json::from_str(
            r#"{"sensor_measurement_2": 642.5, "sensor_21": 23.3, "op_setting_1": 35.0}"#,
        )
        .unwrap();
        let vector = FeaturePipeline::unscaled().extract_payload(&payload);

        assert_eq!(vector.values[0], 642.5);
        assert_eq!(vector.values[13], 23.3);
        assert_eq!(vector.values[14], 35.0);
        assert_eq!(vector.values[1], 0.0);
        assert_eq!(vector.defaulted_count(), 13);
        assert!(!vector.defaulted[0]);
        assert!(vector.defaulted[15]);
        assert!(vector.defaulted_fields().contains(&"op_setting_2"));
    }

    #[test]
    fn test_unrelated_and_non_numeric_keys() {
        let payload: RawPayload = serde_json::from_str(
            r#"{
                "sensor_measurement_2": 642.1,
                "engine_name": "Engine_001",
                "timestamp": "2024-05-01T12:00:00Z",
                "notes": null,
                "sensor_measurement_3": "1589.7",
                "sensor_measurement_4": "n/a",
                "op_setting_1": null,
                "tags": ["a", "b"]
            }"#,
        )
        .unwrap();
        assert!(matches!(payload, RawPayload::Fields(_)));

        let vector = FeaturePipeline::unscaled().extract_payload(&payload);
        assert_eq!(vector.values[0], 642.1);
        assert_eq!(vector.values[1], 1589.7);
        assert_eq!(vector.values[2], 0.0);
        assert!(vector.defaulted[2]);
        assert!(vector.defaulted[14]);
        assert_eq!(vector.defaulted_count(), 14);
    }

    #[test]
    fn test_array_payload() {
        let payload: RawPayload = serde_json::from_str(
            r#"{"sensors": [1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17,18,19,20,21], "settings": [101, 102, 103]}"#,
        )
        .unwrap();
        assert!(matches!(payload, RawPayload::Arrays { .. }));

        let from_payload = FeaturePipeline::unscaled().extract_payload(&payload);
        let from_frame = FeaturePipeline::unscaled().extract_frame(&indexed_frame());
        assert_eq!(from_payload, from_frame);
    }

    #[test]
    fn test_short_arrays_flag_missing_positions() {
        let payload = RawPayload::Arrays {
            sensors: vec![1.0, 2.0, 3.0],
            settings: vec![],
        };
        let vector = FeaturePipeline::unscaled().extract_payload(&payload);
        assert_eq!(vector.values[0], 2.0);
        assert_eq!(vector.values[1], 3.0);
        assert!(!vector.defaulted[1]);
        assert!(vector.defaulted[2]);
        assert_eq!(vector.defaulted_count(), 14);
    }

    #[test]
    fn test_empty_payload_is_all_zero() {
        let payload = RawPayload::default();
        assert!(payload.is_empty());
        let vector = FeaturePipeline::unscaled().extract_payload(&payload);
        assert_eq!(vector.values, [0.0; FEATURE_DIMENSION]);
        assert_eq!(vector.defaulted_count(), FEATURE_DIMENSION);
    }

    #[test]
    fn test_scaler_applied() {
        let scaler = MinMaxScaler::new(vec![0.0; FEATURE_DIMENSION], vec![200.0; FEATURE_DIMENSION], (0.0, 1.0))
            .unwrap();
        let pipeline = FeaturePipeline::with_scaler(Arc::new(scaler)).unwrap();
        let vector = pipeline.extract_frame(&indexed_frame());

        assert!(vector.scaled);
        assert!((vector.values[0] - 0.01).abs() < 1e-6);
        assert!((vector.values[14] - 0.505).abs() < 1e-6);
    }

    #[test]
    fn test_scaler_layout_checked() {
        let wrong_width = MinMaxScaler::new(vec![0.0; 24], vec![1.0; 24], (0.0, 1.0)).unwrap();
        assert!(FeaturePipeline::with_scaler(Arc::new(wrong_width)).is_err());

        let mut names: Vec<String> = FEATURE_NAMES.iter().map(|s| s.to_string()).collect();
        names.swap(0, 1);
        let reordered = identity_scaler().with_feature_names(names);
        assert!(matches!(
            FeaturePipeline::with_scaler(Arc::new(reordered)),
            Err(ScalerError::FeatureOrder { position: 0, .. })
        ));

        assert!(FeaturePipeline::with_scaler(Arc::new(identity_scaler())).is_ok());
    }

    proptest! {
        #[test]
        fn prop_payload_always_sixteen_wide(
            fields in proptest::collection::btree_map(
                prop_oneof![
                    (1usize..=21).prop_map(|i| format!("sensor_measurement_{}", i)),
                    (1usize..=3).prop_map(|i| format!("op_setting_{}", i)),
                    "[a-z_]{1,12}",
                ],
                -1.0e4f64..1.0e4,
                0..30,
            ),
        ) {
            let payload = RawPayload::Fields(
                fields.iter().map(|(k, v)| (k.clone(), Value::from(*v))).collect(),
            );
            let pipeline = FeaturePipeline::unscaled();
            let first = pipeline.extract_payload(&payload);
            let second = pipeline.extract_payload(&payload);

            prop_assert_eq!(first.values.len(), FEATURE_DIMENSION);
            prop_assert!(first.values.iter().all(|v| v.is_finite()));
            prop_assert_eq!(&first, &second);

            for (idx, name) in FEATURE_NAMES.iter().enumerate() {
                prop_assert_eq!(first.defaulted[idx], !fields.contains_key(*name));
            }
        }
    }
}
