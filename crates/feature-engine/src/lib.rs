//! Feature Engineering Engine
//!
//! Turns raw per-cycle telemetry into the fixed `(50, 16)` tensor consumed by
//! the sequence regressor: field selection and scaling, then right-aligned
//! windowing with leading zero padding.

mod features;
mod window;

pub use features::{
    FeaturePipeline, FeatureVector, RawPayload, DROPPED_SENSORS, DROPPED_SETTINGS,
    FEATURE_DIMENSION, FEATURE_NAMES, SELECTED_SENSORS, SELECTED_SETTINGS,
};
pub use window::{Sequence, SequenceWindower, SEQUENCE_LENGTH};
