//! Health Assessment
//!
//! Maps a remaining-useful-life estimate to a health status and a heuristic
//! confidence score.

mod status;

pub use status::{
    confidence, HealthAssessment, HealthStatus, HealthThresholds, MAX_CONFIDENCE, MIN_CONFIDENCE,
};
