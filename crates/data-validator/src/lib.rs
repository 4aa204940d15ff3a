//! Data Validation and Scaling
//!
//! Shape and finiteness checks for model input tensors, plus the min-max
//! scaler fitted at training time and replayed at inference.

mod error;
mod normalizer;
mod report;
mod validator;

pub use error::{ScalerError, ValidationError};
pub use normalizer::{FeatureScaler, MinMaxScaler};
pub use report::TensorReport;
pub use validator::SequenceValidator;
