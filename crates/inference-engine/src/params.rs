//! Model Parameter Loading
//!
//! Reads a JSON state dict exported from the trained network. The document is
//! either a flat `name -> tensor` map or nests that map under
//! `model_state_dict` / `state_dict`. A tensor is `{ "shape": [..], "data": [..] }`
//! in row-major order, or plain nested arrays.

use crate::config::ModelConfig;
use crate::ArtifactError;
use ndarray::{Array1, Array2, Array3, ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

const NESTED_KEYS: [&str; 2] = ["model_state_dict", "state_dict"];

#[derive(Debug, Serialize, Deserialize)]
struct ShapedTensor {
    shape: Vec<usize>,
    data: Value,
}

/// Named tensors of a trained regressor, immutable once loaded
#[derive(Debug, Clone, Default)]
pub struct ModelParameters {
    tensors: BTreeMap<String, ArrayD<f32>>,
}

impl ModelParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ArrayD<f32>> {
        self.tensors.get_mut(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Load a state dict from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let params = Self::from_json(&text)?;
        info!(
            path = %path.display(),
            tensors = params.len(),
            "Loaded model parameters"
        );
        Ok(params)
    }

    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Parse either the flat or the nested document shape
    pub fn from_value(value: Value) -> Result<Self, ArtifactError> {
        let Value::Object(mut root) = value else {
            return Err(ArtifactError::Malformed {
                name: "<root>".to_string(),
                reason: "expected a JSON object".to_string(),
            });
        };

        let mut entries = None;
        for key in NESTED_KEYS {
            if matches!(root.get(key), Some(Value::Object(_))) {
                if let Some(Value::Object(inner)) = root.remove(key) {
                    debug!(key, "Using nested state dict");
                    entries = Some(inner);
                    break;
                }
            }
        }
        let entries: Map<String, Value> = entries.unwrap_or(root);

        let mut tensors = BTreeMap::new();
        for (name, value) in entries {
            let tensor = parse_tensor(&name, value)?;
            tensors.insert(name, tensor);
        }
        Ok(Self { tensors })
    }

    /// Serialize as a flat map of `{shape, data}` tensors
    pub fn to_json(&self) -> Result<String, ArtifactError> {
        let mut map = Map::new();
        for (name, tensor) in &self.tensors {
            let shaped = ShapedTensor {
                shape: tensor.shape().to_vec(),
                data: Value::from(tensor.iter().map(|&v| f64::from(v)).collect::<Vec<f64>>()),
            };
            map.insert(name.clone(), serde_json::to_value(shaped)?);
        }
        Ok(serde_json::to_string(&Value::Object(map))?)
    }

    /// Randomly initialized parameters for an architecture
    ///
    /// Weights are uniform in `±1/sqrt(fan_in)`, layer norms start at identity.
    pub fn seeded(config: &ModelConfig, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut tensors = BTreeMap::new();
        let mut bound = 1.0f32;

        for (name, shape) in config.parameter_shapes() {
            let tensor = if name.contains("layernorm") {
                if name.ends_with(".weight") {
                    ArrayD::ones(IxDyn(&shape))
                } else {
                    ArrayD::zeros(IxDyn(&shape))
                }
            } else {
                if name.ends_with(".weight") {
                    let fan_in: usize = shape[1..].iter().product();
                    bound = 1.0 / (fan_in.max(1) as f32).sqrt();
                }
                ArrayD::from_shape_fn(IxDyn(&shape), |_| rng.gen_range(-bound..bound))
            };
            tensors.insert(name, tensor);
        }

        Self { tensors }
    }

    fn checked(&self, name: &str, expected: &[usize]) -> Result<&ArrayD<f32>, ArtifactError> {
        let tensor = self
            .tensors
            .get(name)
            .ok_or_else(|| ArtifactError::MissingParameter(name.to_string()))?;
        if tensor.shape() != expected {
            return Err(ArtifactError::ShapeMismatch {
                name: name.to_string(),
                expected: expected.to_vec(),
                actual: tensor.shape().to_vec(),
            });
        }
        Ok(tensor)
    }

    pub(crate) fn vector(&self, name: &str, len: usize) -> Result<Array1<f32>, ArtifactError> {
        self.checked(name, &[len])?
            .clone()
            .into_dimensionality()
            .map_err(|e| malformed(name, e))
    }

    pub(crate) fn matrix(&self, name: &str, rows: usize, cols: usize) -> Result<Array2<f32>, ArtifactError> {
        self.checked(name, &[rows, cols])?
            .clone()
            .into_dimensionality()
            .map_err(|e| malformed(name, e))
    }

    pub(crate) fn kernel(
        &self,
        name: &str,
        out: usize,
        input: usize,
        width: usize,
    ) -> Result<Array3<f32>, ArtifactError> {
        self.checked(name, &[out, input, width])?
            .clone()
            .into_dimensionality()
            .map_err(|e| malformed(name, e))
    }
}

fn malformed(name: &str, reason: impl ToString) -> ArtifactError {
    ArtifactError::Malformed {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_tensor(name: &str, value: Value) -> Result<ArrayD<f32>, ArtifactError> {
    match value {
        Value::Object(_) => {
            let shaped: ShapedTensor =
                serde_json::from_value(value).map_err(|e| malformed(name, e))?;
            let (_, data) = flatten(name, &shaped.data)?;
            ArrayD::from_shape_vec(IxDyn(&shaped.shape), data).map_err(|e| malformed(name, e))
        }
        Value::Array(_) | Value::Number(_) => {
            let (shape, data) = flatten(name, &value)?;
            ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| malformed(name, e))
        }
        other => Err(malformed(name, format!("unsupported tensor value {other}"))),
    }
}

/// Flatten nested arrays row-major, inferring a rectangular shape
fn flatten(name: &str, value: &Value) -> Result<(Vec<usize>, Vec<f32>), ArtifactError> {
    let mut shape = Vec::new();
    let mut cursor = value;
    while let Value::Array(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }

    let mut data = Vec::with_capacity(shape.iter().product());
    fill(name, value, &shape, 0, &mut data)?;
    Ok((shape, data))
}

fn fill(
    name: &str,
    value: &Value,
    shape: &[usize],
    depth: usize,
    out: &mut Vec<f32>,
) -> Result<(), ArtifactError> {
    match value {
        Value::Array(items) => {
            if depth >= shape.len() || items.len() != shape[depth] {
                return Err(malformed(name, format!("ragged nesting at depth {depth}")));
            }
            items
                .iter()
                .try_for_each(|item| fill(name, item, shape, depth + 1, out))
        }
        Value::Number(n) => {
            if depth != shape.len() {
                return Err(malformed(name, format!("ragged nesting at depth {depth}")));
            }
            let v = n
                .as_f64()
                .ok_or_else(|| malformed(name, format!("non-numeric value {n}")))?;
            out.push(v as f32);
            Ok(())
        }
        other => Err(malformed(name, format!("non-numeric value {other}"))),
    }
}
