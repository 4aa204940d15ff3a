//! Regressor Architecture

use crate::ArtifactError;
use serde::{Deserialize, Serialize};

/// Hyperparameters of the trained network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub input_dim: usize,
    pub embed_dim: usize,
    pub num_layers: usize,
    pub num_heads: usize,
    /// Feed-forward hidden width
    pub dff: usize,
    pub kernel_size: usize,
    /// Rows in the positional encoding table
    pub max_positions: usize,
    pub max_rul: f32,
    /// Training-time only; inference ignores it
    pub dropout_rate: f32,
    pub layer_norm_eps: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_dim: 16,
            embed_dim: 64,
            num_layers: 2,
            num_heads: 4,
            dff: 128,
            kernel_size: 3,
            max_positions: 1000,
            max_rul: 125.0,
            dropout_rate: 0.1,
            layer_norm_eps: 1e-5,
        }
    }
}

impl ModelConfig {
    pub fn head_dim(&self) -> usize {
        self.embed_dim / self.num_heads
    }

    /// Reject configurations the forward pass cannot evaluate
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.input_dim == 0 || self.embed_dim == 0 || self.dff == 0 {
            return Err(ArtifactError::InvalidConfig(
                "dimensions must be positive".to_string(),
            ));
        }
        if self.num_heads == 0 || self.embed_dim % self.num_heads != 0 {
            return Err(ArtifactError::InvalidConfig(format!(
                "embed_dim {} not divisible by num_heads {}",
                self.embed_dim, self.num_heads
            )));
        }
        // Same-length padding needs an odd kernel
        if self.kernel_size % 2 == 0 {
            return Err(ArtifactError::InvalidConfig(format!(
                "kernel_size {} must be odd",
                self.kernel_size
            )));
        }
        if !(self.max_rul.is_finite() && self.max_rul > 0.0) {
            return Err(ArtifactError::InvalidConfig(format!(
                "max_rul {} must be positive",
                self.max_rul
            )));
        }
        Ok(())
    }

    /// Every learned parameter with its expected shape
    pub fn parameter_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let (d, f, i, k) = (self.embed_dim, self.dff, self.input_dim, self.kernel_size);
        let mut shapes = vec![
            ("gcu.conv.weight".to_string(), vec![d, i, k]),
            ("gcu.conv.bias".to_string(), vec![d]),
            ("gcu.gate.weight".to_string(), vec![d, i, k]),
            ("gcu.gate.bias".to_string(), vec![d]),
            ("linear_gcu.weight".to_string(), vec![d, d]),
            ("linear_gcu.bias".to_string(), vec![d]),
        ];
        for n in 0..self.num_layers {
            for proj in ["wq", "wk", "wv", "dense"] {
                shapes.push((format!("encoder_layers.{n}.mha.{proj}.weight"), vec![d, d]));
                shapes.push((format!("encoder_layers.{n}.mha.{proj}.bias"), vec![d]));
            }
            shapes.push((format!("encoder_layers.{n}.ffn.linear1.weight"), vec![f, d]));
            shapes.push((format!("encoder_layers.{n}.ffn.linear1.bias"), vec![f]));
            shapes.push((format!("encoder_layers.{n}.ffn.linear2.weight"), vec![d, f]));
            shapes.push((format!("encoder_layers.{n}.ffn.linear2.bias"), vec![d]));
            for norm in ["layernorm1", "layernorm2"] {
                shapes.push((format!("encoder_layers.{n}.{norm}.weight"), vec![d]));
                shapes.push((format!("encoder_layers.{n}.{norm}.bias"), vec![d]));
            }
        }
        shapes.push(("regression_linear.weight".to_string(), vec![1, d]));
        shapes.push(("regression_linear.bias".to_string(), vec![1]));
        shapes
    }
}
