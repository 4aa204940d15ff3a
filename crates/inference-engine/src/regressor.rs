//! Sequence Regressor
//!
//! Gated convolution embedding, sinusoidal positions, a stack of post-norm
//! self-attention encoder layers, mean pooling and a sigmoid regression head
//! scaled to the RUL cap. Dropout is a training-time concern and is absent.

use crate::config::ModelConfig;
use crate::layers::{
    mean_pool, positional_encoding, sigmoid, FeedForward, GatedConv, LayerNorm, Linear,
    MultiHeadAttention,
};
use crate::params::ModelParameters;
use crate::{ArtifactError, InferenceError};
use ndarray::{s, Array2, ArrayView2, Axis};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct EncoderLayer {
    mha: MultiHeadAttention,
    ffn: FeedForward,
    layernorm1: LayerNorm,
    layernorm2: LayerNorm,
}

impl EncoderLayer {
    fn from_parameters(
        params: &ModelParameters,
        config: &ModelConfig,
        index: usize,
    ) -> Result<Self, ArtifactError> {
        let prefix = format!("encoder_layers.{index}");
        let d = config.embed_dim;
        Ok(Self {
            mha: MultiHeadAttention::from_parameters(params, &format!("{prefix}.mha"), d, config.num_heads)?,
            ffn: FeedForward::from_parameters(params, &format!("{prefix}.ffn"), d, config.dff)?,
            layernorm1: LayerNorm::from_parameters(params, &format!("{prefix}.layernorm1"), d, config.layer_norm_eps)?,
            layernorm2: LayerNorm::from_parameters(params, &format!("{prefix}.layernorm2"), d, config.layer_norm_eps)?,
        })
    }

    fn forward(&self, x: Array2<f32>) -> Array2<f32> {
        let attended = self.mha.forward(x.view());
        let out1 = self.layernorm1.forward(x + &attended);
        let transformed = self.ffn.forward(out1.view());
        self.layernorm2.forward(out1 + &transformed)
    }
}

/// Trained RUL regressor, read-only and shareable across threads
#[derive(Debug, Clone)]
pub struct SequenceRegressor {
    config: ModelConfig,
    gcu: GatedConv,
    linear_gcu: Linear,
    pos_encoding: Array2<f32>,
    encoder_layers: Vec<EncoderLayer>,
    regression_linear: Linear,
}

impl SequenceRegressor {
    /// Build from named parameters, checking every expected shape
    pub fn from_parameters(config: ModelConfig, params: &ModelParameters) -> Result<Self, ArtifactError> {
        config.validate()?;

        let expected: HashSet<String> = config
            .parameter_shapes()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        let extras: Vec<&str> = params.names().filter(|n| !expected.contains(*n)).collect();
        if !extras.is_empty() {
            warn!(count = extras.len(), ?extras, "Ignoring unexpected model parameters");
        }

        let d = config.embed_dim;
        let gcu = GatedConv::from_parameters(params, "gcu", d, config.input_dim, config.kernel_size)?;
        let linear_gcu = Linear::from_parameters(params, "linear_gcu", d, d)?;
        let encoder_layers = (0..config.num_layers)
            .map(|n| EncoderLayer::from_parameters(params, &config, n))
            .collect::<Result<Vec<_>, _>>()?;
        let regression_linear = Linear::from_parameters(params, "regression_linear", 1, d)?;
        let pos_encoding = positional_encoding(config.max_positions, d);

        info!(
            layers = config.num_layers,
            heads = config.num_heads,
            embed_dim = d,
            "Built sequence regressor"
        );

        Ok(Self {
            config,
            gcu,
            linear_gcu,
            pos_encoding,
            encoder_layers,
            regression_linear,
        })
    }

    /// Load a JSON state dict from disk
    pub fn load(path: impl AsRef<Path>, config: ModelConfig) -> Result<Self, ArtifactError> {
        let params = ModelParameters::load(path)?;
        Self::from_parameters(config, &params)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Number of learned scalars
    pub fn parameter_count(&self) -> usize {
        self.config
            .parameter_shapes()
            .iter()
            .map(|(_, shape)| shape.iter().product::<usize>())
            .sum()
    }

    /// Predict RUL in `[0, max_rul]` for one `(time, input_dim)` sequence
    pub fn forward(&self, input: ArrayView2<'_, f32>) -> Result<f32, InferenceError> {
        let (len, width) = input.dim();
        if width != self.config.input_dim || len == 0 || len > self.config.max_positions {
            return Err(InferenceError::failed(
                "input",
                format!(
                    "sequence shape ({len}, {width}) outside (1..={}, {})",
                    self.config.max_positions, self.config.input_dim
                ),
            ));
        }

        let embedded = self.gcu.forward(input);
        let mut x = self.linear_gcu.forward(embedded.view());
        x += &self.pos_encoding.slice(s![..len, ..]);
        ensure_finite("embedding", &x)?;

        for (n, layer) in self.encoder_layers.iter().enumerate() {
            x = layer.forward(x);
            if let Some((row, col)) = first_non_finite(&x) {
                return Err(InferenceError::failed(
                    "encoder",
                    format!("layer {n} produced non-finite value at ({row}, {col})"),
                ));
            }
        }

        let pooled = mean_pool(&x).ok_or_else(|| InferenceError::failed("pooling", "empty sequence"))?;
        let logit = self.regression_linear.forward(pooled.insert_axis(Axis(0)).view())[[0, 0]];
        if !logit.is_finite() {
            return Err(InferenceError::failed(
                "regression_head",
                format!("non-finite logit {logit}"),
            ));
        }

        let rul = sigmoid(logit) * self.config.max_rul;
        debug!(logit, rul, "Forward pass complete");
        Ok(rul.clamp(0.0, self.config.max_rul))
    }
}

fn first_non_finite(x: &Array2<f32>) -> Option<(usize, usize)> {
    x.indexed_iter()
        .find(|(_, v)| !v.is_finite())
        .map(|(idx, _)| idx)
}

fn ensure_finite(stage: &'static str, x: &Array2<f32>) -> Result<(), InferenceError> {
    match first_non_finite(x) {
        Some((row, col)) => Err(InferenceError::failed(
            stage,
            format!("non-finite value at ({row}, {col})"),
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seeded_regressor(seed: u64) -> SequenceRegressor {
        let config = ModelConfig::default();
        let params = ModelParameters::seeded(&config, seed);
        SequenceRegressor::from_parameters(config, &params).unwrap()
    }

    fn zero_head_regressor(seed: u64) -> SequenceRegressor {
        let config = ModelConfig::default();
        let mut params = ModelParameters::seeded(&config, seed);
        for name in ["regression_linear.weight", "regression_linear.bias"] {
            params.get_mut(name).unwrap().fill(0.0);
        }
        SequenceRegressor::from_parameters(config, &params).unwrap()
    }

    #[test]
    fn test_zero_head_is_constant_midpoint() {
        let model = zero_head_regressor(11);
        let zeros = Array2::<f32>::zeros((50, 16));
        let ramp = Array2::from_shape_fn((50, 16), |(t, f)| (t * 16 + f) as f32 / 800.0);
        let spikes = Array2::from_shape_fn((50, 16), |(t, _)| if t % 7 == 0 { 3.0 } else { -1.0 });

        for input in [zeros, ramp, spikes] {
            assert_eq!(model.forward(input.view()).unwrap(), 62.5);
        }
    }

    #[test]
    fn test_output_within_bounds() {
        let model = seeded_regressor(5);
        let input = Array2::from_shape_fn((50, 16), |(t, f)| ((t + f) % 5) as f32 * 0.25);
        let rul = model.forward(input.view()).unwrap();
        assert!((0.0..=125.0).contains(&rul));
    }

    #[test]
    fn test_forward_is_deterministic() {
        let model = seeded_regressor(9);
        let input = Array2::from_shape_fn((50, 16), |(t, f)| (t as f32 - f as f32) / 50.0);
        assert_eq!(
            model.forward(input.view()).unwrap(),
            model.forward(input.view()).unwrap()
        );
    }

    #[test]
    fn test_rejects_wrong_width() {
        let model = seeded_regressor(1);
        let input = Array2::<f32>::zeros((50, 15));
        assert!(matches!(
            model.forward(input.view()),
            Err(InferenceError::InferenceFailed { stage: "input", .. })
        ));
    }

    #[test]
    fn test_non_finite_input_reports_stage() {
        let model = seeded_regressor(1);
        let mut input = Array2::<f32>::zeros((50, 16));
        input[[10, 3]] = f32::NAN;
        match model.forward(input.view()) {
            Err(InferenceError::InferenceFailed { stage, .. }) => assert_eq!(stage, "embedding"),
            other => panic!("expected forward failure, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_parameter_fails_load() {
        let config = ModelConfig::default();
        let params = ModelParameters::seeded(&config, 2);
        let mut pruned = ModelParameters::new();
        for name in params.names() {
            if name != "encoder_layers.1.ffn.linear2.bias" {
                pruned.insert(name, params.get(name).unwrap().clone());
            }
        }
        assert!(matches!(
            SequenceRegressor::from_parameters(config, &pruned),
            Err(ArtifactError::MissingParameter(name)) if name == "encoder_layers.1.ffn.linear2.bias"
        ));
    }

    #[test]
    fn test_extra_parameters_ignored() {
        let config = ModelConfig::default();
        let mut params = ModelParameters::seeded(&config, 2);
        params.insert("num_batches_tracked", ndarray::ArrayD::zeros(ndarray::IxDyn(&[])));
        assert!(SequenceRegressor::from_parameters(config, &params).is_ok());
    }

    #[test]
    fn test_parameter_count() {
        let model = seeded_regressor(0);
        // gcu 2*(64*16*3+64), linear_gcu 64*64+64, per layer 4*(64*64+64) + (128*64+128)
        // + (64*128+64) + 4*64, head 64+1
        let gcu = 2 * (64 * 16 * 3 + 64);
        let linear_gcu = 64 * 64 + 64;
        let layer = 4 * (64 * 64 + 64) + (128 * 64 + 128) + (64 * 128 + 64) + 4 * 64;
        assert_eq!(model.parameter_count(), gcu + linear_gcu + 2 * layer + 65);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_output_in_range(values in proptest::collection::vec(-50.0f32..50.0, 50 * 16)) {
            let model = seeded_regressor(21);
            let input = Array2::from_shape_vec((50, 16), values).unwrap();
            let rul = model.forward(input.view()).unwrap();
            prop_assert!((0.0..=125.0).contains(&rul));
        }

        #[test]
        fn prop_zero_head_constant(values in proptest::collection::vec(-5.0f32..5.0, 50 * 16)) {
            let model = zero_head_regressor(4);
            let input = Array2::from_shape_vec((50, 16), values).unwrap();
            prop_assert_eq!(model.forward(input.view()).unwrap(), 62.5);
        }
    }
}
