//! Forward-Only Network Layers
//!
//! All layers operate on `(time, channels)` matrices for a single sequence.

use crate::params::ModelParameters;
use crate::ArtifactError;
use ndarray::{s, Array1, Array2, ArrayView2, Axis};

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax over each row, in place
pub(crate) fn softmax_rows(scores: &mut Array2<f32>) {
    for mut row in scores.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
}

/// Sinusoidal position table of shape `(positions, dim)`
///
/// Column `i` uses angle `pos / 10000^(2 * (i / 2) / dim)`; even columns take
/// the sine, odd columns the cosine.
pub fn positional_encoding(positions: usize, dim: usize) -> Array2<f32> {
    Array2::from_shape_fn((positions, dim), |(pos, i)| {
        let exponent = (2 * (i / 2)) as f64 / dim as f64;
        let angle = pos as f64 / 10000f64.powf(exponent);
        if i % 2 == 0 {
            angle.sin() as f32
        } else {
            angle.cos() as f32
        }
    })
}

/// Affine projection `x · Wᵀ + b`
#[derive(Debug, Clone)]
pub(crate) struct Linear {
    /// Stored transposed as `(in, out)`
    weight_t: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    pub(crate) fn from_parameters(
        params: &ModelParameters,
        prefix: &str,
        out_dim: usize,
        in_dim: usize,
    ) -> Result<Self, ArtifactError> {
        let weight = params.matrix(&format!("{prefix}.weight"), out_dim, in_dim)?;
        let bias = params.vector(&format!("{prefix}.bias"), out_dim)?;
        Ok(Self {
            weight_t: weight.reversed_axes(),
            bias,
        })
    }

    pub(crate) fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        x.dot(&self.weight_t) + &self.bias
    }
}

/// Two same-length 1-D convolutions over time, the second gated by a sigmoid
#[derive(Debug, Clone)]
pub(crate) struct GatedConv {
    /// One `(in, out)` matrix per kernel tap
    value_taps: Vec<Array2<f32>>,
    value_bias: Array1<f32>,
    gate_taps: Vec<Array2<f32>>,
    gate_bias: Array1<f32>,
}

impl GatedConv {
    pub(crate) fn from_parameters(
        params: &ModelParameters,
        prefix: &str,
        out_dim: usize,
        in_dim: usize,
        kernel_size: usize,
    ) -> Result<Self, ArtifactError> {
        let taps = |name: &str| -> Result<Vec<Array2<f32>>, ArtifactError> {
            let kernel = params.kernel(&format!("{prefix}.{name}.weight"), out_dim, in_dim, kernel_size)?;
            Ok((0..kernel_size)
                .map(|j| kernel.slice(s![.., .., j]).t().to_owned())
                .collect())
        };

        Ok(Self {
            value_taps: taps("conv")?,
            value_bias: params.vector(&format!("{prefix}.conv.bias"), out_dim)?,
            gate_taps: taps("gate")?,
            gate_bias: params.vector(&format!("{prefix}.gate.bias"), out_dim)?,
        })
    }

    /// Cross-correlation with `kernel / 2` zero padding on both ends
    fn branch(taps: &[Array2<f32>], bias: &Array1<f32>, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let len = x.nrows();
        let pad = taps.len() / 2;
        let mut out = Array2::<f32>::zeros((len, bias.len())) + bias;

        for (j, tap) in taps.iter().enumerate() {
            // output row t reads input row t + j - pad
            let shift = j.abs_diff(pad);
            if shift >= len {
                continue;
            }
            let (dst, src) = if j >= pad {
                (0..len - shift, shift..len)
            } else {
                (shift..len, 0..len - shift)
            };
            let contribution = x.slice(s![src, ..]).dot(tap);
            let mut target = out.slice_mut(s![dst, ..]);
            target += &contribution;
        }
        out
    }

    pub(crate) fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let value = Self::branch(&self.value_taps, &self.value_bias, x);
        let gate = Self::branch(&self.gate_taps, &self.gate_bias, x).mapv(sigmoid);
        value * gate
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LayerNorm {
    gamma: Array1<f32>,
    beta: Array1<f32>,
    eps: f32,
}

impl LayerNorm {
    pub(crate) fn from_parameters(
        params: &ModelParameters,
        prefix: &str,
        dim: usize,
        eps: f32,
    ) -> Result<Self, ArtifactError> {
        Ok(Self {
            gamma: params.vector(&format!("{prefix}.weight"), dim)?,
            beta: params.vector(&format!("{prefix}.bias"), dim)?,
            eps,
        })
    }

    /// Normalize each row with the biased variance
    pub(crate) fn forward(&self, mut x: Array2<f32>) -> Array2<f32> {
        for mut row in x.rows_mut() {
            let n = row.len() as f32;
            let mean = row.sum() / n;
            let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n;
            let inv_std = 1.0 / (var + self.eps).sqrt();
            row.iter_mut()
                .zip(self.gamma.iter().zip(self.beta.iter()))
                .for_each(|(v, (g, b))| *v = (*v - mean) * inv_std * g + b);
        }
        x
    }
}

/// Unmasked scaled dot-product self-attention split across heads
#[derive(Debug, Clone)]
pub(crate) struct MultiHeadAttention {
    wq: Linear,
    wk: Linear,
    wv: Linear,
    dense: Linear,
    num_heads: usize,
}

impl MultiHeadAttention {
    pub(crate) fn from_parameters(
        params: &ModelParameters,
        prefix: &str,
        dim: usize,
        num_heads: usize,
    ) -> Result<Self, ArtifactError> {
        Ok(Self {
            wq: Linear::from_parameters(params, &format!("{prefix}.wq"), dim, dim)?,
            wk: Linear::from_parameters(params, &format!("{prefix}.wk"), dim, dim)?,
            wv: Linear::from_parameters(params, &format!("{prefix}.wv"), dim, dim)?,
            dense: Linear::from_parameters(params, &format!("{prefix}.dense"), dim, dim)?,
            num_heads,
        })
    }

    pub(crate) fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let q = self.wq.forward(x);
        let k = self.wk.forward(x);
        let v = self.wv.forward(x);

        let (len, dim) = q.dim();
        let head_dim = dim / self.num_heads;
        let scale = (head_dim as f32).sqrt();
        let mut heads = Array2::<f32>::zeros((len, dim));

        for h in 0..self.num_heads {
            let cols = h * head_dim..(h + 1) * head_dim;
            let q_h = q.slice(s![.., cols.clone()]);
            let k_h = k.slice(s![.., cols.clone()]);
            let v_h = v.slice(s![.., cols.clone()]);

            let mut scores = q_h.dot(&k_h.t()) / scale;
            softmax_rows(&mut scores);
            heads.slice_mut(s![.., cols]).assign(&scores.dot(&v_h));
        }

        self.dense.forward(heads.view())
    }
}

/// Position-wise `linear2(relu(linear1(x)))`
#[derive(Debug, Clone)]
pub(crate) struct FeedForward {
    linear1: Linear,
    linear2: Linear,
}

impl FeedForward {
    pub(crate) fn from_parameters(
        params: &ModelParameters,
        prefix: &str,
        dim: usize,
        dff: usize,
    ) -> Result<Self, ArtifactError> {
        Ok(Self {
            linear1: Linear::from_parameters(params, &format!("{prefix}.linear1"), dff, dim)?,
            linear2: Linear::from_parameters(params, &format!("{prefix}.linear2"), dim, dff)?,
        })
    }

    pub(crate) fn forward(&self, x: ArrayView2<'_, f32>) -> Array2<f32> {
        let hidden = self.linear1.forward(x).mapv(|v| v.max(0.0));
        self.linear2.forward(hidden.view())
    }
}

/// Mean over the time axis
pub(crate) fn mean_pool(x: &Array2<f32>) -> Option<Array1<f32>> {
    x.mean_axis(Axis(0))
}
