//! Rotary positional embeddings.
//!
//! Tables are dense `f32` tensors shaped `[n, head_dim]`. Columns `2i` and
//! `2i + 1` share the angle `p * inv_freq[i]`, matching the adjacent-pair
//! rotation Meta's Llama checkpoints were trained with. A [`Rope`] is built
//! once per forward pass at the total sequence length and shared by every
//! layer; [`Rope::apply`] then rotates any contiguous position range, which is
//! what lets decode steps rotate only the newly produced positions.

use std::f64::consts::PI;

use candle_core::{bail, DType, Device, Result, Tensor};
use checkpoint::{ModelConfig, RopeScalingParams};

/// Configuration for building rotary positional embeddings.
#[derive(Debug, Clone, PartialEq)]
pub struct RopeConfig {
    /// Per-head dimensionality of the rotated representations (64 or 128 for Llama).
    pub head_dim: usize,
    /// Base angle θ of the frequency spectrum.
    pub rope_theta: f64,
    /// Frequency adjustment for extended context windows.
    pub scaling: RopeScaling,
}

/// Frequency scaling strategies.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RopeScaling {
    /// Plain geometric schedule.
    #[default]
    None,
    /// Llama 3.1 wavelength-dependent scaling: high frequencies are kept,
    /// low frequencies divided by `factor`, and the band in between is
    /// interpolated smoothly.
    Llama3 {
        factor: f64,
        low_freq_factor: f64,
        high_freq_factor: f64,
        original_max_position_embeddings: usize,
    },
}

impl From<RopeScalingParams> for RopeScaling {
    fn from(params: RopeScalingParams) -> Self {
        RopeScaling::Llama3 {
            factor: params.factor,
            low_freq_factor: params.low_freq_factor,
            high_freq_factor: params.high_freq_factor,
            original_max_position_embeddings: params.original_max_position_embeddings,
        }
    }
}

impl Default for RopeConfig {
    fn default() -> Self {
        Self {
            head_dim: 0,
            rope_theta: 10_000.0,
            scaling: RopeScaling::default(),
        }
    }
}

impl RopeConfig {
    pub fn new(head_dim: usize, rope_theta: f64) -> Self {
        Self {
            head_dim,
            rope_theta,
            scaling: RopeScaling::None,
        }
    }

    pub fn from_model_config(config: &ModelConfig) -> Self {
        Self {
            head_dim: config.d_head,
            rope_theta: config.rope_theta,
            scaling: config
                .rope_scaling
                .map(RopeScaling::from)
                .unwrap_or_default(),
        }
    }

    /// `theta^(-2i / head_dim)` for each rotated pair, after scaling.
    pub fn inverse_frequencies(&self) -> Vec<f64> {
        let half_dim = self.head_dim / 2;
        let mut freqs: Vec<f64> = (0..half_dim)
            .map(|i| self.rope_theta.powf(-((2 * i) as f64) / self.head_dim as f64))
            .collect();

        if let RopeScaling::Llama3 {
            factor,
            low_freq_factor,
            high_freq_factor,
            original_max_position_embeddings,
        } = self.scaling
        {
            let old_context_len = original_max_position_embeddings as f64;
            let low_freq_wavelen = old_context_len / low_freq_factor;
            let high_freq_wavelen = old_context_len / high_freq_factor;
            for freq in &mut freqs {
                let wavelen = 2.0 * PI / *freq;
                if wavelen < high_freq_wavelen {
                    continue;
                }
                if wavelen > low_freq_wavelen {
                    *freq /= factor;
                } else {
                    let smooth = (old_context_len / wavelen - low_freq_factor)
                        / (high_freq_factor - low_freq_factor);
                    *freq = (1.0 - smooth) * *freq / factor + smooth * *freq;
                }
            }
        }

        freqs
    }
}

/// Cosine and sine tables for positions `0..len`.
#[derive(Debug, Clone)]
pub struct Rope {
    cos: Tensor,
    sin: Tensor,
    head_dim: usize,
    len: usize,
}

impl Rope {
    /// Builds tables for positions `0..n`.
    pub fn create(config: &RopeConfig, n: usize, device: &Device) -> Result<Self> {
        if n == 0 {
            bail!("rope length must be non-zero");
        }
        if config.head_dim == 0 || config.head_dim % 2 != 0 {
            bail!(
                "rope head_dim must be a positive even number, got {}",
                config.head_dim
            );
        }

        let head_dim = config.head_dim;
        let inv_freqs = config.inverse_frequencies();
        let mut cos_data = Vec::with_capacity(n * head_dim);
        let mut sin_data = Vec::with_capacity(n * head_dim);
        for pos in 0..n {
            for &inv_freq in &inv_freqs {
                let angle = pos as f64 * inv_freq;
                let (sin, cos) = angle.sin_cos();
                cos_data.extend([cos as f32, cos as f32]);
                sin_data.extend([sin as f32, sin as f32]);
            }
        }
        log::debug!("rope tables: n={} head_dim={} scaling={:?}", n, head_dim, config.scaling);

        Ok(Self {
            cos: Tensor::from_vec(cos_data, (n, head_dim), device)?,
            sin: Tensor::from_vec(sin_data, (n, head_dim), device)?,
            head_dim,
            len: n,
        })
    }

    /// Number of positions covered by the tables.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head_dim(&self) -> usize {
        self.head_dim
    }

    pub fn cos(&self) -> &Tensor {
        &self.cos
    }

    pub fn sin(&self) -> &Tensor {
        &self.sin
    }

    /// Rotates `x` shaped `[batch, heads, length, head_dim]` using table rows
    /// `start_offset..start_offset + length`.
    ///
    /// Computed in `f32`; the output keeps the dtype of `x`.
    pub fn apply(&self, x: &Tensor, start_offset: usize) -> Result<Tensor> {
        let (batch, heads, seq_len, head_dim) = x.dims4()?;
        if head_dim != self.head_dim {
            bail!(
                "rope expects head_dim {}, got tensor {:?}",
                self.head_dim,
                x.dims()
            );
        }
        if start_offset + seq_len > self.len {
            bail!(
                "rope table covers {} positions, need {}..{}",
                self.len,
                start_offset,
                start_offset + seq_len
            );
        }

        let dtype = x.dtype();
        let x = x.to_dtype(DType::F32)?;
        let cos = self
            .cos
            .narrow(0, start_offset, seq_len)?
            .reshape((1, 1, seq_len, head_dim))?;
        let sin = self
            .sin
            .narrow(0, start_offset, seq_len)?
            .reshape((1, 1, seq_len, head_dim))?;

        let rotated = rotate_pairs(&x, (batch, heads, seq_len, head_dim))?;
        let out = (x.broadcast_mul(&cos)? + rotated.broadcast_mul(&sin)?)?;
        out.to_dtype(dtype)
    }
}

/// Maps each adjacent pair `(x0, x1)` to `(-x1, x0)`.
fn rotate_pairs(x: &Tensor, dims: (usize, usize, usize, usize)) -> Result<Tensor> {
    let (batch, heads, seq_len, head_dim) = dims;
    let pairs = x.reshape((batch, heads, seq_len, head_dim / 2, 2))?;
    let even = pairs.narrow(4, 0, 1)?;
    let odd = pairs.narrow(4, 1, 1)?;
    Tensor::cat(&[&odd.neg()?, &even], 4)?.reshape((batch, heads, seq_len, head_dim))
}
