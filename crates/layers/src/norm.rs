//! Root mean square normalisation as used by Llama decoder blocks.
//!
//! Inputs follow the `(batch, seq, hidden)` convention. Normalisation happens
//! along the last axis; the mean square is accumulated in
//! [`PrecisionPolicy::reduction`] before the learned scale is applied and the
//! output cast back to storage.

use candle_core::{Result, Tensor, D};
use checkpoint::{ModelConfig, ParameterStore};

use crate::{checkpoint_err, checks, dtypes::PrecisionPolicy};

/// Configuration of an RMS normalisation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct NormConfig {
    /// Size of the hidden dimension being normalised.
    pub hidden_size: usize,
    /// Numeric stabiliser added to the mean square.
    pub epsilon: f64,
}

impl NormConfig {
    pub fn new(hidden_size: usize, epsilon: f64) -> Self {
        Self {
            hidden_size,
            epsilon,
        }
    }

    pub fn from_model_config(config: &ModelConfig) -> Self {
        Self::new(config.d_model, config.rms_norm_eps)
    }
}

/// `y = w * x / sqrt(mean(x²) + eps)` over the last axis.
#[derive(Debug, Clone)]
pub struct RmsNorm {
    config: NormConfig,
    weight: Tensor,
}

impl RmsNorm {
    pub fn new(weight: Tensor, config: NormConfig) -> Result<Self> {
        checks::expect_shape("norm.weight", &weight, &[config.hidden_size])?;
        checks::expect_dtype_in("norm.weight", &weight, checks::PARAMETER_DTYPES)?;
        Ok(Self { config, weight })
    }

    /// Loads `{path}.weight`, e.g. `layers.3.ffn_norm.weight` or `norm.weight`.
    pub fn load(params: &ParameterStore, path: &str, config: NormConfig) -> Result<Self> {
        let key = format!("{path}.weight");
        let weight = params
            .get_with_shape(&key, &[config.hidden_size])
            .map_err(checkpoint_err)?;
        Self::new(weight.clone(), config)
    }

    pub fn config(&self) -> &NormConfig {
        &self.config
    }

    pub fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("norm.input", hidden, self.config.hidden_size)?;

        let compute = policy.cast_for_reduction(hidden)?;
        let mean_square = (compute.sqr()?.sum_keepdim(D::Minus1)? / self.config.hidden_size as f64)?;
        let denom = (mean_square + self.config.epsilon)?.sqrt()?;
        let mut normalized = compute.broadcast_div(&denom)?;

        if normalized.dtype() != policy.compute() {
            normalized = normalized.to_dtype(policy.compute())?;
        }
        let weight = self.weight.to_dtype(normalized.dtype())?;
        normalized = normalized.broadcast_mul(&weight)?;

        policy.cast_to_storage(&normalized)
    }
}
