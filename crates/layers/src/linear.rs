//! Bias-free projections loaded from checkpoint weights.
//!
//! Linear layers expect inputs shaped `(batch, seq, in_dim)` (or `(rows,
//! in_dim)`) and return `(batch, seq, out_dim)`. Weights keep the checkpoint's
//! `(out_features, in_features)` layout, so the forward pass multiplies by the
//! transposed weight. Weights and activations are cast to
//! [`PrecisionPolicy::compute`] for the matmul and the result is returned in
//! [`PrecisionPolicy::storage`].

use candle_core::{Error, Result, Tensor};
use checkpoint::ParameterStore;

use crate::{checkpoint_err, checks, dtypes::PrecisionPolicy};

/// Dimensions of a dense projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
}

impl LinearConfig {
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
        }
    }
}

/// Dense projection `y = x Wᵀ` without bias, as used throughout Llama.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Tensor,
}

impl Linear {
    /// Constructs a linear layer from an `(output_dim, input_dim)` weight.
    pub fn new(config: LinearConfig, weight: Tensor) -> Result<Self> {
        checks::expect_rank("linear.weight", &weight, 2)?;
        checks::expect_shape(
            "linear.weight",
            &weight,
            &[config.output_dim, config.input_dim],
        )?;
        checks::expect_dtype_in("linear.weight", &weight, checks::PARAMETER_DTYPES)?;
        Ok(Self { config, weight })
    }

    /// Loads `{path}.weight` from the parameter store.
    pub fn load(params: &ParameterStore, path: &str, config: LinearConfig) -> Result<Self> {
        let key = format!("{path}.weight");
        let weight = params
            .get_with_shape(&key, &[config.output_dim, config.input_dim])
            .map_err(checkpoint_err)?;
        Self::new(config, weight.clone())
    }

    fn validate_input(&self, hidden: &Tensor) -> Result<()> {
        match hidden.dims() {
            [_, _, hidden_dim] | [_, hidden_dim] if *hidden_dim == self.config.input_dim => Ok(()),
            dims => Err(Error::Msg(format!(
                "linear expects input shaped [B, T, {0}] or [T, {0}], got {dims:?}",
                self.config.input_dim
            ))),
        }
    }

    /// Applies the projection, promoting to the compute dtype for the matmul.
    pub fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        self.validate_input(hidden)?;

        let input = policy.cast_for_matmul(hidden)?;
        let weight_t = policy.cast_for_matmul(&self.weight)?.t()?;

        let output = match *input.dims() {
            [batch, seq, _] => input
                .reshape((batch * seq, self.config.input_dim))?
                .matmul(&weight_t)?
                .reshape((batch, seq, self.config.output_dim))?,
            _ => input.matmul(&weight_t)?,
        };

        policy.cast_to_storage(&output)
    }
}
