//! Gated (SwiGLU) feed-forward block of a Llama decoder layer.
//!
//! The block owns its RMS pre-norm and residual connection:
//! `x + w2(silu(w1(norm(x))) * w3(norm(x)))`. Hidden states are shaped
//! `(batch, seq, hidden)` and the output keeps that layout; `w1` and `w3`
//! expand to `intermediate_size`, `w2` contracts back.

use candle_core::{Error, Result, Tensor};
use checkpoint::{ModelConfig, ParameterStore};

use crate::{
    activations,
    checks,
    dtypes::PrecisionPolicy,
    linear::{Linear, LinearConfig},
    norm::{NormConfig, RmsNorm},
};

/// Dimensions of a feed-forward block.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedForwardConfig {
    /// Model hidden size.
    pub hidden_size: usize,
    /// Width of the gated activation space.
    pub intermediate_size: usize,
    /// Epsilon of the pre-norm.
    pub norm_epsilon: f64,
}

impl FeedForwardConfig {
    pub fn from_model_config(config: &ModelConfig) -> Self {
        Self {
            hidden_size: config.d_model,
            intermediate_size: config.d_ffn,
            norm_epsilon: config.rms_norm_eps,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedForward {
    config: FeedForwardConfig,
    norm: RmsNorm,
    gate: Linear,
    down: Linear,
    up: Linear,
    policy: PrecisionPolicy,
}

impl FeedForward {
    /// Loads the block at `path` (`layers.{i}.feed_forward`) together with its
    /// sibling pre-norm `layers.{i}.ffn_norm`.
    pub fn create(config: &ModelConfig, params: &ParameterStore, path: &str) -> Result<Self> {
        let ff_config = FeedForwardConfig::from_model_config(config);
        let parent = path
            .rsplit_once('.')
            .map(|(parent, _)| parent)
            .ok_or_else(|| Error::Msg(format!("feed-forward path `{path}` has no layer prefix")))?;

        let norm = RmsNorm::load(
            params,
            &format!("{parent}.ffn_norm"),
            NormConfig::new(ff_config.hidden_size, ff_config.norm_epsilon),
        )?;
        let expand = LinearConfig::new(ff_config.hidden_size, ff_config.intermediate_size);
        let contract = LinearConfig::new(ff_config.intermediate_size, ff_config.hidden_size);
        let gate = Linear::load(params, &format!("{path}.w1"), expand)?;
        let down = Linear::load(params, &format!("{path}.w2"), contract)?;
        let up = Linear::load(params, &format!("{path}.w3"), expand)?;
        log::debug!("{path}: d_ffn {}", ff_config.intermediate_size);

        Ok(Self {
            config: ff_config,
            norm,
            gate,
            down,
            up,
            policy: PrecisionPolicy::for_model(config),
        })
    }

    pub fn config(&self) -> &FeedForwardConfig {
        &self.config
    }

    /// Applies norm, gated projection and residual; output shape equals input.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("feed_forward.x", x, self.config.hidden_size)?;

        let normed = self.norm.forward(x, &self.policy)?;
        let gate = activations::silu(&self.gate.forward(&normed, &self.policy)?, &self.policy)?;
        let up = self.policy.cast_for_matmul(&self.up.forward(&normed, &self.policy)?)?;
        let hidden = self.policy.cast_to_storage(&(gate * up)?)?;
        let out = self.down.forward(&hidden, &self.policy)?;

        x + out
    }
}
