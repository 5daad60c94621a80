//! Grouped-query self-attention block of a Llama decoder layer.
//!
//! The block owns its RMS pre-norm and residual connection. Queries use
//! `n_heads` heads while keys and values use `n_kv_heads`; each key/value head
//! is repeated across its group of `n_heads / n_kv_heads` query heads before
//! the scores are computed.

use candle_core::Tensor;
use checkpoint::{ModelConfig, ParameterStore};
use embedding::Rope;
use layers::{Linear, LinearConfig, NormConfig, PrecisionPolicy, RmsNorm};

use crate::{
    core::{AttentionError, AttentionKernel, Config},
    heads::{combine_heads, repeat_kv, split_heads},
    kv_cache::LayerKVCache,
    masks::pad_mask_for_history,
    reference::ExactAttention,
};

/// Projection weights and geometry for one layer's attention.
#[derive(Debug, Clone)]
pub struct Attention {
    norm: RmsNorm,
    queries: Linear,
    keys: Linear,
    values: Linear,
    output: Linear,
    n_heads: usize,
    n_kv_heads: usize,
    n_rep: usize,
    d_model: usize,
    policy: PrecisionPolicy,
    kernel: ExactAttention,
}

impl Attention {
    /// Loads `{path}.{wq,wk,wv,wo}` and the sibling pre-norm
    /// `layers.{i}.attention_norm` for `path = layers.{i}.attention`.
    pub fn create(
        config: &ModelConfig,
        params: &ParameterStore,
        path: &str,
    ) -> Result<Self, AttentionError> {
        let parent = path
            .rsplit_once('.')
            .map(|(parent, _)| parent)
            .ok_or_else(|| {
                AttentionError::shape(format!("attention path `{path}` has no layer prefix"))
            })?;

        if config.n_kv_heads == 0 || config.n_heads % config.n_kv_heads != 0 {
            return Err(AttentionError::shape(format!(
                "n_heads {} must be a positive multiple of n_kv_heads {}",
                config.n_heads, config.n_kv_heads
            )));
        }

        let d_model = config.d_model;
        let d_q = config.n_heads * config.d_head;
        let norm = RmsNorm::load(
            params,
            &format!("{parent}.attention_norm"),
            NormConfig::from_model_config(config),
        )?;
        let queries = Linear::load(params, &format!("{path}.wq"), LinearConfig::new(d_model, d_q))?;
        let keys = Linear::load(
            params,
            &format!("{path}.wk"),
            LinearConfig::new(d_model, config.d_kv()),
        )?;
        let values = Linear::load(
            params,
            &format!("{path}.wv"),
            LinearConfig::new(d_model, config.d_kv()),
        )?;
        let output = Linear::load(params, &format!("{path}.wo"), LinearConfig::new(d_q, d_model))?;
        log::debug!(
            "{path}: {} query heads, {} kv heads, head_dim {}",
            config.n_heads,
            config.n_kv_heads,
            config.d_head
        );

        Ok(Self {
            norm,
            queries,
            keys,
            values,
            output,
            n_heads: config.n_heads,
            n_kv_heads: config.n_kv_heads,
            n_rep: config.n_heads / config.n_kv_heads,
            d_model,
            policy: PrecisionPolicy::for_model(config),
            kernel: ExactAttention,
        })
    }

    /// Runs attention over `x` (`[batch, q_len, d_model]`).
    ///
    /// `rope` must cover `cache.length() + q_len` positions and `mask` is the
    /// `[q_len, q_len]` causal mask shared by every layer of the call. Returns
    /// the residual output with the same shape as `x` and the layer cache
    /// extended by `q_len` positions.
    pub fn forward(
        &self,
        config: &Config,
        rope: &Rope,
        mask: &Tensor,
        cache: &LayerKVCache,
        x: &Tensor,
    ) -> Result<(Tensor, LayerKVCache), AttentionError> {
        let (_, q_len, hidden) = x.dims3().map_err(|_| {
            AttentionError::shape(format!(
                "attention input must be [batch, seq, d_model], got {:?}",
                x.dims()
            ))
        })?;
        if hidden != self.d_model {
            return Err(AttentionError::shape(format!(
                "attention input hidden size {hidden} does not match d_model {}",
                self.d_model
            )));
        }
        if mask.dims() != [q_len, q_len] {
            return Err(AttentionError::shape(format!(
                "mask must be [{q_len}, {q_len}], got {:?}",
                mask.dims()
            )));
        }

        let normed = self.norm.forward(x, &self.policy)?;
        let q = split_heads(&self.queries.forward(&normed, &self.policy)?, self.n_heads)?;
        let k = split_heads(&self.keys.forward(&normed, &self.policy)?, self.n_kv_heads)?;
        let v = split_heads(&self.values.forward(&normed, &self.policy)?, self.n_kv_heads)?;

        let offset = cache.length();
        let q = rope.apply(&q, offset)?;
        let k = rope.apply(&k, offset)?;

        let cache = cache.append(&k, &v)?;
        let (all_keys, all_values) = match (cache.keys(), cache.values()) {
            (Some(keys), Some(values)) => (keys, values),
            _ => return Err(AttentionError::shape("layer cache is empty after append")),
        };

        let all_keys = repeat_kv(all_keys, self.n_rep)?;
        let all_values = repeat_kv(all_values, self.n_rep)?;
        let mask = pad_mask_for_history(mask, offset)?;

        let attended = self
            .kernel
            .attend(&q, &all_keys, &all_values, Some(&mask), config)?;
        let out = self.output.forward(&combine_heads(&attended)?, &self.policy)?;

        Ok(((x + out)?, cache))
    }
}
