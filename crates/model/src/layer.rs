//! One decoder block of the stack.

use attention::{Attention, Config as AttentionConfig, LayerKVCache};
use candle_core::Tensor;
use checkpoint::{ModelConfig, ParameterStore};
use embedding::Rope;
use layers::FeedForward;

use crate::errors::Result;

/// One decoder block: pre-norm attention followed by the pre-norm gated MLP,
/// each with its own residual connection.
#[derive(Debug, Clone)]
pub struct Layer {
    attention: Attention,
    feed_forward: FeedForward,
}

impl Layer {
    /// Loads `{path}.attention` and `{path}.feed_forward`, `path` being
    /// `layers.{i}`.
    pub fn create(config: &ModelConfig, params: &ParameterStore, path: &str) -> Result<Self> {
        Ok(Self {
            attention: Attention::create(config, params, &format!("{path}.attention"))?,
            feed_forward: FeedForward::create(config, params, &format!("{path}.feed_forward"))?,
        })
    }

    pub fn forward(
        &self,
        config: &AttentionConfig,
        rope: &Rope,
        mask: &Tensor,
        cache: &LayerKVCache,
        x: &Tensor,
    ) -> Result<(Tensor, LayerKVCache)> {
        let (hidden, cache) = self.attention.forward(config, rope, mask, cache, x)?;
        Ok((self.feed_forward.forward(&hidden)?, cache))
    }
}
