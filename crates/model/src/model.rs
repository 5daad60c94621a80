//! The full decoder: token embedding, the stack of layers and the output head.
//!
//! A forward call builds one rotary table and one causal mask sized for the
//! new tokens, threads a [`attention::MutableKVCache`] through the layers when
//! the caller supplied a cache, and freezes it into the returned
//! [`ForwardOutput`].

use std::path::Path;

use attention::{attention_mask, Config as AttentionConfig, KVCache};
use candle_core::{DType, Device, Tensor};
use checkpoint::{load_config, load_parameters, ModelConfig, ParameterStore};
use embedding::{Rope, RopeConfig, TokenEmbedding};

use crate::{
    errors::{ModelError, Result},
    head::Head,
    layer::Layer,
};

/// Result of a forward pass.
///
/// Which variant is returned depends only on whether the caller supplied a
/// cache: a stateless call yields bare logits, an incremental one also yields
/// the extended cache.
#[derive(Debug, Clone)]
pub enum ForwardOutput {
    Logits(Tensor),
    Cached { logits: Tensor, cache: KVCache },
}

impl ForwardOutput {
    pub fn logits(&self) -> &Tensor {
        match self {
            ForwardOutput::Logits(logits) | ForwardOutput::Cached { logits, .. } => logits,
        }
    }

    pub fn cache(&self) -> Option<&KVCache> {
        match self {
            ForwardOutput::Logits(_) => None,
            ForwardOutput::Cached { cache, .. } => Some(cache),
        }
    }

    pub fn into_parts(self) -> (Tensor, Option<KVCache>) {
        match self {
            ForwardOutput::Logits(logits) => (logits, None),
            ForwardOutput::Cached { logits, cache } => (logits, Some(cache)),
        }
    }
}

/// Decoder-only Llama transformer loaded from a checkpoint.
#[derive(Debug, Clone)]
pub struct Model {
    config: ModelConfig,
    embedding: TokenEmbedding,
    layers: Vec<Layer>,
    head: Head,
    rope_config: RopeConfig,
    attention_config: AttentionConfig,
}

impl Model {
    /// Builds the embedding, `n_layers` decoder layers (`layers.{i}`) and the head.
    pub fn create(config: ModelConfig, params: &ParameterStore) -> Result<Self> {
        config.validate()?;
        let embedding = TokenEmbedding::create(&config, params, "tok_embeddings")?;
        let layers = (0..config.n_layers)
            .map(|index| Layer::create(&config, params, &format!("layers.{index}")))
            .collect::<Result<Vec<_>>>()?;
        let head = Head::create(&config, params, &embedding)?;

        log::info!(
            "model ready: {} layers, {} heads ({} kv), d_model={}, vocab={}, tied_head={}",
            config.n_layers,
            config.n_heads,
            config.n_kv_heads,
            config.d_model,
            config.vocab_size,
            head.is_tied()
        );

        Ok(Self {
            rope_config: RopeConfig::from_model_config(&config),
            attention_config: AttentionConfig::default(),
            config,
            embedding,
            layers,
            head,
        })
    }

    /// Reads `params.json` and the weights from a checkpoint directory.
    pub fn load(dir: impl AsRef<Path>, dtype: DType, device: &Device) -> Result<Self> {
        let dir = dir.as_ref();
        let config = load_config(dir, dtype, device)?;
        let params = load_parameters(&config, dir)?;
        Self::create(config, &params)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// A cache with one empty slot per layer.
    pub fn empty_cache(&self) -> KVCache {
        KVCache::new(self.config.n_layers)
    }

    /// Runs `tokens` (`(batch, length)` ids) through the model.
    ///
    /// Logits are `(batch, length, vocab_size)`. With `cache` set, the new
    /// positions continue after the cached ones and the extended cache is
    /// returned alongside the logits.
    pub fn forward(&self, tokens: &Tensor, cache: Option<&KVCache>) -> Result<ForwardOutput> {
        let (hidden, next) = self.decode(tokens, cache)?;
        let logits = self.head.forward(&hidden)?;
        Ok(wrap(logits, cache.map(|_| next)))
    }

    /// Like [`Model::forward`] but projects only the last position, yielding
    /// `(batch, vocab_size)` logits.
    pub fn forward_last(&self, tokens: &Tensor, cache: Option<&KVCache>) -> Result<ForwardOutput> {
        let (hidden, next) = self.decode(tokens, cache)?;
        let logits = self.head.forward_last(&hidden)?;
        Ok(wrap(logits, cache.map(|_| next)))
    }

    /// Last-position logits plus the extended cache, for decode loops.
    pub(crate) fn step(&self, tokens: &Tensor, cache: &KVCache) -> Result<(Tensor, KVCache)> {
        let (hidden, next) = self.decode(tokens, Some(cache))?;
        Ok((self.head.forward_last(&hidden)?, next))
    }

    fn decode(&self, tokens: &Tensor, cache: Option<&KVCache>) -> Result<(Tensor, KVCache)> {
        let (batch, query_len) = tokens.dims2().map_err(|_| {
            ModelError::InvalidInput(format!(
                "tokens must be shaped [batch, length], got {:?}",
                tokens.dims()
            ))
        })?;
        let empty;
        let cache = match cache {
            Some(cache) if cache.n_layers() != self.layers.len() => {
                return Err(ModelError::InvalidInput(format!(
                    "cache has {} layers, model has {}",
                    cache.n_layers(),
                    self.layers.len()
                )))
            }
            Some(cache) => cache,
            None => {
                empty = self.empty_cache();
                &empty
            }
        };

        let cached_len = cache.length();
        let total_len = cached_len + query_len;
        log::debug!(
            "forward: batch={batch} cached={cached_len} query={query_len} total={total_len}"
        );

        let device = &self.config.device;
        let rope = Rope::create(&self.rope_config, total_len, device)?;
        let mask = attention_mask(query_len, self.config.dtype, device)?;

        let mut hidden = self.embedding.forward(tokens)?;
        let mut staging = cache.to_mutable();
        for (index, layer) in self.layers.iter().enumerate() {
            let (next_hidden, layer_cache) = layer.forward(
                &self.attention_config,
                &rope,
                &mask,
                staging.get(index)?,
                &hidden,
            )?;
            staging.set(index, layer_cache)?;
            hidden = next_hidden;
        }

        Ok((hidden, staging.freeze()))
    }
}

fn wrap(logits: Tensor, cache: Option<KVCache>) -> ForwardOutput {
    match cache {
        Some(cache) => ForwardOutput::Cached { logits, cache },
        None => ForwardOutput::Logits(logits),
    }
}
