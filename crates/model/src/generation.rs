//! Prefill plus token-by-token decoding.

use attention::KVCache;
use candle_core::{DType, Tensor};

use crate::{
    config::GenerationConfig,
    errors::{ModelError, Result},
    model::Model,
    sampling::{sample_tokens, RngKey},
};

/// Drives a [`Model`] with a fixed [`GenerationConfig`].
///
/// The random key lives on the generator, so consecutive calls continue the
/// same stream instead of replaying it.
#[derive(Debug)]
pub struct Generator<'m> {
    model: &'m Model,
    config: GenerationConfig,
    key: Option<RngKey>,
}

impl<'m> Generator<'m> {
    pub fn new(model: &'m Model, config: GenerationConfig) -> Result<Self> {
        config.validate()?;
        let key = Some(RngKey::new(config.seed));
        Ok(Self { model, config, key })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Key the next sampling step will consume.
    pub fn key(&self) -> Option<RngKey> {
        self.key
    }

    /// Generates `max_tokens` ids after `prompt` (`(batch, length)`), returned
    /// as `(batch, max_tokens)` `u32`.
    pub fn generate(&mut self, prompt: &Tensor) -> Result<Tensor> {
        let batch = prompt_batch(prompt)?;
        let device = prompt.device().clone();
        let steps = self.tokens(prompt)?.collect::<Result<Vec<_>>>()?;
        if steps.is_empty() {
            return Ok(Tensor::zeros((batch, 0), DType::U32, &device)?);
        }
        Ok(Tensor::cat(&steps, 1)?)
    }

    /// Lazily yields one `(batch, 1)` tensor of ids per step.
    ///
    /// The first step runs the whole prompt through an empty cache; every
    /// later step feeds back the previously sampled ids.
    pub fn tokens<'g>(&'g mut self, prompt: &Tensor) -> Result<TokenStream<'g, 'm>> {
        prompt_batch(prompt)?;
        let cache = self.model.empty_cache();
        let remaining = self.config.max_tokens;
        Ok(TokenStream {
            generator: self,
            cache,
            input: prompt.clone(),
            step: 0,
            remaining,
        })
    }

    fn sample(&mut self, logits: &Tensor) -> Result<Tensor> {
        let (ids, key) = sample_tokens(
            logits,
            self.key,
            Some(self.config.temperature),
            Some(self.config.top_k),
            Some(self.config.top_p),
        )?;
        self.key = key;
        Ok(ids)
    }
}

/// Iterator returned by [`Generator::tokens`].
///
/// Stops after `max_tokens` steps, or after the first error.
pub struct TokenStream<'g, 'm> {
    generator: &'g mut Generator<'m>,
    cache: KVCache,
    input: Tensor,
    step: usize,
    remaining: usize,
}

impl TokenStream<'_, '_> {
    /// Cache holding every position processed so far.
    pub fn cache(&self) -> &KVCache {
        &self.cache
    }

    fn advance(&mut self) -> Result<Tensor> {
        let (logits, cache) = self.generator.model.step(&self.input, &self.cache)?;
        let ids = self.generator.sample(&logits)?;
        log::debug!(
            "generation step {}: cache length {}",
            self.step,
            cache.length()
        );
        self.cache = cache;
        self.input = ids.clone();
        self.step += 1;
        Ok(ids)
    }
}

impl Iterator for TokenStream<'_, '_> {
    type Item = Result<Tensor>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let result = self.advance();
        self.remaining = if result.is_ok() { self.remaining - 1 } else { 0 };
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

fn prompt_batch(prompt: &Tensor) -> Result<usize> {
    match *prompt.dims() {
        [batch, length] if batch > 0 && length > 0 => Ok(batch),
        _ => Err(ModelError::InvalidInput(format!(
            "prompt must be a non-empty [batch, length] tensor, got {:?}",
            prompt.dims()
        ))),
    }
}
