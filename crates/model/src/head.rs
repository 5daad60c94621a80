//! Final RMS norm and vocabulary projection.

use candle_core::Tensor;
use checkpoint::{ModelConfig, ParameterStore};
use embedding::TokenEmbedding;
use layers::{Linear, LinearConfig, NormConfig, PrecisionPolicy, RmsNorm};

use crate::errors::{ModelError, Result};

#[derive(Debug, Clone)]
enum Projection {
    Output(Linear),
    /// Reuses the input embedding table when the checkpoint has no
    /// `output.weight`.
    Tied(TokenEmbedding),
}

#[derive(Debug, Clone)]
pub struct Head {
    norm: RmsNorm,
    projection: Projection,
    policy: PrecisionPolicy,
}

impl Head {
    /// Loads `norm.weight` and `output.weight`, falling back to `embedding`.
    pub fn create(
        config: &ModelConfig,
        params: &ParameterStore,
        embedding: &TokenEmbedding,
    ) -> Result<Self> {
        let norm = RmsNorm::load(params, "norm", NormConfig::from_model_config(config))?;
        let projection = if params.contains("output.weight") {
            Projection::Output(Linear::load(
                params,
                "output",
                LinearConfig::new(config.d_model, config.vocab_size),
            )?)
        } else {
            log::info!("checkpoint has no output.weight, tying the head to tok_embeddings");
            Projection::Tied(embedding.clone())
        };
        Ok(Self {
            norm,
            projection,
            policy: PrecisionPolicy::for_model(config),
        })
    }

    pub fn is_tied(&self) -> bool {
        matches!(self.projection, Projection::Tied(_))
    }

    /// `(batch, seq, d_model)` to `(batch, seq, vocab_size)` logits.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let normed = self.norm.forward(x, &self.policy)?;
        let logits = match &self.projection {
            Projection::Output(linear) => linear.forward(&normed, &self.policy)?,
            Projection::Tied(embedding) => embedding.linear_out(&normed, &self.policy)?,
        };
        Ok(logits)
    }

    /// Logits of the last position only, shaped `(batch, vocab_size)`.
    pub fn forward_last(&self, x: &Tensor) -> Result<Tensor> {
        let seq_len = x.dim(1)?;
        if seq_len == 0 {
            return Err(ModelError::InvalidInput(
                "cannot take the last position of an empty sequence".into(),
            ));
        }
        Ok(self.forward(&x.narrow(1, seq_len - 1, 1)?)?.squeeze(1)?)
    }
}
