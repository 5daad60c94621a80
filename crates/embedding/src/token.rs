//! Token embedding lookup.

use candle_core::{DType, Error, Result, Tensor};
use checkpoint::{ModelConfig, ParameterStore};
use layers::{checkpoint_err, PrecisionPolicy};

/// Shape of a token embedding table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEmbeddingConfig {
    /// Size of the vocabulary (number of distinct tokens).
    pub vocab_size: usize,
    /// Dimensionality of each embedding vector.
    pub hidden_dim: usize,
}

impl TokenEmbeddingConfig {
    pub fn from_model_config(config: &ModelConfig) -> Self {
        Self {
            vocab_size: config.vocab_size,
            hidden_dim: config.d_model,
        }
    }
}

/// Embedding table loaded from a checkpoint, shaped `(vocab_size, hidden_dim)`.
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    config: TokenEmbeddingConfig,
    weight: Tensor,
}

impl TokenEmbedding {
    pub fn new(config: TokenEmbeddingConfig, weight: Tensor) -> Result<Self> {
        if config.vocab_size == 0 || config.hidden_dim == 0 {
            return Err(Error::Msg(format!(
                "token embedding requires non-zero sizes, got {config:?}"
            )));
        }
        layers::checks::expect_shape(
            "tok_embeddings.weight",
            &weight,
            &[config.vocab_size, config.hidden_dim],
        )?;
        Ok(Self { config, weight })
    }

    /// Loads `{path}.weight`, normally `tok_embeddings.weight`.
    pub fn create(config: &ModelConfig, params: &ParameterStore, path: &str) -> Result<Self> {
        let config = TokenEmbeddingConfig::from_model_config(config);
        let weight = params
            .get_with_shape(
                &format!("{path}.weight"),
                &[config.vocab_size, config.hidden_dim],
            )
            .map_err(checkpoint_err)?;
        Self::new(config, weight.clone())
    }

    pub fn config(&self) -> &TokenEmbeddingConfig {
        &self.config
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Looks up embeddings for the provided token ids.
    ///
    /// Inputs must be shaped `(batch, seq)` with an integer dtype. Outputs follow the
    /// `(batch, seq, hidden)` layout in the table's dtype.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        let (batch, seq) = self.validate_token_ids(token_ids)?;

        let flat = token_ids.flatten_all()?;
        self.ensure_id_range(&flat)?;

        self.weight
            .index_select(&flat, 0)?
            .reshape((batch, seq, self.config.hidden_dim))
    }

    /// Projects hidden states onto the vocabulary with the transposed table.
    ///
    /// Used as the output head for checkpoints that tie input and output embeddings.
    pub fn linear_out(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        layers::checks::expect_batch_seq_hidden("linear_out.input", hidden, self.config.hidden_dim)?;
        let (batch, seq, hidden_dim) = hidden.dims3()?;

        let input = policy.cast_for_matmul(hidden)?;
        let weight_t = policy.cast_for_matmul(&self.weight)?.t()?;
        let logits = input
            .reshape((batch * seq, hidden_dim))?
            .matmul(&weight_t)?
            .reshape((batch, seq, self.config.vocab_size))?;
        policy.cast_to_storage(&logits)
    }

    fn validate_token_ids(&self, token_ids: &Tensor) -> Result<(usize, usize)> {
        let (batch, seq) = match *token_ids.dims() {
            [batch, seq] if batch > 0 && seq > 0 => (batch, seq),
            [_, _] => {
                return Err(Error::Msg(
                    "token_ids must have non-zero batch and seq dimensions".into(),
                ))
            }
            _ => {
                return Err(Error::Msg(format!(
                    "token_ids must be shaped [batch, seq], got {:?}",
                    token_ids.dims()
                )))
            }
        };

        if !token_ids.dtype().is_int() {
            return Err(Error::Msg(format!(
                "token_ids expected integer dtype but received {:?}",
                token_ids.dtype()
            )));
        }
        Ok((batch, seq))
    }

    fn ensure_id_range(&self, flat_ids: &Tensor) -> Result<()> {
        let ids = flat_ids.to_dtype(DType::I64)?;
        let min_id = ids.min_all()?.to_scalar::<i64>()?;
        if min_id < 0 {
            return Err(Error::Msg(format!(
                "encountered negative token id {min_id} (minimum)"
            )));
        }

        let max_id = ids.max_all()?.to_scalar::<i64>()?;
        let vocab = self.config.vocab_size as i64;
        if max_id >= vocab {
            return Err(Error::Msg(format!(
                "token id {max_id} exceeds vocab size {vocab}"
            )));
        }
        Ok(())
    }
}
