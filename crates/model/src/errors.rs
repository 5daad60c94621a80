use attention::AttentionError;
use checkpoint::CheckpointError;
use thiserror::Error;

/// Misuse of [`crate::sample_tokens`].
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("a random key is required when temperature is non-zero")]
    MissingKey,
    #[error("invalid logits: {0}")]
    InvalidLogits(String),
    #[error("invalid sampling parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
    #[error(transparent)]
    Attention(#[from] AttentionError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error(transparent)]
    Sampling(#[from] SamplingError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;
