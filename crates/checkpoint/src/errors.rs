//! Error type shared by configuration parsing and parameter loading.

use thiserror::Error;

/// Failures raised while reading or validating a checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse checkpoint config: {0}")]
    Format(String),

    #[error("invalid model configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("missing weight `{0}`")]
    MissingWeight(String),

    #[error("weight `{key}` has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        key: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("checkpoint not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

impl From<serde_json::Error> for CheckpointError {
    fn from(value: serde_json::Error) -> Self {
        CheckpointError::Format(value.to_string())
    }
}

impl From<toml::de::Error> for CheckpointError {
    fn from(value: toml::de::Error) -> Self {
        CheckpointError::Format(value.to_string())
    }
}
