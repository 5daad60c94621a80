//! Checkpoint access for Llama-family models.
//!
//! A checkpoint directory holds a `params.json` describing the architecture
//! and one or more weight files (`*.safetensors`, or Meta's
//! `consolidated.00.pth`). This crate turns the former into a validated
//! [`ModelConfig`] and the latter into a [`ParameterStore`] keyed by the
//! dotted names used throughout the workspace (`layers.0.attention.wq.weight`).

pub mod config;
pub mod errors;
pub mod params;
pub mod paths;

pub use config::{
    ffn_hidden_dim, load_config, parse_dtype, CheckpointParams, ModelConfig, RopeScalingParams,
};
pub use errors::CheckpointError;
pub use params::{load_parameters, ParameterStore};
pub use paths::{checkpoint_dir, CHECKPOINTS_ENV};
