//! Architecture hyperparameters.
//!
//! [`CheckpointParams`] mirrors the `params.json` shipped with Meta's Llama
//! checkpoints and may also be written as TOML. [`ModelConfig`] is the
//! derived, validated form consumed by every other crate: it resolves the
//! feed-forward width, the per-head dimension, and binds a dtype and device.

use std::{
    fs,
    path::{Path, PathBuf},
};

use candle_core::{DType, Device};
use serde::{Deserialize, Serialize};

use crate::CheckpointError;

const PARAMS_JSON: &str = "params.json";
const PARAMS_TOML: &str = "params.toml";

fn default_multiple_of() -> usize {
    256
}

fn default_norm_eps() -> f64 {
    1e-5
}

fn default_rope_theta() -> f64 {
    500_000.0
}

/// Frequency scaling applied to RoPE for extended-context Llama 3.x models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RopeScalingParams {
    #[serde(default = "RopeScalingParams::default_factor")]
    pub factor: f64,
    #[serde(default = "RopeScalingParams::default_low_freq_factor")]
    pub low_freq_factor: f64,
    #[serde(default = "RopeScalingParams::default_high_freq_factor")]
    pub high_freq_factor: f64,
    #[serde(default = "RopeScalingParams::default_original_max_position_embeddings")]
    pub original_max_position_embeddings: usize,
}

impl RopeScalingParams {
    fn default_factor() -> f64 {
        8.0
    }

    fn default_low_freq_factor() -> f64 {
        1.0
    }

    fn default_high_freq_factor() -> f64 {
        4.0
    }

    fn default_original_max_position_embeddings() -> usize {
        8192
    }
}

impl Default for RopeScalingParams {
    fn default() -> Self {
        Self {
            factor: Self::default_factor(),
            low_freq_factor: Self::default_low_freq_factor(),
            high_freq_factor: Self::default_high_freq_factor(),
            original_max_position_embeddings: Self::default_original_max_position_embeddings(),
        }
    }
}

/// Raw checkpoint parameters as published alongside the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointParams {
    pub dim: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    /// Absent for checkpoints without grouped-query attention.
    #[serde(default)]
    pub n_kv_heads: Option<usize>,
    pub vocab_size: usize,
    #[serde(default = "default_multiple_of")]
    pub multiple_of: usize,
    #[serde(default)]
    pub ffn_dim_multiplier: Option<f64>,
    #[serde(default = "default_norm_eps")]
    pub norm_eps: f64,
    #[serde(default = "default_rope_theta")]
    pub rope_theta: f64,
    #[serde(default)]
    pub use_scaled_rope: bool,
    /// Overrides the default scaling factor when `use_scaled_rope` is set.
    #[serde(default)]
    pub rope_scaling_factor: Option<f64>,
    #[serde(default)]
    pub rope_scaling: Option<RopeScalingParams>,
}

impl CheckpointParams {
    /// Reads parameters from a JSON or TOML file, chosen by extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&contents)?),
            Some("toml") => Ok(toml::from_str(&contents)?),
            other => Err(CheckpointError::Format(format!(
                "unsupported params extension {:?} for {}",
                other,
                path.display()
            ))),
        }
    }

    /// Effective RoPE scaling, if the checkpoint requests one.
    pub fn resolved_rope_scaling(&self) -> Option<RopeScalingParams> {
        if let Some(scaling) = self.rope_scaling {
            return Some(scaling);
        }
        if !self.use_scaled_rope {
            return None;
        }
        let mut scaling = RopeScalingParams::default();
        if let Some(factor) = self.rope_scaling_factor {
            scaling.factor = factor;
        }
        Some(scaling)
    }
}

/// Validated model hyperparameters bound to a dtype and device.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub d_model: usize,
    pub n_layers: usize,
    pub n_heads: usize,
    pub n_kv_heads: usize,
    pub d_head: usize,
    pub d_ffn: usize,
    pub vocab_size: usize,
    pub rms_norm_eps: f64,
    pub rope_theta: f64,
    pub rope_scaling: Option<RopeScalingParams>,
    pub dtype: DType,
    pub device: Device,
}

impl ModelConfig {
    /// Derives a configuration from raw checkpoint parameters.
    pub fn from_params(
        params: &CheckpointParams,
        dtype: DType,
        device: Device,
    ) -> Result<Self, CheckpointError> {
        if params.n_heads == 0 {
            return Err(CheckpointError::Validation(vec![
                "n_heads must be greater than zero".to_string(),
            ]));
        }
        let config = Self {
            d_model: params.dim,
            n_layers: params.n_layers,
            n_heads: params.n_heads,
            n_kv_heads: params.n_kv_heads.unwrap_or(params.n_heads),
            d_head: params.dim / params.n_heads,
            d_ffn: ffn_hidden_dim(params.dim, params.multiple_of, params.ffn_dim_multiplier),
            vocab_size: params.vocab_size,
            rms_norm_eps: params.norm_eps,
            rope_theta: params.rope_theta,
            rope_scaling: params.resolved_rope_scaling(),
            dtype,
            device,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks the structural invariants every layer relies on.
    pub fn validate(&self) -> Result<(), CheckpointError> {
        let mut errors = Vec::new();

        for (name, value) in [
            ("d_model", self.d_model),
            ("n_layers", self.n_layers),
            ("n_heads", self.n_heads),
            ("n_kv_heads", self.n_kv_heads),
            ("d_head", self.d_head),
            ("d_ffn", self.d_ffn),
            ("vocab_size", self.vocab_size),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be greater than zero"));
            }
        }

        if self.n_heads > 0 && self.n_heads * self.d_head != self.d_model {
            errors.push(format!(
                "d_model ({}) must equal n_heads ({}) * d_head ({})",
                self.d_model, self.n_heads, self.d_head
            ));
        }
        if self.n_kv_heads > 0 && self.n_heads % self.n_kv_heads != 0 {
            errors.push(format!(
                "n_heads ({}) must be divisible by n_kv_heads ({})",
                self.n_heads, self.n_kv_heads
            ));
        }
        if self.d_head % 2 != 0 {
            errors.push(format!(
                "d_head ({}) must be even to pair rotary dimensions",
                self.d_head
            ));
        }
        if self.rms_norm_eps <= 0.0 {
            errors.push("rms_norm_eps must be positive".to_string());
        }
        if self.rope_theta <= 0.0 {
            errors.push("rope_theta must be positive".to_string());
        }
        if let Some(scaling) = &self.rope_scaling {
            if scaling.factor <= 0.0 {
                errors.push("rope_scaling.factor must be positive".to_string());
            }
            if scaling.high_freq_factor <= scaling.low_freq_factor {
                errors.push(
                    "rope_scaling.high_freq_factor must exceed low_freq_factor".to_string(),
                );
            }
        }
        if !matches!(self.dtype, DType::F32 | DType::F16 | DType::BF16) {
            errors.push(format!("unsupported model dtype {:?}", self.dtype));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CheckpointError::Validation(errors))
        }
    }

    /// Number of query heads sharing each key/value head.
    pub fn n_kv_groups(&self) -> usize {
        self.n_heads / self.n_kv_heads
    }

    /// Width of the key and value projections.
    pub fn d_kv(&self) -> usize {
        self.n_kv_heads * self.d_head
    }
}

/// Feed-forward width derived the way Meta's reference implementation does.
pub fn ffn_hidden_dim(dim: usize, multiple_of: usize, multiplier: Option<f64>) -> usize {
    let mut hidden = 2 * (4 * dim) / 3;
    if let Some(multiplier) = multiplier {
        hidden = (multiplier * hidden as f64) as usize;
    }
    let multiple_of = multiple_of.max(1);
    multiple_of * hidden.div_ceil(multiple_of)
}

/// Parses the dtype names accepted in configuration and environment overrides.
pub fn parse_dtype(value: &str) -> Result<DType, CheckpointError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "bf16" | "bfloat16" => Ok(DType::BF16),
        "f16" | "float16" | "half" => Ok(DType::F16),
        "f32" | "float32" | "float" => Ok(DType::F32),
        other => Err(CheckpointError::Format(format!("unknown dtype '{other}'"))),
    }
}

fn params_path(dir: &Path) -> Result<PathBuf, CheckpointError> {
    [PARAMS_JSON, PARAMS_TOML]
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            CheckpointError::NotFound(format!(
                "no {PARAMS_JSON} or {PARAMS_TOML} in {}",
                dir.display()
            ))
        })
}

/// Loads and validates the configuration stored in a checkpoint directory.
pub fn load_config(
    dir: impl AsRef<Path>,
    dtype: DType,
    device: &Device,
) -> Result<ModelConfig, CheckpointError> {
    let path = params_path(dir.as_ref())?;
    let params = CheckpointParams::from_path(&path)?;
    let config = ModelConfig::from_params(&params, dtype, device.clone())?;
    log::info!(
        "checkpoint config {}: d_model={} layers={} heads={} kv_heads={} d_ffn={} vocab={} dtype={:?}",
        path.display(),
        config.d_model,
        config.n_layers,
        config.n_heads,
        config.n_kv_heads,
        config.d_ffn,
        config.vocab_size,
        config.dtype
    );
    Ok(config)
}
