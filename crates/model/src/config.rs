//! Generation settings with serde defaults and `LLAMA_*` environment overrides.

use std::env;

use serde::{Deserialize, Serialize};

use crate::{
    errors::SamplingError,
    sampling::{DEFAULT_TEMPERATURE, DEFAULT_TOP_K, DEFAULT_TOP_P},
};

pub const MAX_TOKENS_ENV: &str = "LLAMA_MAX_TOKENS";
pub const TEMPERATURE_ENV: &str = "LLAMA_TEMPERATURE";
pub const TOP_K_ENV: &str = "LLAMA_TOP_K";
pub const TOP_P_ENV: &str = "LLAMA_TOP_P";
pub const SEED_ENV: &str = "LLAMA_SEED";

/// Decoding options for [`crate::Generator`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Number of tokens produced after the prompt.
    pub max_tokens: usize,
    /// `0.0` selects greedy decoding.
    pub temperature: f64,
    pub top_k: usize,
    pub top_p: f64,
    /// Seed of the initial [`crate::RngKey`].
    pub seed: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 64,
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            top_p: DEFAULT_TOP_P,
            seed: 0,
        }
    }
}

impl GenerationConfig {
    pub fn greedy(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            temperature: 0.0,
            ..Self::default()
        }
    }

    /// Defaults with the `LLAMA_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Overrides fields from `LLAMA_MAX_TOKENS`, `LLAMA_TEMPERATURE`,
    /// `LLAMA_TOP_K`, `LLAMA_TOP_P` and `LLAMA_SEED`. Unparsable values are
    /// ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = parse_env(MAX_TOKENS_ENV) {
            self.max_tokens = value;
        }
        if let Some(value) = parse_env(TEMPERATURE_ENV) {
            self.temperature = value;
        }
        if let Some(value) = parse_env::<usize>(TOP_K_ENV) {
            self.top_k = value.max(1);
        }
        if let Some(value) = parse_env(TOP_P_ENV) {
            self.top_p = value;
        }
        if let Some(value) = parse_env(SEED_ENV) {
            self.seed = value;
        }
    }

    pub fn validate(&self) -> Result<(), SamplingError> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(SamplingError::InvalidParameter(format!(
                "temperature must be finite and non-negative, got {}",
                self.temperature
            )));
        }
        if self.top_k == 0 {
            return Err(SamplingError::InvalidParameter("top_k must be at least 1".into()));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(SamplingError::InvalidParameter(format!(
                "top_p must lie in (0, 1], got {}",
                self.top_p
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = env::var(name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("ignoring {name}={value:?}: not a valid value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() -> anyhow::Result<()> {
        let config: GenerationConfig = serde_json::from_str(r#"{"max_tokens": 8, "temperature": 0.0}"#)?;
        assert_eq!(config.max_tokens, 8);
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert_eq!(config.top_p, DEFAULT_TOP_P);
        config.validate()?;
        Ok(())
    }

    #[test]
    fn env_overrides_replace_defaults() {
        // Only this test touches the LLAMA_* generation variables.
        env::set_var(MAX_TOKENS_ENV, "12");
        env::set_var(TEMPERATURE_ENV, "0.25");
        env::set_var(TOP_K_ENV, "0");
        env::set_var(TOP_P_ENV, "not-a-number");
        env::set_var(SEED_ENV, "99");

        let config = GenerationConfig::from_env();

        for name in [MAX_TOKENS_ENV, TEMPERATURE_ENV, TOP_K_ENV, TOP_P_ENV, SEED_ENV] {
            env::remove_var(name);
        }

        assert_eq!(config.max_tokens, 12);
        assert_eq!(config.temperature, 0.25);
        assert_eq!(config.top_k, 1);
        assert_eq!(config.top_p, DEFAULT_TOP_P);
        assert_eq!(config.seed, 99);
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let mut config = GenerationConfig::default();
        config.top_p = 0.0;
        assert!(config.validate().is_err());
        config.top_p = 0.5;
        config.temperature = -0.1;
        assert!(config.validate().is_err());
        assert!(GenerationConfig::greedy(4).validate().is_ok());
    }
}
