//! Named parameter tensors loaded from a checkpoint directory.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use candle_core::{safetensors::load as load_safetensors, DType, Device, Tensor};

use crate::{CheckpointError, ModelConfig};

/// Mapping from dotted parameter keys to tensors on the model device.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    tensors: HashMap<String, Tensor>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tensors(tensors: HashMap<String, Tensor>) -> Self {
        Self { tensors }
    }

    pub fn insert(&mut self, key: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        self.tensors.insert(key.into(), tensor)
    }

    /// Returns the tensor stored under `key`, or `MissingWeight`.
    pub fn get(&self, key: &str) -> Result<&Tensor, CheckpointError> {
        self.tensors
            .get(key)
            .ok_or_else(|| CheckpointError::MissingWeight(key.to_string()))
    }

    /// Like [`ParameterStore::get`] but also checks the tensor's dimensions.
    pub fn get_with_shape(&self, key: &str, expected: &[usize]) -> Result<&Tensor, CheckpointError> {
        let tensor = self.get(key)?;
        let actual = tensor.dims();
        if actual != expected {
            return Err(CheckpointError::ShapeMismatch {
                key: key.to_string(),
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }
        Ok(tensor)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Parameter keys in sorted order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.tensors.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Writes every tensor to a single safetensors file.
    pub fn save_safetensors(&self, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
        candle_core::safetensors::save(&self.tensors, path.as_ref())?;
        Ok(())
    }

    fn convert(tensor: Tensor, dtype: DType, device: &Device) -> Result<Tensor, CheckpointError> {
        Ok(tensor.to_device(device)?.to_dtype(dtype)?)
    }
}

fn files_with(dir: &Path, matches: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>, CheckpointError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if path.is_file() && matches(name) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Loads every parameter in `dir`, converted to the config's dtype and device.
///
/// All `*.safetensors` files are merged when present; otherwise a single
/// Meta `consolidated.*.pth` file is read.
pub fn load_parameters(
    config: &ModelConfig,
    dir: impl AsRef<Path>,
) -> Result<ParameterStore, CheckpointError> {
    let dir = dir.as_ref();
    let mut store = ParameterStore::new();

    let safetensors = files_with(dir, |name| name.ends_with(".safetensors"))?;
    let sources = if !safetensors.is_empty() {
        for path in &safetensors {
            for (key, tensor) in load_safetensors(path, &Device::Cpu)? {
                let tensor = ParameterStore::convert(tensor, config.dtype, &config.device)?;
                store.insert(key, tensor);
            }
        }
        safetensors
    } else {
        let shards = files_with(dir, |name| {
            name.starts_with("consolidated.") && name.ends_with(".pth")
        })?;
        match shards.as_slice() {
            [] => {
                return Err(CheckpointError::NotFound(format!(
                    "no *.safetensors or consolidated.*.pth in {}",
                    dir.display()
                )))
            }
            [path] => {
                for (key, tensor) in candle_core::pickle::read_all(path)? {
                    let tensor = ParameterStore::convert(tensor, config.dtype, &config.device)?;
                    store.insert(key, tensor);
                }
            }
            _ => {
                return Err(CheckpointError::Format(format!(
                    "{} consolidated shards found in {}; only single-file checkpoints are supported",
                    shards.len(),
                    dir.display()
                )))
            }
        }
        shards
    };

    log::info!(
        "loaded {} parameters from {} file(s) in {}",
        store.len(),
        sources.len(),
        dir.display()
    );
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_reports_name() {
        let store = ParameterStore::new();
        match store.get("norm.weight") {
            Err(CheckpointError::MissingWeight(key)) => assert_eq!(key, "norm.weight"),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn shape_check_rejects_mismatch() -> anyhow::Result<()> {
        let mut store = ParameterStore::new();
        store.insert("w", Tensor::zeros((4, 2), DType::F32, &Device::Cpu)?);
        assert!(store.get_with_shape("w", &[4, 2]).is_ok());
        match store.get_with_shape("w", &[2, 4]) {
            Err(CheckpointError::ShapeMismatch { expected, actual, .. }) => {
                assert_eq!(expected, vec![2, 4]);
                assert_eq!(actual, vec![4, 2]);
            }
            other => panic!("unexpected result {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn keys_are_sorted() -> anyhow::Result<()> {
        let mut store = ParameterStore::new();
        let t = Tensor::zeros(1, DType::F32, &Device::Cpu)?;
        store.insert("norm.weight", t.clone());
        store.insert("layers.0.ffn_norm.weight", t);
        assert_eq!(store.keys(), vec!["layers.0.ffn_norm.weight", "norm.weight"]);
        assert_eq!(store.len(), 2);
        assert!(store.contains("norm.weight"));
        Ok(())
    }
}
