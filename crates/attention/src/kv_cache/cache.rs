use std::sync::Arc;

use crate::{core::AttentionError, kv_cache::LayerKVCache};

/// Immutable per-layer cache state shared between forward calls.
///
/// Layers are reference counted, so cloning is cheap and
/// [`KVCache::with_layer`] shares every untouched layer with the original.
#[derive(Debug, Clone, Default)]
pub struct KVCache {
    layers: Vec<Arc<LayerKVCache>>,
}

impl KVCache {
    /// An empty cache for `n_layers` decoder layers.
    pub fn new(n_layers: usize) -> Self {
        Self {
            layers: (0..n_layers).map(|_| Arc::new(LayerKVCache::new())).collect(),
        }
    }

    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    /// Positions seen so far; every layer holds the same count between calls.
    pub fn length(&self) -> usize {
        self.layers.first().map_or(0, |layer| layer.length())
    }

    pub fn layer(&self, index: usize) -> Option<&LayerKVCache> {
        self.layers.get(index).map(Arc::as_ref)
    }

    /// A new cache with layer `index` replaced; `self` is left untouched.
    pub fn with_layer(&self, index: usize, layer: LayerKVCache) -> Result<Self, AttentionError> {
        check_index(index, self.layers.len())?;
        let mut layers = self.layers.clone();
        layers[index] = Arc::new(layer);
        Ok(Self { layers })
    }

    /// Scratch view for a single forward pass.
    pub fn to_mutable(&self) -> MutableKVCache {
        MutableKVCache {
            layers: self.layers.clone(),
        }
    }
}

/// Per-forward-pass staging buffer allowing in-place layer replacement.
///
/// Not `Clone`: it is created from a [`KVCache`], threaded through the
/// decoder loop and consumed by [`MutableKVCache::freeze`].
#[derive(Debug)]
pub struct MutableKVCache {
    layers: Vec<Arc<LayerKVCache>>,
}

impl MutableKVCache {
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn get(&self, index: usize) -> Result<&LayerKVCache, AttentionError> {
        check_index(index, self.layers.len())?;
        Ok(&self.layers[index])
    }

    pub fn set(&mut self, index: usize, layer: LayerKVCache) -> Result<(), AttentionError> {
        check_index(index, self.layers.len())?;
        self.layers[index] = Arc::new(layer);
        Ok(())
    }

    /// Converts the staging buffer back into an immutable snapshot.
    pub fn freeze(self) -> KVCache {
        KVCache {
            layers: self.layers,
        }
    }
}

fn check_index(index: usize, n_layers: usize) -> Result<(), AttentionError> {
    if index < n_layers {
        Ok(())
    } else {
        Err(AttentionError::shape(format!(
            "layer index {index} out of range for a cache of {n_layers} layers"
        )))
    }
}
