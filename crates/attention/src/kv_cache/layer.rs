use candle_core::Tensor;

use crate::core::AttentionError;

/// Keys and values seen so far by one layer.
///
/// Both tensors are `[batch, kv_heads, seen_len, head_dim]`, or absent before
/// the first append. Appending never mutates `self`; it returns the extended
/// cache so earlier snapshots stay valid.
#[derive(Debug, Clone, Default)]
pub struct LayerKVCache {
    keys: Option<Tensor>,
    values: Option<Tensor>,
}

impl LayerKVCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of positions already cached.
    pub fn length(&self) -> usize {
        self.keys
            .as_ref()
            .and_then(|keys| keys.dim(2).ok())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    pub fn keys(&self) -> Option<&Tensor> {
        self.keys.as_ref()
    }

    pub fn values(&self) -> Option<&Tensor> {
        self.values.as_ref()
    }

    /// Returns a cache extended by `keys`/`values` along the sequence axis.
    pub fn append(&self, keys: &Tensor, values: &Tensor) -> Result<Self, AttentionError> {
        let key_dims = keys.dims4().map_err(|_| {
            AttentionError::shape(format!(
                "cached keys must be [batch, kv_heads, seq, head_dim], got {:?}",
                keys.dims()
            ))
        })?;
        if keys.dims() != values.dims() {
            return Err(AttentionError::shape(format!(
                "keys {:?} and values {:?} must share a shape",
                keys.dims(),
                values.dims()
            )));
        }

        let (keys, values) = match (&self.keys, &self.values) {
            (Some(cached_keys), Some(cached_values)) => {
                let (b, h, _, d) = cached_keys.dims4()?;
                if (key_dims.0, key_dims.1, key_dims.3) != (b, h, d) {
                    return Err(AttentionError::shape(format!(
                        "cannot append {:?} to a cache of [{b}, {h}, _, {d}]",
                        keys.dims()
                    )));
                }
                (
                    Tensor::cat(&[cached_keys, keys], 2)?,
                    Tensor::cat(&[cached_values, values], 2)?,
                )
            }
            _ => (keys.contiguous()?, values.contiguous()?),
        };

        Ok(Self {
            keys: Some(keys),
            values: Some(values),
        })
    }
}
