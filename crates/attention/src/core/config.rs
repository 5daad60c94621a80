//! Run-time options for attention kernels.

/// Configuration driving kernel behaviour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Multiplier applied to `q·kᵀ`.
    ///
    /// When `None`, kernels use `1 / sqrt(head_dim)`.
    pub scale: Option<f64>,
}

impl Config {
    pub fn with_scale(scale: f64) -> Self {
        Self { scale: Some(scale) }
    }

    /// Scale to use for a given head dimension.
    pub fn resolve_scale(&self, head_dim: usize) -> f64 {
        self.scale.unwrap_or_else(|| 1.0 / (head_dim as f64).sqrt())
    }
}
