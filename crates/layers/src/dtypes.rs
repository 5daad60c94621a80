//! Precision policy shared by every inference component.
//!
//! Llama checkpoints ship in `bf16`; projections, RMS statistics, rotary
//! rotation and attention softmax are evaluated in `f32` and the results are
//! cast back to the parameter dtype between blocks. [`PrecisionPolicy`] keeps
//! those casts in one place.

use candle_core::{DType, Result, Tensor};
use checkpoint::ModelConfig;

/// Dtypes for weight storage, matmuls and normalisation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionPolicy {
    storage: DType,
    compute: DType,
    reduction: DType,
}

impl PrecisionPolicy {
    /// Half-precision weights compute in `f32`; statistics are always `f32`.
    pub fn from_parameter_dtype(storage: DType) -> Self {
        let compute = match storage {
            DType::F16 | DType::BF16 => DType::F32,
            other => other,
        };
        Self {
            storage,
            compute,
            reduction: DType::F32,
        }
    }

    pub fn for_model(config: &ModelConfig) -> Self {
        Self::from_parameter_dtype(config.dtype)
    }

    pub fn storage(&self) -> DType {
        self.storage
    }

    pub fn compute(&self) -> DType {
        self.compute
    }

    pub fn cast_for_matmul(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor(tensor, self.compute)
    }

    /// Casts to `f32` before RMS statistics are taken.
    pub fn cast_for_reduction(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor(tensor, self.reduction)
    }

    /// Casts back to the parameter dtype, the dtype passed between blocks.
    pub fn cast_to_storage(&self, tensor: &Tensor) -> Result<Tensor> {
        cast_tensor(tensor, self.storage)
    }
}

fn cast_tensor(tensor: &Tensor, dtype: DType) -> Result<Tensor> {
    if tensor.dtype() == dtype {
        Ok(tensor.clone())
    } else {
        tensor.to_dtype(dtype)
    }
}
