//! Activation used by the gated feed-forward branch.
//!
//! SiLU / Swish computes `x * sigmoid(x)` via the fused kernel exposed by
//! Candle. Inputs are promoted to [`PrecisionPolicy::compute`] before the
//! non-linearity and the result stays in that dtype so the gate product that
//! follows does not lose precision.

use candle_core::{Result, Tensor};

use crate::dtypes::PrecisionPolicy;

/// `x * sigmoid(x)` evaluated at the compute precision.
pub fn silu(input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
    policy.cast_for_matmul(input)?.silu()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn silu_matches_swish_reference() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::from_slice(&[-3.0f32, -1.0, 0.0, 0.5, 2.0], (5,), &device)?;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::F32);
        let output = silu(&input, &policy)?;

        let one = Tensor::ones_like(&input)?;
        let exp = input.affine(-1.0, 0.0)?.exp()?;
        let sigmoid = one.broadcast_div(&(one.clone() + exp)?)?;
        let reference = input.mul(&sigmoid)?;
        let diff = output.sub(&reference)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert!(diff < 5e-6);
        Ok(())
    }

    #[test]
    fn silu_promotes_half_inputs() -> Result<()> {
        let device = Device::Cpu;
        let input = Tensor::from_slice(&[1.0f32, -2.0], (2,), &device)?.to_dtype(DType::BF16)?;
        let policy = PrecisionPolicy::from_parameter_dtype(DType::BF16);
        assert_eq!(silu(&input, &policy)?.dtype(), DType::F32);
        Ok(())
    }
}
