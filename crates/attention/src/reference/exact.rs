//! Reference scaled dot-product attention.
//!
//! The exact path prioritises numerical fidelity: inputs are promoted to
//! `f32`, scores are masked additively and normalised with a last-axis
//! softmax, and the weighted values are cast back to the query dtype.

use candle_core::{DType, Tensor};
use candle_nn::ops::softmax_last_dim;

use crate::core::{AttentionError, AttentionKernel, Config};

/// Numerically stable, portable attention kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactAttention;

impl AttentionKernel for ExactAttention {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        config: &Config,
    ) -> Result<Tensor, AttentionError> {
        let device = q.device();
        if !device.same_device(k.device()) || !device.same_device(v.device()) {
            return Err(AttentionError::shape(
                "q, k, v must reside on the same device",
            ));
        }

        let dtype = q.dtype();
        if dtype != k.dtype() || dtype != v.dtype() {
            return Err(AttentionError::shape("q, k, v must share the same dtype"));
        }
        if !matches!(dtype, DType::F32 | DType::F16 | DType::BF16) {
            return Err(AttentionError::UnsupportedDType {
                requested: format!("{dtype:?}"),
            });
        }

        let (batch, heads, q_len, head_dim) = q.dims4().map_err(|_| {
            AttentionError::shape("q must have shape [batch, heads, seq_len, head_dim]")
        })?;
        let (kb, kh, k_len, kd) = k.dims4().map_err(|_| {
            AttentionError::shape("k must have shape [batch, heads, seq_len, head_dim]")
        })?;
        let (vb, vh, vk, vd) = v.dims4().map_err(|_| {
            AttentionError::shape("v must have shape [batch, heads, seq_len, head_dim]")
        })?;

        if kb != batch || kh != heads || kd != head_dim {
            return Err(AttentionError::shape(format!(
                "k shape mismatch: expected [{batch}, {heads}, ?, {head_dim}] got [{kb}, {kh}, {k_len}, {kd}]"
            )));
        }
        if vb != batch || vh != heads || vk != k_len || vd != head_dim {
            return Err(AttentionError::shape(format!(
                "v shape mismatch: expected [{batch}, {heads}, {k_len}, {head_dim}] got [{vb}, {vh}, {vk}, {vd}]"
            )));
        }

        let q_work = q.to_dtype(DType::F32)?;
        let k_work = k.to_dtype(DType::F32)?;
        let v_work = v.to_dtype(DType::F32)?.contiguous()?;

        let scale = config.resolve_scale(head_dim);
        let mut scores = (q_work.matmul(&k_work.t()?.contiguous()?)? * scale)?;

        if let Some(mask) = mask {
            if !device.same_device(mask.device()) {
                return Err(AttentionError::shape(
                    "mask must reside on the same device as q",
                ));
            }
            let (mq, mk) = mask.dims2().map_err(|_| {
                AttentionError::shape(format!(
                    "mask must have shape [q_len, k_len], got {:?}",
                    mask.dims()
                ))
            })?;
            if mq != q_len || mk != k_len {
                return Err(AttentionError::shape(format!(
                    "mask shape mismatch: expected [{q_len}, {k_len}] got [{mq}, {mk}]"
                )));
            }
            scores = scores.broadcast_add(&mask.to_dtype(DType::F32)?)?;
        }

        let probs = softmax_last_dim(&scores)?;
        let output = probs.matmul(&v_work)?;
        Ok(output.to_dtype(dtype)?)
    }
}
