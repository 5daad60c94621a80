//! Core traits and types shared across attention implementations.
//!
//! Kernels operate on tensors with layout `[batch, n_heads, seq_len,
//! head_dim]`. Keys and values must already carry one head per query head;
//! grouped-query callers expand them with [`repeat_kv`](crate::heads::repeat_kv)
//! first. Reductions accumulate in `f32` regardless of the incoming dtype
//! (`bf16`, `f16`, or `f32`).

pub mod config;
pub mod errors;

use candle_core::Tensor;

pub use config::Config;
pub use errors::AttentionError;

/// Unified interface for scaled dot-product attention kernels.
///
/// * `q` is `[batch, n_heads, q_len, head_dim]`; `k` and `v` are
///   `[batch, n_heads, k_len, head_dim]` with `k_len >= q_len`.
/// * The returned tensor is `[batch, n_heads, q_len, head_dim]` in `q`'s dtype.
/// * Masks, when present, are additive and shaped `[q_len, k_len]`; they are
///   broadcast over batch and heads.
pub trait AttentionKernel {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        config: &Config,
    ) -> Result<Tensor, AttentionError>;
}
