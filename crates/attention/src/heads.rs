//! Reshapes between the model layout `[batch, seq, hidden]` and the per-head
//! layout `[batch, heads, seq, head_dim]`.

use candle_core::Tensor;

use crate::core::AttentionError;

/// `[b, l, d]` to `[b, n_heads, l, d / n_heads]`.
pub fn split_heads(x: &Tensor, n_heads: usize) -> Result<Tensor, AttentionError> {
    let (batch, seq_len, hidden) = match *x.dims() {
        [batch, seq_len, hidden] => (batch, seq_len, hidden),
        _ => {
            return Err(AttentionError::shape(format!(
                "split_heads expects [batch, seq, hidden], got {:?}",
                x.dims()
            )))
        }
    };
    if n_heads == 0 || hidden % n_heads != 0 {
        return Err(AttentionError::shape(format!(
            "split_heads: hidden size {hidden} is not divisible by {n_heads} heads"
        )));
    }
    let head_dim = hidden / n_heads;
    Ok(x
        .reshape((batch, seq_len, n_heads, head_dim))?
        .transpose(1, 2)?
        .contiguous()?)
}

/// `[b, h, l, hd]` to `[b, l, h * hd]`; exact inverse of [`split_heads`].
pub fn combine_heads(x: &Tensor) -> Result<Tensor, AttentionError> {
    let (batch, heads, seq_len, head_dim) = x.dims4().map_err(|_| {
        AttentionError::shape(format!(
            "combine_heads expects [batch, heads, seq, head_dim], got {:?}",
            x.dims()
        ))
    })?;
    Ok(x
        .transpose(1, 2)?
        .reshape((batch, seq_len, heads * head_dim))?)
}

/// Repeats each key/value head `n_rep` times along the head axis.
///
/// `[b, kv, l, hd]` becomes `[b, kv * n_rep, l, hd]` with copies of a head kept
/// adjacent, so query head `q` reads kv head `q / n_rep`.
pub fn repeat_kv(x: &Tensor, n_rep: usize) -> Result<Tensor, AttentionError> {
    if n_rep == 0 {
        return Err(AttentionError::shape("repeat_kv requires n_rep >= 1"));
    }
    let (batch, kv_heads, seq_len, head_dim) = x.dims4().map_err(|_| {
        AttentionError::shape(format!(
            "repeat_kv expects [batch, kv_heads, seq, head_dim], got {:?}",
            x.dims()
        ))
    })?;
    if n_rep == 1 {
        return Ok(x.clone());
    }
    Ok(x
        .unsqueeze(2)?
        .broadcast_as((batch, kv_heads, n_rep, seq_len, head_dim))?
        .reshape((batch, kv_heads * n_rep, seq_len, head_dim))?)
}
