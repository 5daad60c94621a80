//! Builders for causal attention masks.

use candle_core::{bail, DType, Device, Result, Tensor};

/// Causal mask for a block of `query_length` new positions.
///
/// Shaped `[query_length, query_length]` in `dtype`: `0` where `j <= i` and
/// negative infinity where `j > i`.
pub fn attention_mask(query_length: usize, dtype: DType, device: &Device) -> Result<Tensor> {
    if query_length == 0 {
        bail!("attention mask requires a non-zero query length");
    }
    let data: Vec<f32> = (0..query_length)
        .flat_map(|i| {
            (0..query_length).map(move |j| if j > i { f32::NEG_INFINITY } else { 0.0 })
        })
        .collect();
    Tensor::from_vec(data, (query_length, query_length), device)?.to_dtype(dtype)
}

/// Left-pads a `[q, q]` causal mask with `cached_length` zero columns.
///
/// The result is `[q, cached_length + q]`: cached positions are visible to
/// every query while the new block keeps its causal triangle.
pub fn pad_mask_for_history(mask: &Tensor, cached_length: usize) -> Result<Tensor> {
    let (rows, _) = mask.dims2()?;
    if cached_length == 0 {
        return Ok(mask.clone());
    }
    let history = Tensor::zeros((rows, cached_length), mask.dtype(), mask.device())?;
    Tensor::cat(&[&history, mask], 1)
}
