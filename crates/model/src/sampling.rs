//! Next-token selection from logits.
//!
//! Greedy decoding when the temperature is zero; otherwise temperature
//! scaling, softmax, top-k and top-p truncation over the descending
//! distribution, then one weighted draw per batch row. Randomness is an
//! explicit [`RngKey`] passed in and handed back, so a caller that threads
//! the returned key through successive calls gets a reproducible stream.

use std::cmp::Ordering;

use candle_core::{DType, Tensor};
use candle_nn::ops::softmax_last_dim;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::errors::{ModelError, SamplingError};

pub const DEFAULT_TEMPERATURE: f64 = 0.6;
pub const DEFAULT_TOP_K: usize = 50;
pub const DEFAULT_TOP_P: f64 = 0.9;

/// Splittable random key.
///
/// A key is never advanced in place; [`RngKey::split`] derives fresh,
/// deterministic children instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RngKey(u64);

impl RngKey {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn seed(&self) -> u64 {
        self.0
    }

    /// Derives `n` child keys; the same parent always yields the same children.
    pub fn split(self, n: usize) -> Vec<RngKey> {
        let mut rng = self.rng();
        (0..n).map(|_| RngKey(rng.gen())).collect()
    }

    fn rng(self) -> StdRng {
        StdRng::seed_from_u64(self.0)
    }
}

/// Picks one token per row of `logits` (`(batch, vocab)`).
///
/// Returns `(batch, 1)` `u32` ids and the key to use for the next call.
/// `None` parameters fall back to [`DEFAULT_TEMPERATURE`], [`DEFAULT_TOP_K`]
/// and [`DEFAULT_TOP_P`]. A zero temperature takes the argmax and returns
/// `key` untouched, so it may be `None`.
pub fn sample_tokens(
    logits: &Tensor,
    key: Option<RngKey>,
    temperature: Option<f64>,
    top_k: Option<usize>,
    top_p: Option<f64>,
) -> Result<(Tensor, Option<RngKey>), ModelError> {
    let (batch, vocab) = logits.dims2().map_err(|_| {
        SamplingError::InvalidLogits(format!(
            "expected [batch, vocab] logits, got {:?}",
            logits.dims()
        ))
    })?;
    if batch == 0 || vocab == 0 {
        return Err(SamplingError::InvalidLogits(format!("empty logits {:?}", logits.dims())).into());
    }

    let temperature = temperature.unwrap_or(DEFAULT_TEMPERATURE);
    let top_k = top_k.unwrap_or(DEFAULT_TOP_K);
    let top_p = top_p.unwrap_or(DEFAULT_TOP_P);
    validate(temperature, top_k, top_p)?;

    if temperature == 0.0 {
        return Ok((logits.argmax_keepdim(1)?, key));
    }
    let key = key.ok_or(SamplingError::MissingKey)?;

    let scaled = (logits.to_dtype(DType::F32)? / temperature)?;
    let rows = softmax_last_dim(&scaled)?.to_vec2::<f32>()?;

    let keys = key.split(batch + 1);
    let mut ids = Vec::with_capacity(batch);
    for (row, row_key) in rows.iter().zip(&keys[1..]) {
        let candidates = truncate_distribution(row, top_k, top_p);
        ids.push(draw(&candidates, &mut row_key.rng())?);
    }

    let ids = Tensor::from_vec(ids, (batch, 1), logits.device())?;
    Ok((ids, Some(keys[0])))
}

fn validate(temperature: f64, top_k: usize, top_p: f64) -> Result<(), SamplingError> {
    if !temperature.is_finite() || temperature < 0.0 {
        return Err(SamplingError::InvalidParameter(format!(
            "temperature must be finite and non-negative, got {temperature}"
        )));
    }
    if top_k == 0 {
        return Err(SamplingError::InvalidParameter("top_k must be at least 1".into()));
    }
    if !(top_p > 0.0 && top_p <= 1.0) {
        return Err(SamplingError::InvalidParameter(format!(
            "top_p must lie in (0, 1], got {top_p}"
        )));
    }
    Ok(())
}

/// Surviving `(token, probability)` pairs in descending probability order.
///
/// Keeps the first `top_k` entries, then everything up to and including the
/// first entry at which the running total reaches `top_p`; a `top_p` of 1.0
/// cuts nothing. Ties keep the lower token id first. Probabilities are not
/// renormalised.
pub(crate) fn truncate_distribution(probs: &[f32], top_k: usize, top_p: f64) -> Vec<(u32, f32)> {
    let mut ranked: Vec<(u32, f32)> = probs
        .iter()
        .enumerate()
        .map(|(idx, &prob)| (idx as u32, prob))
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(top_k);

    // A running total can round up to 1.0 before the tail is reached.
    if top_p >= 1.0 {
        return ranked;
    }

    let mut cumulative = 0.0f64;
    let cutoff = ranked
        .iter()
        .position(|&(_, prob)| {
            cumulative += prob as f64;
            cumulative >= top_p
        })
        .map_or(ranked.len(), |idx| idx + 1);
    ranked.truncate(cutoff);
    ranked
}

/// Weighted draw over the renormalised candidates.
fn draw(candidates: &[(u32, f32)], rng: &mut StdRng) -> Result<u32, SamplingError> {
    let total: f64 = candidates.iter().map(|&(_, prob)| prob as f64).sum();
    if !(total.is_finite() && total > 0.0) {
        return Err(SamplingError::InvalidLogits(format!(
            "no probability mass left after truncation (total {total})"
        )));
    }

    let target = rng.gen::<f64>() * total;
    let mut cumulative = 0.0f64;
    for &(token, prob) in candidates {
        cumulative += prob as f64;
        if target < cumulative {
            return Ok(token);
        }
    }
    // Rounding can leave `target` just past the final running sum.
    Ok(candidates[candidates.len() - 1].0)
}
