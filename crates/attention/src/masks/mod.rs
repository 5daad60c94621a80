//! Additive attention masks.
//!
//! Masks hold `0.0` where attention is permitted and negative infinity where it
//! is blocked, and are added to the raw scores before the softmax.

pub mod causal;

pub use causal::{attention_mask, pad_mask_for_history};
