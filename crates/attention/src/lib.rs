//! Causal grouped-query self-attention for Llama decoders.
//!
//! The crate covers everything between a layer's hidden states and its
//! attention output:
//!
//! * [`masks`] builds the additive causal mask and pads it for cached history.
//! * [`heads`] splits projections into heads, merges them back and repeats
//!   key/value heads across their query group.
//! * [`kv_cache`] holds the per-layer keys and values seen so far, with an
//!   immutable [`KVCache`] shared between calls and a [`MutableKVCache`] used
//!   only inside one forward pass.
//! * [`reference`] provides [`ExactAttention`], the portable scaled
//!   dot-product kernel behind the [`AttentionKernel`] trait.
//! * [`self_attention`] ties the above to the checkpoint projections.
//!
//! Tensors use the layout `[batch, n_heads, seq_len, head_dim]` once split
//! into heads. Scores and softmax are accumulated in `f32`; outputs match the
//! dtype of the incoming queries.

pub mod core;
pub mod heads;
pub mod kv_cache;
pub mod masks;
pub mod reference;
pub mod self_attention;

pub use crate::core::{AttentionError, AttentionKernel, Config};
pub use heads::{combine_heads, repeat_kv, split_heads};
pub use kv_cache::{KVCache, LayerKVCache, MutableKVCache};
pub use masks::{attention_mask, pad_mask_for_history};
pub use reference::ExactAttention;
pub use self_attention::Attention;
