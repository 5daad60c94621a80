//! Key/value cache for incremental decoding.
//!
//! Each decoder layer accumulates its rotated keys and values in a
//! [`LayerKVCache`]. The model-level state is a [`KVCache`]: an immutable,
//! cheaply cloned sequence of layers. During one forward pass the model turns
//! it into a [`MutableKVCache`], replaces layers in place as it walks the
//! decoder stack, and freezes the result back into a [`KVCache`] before
//! returning.

pub mod cache;
pub mod layer;

pub use cache::{KVCache, MutableKVCache};
pub use layer::LayerKVCache;

#[cfg(test)]
mod tests;
