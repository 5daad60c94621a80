//! Building blocks for Llama decoder layers.
//!
//! Every component here consumes hidden states shaped `(batch, seq, hidden)`
//! and is loaded from a [`checkpoint::ParameterStore`] by dotted key. Parameter
//! tensors stay in the checkpoint dtype while matmuls and reductions run at
//! the precision chosen by [`dtypes::PrecisionPolicy`].

pub mod activations;
pub mod checks;
pub mod dtypes;
pub mod linear;
pub mod mlp;
pub mod norm;

pub use dtypes::PrecisionPolicy;
pub use linear::{Linear, LinearConfig};
pub use mlp::{FeedForward, FeedForwardConfig};
pub use norm::{NormConfig, RmsNorm};

/// Converts a checkpoint failure into the candle error used by layer APIs.
pub fn checkpoint_err(err: checkpoint::CheckpointError) -> candle_core::Error {
    candle_core::Error::wrap(err)
}
