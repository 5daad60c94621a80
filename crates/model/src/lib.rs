//! Llama decoder assembled from the workspace crates.
//!
//! [`Model`] wires the token embedding, the decoder [`Layer`]s and the output
//! [`Head`] together and threads the key/value cache through one forward
//! pass. [`sample_tokens`] turns logits into token ids and [`Generator`]
//! drives prefill plus incremental decoding on top of both.

pub mod config;
pub mod errors;
pub mod generation;
pub mod head;
pub mod layer;
pub mod model;
pub mod sampling;

pub use config::GenerationConfig;
pub use errors::{ModelError, Result, SamplingError};
pub use generation::{Generator, TokenStream};
pub use head::Head;
pub use layer::Layer;
pub use model::{ForwardOutput, Model};
pub use sampling::{sample_tokens, RngKey, DEFAULT_TEMPERATURE, DEFAULT_TOP_K, DEFAULT_TOP_P};
