//! Embedding crate
//!
//! Token lookup from the checkpoint's `tok_embeddings` table and rotary
//! positional embeddings applied inside attention.

pub mod positional;
pub mod token;

pub use positional::*;
pub use token::*;
