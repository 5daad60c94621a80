//! Positional encodings.

pub mod rope;

pub use rope::{Rope, RopeConfig, RopeScaling};
