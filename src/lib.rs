//! Llama-family decoder inference on candle.
//!
//! The workspace crates are re-exported under their own names; the most used
//! types are also available at the root.

pub use attention;
pub use checkpoint;
pub use embedding;
pub use layers;
pub use model;

pub use attention::{KVCache, LayerKVCache};
pub use checkpoint::{load_config, load_parameters, ModelConfig, ParameterStore};
pub use model::{
    sample_tokens, ForwardOutput, GenerationConfig, Generator, Model, ModelError, RngKey,
};

use anyhow::Result;
use candle_core::Device;

pub const FORCE_CPU_ENV: &str = "CANDLE_FORCE_CPU";

/// Picks the compute device: CPU when `CANDLE_FORCE_CPU` is set, then Metal
/// (with the `metal` feature), then the first CUDA device, then CPU.
pub fn setup_device() -> Result<Device> {
    if std::env::var(FORCE_CPU_ENV).is_ok() {
        log::info!("{FORCE_CPU_ENV} set, using CPU backend");
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "metal")]
    match Device::new_metal(0) {
        Ok(device) => {
            log::info!("Metal device selected: {:?}", device);
            return Ok(device);
        }
        Err(err) => log::warn!("Metal unavailable ({err}), falling back"),
    }

    match Device::cuda_if_available(0) {
        Ok(device) if device.is_cuda() => {
            log::info!("CUDA device selected: {:?}", device);
            Ok(device)
        }
        Ok(_) | Err(_) => {
            log::info!("using CPU backend");
            Ok(Device::Cpu)
        }
    }
}
