#![allow(dead_code)]

use candle_core::{DType, Device, Tensor};
use checkpoint::{CheckpointParams, ModelConfig, ParameterStore};

pub fn tiny_params_json(n_heads: usize, n_kv_heads: usize) -> serde_json::Value {
    serde_json::json!({
        "dim": 16,
        "n_layers": 2,
        "n_heads": n_heads,
        "n_kv_heads": n_kv_heads,
        "vocab_size": 24,
        "multiple_of": 8,
        "norm_eps": 1e-5,
        "rope_theta": 10000.0
    })
}

pub fn tiny_config(n_heads: usize, n_kv_heads: usize) -> anyhow::Result<ModelConfig> {
    let params: CheckpointParams = serde_json::from_value(tiny_params_json(n_heads, n_kv_heads))?;
    Ok(ModelConfig::from_params(&params, DType::F32, Device::Cpu)?)
}

fn random(shape: (usize, usize), device: &Device) -> candle_core::Result<Tensor> {
    Tensor::randn(0f32, 0.2, shape, device)
}

/// Random weights under Meta key names; `tied` omits `output.weight`.
pub fn random_params(config: &ModelConfig, tied: bool) -> anyhow::Result<ParameterStore> {
    let device = &config.device;
    let (d, d_q, d_kv, d_ffn) = (
        config.d_model,
        config.n_heads * config.d_head,
        config.d_kv(),
        config.d_ffn,
    );
    let mut params = ParameterStore::new();
    params.insert("tok_embeddings.weight", random((config.vocab_size, d), device)?);
    params.insert("norm.weight", Tensor::ones(d, DType::F32, device)?);
    if !tied {
        params.insert("output.weight", random((config.vocab_size, d), device)?);
    }
    for layer in 0..config.n_layers {
        let prefix = format!("layers.{layer}");
        params.insert(format!("{prefix}.attention_norm.weight"), Tensor::ones(d, DType::F32, device)?);
        params.insert(format!("{prefix}.ffn_norm.weight"), Tensor::ones(d, DType::F32, device)?);
        for (name, shape) in [
            ("attention.wq", (d_q, d)),
            ("attention.wk", (d_kv, d)),
            ("attention.wv", (d_kv, d)),
            ("attention.wo", (d, d_q)),
            ("feed_forward.w1", (d_ffn, d)),
            ("feed_forward.w2", (d, d_ffn)),
            ("feed_forward.w3", (d_ffn, d)),
        ] {
            params.insert(format!("{prefix}.{name}.weight"), random(shape, device)?);
        }
    }
    Ok(params)
}

pub fn prompt() -> candle_core::Result<Tensor> {
    Tensor::new(&[[1u32, 5, 7, 3, 20], [2, 9, 4, 11, 0]], &Device::Cpu)
}

pub fn max_abs_diff(a: &Tensor, b: &Tensor) -> candle_core::Result<f32> {
    (a - b)?.abs()?.max_all()?.to_vec0::<f32>()
}
