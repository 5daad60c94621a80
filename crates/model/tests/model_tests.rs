mod common;

use anyhow::Result;
use attention::KVCache;
use candle_core::{DType, Device, Tensor};
use common::{max_abs_diff, prompt, random_params, tiny_config, tiny_params_json};
use model::{ForwardOutput, Model, ModelError};
use static_assertions::assert_impl_all;

assert_impl_all!(Model: Send, Sync, Clone);
assert_impl_all!(ForwardOutput: Send, Sync);

fn tiny_model(n_heads: usize, n_kv_heads: usize) -> Result<Model> {
    let config = tiny_config(n_heads, n_kv_heads)?;
    let params = random_params(&config, false)?;
    Ok(Model::create(config, &params)?)
}

#[test]
fn forward_without_cache_returns_bare_logits() -> Result<()> {
    let model = tiny_model(4, 2)?;
    let output = model.forward(&prompt()?, None)?;

    assert!(output.cache().is_none());
    assert_eq!(output.logits().dims(), &[2, 5, 24]);
    assert_eq!(output.logits().dtype(), DType::F32);
    Ok(())
}

#[test]
fn forward_with_cache_extends_every_layer() -> Result<()> {
    let model = tiny_model(4, 2)?;
    let empty = model.empty_cache();
    let (logits, cache) = model.forward(&prompt()?, Some(&empty))?.into_parts();
    let cache = cache.expect("cache requested");

    assert_eq!(logits.dims(), &[2, 5, 24]);
    assert_eq!(cache.length(), 5);
    for index in 0..cache.n_layers() {
        assert_eq!(cache.layer(index).map(|layer| layer.length()), Some(5));
    }
    // The supplied cache is a value and is left as it was.
    assert_eq!(empty.length(), 0);

    let next = Tensor::new(&[[4u32, 1], [8, 8]], &Device::Cpu)?;
    let (_, cache) = model.forward(&next, Some(&cache))?.into_parts();
    assert_eq!(cache.map(|cache| cache.length()), Some(7));
    Ok(())
}

#[test]
fn incremental_decoding_matches_full_forward() -> Result<()> {
    for (n_heads, n_kv_heads) in [(4, 4), (4, 2), (4, 1)] {
        let model = tiny_model(n_heads, n_kv_heads)?;
        let tokens = prompt()?;
        let full = model.forward(&tokens, None)?.logits().clone();

        let mut cache = model.empty_cache();
        for pos in 0..tokens.dim(1)? {
            let (logits, next) = model
                .forward(&tokens.narrow(1, pos, 1)?, Some(&cache))?
                .into_parts();
            let diff = max_abs_diff(&logits, &full.narrow(1, pos, 1)?)?;
            assert!(
                diff < 1e-4,
                "heads {n_heads}/{n_kv_heads} position {pos} diverged by {diff}"
            );
            cache = next.expect("cache requested");
        }
        assert_eq!(cache.length(), tokens.dim(1)?);
    }
    Ok(())
}

#[test]
fn chunked_prefill_matches_full_forward() -> Result<()> {
    let model = tiny_model(4, 2)?;
    let tokens = prompt()?;
    let full = model.forward(&tokens, None)?.logits().clone();

    let (first, cache) = model
        .forward(&tokens.narrow(1, 0, 3)?, Some(&model.empty_cache()))?
        .into_parts();
    let cache = cache.expect("cache requested");
    let (second, _) = model
        .forward(&tokens.narrow(1, 3, 2)?, Some(&cache))?
        .into_parts();

    let stitched = Tensor::cat(&[&first, &second], 1)?;
    assert!(max_abs_diff(&stitched, &full)? < 1e-4);
    Ok(())
}

#[test]
fn forward_last_matches_final_position() -> Result<()> {
    let model = tiny_model(4, 2)?;
    let tokens = prompt()?;
    let full = model.forward(&tokens, None)?.logits().clone();
    let last = model.forward_last(&tokens, None)?.logits().clone();

    assert_eq!(last.dims(), &[2, 24]);
    assert!(max_abs_diff(&last, &full.narrow(1, 4, 1)?.squeeze(1)?)? < 1e-6);
    Ok(())
}

#[test]
fn missing_output_weight_ties_the_head() -> Result<()> {
    let config = tiny_config(4, 2)?;
    let params = random_params(&config, true)?;
    let model = Model::create(config, &params)?;
    let logits = model.forward(&prompt()?, None)?.logits().clone();
    assert_eq!(logits.dims(), &[2, 5, 24]);
    Ok(())
}

#[test]
fn misshaped_layer_weight_fails_creation() -> Result<()> {
    let config = tiny_config(4, 2)?;
    let mut params = random_params(&config, false)?;
    // Replace a projection with a misshaped tensor.
    params.insert(
        "layers.1.attention.wv.weight",
        Tensor::zeros((3, 16), DType::F32, &Device::Cpu)?,
    );
    assert!(Model::create(config, &params).is_err());
    Ok(())
}

#[test]
fn invalid_inputs_are_rejected() -> Result<()> {
    let model = tiny_model(4, 2)?;

    let flat = Tensor::new(&[1u32, 2, 3], &Device::Cpu)?;
    assert!(matches!(
        model.forward(&flat, None),
        Err(ModelError::InvalidInput(_))
    ));

    let wrong_depth = KVCache::new(5);
    assert!(matches!(
        model.forward(&prompt()?, Some(&wrong_depth)),
        Err(ModelError::InvalidInput(_))
    ));

    let out_of_vocab = Tensor::new(&[[30u32]], &Device::Cpu)?;
    assert!(model.forward(&out_of_vocab, None).is_err());
    Ok(())
}

#[test]
fn load_reads_params_and_safetensors() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(
        dir.path().join("params.json"),
        serde_json::to_vec(&tiny_params_json(4, 2))?,
    )?;
    let config = tiny_config(4, 2)?;
    let params = random_params(&config, false)?;
    params.save_safetensors(dir.path().join("model.safetensors"))?;

    let loaded = Model::load(dir.path(), DType::F32, &Device::Cpu)?;
    let reference = Model::create(config, &params)?;

    let tokens = prompt()?;
    let a = loaded.forward(&tokens, None)?.logits().clone();
    let b = reference.forward(&tokens, None)?.logits().clone();
    assert_eq!(loaded.layers().len(), 2);
    assert!(max_abs_diff(&a, &b)? < 1e-6);
    Ok(())
}
