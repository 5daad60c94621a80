use candle_core::{DType, Device, Result, Tensor};
use embedding::token::{TokenEmbedding, TokenEmbeddingConfig};
use layers::PrecisionPolicy;

fn make_ids(data: &[u32], shape: (usize, usize)) -> Result<Tensor> {
    Tensor::from_slice(data, shape, &Device::Cpu)
}

fn build(vocab_size: usize, hidden_dim: usize, dtype: DType) -> Result<TokenEmbedding> {
    let config = TokenEmbeddingConfig {
        vocab_size,
        hidden_dim,
    };
    let weight = Tensor::randn(0f32, 1.0, (vocab_size, hidden_dim), &Device::Cpu)?.to_dtype(dtype)?;
    TokenEmbedding::new(config, weight)
}

#[test]
fn forward_shape_and_dtype_match_table() -> Result<()> {
    let embedding = build(8, 4, DType::F16)?;
    let output = embedding.forward(&make_ids(&[0, 1, 2, 3], (2, 2))?)?;

    assert_eq!(output.dims(), &[2, 2, 4]);
    assert_eq!(output.dtype(), DType::F16);
    Ok(())
}

#[test]
fn forward_returns_table_rows() -> Result<()> {
    let embedding = build(5, 3, DType::F32)?;
    let output = embedding.forward(&make_ids(&[4, 1], (1, 2))?)?;
    let rows = embedding.weight().to_vec2::<f32>()?;
    let got = output.squeeze(0)?.to_vec2::<f32>()?;
    assert_eq!(got[0], rows[4]);
    assert_eq!(got[1], rows[1]);
    Ok(())
}

#[test]
fn forward_rejects_out_of_range_ids() -> Result<()> {
    let embedding = build(4, 3, DType::F32)?;
    let err = embedding.forward(&make_ids(&[0, 4], (1, 2))?).unwrap_err();
    assert!(err.to_string().contains("token id 4 exceeds vocab size"));
    Ok(())
}

#[test]
fn forward_rejects_bad_layouts() -> Result<()> {
    let embedding = build(4, 3, DType::F32)?;
    let flat = Tensor::from_slice(&[0u32, 1], 2, &Device::Cpu)?;
    assert!(embedding.forward(&flat).is_err());
    let floats = Tensor::zeros((1, 2), DType::F32, &Device::Cpu)?;
    assert!(embedding.forward(&floats).is_err());
    Ok(())
}

#[test]
fn tied_linear_head_produces_finite_logits() -> Result<()> {
    for &dtype in &[DType::F32, DType::F16, DType::BF16] {
        let embedding = build(6, 5, dtype)?;
        let hidden = embedding.forward(&make_ids(&[0, 1, 2, 3], (2, 2))?)?;
        let logits = embedding.linear_out(&hidden, &PrecisionPolicy::from_parameter_dtype(dtype))?;

        assert_eq!(logits.dims(), &[2, 2, 6]);
        assert_eq!(logits.dtype(), dtype);

        let values = logits.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?;
        assert!(values.iter().all(|v| v.is_finite()));
    }
    Ok(())
}
