use candle_core::{DType, Device, Tensor};
use checkpoint::{CheckpointParams, ModelConfig, ParameterStore};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use layers::FeedForward;

fn build(dtype: DType, device: &Device) -> (ModelConfig, FeedForward) {
    let params: CheckpointParams = serde_json::from_str(
        r#"{"dim": 1024, "n_layers": 1, "n_heads": 8, "vocab_size": 32}"#,
    )
    .expect("params");
    let config = ModelConfig::from_params(&params, dtype, device.clone()).expect("config");

    let mut store = ParameterStore::new();
    let randn = |shape: (usize, usize)| {
        Tensor::randn(0f32, 0.02, shape, device)
            .and_then(|t| t.to_dtype(dtype))
            .expect("weight")
    };
    store.insert(
        "layers.0.ffn_norm.weight",
        Tensor::ones(config.d_model, dtype, device).expect("norm"),
    );
    store.insert("layers.0.feed_forward.w1.weight", randn((config.d_ffn, config.d_model)));
    store.insert("layers.0.feed_forward.w2.weight", randn((config.d_model, config.d_ffn)));
    store.insert("layers.0.feed_forward.w3.weight", randn((config.d_ffn, config.d_model)));
    let ffn = FeedForward::create(&config, &store, "layers.0.feed_forward").expect("ffn");
    (config, ffn)
}

fn bench_mlp(c: &mut Criterion) {
    let device = Device::Cpu;
    let batch = 1usize;

    for &dtype in &[DType::BF16, DType::F32] {
        let (config, ffn) = build(dtype, &device);
        let mut group = c.benchmark_group(format!("feed_forward/{dtype:?}"));
        for &seq in &[1usize, 32] {
            let input = Tensor::randn(0f32, 1.0, (batch, seq, config.d_model), &device)
                .and_then(|t| t.to_dtype(dtype))
                .expect("input");
            group.throughput(Throughput::Elements((batch * seq * config.d_model) as u64));
            group.bench_with_input(BenchmarkId::new("swiglu", seq), &input, |b, input| {
                b.iter(|| black_box(ffn.forward(black_box(input)).expect("forward")));
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_mlp);
criterion_main!(benches);
