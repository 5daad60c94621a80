use super::{KVCache, LayerKVCache, MutableKVCache};
use candle_core::{DType, Device, Tensor};
use static_assertions::{assert_impl_all, assert_not_impl_any};

assert_impl_all!(KVCache: Clone, Send, Sync);
assert_impl_all!(LayerKVCache: Clone, Send, Sync);
assert_not_impl_any!(MutableKVCache: Clone);

fn allclose(a: &Tensor, b: &Tensor, tol: f32) {
    let diff = a
        .to_dtype(DType::F32)
        .unwrap()
        .sub(&b.to_dtype(DType::F32).unwrap())
        .unwrap()
        .abs()
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1::<f32>()
        .unwrap();
    let max = diff.into_iter().fold(0.0_f32, |acc, v| acc.max(v));
    assert!(max <= tol, "max diff {max} exceeded tolerance {tol}");
}

fn random_kv(device: &Device, seq_len: usize) -> (Tensor, Tensor) {
    let shape = (2, 2, seq_len, 4);
    let keys = Tensor::rand(0.0f32, 1.0, shape, device).unwrap();
    let values = Tensor::rand(0.0f32, 1.0, shape, device).unwrap();
    (keys, values)
}

#[test]
fn append_extends_length_and_keeps_history() {
    let device = Device::Cpu;
    let empty = LayerKVCache::new();
    assert_eq!(empty.length(), 0);
    assert!(empty.keys().is_none());

    let (k0, v0) = random_kv(&device, 3);
    let first = empty.append(&k0, &v0).unwrap();
    assert_eq!(first.length(), 3);

    let (k1, v1) = random_kv(&device, 1);
    let second = first.append(&k1, &v1).unwrap();
    assert_eq!(second.length(), 4);
    assert_eq!(first.length(), 3);
    assert_eq!(empty.length(), 0);

    let keys = second.keys().unwrap();
    let values = second.values().unwrap();
    assert_eq!(keys.dims(), values.dims());
    allclose(&keys.narrow(2, 0, 3).unwrap(), &k0, 0.0);
    allclose(&keys.narrow(2, 3, 1).unwrap(), &k1, 0.0);
    allclose(&values.narrow(2, 3, 1).unwrap(), &v1, 0.0);
}

#[test]
fn append_rejects_mismatched_geometry() {
    let device = Device::Cpu;
    let (k, v) = random_kv(&device, 2);
    let cache = LayerKVCache::new().append(&k, &v).unwrap();

    let wrong_heads = Tensor::zeros((2, 3, 1, 4), DType::F32, &device).unwrap();
    assert!(cache.append(&wrong_heads, &wrong_heads).is_err());

    let short_values = Tensor::zeros((2, 2, 2, 4), DType::F32, &device).unwrap();
    let keys = Tensor::zeros((2, 2, 1, 4), DType::F32, &device).unwrap();
    assert!(cache.append(&keys, &short_values).is_err());

    let rank3 = Tensor::zeros((2, 1, 4), DType::F32, &device).unwrap();
    assert!(LayerKVCache::new().append(&rank3, &rank3).is_err());
}

#[test]
fn with_layer_leaves_original_untouched() {
    let device = Device::Cpu;
    let cache = KVCache::new(3);
    let (k, v) = random_kv(&device, 2);
    let layer = cache.layer(1).unwrap().append(&k, &v).unwrap();

    let updated = cache.with_layer(1, layer).unwrap();
    assert_eq!(cache.layer(1).unwrap().length(), 0);
    assert_eq!(updated.layer(1).unwrap().length(), 2);
    assert_eq!(updated.layer(0).unwrap().length(), 0);
    assert!(cache.with_layer(3, LayerKVCache::new()).is_err());
}

#[test]
fn mutable_view_updates_every_layer_then_freezes() {
    let device = Device::Cpu;
    let before = KVCache::new(4);
    let mut staging = before.to_mutable();
    assert_eq!(staging.n_layers(), 4);

    let (k, v) = random_kv(&device, 5);
    for index in 0..staging.n_layers() {
        let next = staging.get(index).unwrap().append(&k, &v).unwrap();
        staging.set(index, next).unwrap();
    }
    let after = staging.freeze();

    assert_eq!(before.length(), 0);
    assert_eq!(after.length(), 5);
    for index in 0..4 {
        assert_eq!(after.layer(index).unwrap().length(), 5);
    }

    let (k, v) = random_kv(&device, 2);
    let mut staging = after.to_mutable();
    for index in 0..4 {
        let next = staging.get(index).unwrap().append(&k, &v).unwrap();
        staging.set(index, next).unwrap();
    }
    let extended = staging.freeze();
    assert_eq!(after.length(), 5);
    for index in 0..4 {
        assert_eq!(extended.layer(index).unwrap().length(), 7);
    }
}

#[test]
fn empty_cache_has_zero_length() {
    assert_eq!(KVCache::default().length(), 0);
    assert_eq!(KVCache::new(2).length(), 0);
    assert!(KVCache::new(2).to_mutable().get(2).is_err());
}
