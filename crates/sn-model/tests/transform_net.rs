mod common;

use assert_matches::assert_matches;
use sn_model::{
    rgba_to_tensor, tensor_to_rgba, CheckpointLoader, MemoryLoader, ModelArchitecture, ModelError,
    TransformNet, TransformNetConfig,
};
use sn_tensor::{Device, Tensor};

use common::Lcg;

/// Input extent; the two stride-2 convs leave a 2x2 bottleneck.
const SIZE: usize = 8;

fn small_config() -> TransformNetConfig {
    TransformNetConfig {
        residual_blocks: 2,
        upsample_filters: vec![4, 4],
        ..Default::default()
    }
}

fn loaded_net() -> TransformNet {
    let net = TransformNet::new(small_config()).unwrap();
    let vars = common::transform_variables(net.plan(), 4);
    net.with_variables(common::store(&vars))
}

#[test]
fn test_output_shape_and_range() {
    common::init_tracing();
    let net = loaded_net();
    let mut dev = Device::cpu();
    let input = Lcg::new(3).tensor([SIZE, SIZE, 3]);

    let out = net.infer(&mut dev, &input).unwrap();
    assert_eq!(out.shape().dims(), &[SIZE, SIZE, 3]);
    assert!(out.is_device());

    let values = dev.read(&out).unwrap();
    assert!(values.iter().all(|v| (-22.5..=277.5).contains(v)));
    dev.dispose(&out).unwrap();
}

#[test]
fn test_only_the_output_survives() {
    let net = loaded_net();
    let mut dev = Device::cpu();
    let input = Lcg::new(5).tensor([SIZE, SIZE, 3]);

    let out = net.infer(&mut dev, &input).unwrap();
    assert_eq!(dev.scope_depth(), 0);
    assert_eq!(dev.live_buffers(), 1);
    let stats = dev.stats();
    assert_eq!(stats.allocations, stats.released + 1);
    assert!(stats.reused > 0);

    dev.dispose(&out).unwrap();
    assert_eq!(dev.live_buffers(), 0);
    assert!(!dev.is_live(&out));
}

#[test]
fn test_inference_is_deterministic() {
    let net = loaded_net();
    let mut dev = Device::cpu();
    let input = Lcg::new(9).tensor([SIZE, SIZE, 3]);

    let first = net.infer(&mut dev, &input).unwrap();
    let second = net.infer(&mut dev, &input).unwrap();
    assert_eq!(dev.read(&first).unwrap(), dev.read(&second).unwrap());
}

#[test]
fn test_output_depends_on_input() {
    let net = loaded_net();
    let mut dev = Device::cpu();
    let a = net.infer(&mut dev, &Lcg::new(3).tensor([SIZE, SIZE, 3])).unwrap();
    let b = net.infer(&mut dev, &Lcg::new(99).tensor([SIZE, SIZE, 3])).unwrap();
    assert_ne!(dev.read(&a).unwrap(), dev.read(&b).unwrap());
}

#[test]
fn test_first_layer_weights_reach_the_output() {
    let net = TransformNet::new(small_config()).unwrap();
    let vars = common::transform_variables(net.plan(), 4);
    let mut flipped = vars.clone();
    let w = &vars["Variable"];
    let negated: Vec<f32> = w.host_data().unwrap().iter().map(|v| -v).collect();
    flipped.insert("Variable".to_string(), Tensor::new(negated, w.shape().clone()));

    let original = TransformNet::new(small_config())
        .unwrap()
        .with_variables(common::store(&vars));
    let altered = net.with_variables(common::store(&flipped));

    let mut dev = Device::cpu();
    let input = Lcg::new(17).tensor([SIZE, SIZE, 3]);
    let a = original.infer(&mut dev, &input).unwrap();
    let b = altered.infer(&mut dev, &input).unwrap();
    assert_ne!(dev.read(&a).unwrap(), dev.read(&b).unwrap());
}

#[test]
fn test_infer_before_loading_is_missing_variable() {
    let net = TransformNet::new(TransformNetConfig::default()).unwrap();
    let mut dev = Device::cpu();
    let input = Tensor::zeros([SIZE, SIZE, 3]);

    let err = net.infer(&mut dev, &input).unwrap_err();
    assert_matches!(err, ModelError::MissingVariable(key) if key == "Variable");
    assert_eq!(dev.stats().allocations, 0);
    assert_eq!(dev.scope_depth(), 0);
}

#[test]
fn test_missing_later_variable_releases_partial_work() {
    let net = TransformNet::new(small_config()).unwrap();
    let mut vars = common::transform_variables(net.plan(), 4);
    vars.remove("Variable_9").unwrap();
    let net = net.with_variables(common::store(&vars));

    let mut dev = Device::cpu();
    let err = net.infer(&mut dev, &Tensor::zeros([SIZE, SIZE, 3])).unwrap_err();
    assert_matches!(err, ModelError::MissingVariable(key) if key == "Variable_9");
    assert!(dev.stats().allocations > 0);
    assert_eq!(dev.live_buffers(), 0);
}

#[test]
fn test_channel_mismatch_is_shape_fault() {
    let net = loaded_net();
    let mut dev = Device::cpu();
    let err = net.infer(&mut dev, &Tensor::zeros([SIZE, SIZE, 4])).unwrap_err();
    assert!(err.is_shape_mismatch());
    assert_eq!(dev.live_buffers(), 0);
}

#[test]
fn test_pixels_in_pixels_out_inside_caller_scope() {
    let net = loaded_net();
    let mut dev = Device::cpu();
    let pixels: Vec<u8> = (0..SIZE * SIZE * 4).map(|i| (i * 37 % 256) as u8).collect();

    let scope = dev.open_scope();
    let input = rgba_to_tensor(&mut dev, &pixels, SIZE, SIZE).unwrap();
    let out = net.infer(&mut dev, &input).unwrap();
    let rgba = tensor_to_rgba(&mut dev, &out).unwrap();
    assert_eq!(dev.live_buffers(), 2);
    dev.close_scope(scope).unwrap();

    assert_eq!(rgba.len(), SIZE * SIZE * 4);
    assert!(rgba.chunks_exact(4).all(|px| px[3] == 255));
    assert_eq!(dev.live_buffers(), 0);
}

#[test]
fn test_checkpoint_and_memory_loaders_agree() {
    let dir = tempfile::tempdir().unwrap();
    let mut net = TransformNet::new(small_config()).unwrap();
    let vars = common::transform_variables(net.plan(), 4);
    common::write_checkpoint(dir.path(), &vars);

    net.load_variables(&CheckpointLoader::new(dir.path())).unwrap();
    assert_eq!(net.variables().unwrap().len(), net.plan().variable_count());

    let mut memory_net = TransformNet::new(small_config()).unwrap();
    memory_net
        .load_variables(&vars.clone().into_iter().collect::<MemoryLoader>())
        .unwrap();

    let mut dev = Device::cpu();
    let input = Lcg::new(21).tensor([SIZE, SIZE, 3]);
    let a = net.infer(&mut dev, &input).unwrap();
    let b = memory_net.infer(&mut dev, &input).unwrap();
    assert_eq!(dev.read(&a).unwrap(), dev.read(&b).unwrap());
}
