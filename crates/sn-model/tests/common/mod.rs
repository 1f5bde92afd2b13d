#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;

use sn_model::transform::{ConvLayer, Stage, TransformPlan};
use sn_model::{FireModule, VariableStore};
use sn_tensor::{Shape, Tensor};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Deterministic pseudo-random values in `[-0.5, 0.5)`.
pub struct Lcg(u32);

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Lcg(seed)
    }

    pub fn next(&mut self) -> f32 {
        self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (self.0 >> 8) as f32 / (1u32 << 24) as f32 - 0.5
    }

    pub fn tensor(&mut self, shape: impl Into<Shape>) -> Tensor {
        let shape = shape.into();
        let data = (0..shape.numel()).map(|_| self.next()).collect();
        Tensor::new(data, shape)
    }
}

fn conv_variables(
    rng: &mut Lcg,
    vars: &mut BTreeMap<String, Tensor>,
    layer: &ConvLayer,
    cin: usize,
    cout: usize,
) {
    vars.insert(layer.weight.clone(), rng.tensor([3, 3, cin, cout]));
    vars.insert(layer.norm.shift.clone(), rng.tensor([cout]));
    vars.insert(layer.norm.scale.clone(), Tensor::ones([cout]));
}

/// Variables for a transform plan with `width` channels everywhere except
/// the RGB input and output.
pub fn transform_variables(plan: &TransformPlan, width: usize) -> BTreeMap<String, Tensor> {
    let mut rng = Lcg::new(7);
    let mut vars = BTreeMap::new();
    let mut channels = 3;
    let last = plan.stages().len() - 1;

    for (i, (_, stage)) in plan.stages().iter().enumerate() {
        match stage {
            Stage::Conv(layer) => {
                let cout = if i == last { 3 } else { width };
                conv_variables(&mut rng, &mut vars, layer, channels, cout);
                channels = cout;
            }
            Stage::Residual(block) => {
                conv_variables(&mut rng, &mut vars, &block.first, channels, channels);
                conv_variables(&mut rng, &mut vars, &block.second, channels, channels);
            }
            Stage::ConvTranspose(layer) => {
                vars.insert(
                    layer.weight.clone(),
                    rng.tensor([3, 3, layer.filters, channels]),
                );
                vars.insert(layer.norm.shift.clone(), rng.tensor([layer.filters]));
                vars.insert(layer.norm.scale.clone(), Tensor::ones([layer.filters]));
                channels = layer.filters;
            }
        }
    }
    vars
}

/// Variables for a fire-module classifier with small channel counts:
/// conv1 to 4 channels, every fire module squeezing to 2 and expanding to
/// 2 + 2, conv10 to `classes`.
pub fn squeezenet_variables(fires: &[FireModule], classes: usize) -> BTreeMap<String, Tensor> {
    let mut rng = Lcg::new(11);
    let mut vars = BTreeMap::new();
    vars.insert("conv1_W:0".to_string(), rng.tensor([3, 3, 3, 4]));
    vars.insert("conv1_b:0".to_string(), rng.tensor([4]));
    for fire in fires {
        vars.insert(fire.squeeze.weight.clone(), rng.tensor([1, 1, 4, 2]));
        vars.insert(fire.squeeze.bias.clone(), rng.tensor([2]));
        vars.insert(fire.expand1x1.weight.clone(), rng.tensor([1, 1, 2, 2]));
        vars.insert(fire.expand1x1.bias.clone(), rng.tensor([2]));
        vars.insert(fire.expand3x3.weight.clone(), rng.tensor([3, 3, 2, 2]));
        vars.insert(fire.expand3x3.bias.clone(), rng.tensor([2]));
    }
    vars.insert("conv10_W:0".to_string(), rng.tensor([1, 1, 4, classes]));
    vars.insert("conv10_b:0".to_string(), rng.tensor([classes]));
    vars
}

pub fn store(vars: &BTreeMap<String, Tensor>) -> VariableStore {
    vars.iter().map(|(k, t)| (k.clone(), t.clone())).collect()
}

/// Writes `vars` as a float32 checkpoint directory.
pub fn write_checkpoint(dir: &Path, vars: &BTreeMap<String, Tensor>) {
    let mut manifest = serde_json::Map::new();
    for (i, (key, tensor)) in vars.iter().enumerate() {
        let filename = format!("var{i}.bin");
        let bytes: Vec<u8> = tensor
            .host_data()
            .unwrap()
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        std::fs::write(dir.join(&filename), bytes).unwrap();
        manifest.insert(
            key.clone(),
            serde_json::json!({ "filename": filename, "shape": tensor.shape().dims() }),
        );
    }
    std::fs::write(
        dir.join("manifest.json"),
        serde_json::to_vec_pretty(&serde_json::Value::Object(manifest)).unwrap(),
    )
    .unwrap();
}
