pub mod classes;
pub mod config;
pub mod layers;

pub use classes::top_k_classes;
pub use config::SqueezeNetConfig;
pub use layers::{ConvKeys, FireModule};

use std::collections::BTreeMap;

use sn_tensor::{Device, Padding, Retain, Tensor};
use tracing::{debug, instrument};

use crate::architecture::ModelArchitecture;
use crate::error::Result;
use crate::variables::{VariableLoader, VariableStore};

/// Result of a classifier forward pass: pre-softmax logits plus the named
/// intermediate activations, all owned by the caller.
#[derive(Debug, Clone)]
pub struct SqueezeNetOutput {
    /// `[classes]`
    pub logits: Tensor,
    /// `conv_1`, `maxpool_1`, `fire2` ... `fire9`, `maxpool_2`, `maxpool_3`, `conv10`.
    pub activations: BTreeMap<String, Tensor>,
}

impl Retain for SqueezeNetOutput {
    fn tensors(&self) -> Vec<&Tensor> {
        let mut out = vec![&self.logits];
        out.extend(self.activations.values());
        out
    }
}

/// Fire-module image classifier.
#[derive(Debug, Clone)]
pub struct SqueezeNet {
    config: SqueezeNetConfig,
    conv1: ConvKeys,
    fires: Vec<FireModule>,
    conv10: ConvKeys,
    variables: Option<VariableStore>,
}

impl SqueezeNet {
    pub fn new(config: SqueezeNetConfig) -> Result<Self> {
        config.validate()?;
        let fires = config.fire_ids.iter().map(|&id| FireModule::new(id)).collect();
        Ok(SqueezeNet {
            config,
            conv1: ConvKeys::named("conv1"),
            fires,
            conv10: ConvKeys::named("conv10"),
            variables: None,
        })
    }

    pub fn with_variables(mut self, variables: VariableStore) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn fires(&self) -> &[FireModule] {
        &self.fires
    }

    fn forward(
        &self,
        dev: &mut Device,
        vars: &VariableStore,
        input: &Tensor,
    ) -> Result<SqueezeNetOutput> {
        const POOL_WINDOW: [usize; 2] = [3, 3];
        const POOL_STRIDE: [usize; 2] = [2, 2];

        let mut activations = BTreeMap::new();

        let (w1, b1) = self.conv1.resolve(vars)?;
        let stride = [self.config.conv1_stride, self.config.conv1_stride];
        let conv1 = dev.conv2d(input, w1, Some(b1), stride, Padding::Valid)?;
        let conv1 = dev.relu(&conv1)?;
        activations.insert("conv_1".to_string(), conv1.clone());

        let mut x = dev.max_pool(&conv1, POOL_WINDOW, POOL_STRIDE, Padding::Valid)?;
        activations.insert("maxpool_1".to_string(), x.clone());

        let mut pools = 1;
        for fire in &self.fires {
            x = dev.scope(|dev| fire.apply(dev, vars, &x))?;
            activations.insert(fire.name(), x.clone());

            if self.config.pool_after.contains(&fire.id) {
                pools += 1;
                x = dev.max_pool(&x, POOL_WINDOW, POOL_STRIDE, Padding::Valid)?;
                activations.insert(format!("maxpool_{pools}"), x.clone());
            }
        }

        let (w10, b10) = self.conv10.resolve(vars)?;
        let conv10 = dev.conv2d(&x, w10, Some(b10), [1, 1], Padding::Valid)?;
        activations.insert("conv10".to_string(), conv10.clone());

        let (h, w, classes) = conv10.shape().hwc("avg_pool")?;
        let pooled = dev.avg_pool(&conv10, [h, w], [1, 1], Padding::Valid)?;
        let logits = pooled.reshape([classes])?;
        debug!(classes, "squeezenet logits");

        Ok(SqueezeNetOutput {
            logits,
            activations,
        })
    }
}

impl ModelArchitecture for SqueezeNet {
    type Output = SqueezeNetOutput;

    fn name(&self) -> &str {
        "squeezenet"
    }

    fn load_variables(&mut self, loader: &dyn VariableLoader) -> Result<()> {
        self.variables = Some(loader.load_all()?);
        Ok(())
    }

    fn variables(&self) -> Option<&VariableStore> {
        self.variables.as_ref()
    }

    #[instrument(skip_all, level = "debug", fields(input = %input.shape()))]
    fn infer(&self, dev: &mut Device, input: &Tensor) -> Result<SqueezeNetOutput> {
        let empty = VariableStore::new();
        let vars = self.variables.as_ref().unwrap_or(&empty);
        dev.scope(|dev| self.forward(dev, vars, input))
    }
}
