pub mod config;
pub mod layers;

pub use config::TransformNetConfig;
pub use layers::{ConvLayer, ConvTransposeLayer, InstanceNormKeys, ResidualBlock, Stage};

use sn_tensor::{Device, Tensor};
use tracing::{debug, instrument};

use crate::architecture::ModelArchitecture;
use crate::error::Result;
use crate::variables::{VariableLoader, VariableStore};

/// Ordered stages of a transform network with their variable keys resolved
/// from consecutive positional indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformPlan {
    stages: Vec<(String, Stage)>,
    variable_count: usize,
}

impl TransformPlan {
    /// Lays out the network: three convs with strides 1, 2, 2, the residual
    /// blocks, the stride-2 upsampling layers and a final stride-1 conv
    /// without relu.
    pub fn new(config: &TransformNetConfig) -> Self {
        let mut stages = Vec::new();
        let mut cursor = 0;

        for (i, stride) in [1, 2, 2].into_iter().enumerate() {
            stages.push((format!("conv{}", i + 1), Stage::Conv(ConvLayer::at(cursor, stride, true))));
            cursor += ConvLayer::VARIABLES;
        }
        for i in 0..config.residual_blocks {
            stages.push((format!("resid{}", i + 1), Stage::Residual(ResidualBlock::at(cursor))));
            cursor += ResidualBlock::VARIABLES;
        }
        for (i, &filters) in config.upsample_filters.iter().enumerate() {
            stages.push((
                format!("conv_t{}", i + 1),
                Stage::ConvTranspose(ConvTransposeLayer::at(cursor, filters, 2)),
            ));
            cursor += ConvTransposeLayer::VARIABLES;
        }
        stages.push((
            format!("conv_t{}", config.upsample_filters.len() + 1),
            Stage::Conv(ConvLayer::at(cursor, 1, false)),
        ));
        cursor += ConvLayer::VARIABLES;

        TransformPlan {
            stages,
            variable_count: cursor,
        }
    }

    pub fn stages(&self) -> &[(String, Stage)] {
        &self.stages
    }

    /// Number of positional variables the plan reads.
    pub fn variable_count(&self) -> usize {
        self.variable_count
    }
}

/// Feed-forward style-transfer network mapping an `[H, W, 3]` image to a
/// stylized `[H, W, 3]` image with values in `[offset - scale, offset + scale]`.
#[derive(Debug, Clone)]
pub struct TransformNet {
    config: TransformNetConfig,
    plan: TransformPlan,
    variables: Option<VariableStore>,
}

impl TransformNet {
    pub fn new(config: TransformNetConfig) -> Result<Self> {
        config.validate()?;
        let plan = TransformPlan::new(&config);
        Ok(TransformNet {
            config,
            plan,
            variables: None,
        })
    }

    /// Installs an already resolved store.
    pub fn with_variables(mut self, variables: VariableStore) -> Self {
        self.variables = Some(variables);
        self
    }

    pub fn config(&self) -> &TransformNetConfig {
        &self.config
    }

    pub fn plan(&self) -> &TransformPlan {
        &self.plan
    }

    /// Runs every stage in its own child scope, so peak device memory stays
    /// at one stage's working set plus the running activation.
    fn forward(&self, dev: &mut Device, vars: &VariableStore, input: &Tensor) -> Result<Tensor> {
        let epsilon = self.config.epsilon;
        let mut x = input.clone();
        for (i, (name, stage)) in self.plan.stages().iter().enumerate() {
            let next = dev.scope(|dev| stage.apply(name, dev, vars, &x, epsilon))?;
            // The caller's input is not ours to release.
            if i > 0 {
                dev.dispose(&x)?;
            }
            x = next;
        }

        let t = dev.tanh(&x)?;
        let scaled = dev.mul_scalar(&t, self.config.output_scale)?;
        Ok(dev.add_scalar(&scaled, self.config.output_offset)?)
    }
}

impl ModelArchitecture for TransformNet {
    type Output = Tensor;

    fn name(&self) -> &str {
        "transform_net"
    }

    fn load_variables(&mut self, loader: &dyn VariableLoader) -> Result<()> {
        let store = loader.load_all()?;
        debug!(
            variables = store.len(),
            expected = self.plan.variable_count(),
            "transform net variables loaded"
        );
        self.variables = Some(store);
        Ok(())
    }

    fn variables(&self) -> Option<&VariableStore> {
        self.variables.as_ref()
    }

    #[instrument(skip_all, level = "debug", fields(input = %input.shape()))]
    fn infer(&self, dev: &mut Device, input: &Tensor) -> Result<Tensor> {
        let empty = VariableStore::new();
        let vars = self.variables.as_ref().unwrap_or(&empty);
        dev.scope(|dev| self.forward(dev, vars, input))
    }
}
