//! Building blocks of the transform network.
//!
//! Every layer carries the checkpoint keys it reads, resolved from its base
//! variable index when the plan is built. All keys of a layer are looked up
//! before the layer issues any device work.

use sn_tensor::{Device, Padding, Tensor};
use tracing::instrument;

use crate::error::Result;
use crate::variables::{var_name, VariableStore};

/// Keys of an instance normalization's per-channel affine parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceNormKeys {
    pub shift: String,
    pub scale: String,
}

impl InstanceNormKeys {
    /// Shift at `index`, scale at `index + 1`.
    pub fn at(index: usize) -> Self {
        InstanceNormKeys {
            shift: var_name(index),
            scale: var_name(index + 1),
        }
    }
}

/// Convolution with "same" padding, instance norm, optional relu.
///
/// Occupies three variable indices: the filter, then shift and scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvLayer {
    pub weight: String,
    pub norm: InstanceNormKeys,
    pub stride: usize,
    pub relu: bool,
}

impl ConvLayer {
    pub const VARIABLES: usize = 3;

    pub fn at(index: usize, stride: usize, relu: bool) -> Self {
        ConvLayer {
            weight: var_name(index),
            norm: InstanceNormKeys::at(index + 1),
            stride,
            relu,
        }
    }

    fn resolve<'a>(&self, vars: &'a VariableStore) -> Result<ResolvedConv<'a>> {
        Ok(ResolvedConv {
            weight: vars.get(&self.weight)?,
            shift: vars.get(&self.norm.shift)?,
            scale: vars.get(&self.norm.scale)?,
            stride: self.stride,
            relu: self.relu,
        })
    }

    pub fn apply(
        &self,
        dev: &mut Device,
        vars: &VariableStore,
        input: &Tensor,
        epsilon: f32,
    ) -> Result<Tensor> {
        self.resolve(vars)?.run(dev, input, epsilon)
    }
}

struct ResolvedConv<'a> {
    weight: &'a Tensor,
    shift: &'a Tensor,
    scale: &'a Tensor,
    stride: usize,
    relu: bool,
}

impl ResolvedConv<'_> {
    fn run(&self, dev: &mut Device, input: &Tensor, epsilon: f32) -> Result<Tensor> {
        let stride = [self.stride, self.stride];
        let y = dev.conv2d(input, self.weight, None, stride, Padding::Same)?;
        let y = dev.instance_norm(&y, self.shift, self.scale, epsilon)?;
        if self.relu {
            Ok(dev.relu(&y)?)
        } else {
            Ok(y)
        }
    }
}

/// Two stride-1 conv layers and an identity skip connection.
///
/// Occupies six variable indices; the output shape equals the input shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResidualBlock {
    pub first: ConvLayer,
    pub second: ConvLayer,
}

impl ResidualBlock {
    pub const VARIABLES: usize = 2 * ConvLayer::VARIABLES;

    pub fn at(index: usize) -> Self {
        ResidualBlock {
            first: ConvLayer::at(index, 1, true),
            second: ConvLayer::at(index + ConvLayer::VARIABLES, 1, false),
        }
    }

    pub fn apply(
        &self,
        dev: &mut Device,
        vars: &VariableStore,
        input: &Tensor,
        epsilon: f32,
    ) -> Result<Tensor> {
        let first = self.first.resolve(vars)?;
        let second = self.second.resolve(vars)?;
        let c1 = first.run(dev, input, epsilon)?;
        let c2 = second.run(dev, &c1, epsilon)?;
        Ok(dev.add_strict(&c2, input)?)
    }
}

/// Transposed convolution upsampling by `stride`, instance norm, relu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvTransposeLayer {
    pub weight: String,
    pub norm: InstanceNormKeys,
    pub filters: usize,
    pub stride: usize,
}

impl ConvTransposeLayer {
    pub const VARIABLES: usize = 3;

    pub fn at(index: usize, filters: usize, stride: usize) -> Self {
        ConvTransposeLayer {
            weight: var_name(index),
            norm: InstanceNormKeys::at(index + 1),
            filters,
            stride,
        }
    }

    pub fn apply(
        &self,
        dev: &mut Device,
        vars: &VariableStore,
        input: &Tensor,
        epsilon: f32,
    ) -> Result<Tensor> {
        let weight = vars.get(&self.weight)?;
        let shift = vars.get(&self.norm.shift)?;
        let scale = vars.get(&self.norm.scale)?;

        let (h, w, _) = input.shape().hwc("conv2d_transpose")?;
        let output = [h * self.stride, w * self.stride, self.filters];
        let y = dev.conv2d_transpose(
            input,
            weight,
            output,
            [self.stride, self.stride],
            Padding::Same,
        )?;
        let y = dev.instance_norm(&y, shift, scale, epsilon)?;
        Ok(dev.relu(&y)?)
    }
}

/// One named step of the transform network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Conv(ConvLayer),
    Residual(ResidualBlock),
    ConvTranspose(ConvTransposeLayer),
}

impl Stage {
    pub fn variables(&self) -> usize {
        match self {
            Stage::Conv(_) => ConvLayer::VARIABLES,
            Stage::Residual(_) => ResidualBlock::VARIABLES,
            Stage::ConvTranspose(_) => ConvTransposeLayer::VARIABLES,
        }
    }

    #[instrument(skip_all, level = "debug", fields(stage = name, shape = %input.shape()))]
    pub fn apply(
        &self,
        name: &str,
        dev: &mut Device,
        vars: &VariableStore,
        input: &Tensor,
        epsilon: f32,
    ) -> Result<Tensor> {
        match self {
            Stage::Conv(layer) => layer.apply(dev, vars, input, epsilon),
            Stage::Residual(block) => block.apply(dev, vars, input, epsilon),
            Stage::ConvTranspose(layer) => layer.apply(dev, vars, input, epsilon),
        }
    }
}
