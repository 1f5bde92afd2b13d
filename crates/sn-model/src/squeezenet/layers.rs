use sn_tensor::{Device, Padding, Tensor};
use tracing::instrument;

use crate::error::Result;
use crate::variables::VariableStore;

/// Filter and bias keys of a biased convolution, `{prefix}_W:0` and
/// `{prefix}_b:0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvKeys {
    pub weight: String,
    pub bias: String,
}

impl ConvKeys {
    pub fn named(prefix: &str) -> Self {
        ConvKeys {
            weight: format!("{prefix}_W:0"),
            bias: format!("{prefix}_b:0"),
        }
    }

    pub fn resolve<'a>(&self, vars: &'a VariableStore) -> Result<(&'a Tensor, &'a Tensor)> {
        Ok((vars.get(&self.weight)?, vars.get(&self.bias)?))
    }
}

/// Squeeze-then-expand block: a 1x1 squeeze conv feeding a 1x1 and a padded
/// 3x3 expand conv whose outputs are concatenated along channels. Every
/// conv is followed by relu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireModule {
    pub id: usize,
    pub squeeze: ConvKeys,
    pub expand1x1: ConvKeys,
    pub expand3x3: ConvKeys,
}

impl FireModule {
    pub fn new(id: usize) -> Self {
        FireModule {
            id,
            squeeze: ConvKeys::named(&format!("fire{id}/squeeze1x1")),
            expand1x1: ConvKeys::named(&format!("fire{id}/expand1x1")),
            expand3x3: ConvKeys::named(&format!("fire{id}/expand3x3")),
        }
    }

    pub fn name(&self) -> String {
        format!("fire{}", self.id)
    }

    #[instrument(skip_all, level = "debug", fields(fire = self.id, shape = %input.shape()))]
    pub fn apply(&self, dev: &mut Device, vars: &VariableStore, input: &Tensor) -> Result<Tensor> {
        let (sw, sb) = self.squeeze.resolve(vars)?;
        let (e1w, e1b) = self.expand1x1.resolve(vars)?;
        let (e3w, e3b) = self.expand3x3.resolve(vars)?;

        let s = dev.conv2d(input, sw, Some(sb), [1, 1], Padding::Valid)?;
        let s = dev.relu(&s)?;
        let e1 = dev.conv2d(&s, e1w, Some(e1b), [1, 1], Padding::Valid)?;
        let e1 = dev.relu(&e1)?;
        let e3 = dev.conv2d(&s, e3w, Some(e3b), [1, 1], Padding::Explicit(1))?;
        let e3 = dev.relu(&e3)?;
        Ok(dev.concat_channels(&e1, &e3)?)
    }
}
