use crate::error::{ModelError, Result};

/// Layout of the fire-module classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqueezeNetConfig {
    /// Fire modules in execution order; module `n` reads `fire{n}/...` keys.
    pub fire_ids: Vec<usize>,
    /// Fire modules followed by a 3x3 stride-2 max pool.
    pub pool_after: Vec<usize>,
    /// Stride of the first convolution.
    pub conv1_stride: usize,
}

impl Default for SqueezeNetConfig {
    fn default() -> Self {
        SqueezeNetConfig {
            fire_ids: (2..=9).collect(),
            pool_after: vec![3, 5],
            conv1_stride: 2,
        }
    }
}

impl SqueezeNetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.conv1_stride == 0 {
            return Err(ModelError::InvalidConfig("conv1 stride must be positive".to_string()));
        }
        if let Some(id) = self.pool_after.iter().find(|id| !self.fire_ids.contains(id)) {
            return Err(ModelError::InvalidConfig(format!(
                "pool after unknown fire module {id}"
            )));
        }
        Ok(())
    }
}
