use crate::error::{ModelError, Result};

/// Hyperparameters of the style-transfer transform network.
///
/// Channel counts and kernel sizes come from the checkpoint's filter shapes;
/// only what the checkpoint cannot express lives here.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformNetConfig {
    /// Instance normalization epsilon.
    pub epsilon: f32,
    /// Number of residual blocks between the downsampling and upsampling stages.
    pub residual_blocks: usize,
    /// Filter count of each stride-2 transposed convolution, in order.
    pub upsample_filters: Vec<usize>,
    /// Output is `tanh(x) * output_scale + output_offset`.
    pub output_scale: f32,
    pub output_offset: f32,
}

impl Default for TransformNetConfig {
    fn default() -> Self {
        TransformNetConfig {
            epsilon: 1e-3,
            residual_blocks: 5,
            upsample_filters: vec![64, 32],
            output_scale: 150.0,
            output_offset: 255.0 / 2.0,
        }
    }
}

impl TransformNetConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(ModelError::InvalidConfig(format!(
                "epsilon must be finite and non-negative, got {}",
                self.epsilon
            )));
        }
        if let Some(pos) = self.upsample_filters.iter().position(|&f| f == 0) {
            return Err(ModelError::InvalidConfig(format!(
                "upsample layer {pos} has zero filters"
            )));
        }
        if !self.output_scale.is_finite() || !self.output_offset.is_finite() {
            return Err(ModelError::InvalidConfig(
                "output scale and offset must be finite".to_string(),
            ));
        }
        Ok(())
    }
}
