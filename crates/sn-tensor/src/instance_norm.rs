//! Instance normalization.
//!
//! Per-channel statistics are reduced on the host: the input is read back,
//! laid out channel-major so every channel is one contiguous run, and the
//! channels are reduced in parallel. The normalize/scale/shift arithmetic
//! then runs on the device against host-broadcast statistics.

use rayon::prelude::*;
use tracing::debug;

use crate::cpu::layout;
use crate::device::Device;
use crate::error::{Result, TensorError};
use crate::tensor::Tensor;

/// Mean and population variance of one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ChannelMoments {
    pub mean: f32,
    pub variance: f32,
}

/// Computes per-channel moments of an `[h, w, c]` activation.
///
/// The variance divides by `h * w`. An empty spatial extent yields zero
/// moments for every channel.
pub fn channel_moments(values: &[f32], h: usize, w: usize, c: usize) -> Result<Vec<ChannelMoments>> {
    let spatial = h * w;
    if values.len() != spatial * c {
        return Err(TensorError::ShapeMismatch {
            op: "channel_moments",
            expected: vec![h, w, c],
            got: vec![values.len()],
        });
    }
    if spatial == 0 {
        return Ok(vec![ChannelMoments::default(); c]);
    }

    let channel_major = layout::permute(values, &[h, w, c].into(), &[2, 0, 1])?;
    let n = spatial as f64;
    Ok(channel_major
        .par_chunks(spatial)
        .map(|run| {
            let mean = run.iter().map(|&v| v as f64).sum::<f64>() / n;
            let variance = run
                .iter()
                .map(|&v| {
                    let d = v as f64 - mean;
                    d * d
                })
                .sum::<f64>()
                / n;
            ChannelMoments {
                mean: mean as f32,
                variance: variance as f32,
            }
        })
        .collect())
}

/// Replicates one value per channel across every spatial position of an
/// `[h, w, c]` layout.
fn broadcast_channels(per_channel: impl Iterator<Item = f32> + Clone, spatial: usize, c: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(spatial * c);
    for _ in 0..spatial {
        out.extend(per_channel.clone());
    }
    debug_assert_eq!(out.len(), spatial * c);
    out
}

impl Device {
    /// Mean and variance of `input[H, W, C]`, each broadcast back to
    /// `[H, W, C]` as host tensors.
    ///
    /// Reads `input` back to the host when it lives on the device.
    pub fn instance_moments(&mut self, input: &Tensor) -> Result<(Tensor, Tensor)> {
        let (h, w, c) = input.shape().hwc("instance_moments")?;
        let host = self.to_host(input)?;
        let values = host.host_data().unwrap_or_default();
        let moments = channel_moments(values, h, w, c)?;
        debug!(shape = %input.shape(), "instance moments");

        let spatial = h * w;
        let mean = broadcast_channels(moments.iter().map(|m| m.mean), spatial, c);
        let variance = broadcast_channels(moments.iter().map(|m| m.variance), spatial, c);
        Ok((
            Tensor::try_new(mean, input.shape().clone())?,
            Tensor::try_new(variance, input.shape().clone())?,
        ))
    }

    /// `scale * (input - mean) / sqrt(variance + epsilon) + shift`, with
    /// statistics taken per channel over the spatial extent.
    ///
    /// `shift` and `scale` are per-channel vectors broadcast over H and W.
    pub fn instance_norm(
        &mut self,
        input: &Tensor,
        shift: &Tensor,
        scale: &Tensor,
        epsilon: f32,
    ) -> Result<Tensor> {
        let (mean, variance) = self.instance_moments(input)?;
        let centered = self.sub_strict(input, &mean)?;
        let padded = self.add_scalar(&variance, epsilon)?;
        let sigma = self.sqrt(&padded)?;
        let normalized = self.div_strict(&centered, &sigma)?;
        let scaled = self.mul(scale, &normalized)?;
        self.add(&scaled, shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn ramp_3x3x12() -> Tensor {
        Tensor::new((0..108).map(|v| v as f32).collect(), [3, 3, 12])
    }

    #[test]
    fn test_moments_of_ramp() {
        let t = ramp_3x3x12();
        let moments = channel_moments(t.host_data().unwrap(), 3, 3, 12).unwrap();
        assert_eq!(moments.len(), 12);
        for (c, m) in moments.iter().enumerate() {
            // channel c holds {c, c+12, ..., c+96}
            assert_abs_diff_eq!(m.mean, c as f32 + 48.0, epsilon = 1e-4);
            assert_abs_diff_eq!(m.variance, 960.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_instance_moments_broadcast_layout() {
        let mut dev = Device::cpu();
        let scope = dev.open_scope();
        let x = dev.upload(&ramp_3x3x12()).unwrap();
        let (mean, variance) = dev.instance_moments(&x).unwrap();
        assert!(!mean.is_device());
        assert_eq!(mean.shape().dims(), &[3, 3, 12]);

        let mean = mean.host_data().unwrap();
        // every pixel repeats the same channel means
        for pixel in mean.chunks_exact(12) {
            assert_eq!(pixel, &mean[..12]);
        }
        assert_abs_diff_eq!(mean[5], 53.0, epsilon = 1e-4);
        assert!(variance.host_data().unwrap().iter().all(|&v| (v - 960.0).abs() < 1e-3));
        assert_eq!(dev.stats().host_transfers, 1);
        dev.close_scope(scope).unwrap();
    }

    #[test]
    fn test_empty_spatial_extent() {
        let moments = channel_moments(&[], 0, 4, 3).unwrap();
        assert_eq!(moments, vec![ChannelMoments::default(); 3]);
    }

    #[test]
    fn test_affine_is_applied_per_channel() {
        let mut dev = Device::cpu();
        let scope = dev.open_scope();
        // channel 0: {0, 2}, channel 1: {5, 5}
        let x = Tensor::new(vec![0.0, 5.0, 2.0, 5.0], [1, 2, 2]);
        let shift = Tensor::new(vec![1.0, -1.0], [2]);
        let scale = Tensor::new(vec![2.0, 3.0], [2]);
        let y = dev.instance_norm(&x, &shift, &scale, 0.0).unwrap();
        let y = dev.read(&y).unwrap();
        assert_abs_diff_eq!(y[0], -1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(y[2], 3.0, epsilon = 1e-5);
        // constant channel: 0 / sqrt(0) is NaN without epsilon
        assert!(y[1].is_nan());
        dev.close_scope(scope).unwrap();
    }

    #[test]
    fn test_rejects_non_activation_rank() {
        let mut dev = Device::cpu();
        let scope = dev.open_scope();
        let x = Tensor::zeros([4, 4]);
        let one = Tensor::ones([4]);
        assert!(dev
            .instance_norm(&x, &one, &one, 1e-3)
            .unwrap_err()
            .is_shape_mismatch());
        dev.close_scope(scope).unwrap();
    }

    proptest! {
        #[test]
        fn unit_affine_standardizes_channels(
            (h, w, c, data) in (1usize..6, 1usize..6, 1usize..4).prop_flat_map(|(h, w, c)| {
                (Just(h), Just(w), Just(c), prop::collection::vec(-50.0f32..50.0, h * w * c))
            })
        ) {
            // A constant channel has no defined standardization.
            let moments = channel_moments(&data, h, w, c).unwrap();
            prop_assume!(h * w > 1 && moments.iter().all(|m| m.variance > 1e-2));

            let mut dev = Device::cpu();
            let scope = dev.open_scope();
            let x = Tensor::new(data, [h, w, c]);
            let y = dev
                .instance_norm(&x, &Tensor::zeros([c]), &Tensor::ones([c]), 0.0)
                .unwrap();
            let y = dev.read(&y).unwrap();
            dev.close_scope(scope).unwrap();

            for m in channel_moments(&y, h, w, c).unwrap() {
                prop_assert!(m.mean.abs() < 1e-3);
                prop_assert!((m.variance - 1.0).abs() < 1e-2);
            }
        }
    }
}
