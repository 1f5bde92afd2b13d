//! Conversions between interleaved 8-bit pixel buffers and `[H, W, 3]`
//! tensors.

use sn_tensor::{Device, Tensor};

use crate::error::{ModelError, Result};

/// Uploads an RGB or RGBA pixel buffer as an `[height, width, 3]` device
/// tensor of raw channel values. Alpha is dropped.
pub fn rgba_to_tensor(dev: &mut Device, pixels: &[u8], width: usize, height: usize) -> Result<Tensor> {
    let count = width * height;
    let channels = match pixels.len().checked_div(count) {
        Some(c @ (3 | 4)) if c * count == pixels.len() => c,
        _ => {
            return Err(ModelError::Other(format!(
                "{} bytes is neither RGB nor RGBA for a {width}x{height} image",
                pixels.len()
            )))
        }
    };

    let data: Vec<f32> = pixels
        .chunks_exact(channels)
        .flat_map(|px| px[..3].iter().map(|&v| v as f32))
        .collect();
    let host = Tensor::try_new(data, [height, width, 3])?;
    Ok(dev.upload(&host)?)
}

/// Reads an `[H, W, 3]` tensor back as RGBA bytes, rounding and clamping
/// every channel to `0..=255` with an opaque alpha.
pub fn tensor_to_rgba(dev: &mut Device, tensor: &Tensor) -> Result<Vec<u8>> {
    let (_, _, c) = tensor.shape().hwc("tensor_to_rgba")?;
    if c != 3 {
        return Err(ModelError::Other(format!(
            "expected 3 channels, got shape {}",
            tensor.shape()
        )));
    }
    let values = dev.read(tensor)?;
    let mut out = Vec::with_capacity(values.len() / 3 * 4);
    for px in values.chunks_exact(3) {
        out.extend(px.iter().map(|&v| v.round().clamp(0.0, 255.0) as u8));
        out.push(255);
    }
    Ok(out)
}
