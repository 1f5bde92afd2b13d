// Layout kernels: broadcasting index math, axis permutation, channel concat.

use crate::error::{Result, TensorError};
use crate::shape::Shape;

use super::check_len;

/// Strides of `shape` when viewed as `out_shape` under numpy broadcasting:
/// broadcast axes get stride 0.
pub fn broadcast_strides(shape: &Shape, out_shape: &Shape) -> Vec<usize> {
    let offset = out_shape.ndim() - shape.ndim();
    let strides = shape.strides();
    (0..out_shape.ndim())
        .map(|i| {
            if i < offset || shape.dim(i - offset) == 1 {
                0
            } else {
                strides[i - offset]
            }
        })
        .collect()
}

/// Host-side axis permutation returning a fresh contiguous vector.
pub fn permute(x: &[f32], shape: &Shape, axes: &[usize]) -> Result<Vec<f32>> {
    let mut out = vec![0.0; x.len()];
    permute_into(x, shape, axes, &mut out)?;
    Ok(out)
}

pub fn permute_into(x: &[f32], shape: &Shape, axes: &[usize], out: &mut [f32]) -> Result<()> {
    check_len("permute", "x", x.len(), shape.numel())?;
    check_len("permute", "out", out.len(), shape.numel())?;
    let out_shape = shape.permuted(axes)?;
    let in_strides = shape.strides();
    let out_strides = out_shape.strides();
    // Input stride walked by each output axis.
    let walk: Vec<usize> = axes.iter().map(|&a| in_strides[a]).collect();

    for (idx, o) in out.iter_mut().enumerate() {
        let mut rem = idx;
        let mut src = 0;
        for d in 0..out_strides.len() {
            let coord = rem / out_strides[d];
            rem %= out_strides[d];
            src += coord * walk[d];
        }
        *o = x[src];
    }
    Ok(())
}

pub fn concat_channels(a: &[f32], ca: usize, b: &[f32], cb: usize, out: &mut [f32]) -> Result<()> {
    if ca == 0 || cb == 0 {
        return Err(TensorError::Other(
            "concat_channels: channel counts must be > 0".to_string(),
        ));
    }
    let pixels = a.len() / ca;
    if b.len() != pixels * cb || a.len() != pixels * ca {
        return Err(TensorError::ShapeMismatch {
            op: "concat_channels",
            expected: vec![pixels, cb],
            got: vec![b.len() / cb, cb],
        });
    }
    check_len("concat_channels", "out", out.len(), pixels * (ca + cb))?;

    for ((dst, ra), rb) in out
        .chunks_exact_mut(ca + cb)
        .zip(a.chunks_exact(ca))
        .zip(b.chunks_exact(cb))
    {
        dst[..ca].copy_from_slice(ra);
        dst[ca..].copy_from_slice(rb);
    }
    Ok(())
}
