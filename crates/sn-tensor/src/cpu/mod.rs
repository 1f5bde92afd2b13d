pub mod conv;
pub mod layout;
pub mod pool;

use crate::backend::{BinaryOp, ComputeBackend, PoolKind, UnaryOp};
use crate::error::{Result, TensorError};
use crate::geometry::WindowGeometry;
use crate::shape::Shape;

/// Pure-Rust CPU compute backend.
///
/// Implements all kernels with straightforward loops optimized for
/// correctness rather than peak performance. Intended as a reference
/// implementation and fallback.
#[derive(Debug, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn check_len(op: &'static str, what: &str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(TensorError::Other(format!(
            "{op}: {what}.len()={got} but expected {expected}"
        )));
    }
    Ok(())
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn binary(&self, op: BinaryOp, a: &[f32], b: &[f32], out: &mut [f32]) -> Result<()> {
        if a.len() != b.len() {
            return Err(TensorError::ShapeMismatch {
                op: op.name(),
                expected: vec![a.len()],
                got: vec![b.len()],
            });
        }
        check_len(op.name(), "out", out.len(), a.len())?;
        for ((o, &x), &y) in out.iter_mut().zip(a).zip(b) {
            *o = op.apply(x, y);
        }
        Ok(())
    }

    fn broadcast_binary(
        &self,
        op: BinaryOp,
        a: &[f32],
        a_shape: &Shape,
        b: &[f32],
        b_shape: &Shape,
        out_shape: &Shape,
        out: &mut [f32],
    ) -> Result<()> {
        check_len(op.name(), "a", a.len(), a_shape.numel())?;
        check_len(op.name(), "b", b.len(), b_shape.numel())?;
        check_len(op.name(), "out", out.len(), out_shape.numel())?;

        let a_strides = layout::broadcast_strides(a_shape, out_shape);
        let b_strides = layout::broadcast_strides(b_shape, out_shape);
        let out_strides = out_shape.strides();

        for (idx, o) in out.iter_mut().enumerate() {
            let mut rem = idx;
            let mut ia = 0;
            let mut ib = 0;
            for d in 0..out_strides.len() {
                let coord = rem / out_strides[d];
                rem %= out_strides[d];
                ia += coord * a_strides[d];
                ib += coord * b_strides[d];
            }
            *o = op.apply(a[ia], b[ib]);
        }
        Ok(())
    }

    fn scalar(&self, op: BinaryOp, a: &[f32], s: f32, out: &mut [f32]) -> Result<()> {
        check_len(op.name(), "out", out.len(), a.len())?;
        for (o, &x) in out.iter_mut().zip(a) {
            *o = op.apply(x, s);
        }
        Ok(())
    }

    fn unary(&self, op: UnaryOp, x: &[f32], out: &mut [f32]) -> Result<()> {
        check_len(op.name(), "out", out.len(), x.len())?;
        for (o, &v) in out.iter_mut().zip(x) {
            *o = op.apply(v);
        }
        Ok(())
    }

    fn conv2d(
        &self,
        input: &[f32],
        filter: &[f32],
        bias: Option<&[f32]>,
        geom: &WindowGeometry,
        out: &mut [f32],
    ) -> Result<()> {
        conv::conv2d(input, filter, bias, geom, out)
    }

    fn conv2d_transpose(
        &self,
        input: &[f32],
        filter: &[f32],
        geom: &WindowGeometry,
        out: &mut [f32],
    ) -> Result<()> {
        conv::conv2d_transpose(input, filter, geom, out)
    }

    fn pool(&self, kind: PoolKind, input: &[f32], geom: &WindowGeometry, out: &mut [f32]) -> Result<()> {
        pool::pool(kind, input, geom, out)
    }

    fn concat_channels(
        &self,
        a: &[f32],
        ca: usize,
        b: &[f32],
        cb: usize,
        out: &mut [f32],
    ) -> Result<()> {
        layout::concat_channels(a, ca, b, cb, out)
    }

    fn permute(&self, x: &[f32], shape: &Shape, axes: &[usize], out: &mut [f32]) -> Result<()> {
        layout::permute_into(x, shape, axes, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> CpuBackend {
        CpuBackend::new()
    }

    #[test]
    fn test_binary_ops() {
        let b = backend();
        let mut out = vec![0.0; 2];
        b.binary(BinaryOp::Add, &[1.0, 2.0], &[3.0, 4.0], &mut out).unwrap();
        assert_eq!(out, vec![4.0, 6.0]);
        b.binary(BinaryOp::Sub, &[1.0, 2.0], &[3.0, 4.0], &mut out).unwrap();
        assert_eq!(out, vec![-2.0, -2.0]);
        b.binary(BinaryOp::Mul, &[2.0, 3.0], &[4.0, 5.0], &mut out).unwrap();
        assert_eq!(out, vec![8.0, 15.0]);
        b.binary(BinaryOp::Div, &[8.0, 3.0], &[4.0, 2.0], &mut out).unwrap();
        assert_eq!(out, vec![2.0, 1.5]);
    }

    #[test]
    fn test_binary_length_mismatch() {
        let b = backend();
        let mut out = vec![0.0; 2];
        assert!(b.binary(BinaryOp::Add, &[1.0], &[1.0, 2.0], &mut out).is_err());
    }

    #[test]
    fn test_broadcast_channel_vector() {
        let b = backend();
        // [1, 2, 2] * [2]
        let a = [1.0, 2.0, 3.0, 4.0];
        let scale = [10.0, 100.0];
        let mut out = vec![0.0; 4];
        b.broadcast_binary(
            BinaryOp::Mul,
            &a,
            &Shape::from([1, 2, 2]),
            &scale,
            &Shape::from([2]),
            &Shape::from([1, 2, 2]),
            &mut out,
        )
        .unwrap();
        assert_eq!(out, vec![10.0, 200.0, 30.0, 400.0]);
    }

    #[test]
    fn test_broadcast_left_operand() {
        let b = backend();
        let shift = [1.0, -1.0];
        let x = [0.0, 0.0, 5.0, 5.0];
        let mut out = vec![0.0; 4];
        b.broadcast_binary(
            BinaryOp::Sub,
            &shift,
            &Shape::from([2]),
            &x,
            &Shape::from([2, 2]),
            &Shape::from([2, 2]),
            &mut out,
        )
        .unwrap();
        assert_eq!(out, vec![1.0, -1.0, -4.0, -6.0]);
    }

    #[test]
    fn test_scalar_and_unary() {
        let b = backend();
        let mut out = vec![0.0; 3];
        b.scalar(BinaryOp::Mul, &[1.0, 2.0, 3.0], 2.0, &mut out).unwrap();
        assert_eq!(out, vec![2.0, 4.0, 6.0]);

        b.unary(UnaryOp::Relu, &[-1.0, 0.0, 2.5], &mut out).unwrap();
        assert_eq!(out, vec![0.0, 0.0, 2.5]);

        b.unary(UnaryOp::Sqrt, &[4.0, 9.0, 0.0], &mut out).unwrap();
        assert_eq!(out, vec![2.0, 3.0, 0.0]);

        b.unary(UnaryOp::Tanh, &[0.0, 100.0, -100.0], &mut out).unwrap();
        assert_eq!(out, vec![0.0, 1.0, -1.0]);
    }
}
