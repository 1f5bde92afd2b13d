//! Primitive operations of a [`Device`].
//!
//! Operands may live on the device or on the host; every result is a new
//! device tensor tracked by the innermost open scope.

use tracing::trace;

use crate::backend::{BinaryOp, PoolKind, UnaryOp};
use crate::device::Device;
use crate::error::{Result, TensorError};
use crate::geometry::{Padding, WindowGeometry};
use crate::shape::Shape;
use crate::tensor::Tensor;

impl Device {
    // ---- elementwise -----------------------------------------------------

    /// `a op b` with numpy-style broadcasting.
    pub fn binary(&mut self, op: BinaryOp, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        if a.shape() == b.shape() {
            return self.binary_same_shape(op, a, b);
        }
        let out_shape = Shape::broadcast_shape(a.shape(), b.shape())?;
        self.emit(&out_shape, |dev, out| {
            let (da, db) = (dev.data(a)?, dev.data(b)?);
            dev.backend()
                .broadcast_binary(op, da, a.shape(), db, b.shape(), &out_shape, out)
        })
    }

    /// `a op b` for operands of exactly equal shape.
    pub fn binary_strict(&mut self, op: BinaryOp, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        if a.shape() != b.shape() {
            return Err(TensorError::ShapeMismatch {
                op: op.name(),
                expected: a.shape().dims().to_vec(),
                got: b.shape().dims().to_vec(),
            });
        }
        self.binary_same_shape(op, a, b)
    }

    fn binary_same_shape(&mut self, op: BinaryOp, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        let shape = a.shape().clone();
        self.emit(&shape, |dev, out| {
            let (da, db) = (dev.data(a)?, dev.data(b)?);
            dev.backend().binary(op, da, db, out)
        })
    }

    pub fn add(&mut self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        self.binary(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        self.binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn div(&mut self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        self.binary(BinaryOp::Div, a, b)
    }

    pub fn add_strict(&mut self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        self.binary_strict(BinaryOp::Add, a, b)
    }

    pub fn sub_strict(&mut self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        self.binary_strict(BinaryOp::Sub, a, b)
    }

    pub fn mul_strict(&mut self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        self.binary_strict(BinaryOp::Mul, a, b)
    }

    pub fn div_strict(&mut self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        self.binary_strict(BinaryOp::Div, a, b)
    }

    /// `x op s` for every element of `x`.
    pub fn scalar_op(&mut self, op: BinaryOp, x: &Tensor, s: f32) -> Result<Tensor> {
        let shape = x.shape().clone();
        self.emit(&shape, |dev, out| {
            let dx = dev.data(x)?;
            dev.backend().scalar(op, dx, s, out)
        })
    }

    pub fn add_scalar(&mut self, x: &Tensor, s: f32) -> Result<Tensor> {
        self.scalar_op(BinaryOp::Add, x, s)
    }

    pub fn mul_scalar(&mut self, x: &Tensor, s: f32) -> Result<Tensor> {
        self.scalar_op(BinaryOp::Mul, x, s)
    }

    pub fn unary(&mut self, op: UnaryOp, x: &Tensor) -> Result<Tensor> {
        let shape = x.shape().clone();
        self.emit(&shape, |dev, out| {
            let dx = dev.data(x)?;
            dev.backend().unary(op, dx, out)
        })
    }

    pub fn relu(&mut self, x: &Tensor) -> Result<Tensor> {
        self.unary(UnaryOp::Relu, x)
    }

    pub fn tanh(&mut self, x: &Tensor) -> Result<Tensor> {
        self.unary(UnaryOp::Tanh, x)
    }

    pub fn sqrt(&mut self, x: &Tensor) -> Result<Tensor> {
        self.unary(UnaryOp::Sqrt, x)
    }

    // ---- convolution -----------------------------------------------------

    /// `conv2d(input[H,W,Cin], filter[Kh,Kw,Cin,Cout], bias[Cout]?)`.
    pub fn conv2d(
        &mut self,
        input: &Tensor,
        filter: &Tensor,
        bias: Option<&Tensor>,
        stride: [usize; 2],
        padding: Padding,
    ) -> Result<Tensor> {
        let geom = WindowGeometry::conv2d(input.shape(), filter.shape(), stride, padding)?;
        if let Some(bias) = bias {
            if bias.numel() != geom.out_c {
                return Err(TensorError::ShapeMismatch {
                    op: "conv2d bias",
                    expected: vec![geom.out_c],
                    got: bias.shape().dims().to_vec(),
                });
            }
        }
        trace!(input = %input.shape(), filter = %filter.shape(), "conv2d");

        let out_shape = geom.output_shape();
        self.emit(&out_shape, |dev, out| {
            let di = dev.data(input)?;
            let df = dev.data(filter)?;
            let db = bias.map(|b| dev.data(b)).transpose()?;
            dev.backend().conv2d(di, df, db, &geom, out)
        })
    }

    /// Fractionally strided convolution producing exactly `output_shape`.
    pub fn conv2d_transpose(
        &mut self,
        input: &Tensor,
        filter: &Tensor,
        output_shape: impl Into<Shape>,
        stride: [usize; 2],
        padding: Padding,
    ) -> Result<Tensor> {
        let output_shape = output_shape.into();
        let geom = WindowGeometry::conv2d_transpose(
            input.shape(),
            filter.shape(),
            &output_shape,
            stride,
            padding,
        )?;
        trace!(input = %input.shape(), output = %output_shape, "conv2d_transpose");

        self.emit(&output_shape, |dev, out| {
            let di = dev.data(input)?;
            let df = dev.data(filter)?;
            dev.backend().conv2d_transpose(di, df, &geom, out)
        })
    }

    // ---- pooling and layout ------------------------------------------------

    pub fn pool(
        &mut self,
        kind: PoolKind,
        input: &Tensor,
        window: [usize; 2],
        stride: [usize; 2],
        padding: Padding,
    ) -> Result<Tensor> {
        let geom = WindowGeometry::pool(input.shape(), window, stride, padding)?;
        let out_shape = geom.output_shape();
        self.emit(&out_shape, |dev, out| {
            let di = dev.data(input)?;
            dev.backend().pool(kind, di, &geom, out)
        })
    }

    pub fn max_pool(
        &mut self,
        input: &Tensor,
        window: [usize; 2],
        stride: [usize; 2],
        padding: Padding,
    ) -> Result<Tensor> {
        self.pool(PoolKind::Max, input, window, stride, padding)
    }

    pub fn avg_pool(
        &mut self,
        input: &Tensor,
        window: [usize; 2],
        stride: [usize; 2],
        padding: Padding,
    ) -> Result<Tensor> {
        self.pool(PoolKind::Avg, input, window, stride, padding)
    }

    /// `concat(a[H,W,Ca], b[H,W,Cb])` along the channel axis.
    pub fn concat_channels(&mut self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        let (h, w, ca) = a.shape().hwc("concat_channels")?;
        let (hb, wb, cb) = b.shape().hwc("concat_channels")?;
        if (h, w) != (hb, wb) {
            return Err(TensorError::ShapeMismatch {
                op: "concat_channels",
                expected: vec![h, w, cb],
                got: b.shape().dims().to_vec(),
            });
        }
        let out_shape = Shape::new(vec![h, w, ca + cb]);
        self.emit(&out_shape, |dev, out| {
            let (da, db) = (dev.data(a)?, dev.data(b)?);
            dev.backend().concat_channels(da, ca, db, cb, out)
        })
    }

    /// Reorders axes so that output axis `i` is input axis `axes[i]`.
    pub fn permute(&mut self, x: &Tensor, axes: &[usize]) -> Result<Tensor> {
        let out_shape = x.shape().permuted(axes)?;
        self.emit(&out_shape, |dev, out| {
            let dx = dev.data(x)?;
            dev.backend().permute(dx, x.shape(), axes, out)
        })
    }
}
