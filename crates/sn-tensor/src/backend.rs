use std::fmt::Debug;

use crate::error::Result;
use crate::geometry::WindowGeometry;
use crate::shape::Shape;

/// Elementwise binary arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    #[inline]
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
        }
    }
}

/// Elementwise unary functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Relu,
    Tanh,
    Sqrt,
}

impl UnaryOp {
    #[inline]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            UnaryOp::Relu => x.max(0.0),
            UnaryOp::Tanh => x.tanh(),
            UnaryOp::Sqrt => x.sqrt(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Relu => "relu",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Sqrt => "sqrt",
        }
    }
}

/// Spatial reductions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    Avg,
}

/// Trait for pluggable compute backends executing the kernels behind a
/// [`Device`](crate::Device).
///
/// Kernels read `[H, W, C]` row-major operands from slices and write into a
/// caller-provided `out` slice of exactly the output's element count. `out`
/// may hold stale values from a recycled buffer; every kernel overwrites all
/// of it. Shape validation happens before a kernel is called, so kernels
/// only re-check buffer lengths.
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu").
    fn name(&self) -> &str;

    /// `out[i] = op(a[i], b[i])` over operands of equal length.
    fn binary(&self, op: BinaryOp, a: &[f32], b: &[f32], out: &mut [f32]) -> Result<()>;

    /// `op` with numpy-style broadcasting of `a` and `b` to `out_shape`.
    fn broadcast_binary(
        &self,
        op: BinaryOp,
        a: &[f32],
        a_shape: &Shape,
        b: &[f32],
        b_shape: &Shape,
        out_shape: &Shape,
        out: &mut [f32],
    ) -> Result<()>;

    /// `out[i] = op(a[i], s)`.
    fn scalar(&self, op: BinaryOp, a: &[f32], s: f32, out: &mut [f32]) -> Result<()>;

    /// `out[i] = op(x[i])`.
    fn unary(&self, op: UnaryOp, x: &[f32], out: &mut [f32]) -> Result<()>;

    /// 2D convolution.
    ///
    /// - `input`: `[in_h, in_w, in_c]`
    /// - `filter`: `[k_h, k_w, in_c, out_c]`
    /// - `bias`: `[out_c]`, added to every output pixel when present
    /// - `out`: `[out_h, out_w, out_c]`
    fn conv2d(
        &self,
        input: &[f32],
        filter: &[f32],
        bias: Option<&[f32]>,
        geom: &WindowGeometry,
        out: &mut [f32],
    ) -> Result<()>;

    /// Transposed (fractionally strided) convolution, the adjoint of
    /// [`ComputeBackend::conv2d`] for the same geometry.
    ///
    /// - `input`: `[in_h, in_w, in_c]`
    /// - `filter`: `[k_h, k_w, out_c, in_c]`
    /// - `out`: `[out_h, out_w, out_c]`
    fn conv2d_transpose(
        &self,
        input: &[f32],
        filter: &[f32],
        geom: &WindowGeometry,
        out: &mut [f32],
    ) -> Result<()>;

    /// Max or average pooling. Padded positions never contribute.
    fn pool(&self, kind: PoolKind, input: &[f32], geom: &WindowGeometry, out: &mut [f32]) -> Result<()>;

    /// Concatenates `[pixels, ca]` and `[pixels, cb]` rows into `[pixels, ca + cb]`.
    fn concat_channels(
        &self,
        a: &[f32],
        ca: usize,
        b: &[f32],
        cb: usize,
        out: &mut [f32],
    ) -> Result<()>;

    /// Reorders the axes of `x` (shape `shape`) so that output axis `i` is
    /// input axis `axes[i]`.
    fn permute(&self, x: &[f32], shape: &Shape, axes: &[usize], out: &mut [f32]) -> Result<()>;
}
