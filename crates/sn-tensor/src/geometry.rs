use crate::error::{Result, TensorError};
use crate::shape::Shape;

/// Spatial padding policy of convolutions and pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Output extent is `ceil(dim / stride)`; zero padding split evenly,
    /// the odd element going after.
    Same,
    /// No padding; windows never leave the input.
    Valid,
    /// `n` zero rows/columns on every side.
    Explicit(usize),
}

/// Resolved index arithmetic of one sliding-window operation over `[H, W, C]`
/// activations.
///
/// For transposed convolutions `in_*` describes the small input and `out_*`
/// the requested (upsampled) output; padding is that of the forward
/// convolution mapping the output back onto the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub in_h: usize,
    pub in_w: usize,
    pub in_c: usize,
    pub out_h: usize,
    pub out_w: usize,
    pub out_c: usize,
    pub k_h: usize,
    pub k_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub pad_top: usize,
    pub pad_left: usize,
}

impl WindowGeometry {
    /// Geometry of `conv2d(input[H,W,Cin], filter[Kh,Kw,Cin,Cout])`.
    pub fn conv2d(
        input: &Shape,
        filter: &Shape,
        stride: [usize; 2],
        padding: Padding,
    ) -> Result<Self> {
        let (in_h, in_w, in_c) = input.hwc("conv2d")?;
        filter.ensure_rank("conv2d filter", 4)?;
        let (k_h, k_w, f_in, out_c) = (filter.dim(0), filter.dim(1), filter.dim(2), filter.dim(3));
        if f_in != in_c {
            return Err(TensorError::ShapeMismatch {
                op: "conv2d",
                expected: vec![k_h, k_w, in_c, out_c],
                got: filter.dims().to_vec(),
            });
        }
        check_stride("conv2d", stride)?;

        let (out_h, pad_top) = window_extent("conv2d", in_h, k_h, stride[0], padding)?;
        let (out_w, pad_left) = window_extent("conv2d", in_w, k_w, stride[1], padding)?;

        Ok(WindowGeometry {
            in_h,
            in_w,
            in_c,
            out_h,
            out_w,
            out_c,
            k_h,
            k_w,
            stride_h: stride[0],
            stride_w: stride[1],
            pad_top,
            pad_left,
        })
    }

    /// Geometry of `conv2d_transpose(input[H,W,Cin], filter[Kh,Kw,Cout,Cin])`
    /// producing `output[H',W',Cout]`.
    ///
    /// The request is valid when a forward convolution with the same filter,
    /// stride and padding maps `output` back onto `input`'s spatial extent.
    pub fn conv2d_transpose(
        input: &Shape,
        filter: &Shape,
        output: &Shape,
        stride: [usize; 2],
        padding: Padding,
    ) -> Result<Self> {
        let (in_h, in_w, in_c) = input.hwc("conv2d_transpose")?;
        let (out_h, out_w, out_c) = output.hwc("conv2d_transpose output")?;
        filter.ensure_rank("conv2d_transpose filter", 4)?;
        let (k_h, k_w) = (filter.dim(0), filter.dim(1));
        if filter.dim(2) != out_c || filter.dim(3) != in_c {
            return Err(TensorError::ShapeMismatch {
                op: "conv2d_transpose",
                expected: vec![k_h, k_w, out_c, in_c],
                got: filter.dims().to_vec(),
            });
        }
        check_stride("conv2d_transpose", stride)?;

        let (fwd_h, pad_top) = window_extent("conv2d_transpose", out_h, k_h, stride[0], padding)?;
        let (fwd_w, pad_left) = window_extent("conv2d_transpose", out_w, k_w, stride[1], padding)?;
        if fwd_h != in_h || fwd_w != in_w {
            return Err(TensorError::ShapeMismatch {
                op: "conv2d_transpose",
                expected: vec![fwd_h, fwd_w, in_c],
                got: input.dims().to_vec(),
            });
        }

        Ok(WindowGeometry {
            in_h,
            in_w,
            in_c,
            out_h,
            out_w,
            out_c,
            k_h,
            k_w,
            stride_h: stride[0],
            stride_w: stride[1],
            pad_top,
            pad_left,
        })
    }

    /// Geometry of a max or average pool; channels pass through unchanged.
    ///
    /// A window larger than the (padded) spatial extent is rejected.
    pub fn pool(
        input: &Shape,
        window: [usize; 2],
        stride: [usize; 2],
        padding: Padding,
    ) -> Result<Self> {
        let (in_h, in_w, in_c) = input.hwc("pool")?;
        check_stride("pool", stride)?;
        let explicit = match padding {
            Padding::Explicit(p) => p,
            Padding::Same | Padding::Valid => 0,
        };
        if window[0] == 0 || window[1] == 0 || window[0] > in_h + 2 * explicit || window[1] > in_w + 2 * explicit {
            return Err(TensorError::ShapeMismatch {
                op: "pool",
                expected: vec![in_h + 2 * explicit, in_w + 2 * explicit],
                got: window.to_vec(),
            });
        }

        let (out_h, pad_top) = window_extent("pool", in_h, window[0], stride[0], padding)?;
        let (out_w, pad_left) = window_extent("pool", in_w, window[1], stride[1], padding)?;

        Ok(WindowGeometry {
            in_h,
            in_w,
            in_c,
            out_h,
            out_w,
            out_c: in_c,
            k_h: window[0],
            k_w: window[1],
            stride_h: stride[0],
            stride_w: stride[1],
            pad_top,
            pad_left,
        })
    }

    pub fn input_shape(&self) -> Shape {
        Shape::new(vec![self.in_h, self.in_w, self.in_c])
    }

    pub fn output_shape(&self) -> Shape {
        Shape::new(vec![self.out_h, self.out_w, self.out_c])
    }

    /// Input coordinate touched by output row `oy` and kernel row `ky`.
    #[inline]
    pub fn source_row(&self, oy: usize, ky: usize) -> Option<usize> {
        (oy * self.stride_h + ky)
            .checked_sub(self.pad_top)
            .filter(|&y| y < self.in_h)
    }

    /// Input coordinate touched by output column `ox` and kernel column `kx`.
    #[inline]
    pub fn source_col(&self, ox: usize, kx: usize) -> Option<usize> {
        (ox * self.stride_w + kx)
            .checked_sub(self.pad_left)
            .filter(|&x| x < self.in_w)
    }
}

fn check_stride(op: &'static str, stride: [usize; 2]) -> Result<()> {
    if stride[0] == 0 || stride[1] == 0 {
        return Err(TensorError::Other(format!("{op}: stride must be positive")));
    }
    Ok(())
}

/// Output length and leading padding of a window of size `k` sliding over
/// `dim` elements with the given stride.
fn window_extent(
    op: &'static str,
    dim: usize,
    k: usize,
    stride: usize,
    padding: Padding,
) -> Result<(usize, usize)> {
    let too_small = || TensorError::ShapeMismatch {
        op,
        expected: vec![k],
        got: vec![dim],
    };
    match padding {
        Padding::Same => {
            let out = dim.div_ceil(stride);
            let needed = (out.saturating_sub(1) * stride + k).saturating_sub(dim);
            Ok((out, needed / 2))
        }
        Padding::Valid => {
            if k > dim {
                return Err(too_small());
            }
            Ok(((dim - k) / stride + 1, 0))
        }
        Padding::Explicit(p) => {
            if k > dim + 2 * p {
                return Err(too_small());
            }
            Ok(((dim + 2 * p - k) / stride + 1, p))
        }
    }
}
