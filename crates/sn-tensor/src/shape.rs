use crate::error::{Result, TensorError};
use std::fmt;

/// A tensor shape, wrapping a vector of dimension sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Create a new shape from a vector of dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    /// Create a shape from a slice of dimensions.
    pub fn from_slice(dims: &[usize]) -> Self {
        Shape {
            dims: dims.to_vec(),
        }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements (product of all dimension sizes).
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Returns the size of dimension `i`.
    ///
    /// # Panics
    /// Panics if `i >= ndim()`.
    pub fn dim(&self, i: usize) -> usize {
        self.dims[i]
    }

    /// Returns a reference to the underlying dimension sizes.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Row-major contiguous strides: `[d1*d2, d2, 1]` for `[d0, d1, d2]`.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.dims.len()];
        for i in (1..self.dims.len()).rev() {
            strides[i - 1] = strides[i] * self.dims[i];
        }
        strides
    }

    /// Fails with `RankMismatch` unless this shape has exactly `rank` dimensions.
    pub fn ensure_rank(&self, op: &'static str, rank: usize) -> Result<()> {
        if self.ndim() != rank {
            return Err(TensorError::RankMismatch {
                op,
                expected: rank,
                got: self.dims.clone(),
            });
        }
        Ok(())
    }

    /// Splits a rank-3 activation shape into `(height, width, channels)`.
    pub fn hwc(&self, op: &'static str) -> Result<(usize, usize, usize)> {
        self.ensure_rank(op, 3)?;
        Ok((self.dims[0], self.dims[1], self.dims[2]))
    }

    /// Returns the shape obtained by reordering dimensions according to `axes`.
    ///
    /// `axes` must be a permutation of `0..ndim()`.
    pub fn permuted(&self, axes: &[usize]) -> Result<Shape> {
        if axes.len() != self.ndim() {
            return Err(TensorError::RankMismatch {
                op: "permute",
                expected: self.ndim(),
                got: axes.to_vec(),
            });
        }
        let mut seen = vec![false; axes.len()];
        for &axis in axes {
            if axis >= self.ndim() || seen[axis] {
                return Err(TensorError::InvalidAxis {
                    axis,
                    ndim: self.ndim(),
                });
            }
            seen[axis] = true;
        }
        Ok(Shape::new(axes.iter().map(|&a| self.dims[a]).collect()))
    }

    /// Shape of `a op b` under numpy broadcasting: dims are aligned from the
    /// right, missing leading dims count as 1, and each aligned pair must be
    /// equal or contain a 1.
    ///
    /// A per-channel vector `[C]` therefore broadcasts over an activation
    /// `[H, W, C]`, and a one-element tensor broadcasts over anything.
    pub fn broadcast_shape(a: &Shape, b: &Shape) -> Result<Shape> {
        let rank = a.ndim().max(b.ndim());
        let aligned = |s: &Shape, i: usize| {
            (i + s.ndim()).checked_sub(rank).map_or(1, |j| s.dims[j])
        };

        (0..rank)
            .map(|i| match (aligned(a, i), aligned(b, i)) {
                (x, y) if x == y || y == 1 => Ok(x),
                (1, y) => Ok(y),
                _ => Err(TensorError::BroadcastError {
                    a: a.dims.clone(),
                    b: b.dims.clone(),
                }),
            })
            .collect::<Result<Vec<_>>>()
            .map(Shape::new)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{d}")?;
        }
        f.write_str("]")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape::new(dims.to_vec())
    }
}
