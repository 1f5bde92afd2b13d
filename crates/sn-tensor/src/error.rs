use thiserror::Error;

use crate::storage::BufferId;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("shape mismatch in {op}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("rank mismatch in {op}: expected rank {expected}, got shape {got:?}")]
    RankMismatch {
        op: &'static str,
        expected: usize,
        got: Vec<usize>,
    },
    #[error("cannot broadcast shapes {a:?} and {b:?}")]
    BroadcastError { a: Vec<usize>, b: Vec<usize> },
    #[error("invalid axis {axis} for tensor with {ndim} dimensions")]
    InvalidAxis { axis: usize, ndim: usize },
    #[error("stale reference to released device buffer {0}")]
    StaleReference(BufferId),
    #[error("no open scope to track device buffer")]
    NoOpenScope,
    #[error("scope {got} is not the innermost open scope (innermost: {innermost:?})")]
    ScopeMismatch { got: u64, innermost: Option<u64> },
    #[error("device memory exhausted: {live} live buffers, limit {limit}")]
    OutOfDeviceMemory { live: usize, limit: usize },
    #[error("unsupported dtype: {0}")]
    UnsupportedDType(String),
    #[error("{0}")]
    Other(String),
}

impl TensorError {
    /// True for every fault that stems from incompatible operand shapes.
    pub fn is_shape_mismatch(&self) -> bool {
        matches!(
            self,
            TensorError::ShapeMismatch { .. }
                | TensorError::RankMismatch { .. }
                | TensorError::BroadcastError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TensorError>;
