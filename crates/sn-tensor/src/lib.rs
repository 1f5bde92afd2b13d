//! `sn-tensor` - placement-aware tensors and a scoped device arena for stylenet.
//!
//! This crate provides:
//! - A `Tensor` whose storage lives either on a device or on the host
//! - A `Device` owning a pooled buffer table and an `Arena` of nested scopes
//!   that release every device buffer not explicitly kept
//! - A `ComputeBackend` trait and the reference `CpuBackend` kernels
//!   (convolution, transposed convolution, pooling, elementwise, layout)
//! - Host-side instance normalization statistics
//! - Shape, window geometry and data type utilities

pub mod arena;
pub mod backend;
pub mod cpu;
pub mod device;
pub mod dtype;
pub mod error;
pub mod geometry;
pub mod instance_norm;
mod ops;
pub mod pool;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use arena::{Arena, KeepOutcome, ScopeHandle};
pub use backend::{BinaryOp, ComputeBackend, PoolKind, UnaryOp};
pub use cpu::CpuBackend;
pub use device::{Device, DeviceConfig, Retain};
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use geometry::{Padding, WindowGeometry};
pub use instance_norm::{channel_moments, ChannelMoments};
pub use pool::{BufferPool, PoolStats, Scratch};
pub use shape::Shape;
pub use storage::{BufferId, Placement, Storage};
pub use tensor::Tensor;
