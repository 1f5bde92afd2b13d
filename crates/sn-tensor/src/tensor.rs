use std::sync::Arc;

use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::{BufferId, Placement, Storage};

/// An immutable tensor handle: a shape plus device or host storage.
///
/// Host tensors carry their elements directly. Device tensors only carry a
/// [`BufferId`]; their elements are reachable through the owning
/// [`Device`](crate::Device) for as long as the arena scope that owns the
/// buffer stays open. Cloning a tensor clones the handle, never the buffer.
#[derive(Debug, Clone)]
pub struct Tensor {
    shape: Shape,
    storage: Storage,
}

impl Tensor {
    /// Create a new host tensor from f32 data and a shape.
    ///
    /// # Panics
    /// Panics if `data.len() != shape.numel()`.
    pub fn new(data: Vec<f32>, shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        assert_eq!(
            data.len(),
            shape.numel(),
            "data length {} does not match shape {} (numel={})",
            data.len(),
            shape,
            shape.numel()
        );
        Tensor {
            storage: Storage::Host(Arc::from(data)),
            shape,
        }
    }

    /// Fallible variant of [`Tensor::new`] for data of untrusted length.
    pub fn try_new(data: Vec<f32>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        if data.len() != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                op: "tensor",
                expected: vec![shape.numel()],
                got: vec![data.len()],
            });
        }
        Ok(Tensor {
            storage: Storage::Host(Arc::from(data)),
            shape,
        })
    }

    /// A rank-0 host tensor holding a single value.
    pub fn scalar(value: f32) -> Self {
        Tensor::new(vec![value], Shape::new(vec![]))
    }

    /// Create a zero-filled host tensor with the given shape.
    pub fn zeros(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        Tensor::new(vec![0.0; shape.numel()], shape)
    }

    /// Create a host tensor filled with ones with the given shape.
    pub fn ones(shape: impl Into<Shape>) -> Self {
        let shape = shape.into();
        Tensor::new(vec![1.0; shape.numel()], shape)
    }

    pub(crate) fn on_device(id: BufferId, shape: Shape) -> Self {
        Tensor {
            shape,
            storage: Storage::Device(id),
        }
    }

    pub(crate) fn from_host_arc(data: Arc<[f32]>, shape: Shape) -> Self {
        debug_assert_eq!(data.len(), shape.numel());
        Tensor {
            shape,
            storage: Storage::Host(data),
        }
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn placement(&self) -> Placement {
        self.storage.placement()
    }

    pub fn is_device(&self) -> bool {
        self.placement() == Placement::Device
    }

    /// The device buffer handle, or `None` for host tensors.
    pub fn buffer_id(&self) -> Option<BufferId> {
        self.storage.buffer_id()
    }

    /// Host elements, or `None` when the tensor lives on a device.
    ///
    /// Device values are read back with [`Device::to_host`](crate::Device::to_host).
    pub fn host_data(&self) -> Option<&[f32]> {
        self.storage.as_host()
    }

    /// Returns the underlying storage reference.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Reinterpret the tensor with a different shape of equal element count.
    ///
    /// Device tensors keep sharing the same buffer, so the reshaped handle is
    /// owned by the same scope as the original.
    pub fn reshape(&self, new_shape: impl Into<Shape>) -> Result<Tensor> {
        let new_shape = new_shape.into();
        if self.shape.numel() != new_shape.numel() {
            return Err(TensorError::ShapeMismatch {
                op: "reshape",
                expected: self.shape.dims().to_vec(),
                got: new_shape.dims().to_vec(),
            });
        }
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: new_shape,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_host_tensor() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [1, 2, 3]);
        assert_eq!(t.shape().dims(), &[1, 2, 3]);
        assert_eq!(t.placement(), Placement::Host);
        assert!(!t.is_device());
        assert_eq!(t.host_data().unwrap(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_zeros_ones_scalar() {
        let z = Tensor::zeros([2, 3]);
        assert_eq!(z.host_data().unwrap(), &[0.0; 6]);

        let o = Tensor::ones([3]);
        assert_eq!(o.host_data().unwrap(), &[1.0, 1.0, 1.0]);

        let s = Tensor::scalar(1e-3);
        assert_eq!(s.shape().ndim(), 0);
        assert_eq!(s.numel(), 1);
    }

    #[test]
    fn test_reshape_shares_storage() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], [1, 1, 6]);
        let r = t.reshape([6]).unwrap();
        assert_eq!(r.shape().dims(), &[6]);
        assert_eq!(r.host_data(), t.host_data());
    }

    #[test]
    fn test_reshape_mismatch() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0], [3]);
        assert!(t.reshape([2, 2]).is_err());
    }

    #[test]
    fn test_try_new_mismatch() {
        let err = Tensor::try_new(vec![1.0, 2.0], [3]).unwrap_err();
        assert!(err.is_shape_mismatch());
    }

    #[test]
    #[should_panic]
    fn test_new_shape_mismatch_panics() {
        let _t = Tensor::new(vec![1.0, 2.0], [3]);
    }
}
