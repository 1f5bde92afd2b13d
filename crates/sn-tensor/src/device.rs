use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::arena::{Arena, KeepOutcome, ScopeHandle};
use crate::backend::ComputeBackend;
use crate::cpu::CpuBackend;
use crate::error::{Result, TensorError};
use crate::pool::{BufferPool, PoolStats};
use crate::shape::Shape;
use crate::storage::Storage;
use crate::tensor::Tensor;

/// Limits applied to a [`Device`].
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    /// Maximum number of device buffers alive at once; `None` is unlimited.
    pub max_live_buffers: Option<usize>,
}

/// Values a scope closure can hand back to its enclosing scope.
///
/// Every device tensor reachable through [`Retain::tensors`] is kept when
/// [`Device::scope`] closes the scope; everything else is disposed.
pub trait Retain {
    fn tensors(&self) -> Vec<&Tensor>;
}

impl Retain for () {
    fn tensors(&self) -> Vec<&Tensor> {
        Vec::new()
    }
}

impl Retain for Tensor {
    fn tensors(&self) -> Vec<&Tensor> {
        vec![self]
    }
}

impl<T: Retain> Retain for Option<T> {
    fn tensors(&self) -> Vec<&Tensor> {
        self.iter().flat_map(Retain::tensors).collect()
    }
}

impl<T: Retain> Retain for Vec<T> {
    fn tensors(&self) -> Vec<&Tensor> {
        self.iter().flat_map(Retain::tensors).collect()
    }
}

impl<K, T: Retain> Retain for BTreeMap<K, T> {
    fn tensors(&self) -> Vec<&Tensor> {
        self.values().flat_map(Retain::tensors).collect()
    }
}

impl<A: Retain, B: Retain> Retain for (A, B) {
    fn tensors(&self) -> Vec<&Tensor> {
        let mut out = self.0.tensors();
        out.extend(self.1.tensors());
        out
    }
}

/// An accelerated execution context: a compute backend, the pooled buffer
/// table holding device tensors, and the arena that scopes their lifetimes.
///
/// A device is driven by a single thread of control through `&mut self`.
/// Concurrent inference needs one device per thread.
#[derive(Debug)]
pub struct Device {
    backend: Box<dyn ComputeBackend>,
    pool: BufferPool,
    arena: Arena,
}

impl Device {
    pub fn new(backend: Box<dyn ComputeBackend>) -> Self {
        Self::with_config(backend, DeviceConfig::default())
    }

    pub fn with_config(backend: Box<dyn ComputeBackend>, config: DeviceConfig) -> Self {
        Device {
            backend,
            pool: BufferPool::with_limit(config.max_live_buffers),
            arena: Arena::new(),
        }
    }

    /// A device running the reference [`CpuBackend`].
    pub fn cpu() -> Self {
        Self::new(Box::new(CpuBackend::new()))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub(crate) fn backend(&self) -> &dyn ComputeBackend {
        self.backend.as_ref()
    }

    // ---- arena ---------------------------------------------------------

    pub fn open_scope(&mut self) -> ScopeHandle {
        self.arena.open()
    }

    /// Closes the innermost scope, releasing every buffer it still tracks.
    pub fn close_scope(&mut self, handle: ScopeHandle) -> Result<()> {
        let released = self.arena.close(handle)?;
        for id in released {
            self.pool.release(id)?;
        }
        trace!(live = self.pool.live(), "scope released");
        Ok(())
    }

    /// Runs `f` inside a fresh scope.
    ///
    /// The tensors of the returned value are kept into the enclosing scope
    /// (or handed to the caller at top level). The scope is closed whether
    /// `f` succeeds or fails, so a failed computation leaves no buffers behind.
    ///
    /// Scopes `f` opened and did not close are closed with it. Returning
    /// from `f` with such a scope still open is a `ScopeMismatch`, and the
    /// returned tensors are released.
    pub fn scope<R, E, F>(&mut self, f: F) -> std::result::Result<R, E>
    where
        R: Retain,
        E: From<TensorError>,
        F: FnOnce(&mut Device) -> std::result::Result<R, E>,
    {
        let handle = self.open_scope();
        let result = f(self).and_then(|value| {
            let innermost = self.arena.innermost();
            if innermost != Some(handle.serial()) {
                return Err(TensorError::ScopeMismatch {
                    got: handle.serial(),
                    innermost,
                }
                .into());
            }
            for tensor in value.tensors() {
                self.keep(tensor)?;
            }
            Ok(value)
        });
        let closed = self.close_through(handle);
        match result {
            Ok(value) => {
                closed?;
                Ok(value)
            }
            Err(err) => {
                if let Err(close_err) = closed {
                    warn!(%close_err, "scope cleanup failed after an error");
                }
                Err(err)
            }
        }
    }

    /// Closes `handle` and any scope still open inside it.
    fn close_through(&mut self, handle: ScopeHandle) -> Result<()> {
        let (released, abandoned) = self.arena.close_through(handle)?;
        if abandoned > 0 {
            warn!(abandoned, "closing scopes left open");
        }
        for id in released {
            self.pool.release(id)?;
        }
        trace!(live = self.pool.live(), "scope released");
        Ok(())
    }

    /// Registers `data` as a new device tensor owned by the innermost scope.
    pub fn track(&mut self, data: Vec<f32>, shape: impl Into<Shape>) -> Result<Tensor> {
        let shape = shape.into();
        if data.len() != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                op: "track",
                expected: vec![shape.numel()],
                got: vec![data.len()],
            });
        }
        if self.arena.depth() == 0 {
            return Err(TensorError::NoOpenScope);
        }
        let id = self.pool.insert(data)?;
        self.arena.track(id)?;
        Ok(Tensor::on_device(id, shape))
    }

    /// Promotes `tensor` out of the innermost scope.
    ///
    /// Host tensors and tensors already owned by an outer scope are returned
    /// unchanged. Keeping a released tensor is a stale-reference fault.
    pub fn keep(&mut self, tensor: &Tensor) -> Result<Tensor> {
        if let Some(id) = tensor.buffer_id() {
            if !self.pool.is_live(id) {
                return Err(TensorError::StaleReference(id));
            }
            if self.arena.keep(id)? == KeepOutcome::Detached {
                trace!(buffer = %id, "detached from top-level scope");
            }
        }
        Ok(tensor.clone())
    }

    /// Releases a device tensor immediately, wherever it is owned.
    ///
    /// This is how callers free tensors kept out of a top-level scope.
    pub fn dispose(&mut self, tensor: &Tensor) -> Result<()> {
        if let Some(id) = tensor.buffer_id() {
            self.pool.get(id)?;
            let owned = self.arena.untrack(id);
            self.pool.release(id)?;
            trace!(buffer = %id, owned, "disposed");
        }
        Ok(())
    }

    /// Open scope depth; zero outside any scope.
    pub fn scope_depth(&self) -> usize {
        self.arena.depth()
    }

    /// Device buffers currently allocated, tracked or caller-owned.
    pub fn live_buffers(&self) -> usize {
        self.pool.live()
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// True while the tensor's buffer has not been released. Host tensors
    /// are always live.
    pub fn is_live(&self, tensor: &Tensor) -> bool {
        tensor.buffer_id().map_or(true, |id| self.pool.is_live(id))
    }

    // ---- transfers -------------------------------------------------------

    /// Borrows a tensor's elements without transferring them.
    pub(crate) fn data<'a>(&'a self, tensor: &'a Tensor) -> Result<&'a [f32]> {
        match tensor.storage() {
            Storage::Host(data) => Ok(data),
            Storage::Device(id) => self.pool.get(*id),
        }
    }

    /// Copies `tensor` into host memory. Host tensors are returned as is.
    ///
    /// This is the synchronization point between device work and host code.
    pub fn to_host(&mut self, tensor: &Tensor) -> Result<Tensor> {
        let Some(id) = tensor.buffer_id() else {
            return Ok(tensor.clone());
        };
        let data: Arc<[f32]> = Arc::from(self.pool.get(id)?);
        self.pool.stats_mut().host_transfers += 1;
        debug!(buffer = %id, shape = %tensor.shape(), "device to host transfer");
        Ok(Tensor::from_host_arc(data, tensor.shape().clone()))
    }

    /// Reads a tensor's values as a vector.
    pub fn read(&mut self, tensor: &Tensor) -> Result<Vec<f32>> {
        let host = self.to_host(tensor)?;
        Ok(host.host_data().map(<[f32]>::to_vec).unwrap_or_default())
    }

    /// Copies a host tensor into a device buffer owned by the innermost
    /// scope. Device tensors are returned unchanged.
    pub fn upload(&mut self, tensor: &Tensor) -> Result<Tensor> {
        let Some(data) = tensor.host_data() else {
            return Ok(tensor.clone());
        };
        let uploaded = self.emit(tensor.shape(), |_, out| {
            out.copy_from_slice(data);
            Ok(())
        })?;
        self.pool.stats_mut().uploads += 1;
        Ok(uploaded)
    }

    /// Runs `kernel` over a pooled output buffer of `shape` and tracks the
    /// result in the innermost scope. On failure the buffer goes back to
    /// the pool untracked.
    pub(crate) fn emit<F>(&mut self, shape: &Shape, kernel: F) -> Result<Tensor>
    where
        F: FnOnce(&Device, &mut [f32]) -> Result<()>,
    {
        let mut out = self.pool.acquire(shape.numel());
        let ready = if self.arena.depth() == 0 {
            Err(TensorError::NoOpenScope)
        } else {
            kernel(&*self, &mut out[..])
        };
        if let Err(err) = ready {
            self.pool.restore(out);
            return Err(err);
        }
        let id = self.pool.insert_scratch(out)?;
        self.arena.track(id)?;
        Ok(Tensor::on_device(id, shape.clone()))
    }
}
