use std::fmt;
use std::sync::Arc;

/// Where a tensor's elements live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// Pooled buffer owned by a [`Device`](crate::Device) and tracked by its arena.
    Device,
    /// Immutable host memory, freed when the last handle is dropped.
    Host,
}

/// Index-based handle into a device's buffer table.
///
/// The generation is bumped every time the slot is released, so a handle
/// that outlives its buffer is detected instead of aliasing a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

impl BufferId {
    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.slot, self.generation)
    }
}

/// Backing storage of a tensor.
#[derive(Debug, Clone)]
pub enum Storage {
    Device(BufferId),
    Host(Arc<[f32]>),
}

impl Storage {
    pub fn placement(&self) -> Placement {
        match self {
            Storage::Device(_) => Placement::Device,
            Storage::Host(_) => Placement::Host,
        }
    }

    /// Host elements, or `None` for device storage.
    pub fn as_host(&self) -> Option<&[f32]> {
        match self {
            Storage::Host(data) => Some(data),
            Storage::Device(_) => None,
        }
    }

    pub fn buffer_id(&self) -> Option<BufferId> {
        match self {
            Storage::Device(id) => Some(*id),
            Storage::Host(_) => None,
        }
    }
}
