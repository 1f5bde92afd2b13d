use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use crate::error::{Result, TensorError};
use crate::storage::BufferId;

/// Allocation counters of a [`BufferPool`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers currently allocated.
    pub live: usize,
    /// Highest value `live` has reached.
    pub peak_live: usize,
    /// Buffers handed out in total, fresh or recycled.
    pub allocations: usize,
    /// Allocations served from a recycled buffer.
    pub reused: usize,
    /// Buffers returned to the pool.
    pub released: usize,
    /// Device to host read-backs.
    pub host_transfers: usize,
    /// Host to device uploads.
    pub uploads: usize,
}

/// An output vector handed out by [`BufferPool::acquire`].
///
/// Becomes a buffer through [`BufferPool::insert_scratch`]; an unused one
/// goes back with [`BufferPool::restore`].
#[derive(Debug)]
pub struct Scratch {
    data: Vec<f32>,
    recycled: bool,
}

impl Scratch {
    pub fn is_recycled(&self) -> bool {
        self.recycled
    }
}

impl Deref for Scratch {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.data
    }
}

impl DerefMut for Scratch {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    data: Option<Vec<f32>>,
}

/// Table of pooled device buffers addressed by [`BufferId`].
///
/// Released slots go onto a free list and their backing vectors are kept,
/// keyed by length, so a later allocation of the same size reuses them.
#[derive(Debug, Default)]
pub struct BufferPool {
    slots: Vec<Slot>,
    free_slots: Vec<u32>,
    recycled: HashMap<usize, Vec<Vec<f32>>>,
    max_live: Option<usize>,
    stats: PoolStats,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pool refusing to hold more than `max_live` buffers at once.
    pub fn with_limit(max_live: Option<usize>) -> Self {
        BufferPool {
            max_live,
            ..Self::default()
        }
    }

    /// Returns a scratch vector of `len` elements, recycled when possible.
    ///
    /// The contents of a recycled vector are stale; callers overwrite every
    /// element before inserting it.
    pub fn acquire(&mut self, len: usize) -> Scratch {
        match self.recycled.get_mut(&len).and_then(Vec::pop) {
            Some(data) => Scratch {
                data,
                recycled: true,
            },
            None => Scratch {
                data: vec![0.0; len],
                recycled: false,
            },
        }
    }

    /// Stores an acquired vector; a recycled one counts as a reuse.
    pub fn insert_scratch(&mut self, scratch: Scratch) -> Result<BufferId> {
        let id = self.insert(scratch.data)?;
        if scratch.recycled {
            self.stats.reused += 1;
        }
        Ok(id)
    }

    /// Returns an acquired vector that never became a buffer.
    pub fn restore(&mut self, scratch: Scratch) {
        self.recycle(scratch.data);
    }

    /// Stores `data` in a free slot and returns its handle.
    pub fn insert(&mut self, data: Vec<f32>) -> Result<BufferId> {
        if let Some(limit) = self.max_live {
            if self.stats.live >= limit {
                self.recycle(data);
                return Err(TensorError::OutOfDeviceMemory {
                    live: self.stats.live,
                    limit,
                });
            }
        }

        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let entry = &mut self.slots[slot as usize];
        entry.data = Some(data);

        self.stats.allocations += 1;
        self.stats.live += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.stats.live);

        Ok(BufferId {
            slot,
            generation: entry.generation,
        })
    }

    /// Borrow the elements of a live buffer.
    pub fn get(&self, id: BufferId) -> Result<&[f32]> {
        match self.slots.get(id.slot as usize) {
            Some(Slot {
                generation,
                data: Some(data),
            }) if *generation == id.generation => Ok(data),
            _ => Err(TensorError::StaleReference(id)),
        }
    }

    pub fn is_live(&self, id: BufferId) -> bool {
        self.get(id).is_ok()
    }

    /// Frees the buffer behind `id`, invalidating every handle to it.
    pub fn release(&mut self, id: BufferId) -> Result<()> {
        let entry = match self.slots.get_mut(id.slot as usize) {
            Some(entry) if entry.generation == id.generation && entry.data.is_some() => entry,
            _ => return Err(TensorError::StaleReference(id)),
        };
        let data = entry.data.take();
        entry.generation = entry.generation.wrapping_add(1);
        self.free_slots.push(id.slot);
        self.stats.live -= 1;
        self.stats.released += 1;
        if let Some(data) = data {
            self.recycle(data);
        }
        Ok(())
    }

    /// Drops every cached vector kept for reuse.
    pub fn purge_recycled(&mut self) {
        self.recycled.clear();
    }

    pub fn live(&self) -> usize {
        self.stats.live
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut PoolStats {
        &mut self.stats
    }

    fn recycle(&mut self, data: Vec<f32>) {
        self.recycled.entry(data.len()).or_default().push(data);
    }
}
