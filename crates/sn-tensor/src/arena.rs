use tracing::trace;

use crate::error::{Result, TensorError};
use crate::storage::BufferId;

/// Handle to an open arena scope, returned by [`Arena::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "an open scope must be closed to release its buffers"]
pub struct ScopeHandle {
    serial: u64,
}

impl ScopeHandle {
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

#[derive(Debug)]
struct Frame {
    serial: u64,
    tracked: Vec<BufferId>,
}

/// Where a buffer ended up after [`Arena::keep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepOutcome {
    /// Moved into the enclosing scope.
    Promoted,
    /// Left the top-level scope; the caller now owns it.
    Detached,
    /// Not tracked by the innermost scope, so nothing changed.
    Unchanged,
}

/// Ownership bookkeeping for device buffers: a stack of scopes, each
/// tracking the buffers allocated while it was innermost.
///
/// The arena never touches buffer memory. Closing a scope hands back the
/// ids it still tracked and the caller releases them.
#[derive(Debug, Default)]
pub struct Arena {
    frames: Vec<Frame>,
    next_serial: u64,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self) -> ScopeHandle {
        let serial = self.next_serial;
        self.next_serial += 1;
        self.frames.push(Frame {
            serial,
            tracked: Vec::new(),
        });
        trace!(scope = serial, depth = self.frames.len(), "open scope");
        ScopeHandle { serial }
    }

    /// Pops the innermost scope and returns every buffer it still tracked.
    pub fn close(&mut self, handle: ScopeHandle) -> Result<Vec<BufferId>> {
        let innermost = self.innermost();
        if innermost != Some(handle.serial) {
            return Err(TensorError::ScopeMismatch {
                got: handle.serial,
                innermost,
            });
        }
        let frame = self
            .frames
            .pop()
            .ok_or(TensorError::ScopeMismatch {
                got: handle.serial,
                innermost,
            })?;
        trace!(
            scope = frame.serial,
            disposed = frame.tracked.len(),
            "close scope"
        );
        Ok(frame.tracked)
    }

    /// Pops `handle` together with every scope opened after it and left
    /// open, returning the buffers they tracked and how many inner scopes
    /// were abandoned.
    pub fn close_through(&mut self, handle: ScopeHandle) -> Result<(Vec<BufferId>, usize)> {
        let innermost = self.innermost();
        let pos = self
            .frames
            .iter()
            .rposition(|f| f.serial == handle.serial)
            .ok_or(TensorError::ScopeMismatch {
                got: handle.serial,
                innermost,
            })?;
        let abandoned = self.frames.len() - pos - 1;
        let released: Vec<BufferId> = self
            .frames
            .drain(pos..)
            .flat_map(|frame| frame.tracked)
            .collect();
        trace!(
            scope = handle.serial,
            abandoned,
            disposed = released.len(),
            "close scope"
        );
        Ok((released, abandoned))
    }

    /// Serial of the innermost open scope.
    pub fn innermost(&self) -> Option<u64> {
        self.frames.last().map(|f| f.serial)
    }

    /// Registers a freshly allocated buffer with the innermost scope.
    pub fn track(&mut self, id: BufferId) -> Result<()> {
        let frame = self.frames.last_mut().ok_or(TensorError::NoOpenScope)?;
        frame.tracked.push(id);
        Ok(())
    }

    /// Moves `id` from the innermost scope to its parent, or out of the arena
    /// entirely when the innermost scope is the top-level one.
    pub fn keep(&mut self, id: BufferId) -> Result<KeepOutcome> {
        let depth = self.frames.len();
        let frame = self.frames.last_mut().ok_or(TensorError::NoOpenScope)?;
        let Some(pos) = frame.tracked.iter().position(|&t| t == id) else {
            return Ok(KeepOutcome::Unchanged);
        };
        frame.tracked.swap_remove(pos);

        if depth >= 2 {
            self.frames[depth - 2].tracked.push(id);
            Ok(KeepOutcome::Promoted)
        } else {
            Ok(KeepOutcome::Detached)
        }
    }

    /// Stops tracking `id` in whichever open scope owns it.
    ///
    /// Returns false when no open scope tracks the buffer.
    pub fn untrack(&mut self, id: BufferId) -> bool {
        for frame in self.frames.iter_mut().rev() {
            if let Some(pos) = frame.tracked.iter().position(|&t| t == id) {
                frame.tracked.swap_remove(pos);
                return true;
            }
        }
        false
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Number of buffers tracked across all open scopes.
    pub fn tracked(&self) -> usize {
        self.frames.iter().map(|f| f.tracked.len()).sum()
    }

    /// The serial of the scope currently tracking `id`, if any.
    pub fn owner(&self, id: BufferId) -> Option<u64> {
        self.frames
            .iter()
            .rev()
            .find(|f| f.tracked.contains(&id))
            .map(|f| f.serial)
    }
}
