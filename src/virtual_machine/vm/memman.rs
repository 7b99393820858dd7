use super::memory::Slot;
use std::collections::VecDeque;

/// Allocator of [`Slot`]s identified by recyclable integer handles.
///
/// Freed handles are queued and handed out again, oldest first, before the
/// handle space grows. A freed handle resolves to nothing until it is
/// reissued by [`alloc`](Self::alloc).
#[derive(Debug, Default)]
pub struct MemoryManager {
    slots: Vec<Option<Slot>>,
    free_ids: VecDeque<u64>,
}

impl MemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a zeroed slot of `size` bytes and returns its handle.
    ///
    /// Returns `None` when the buffer cannot be reserved.
    pub fn alloc(&mut self, size: u64) -> Option<u64> {
        let slot = Slot::new(size)?;
        Some(self.insert(slot))
    }

    /// Stores an already built slot and returns its handle.
    pub fn insert(&mut self, slot: Slot) -> u64 {
        if let Some(id) = self.free_ids.pop_front() {
            self.slots[id as usize] = Some(slot);
            return id;
        }
        self.slots.push(Some(slot));
        (self.slots.len() - 1) as u64
    }

    /// Releases `id`. Returns false for unknown or already freed handles.
    pub fn free(&mut self, id: u64) -> bool {
        let Some(entry) = usize::try_from(id).ok().and_then(|i| self.slots.get_mut(i)) else {
            return false;
        };
        if entry.take().is_none() {
            return false;
        }
        self.free_ids.push_back(id);
        true
    }

    pub fn get(&mut self, id: u64) -> Option<&mut Slot> {
        let idx = usize::try_from(id).ok()?;
        self.slots.get_mut(idx)?.as_mut()
    }

    pub fn get_ref(&self, id: u64) -> Option<&Slot> {
        let idx = usize::try_from(id).ok()?;
        self.slots.get(idx)?.as_ref()
    }

    /// Number of live slots.
    pub fn live(&self) -> usize {
        self.slots.len() - self.free_ids.len()
    }
}
