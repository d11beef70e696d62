//! Invoke-id allocation
//!
//! One allocator per session, covering both locally allocated ids and
//! ids reserved on behalf of the peer. Id 0 is never allocated: it marks
//! fire-and-forget messages and is rejected by `reserve`/`free` as a
//! no-op.

use std::collections::BTreeSet;

/// Tracks which invoke ids are in flight for one session.
#[derive(Debug, Default)]
pub struct InvokeIdAllocator {
    used: BTreeSet<u32>,
}

impl InvokeIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the smallest positive id not currently in use and marks
    /// it used.
    pub fn allocate(&mut self) -> u32 {
        let mut candidate = 1;
        for &id in &self.used {
            if id == candidate {
                candidate += 1;
            } else if id > candidate {
                break;
            }
        }
        self.used.insert(candidate);
        candidate
    }

    /// Marks an externally supplied id (one chosen by the peer) as used.
    /// Reserving an id that is already in use is a no-op.
    pub fn reserve(&mut self, id: u32) {
        if id != 0 {
            self.used.insert(id);
        }
    }

    /// Marks an id unused. Freeing an id that is not in use is a no-op.
    pub fn free(&mut self, id: u32) {
        if id != 0 {
            self.used.remove(&id);
        }
    }

    pub fn is_used(&self, id: u32) -> bool {
        self.used.contains(&id)
    }

    pub fn in_flight(&self) -> usize {
        self.used.len()
    }

    pub fn clear(&mut self) {
        self.used.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_smallest_free_id() {
        let mut ids = InvokeIdAllocator::new();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.allocate(), 3);

        ids.free(2);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.allocate(), 4);
    }

    #[test]
    fn test_reserve_skips_peer_ids() {
        let mut ids = InvokeIdAllocator::new();
        ids.reserve(1);
        ids.reserve(2);
        assert_eq!(ids.allocate(), 3);
    }

    #[test]
    fn test_free_is_idempotent() {
        let mut ids = InvokeIdAllocator::new();
        let id = ids.allocate();
        ids.free(id);
        ids.free(id);
        assert!(!ids.is_used(id));
        assert_eq!(ids.in_flight(), 0);
    }

    #[test]
    fn test_reserve_is_idempotent() {
        let mut ids = InvokeIdAllocator::new();
        ids.reserve(5);
        ids.reserve(5);
        assert_eq!(ids.in_flight(), 1);
        ids.free(5);
        assert_eq!(ids.in_flight(), 0);
    }

    #[test]
    fn test_zero_is_never_tracked() {
        let mut ids = InvokeIdAllocator::new();
        ids.reserve(0);
        ids.free(0);
        assert_eq!(ids.in_flight(), 0);
        assert_eq!(ids.allocate(), 1);
    }
}
