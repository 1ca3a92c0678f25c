//! The default ready-queue policy: a single global list kept sorted by
//! descending priority (spec §3 "Ready queue", §4.1 "Scheduling choice").
//!
//! Grounded on `original_source/threads/thread.c`'s `cmp_priority` and its
//! sorted-insert `list_insert_ordered` use in `thread_unblock`/
//! `thread_yield`, generalized from Pintos's intrusive list to an owned
//! `Vec<(ThreadId, u8)>` per `DESIGN.md`'s arena resolution of the "aliased
//! intrusive list" design note (spec §9).

extern crate alloc;

use alloc::vec::Vec;

use super::trait_def::Scheduler;
use crate::thread::ThreadId;

/// Ties are broken FIFO: among equal priorities, the thread that has been
/// ready longest runs first, matching `list_insert_ordered`'s stable
/// insertion behavior (new entries of equal priority go after existing
/// ones).
pub struct PriorityScheduler {
    ready: Vec<(ThreadId, u8)>,
}

impl PriorityScheduler {
    pub const fn new() -> Self {
        Self { ready: Vec::new() }
    }

    /// Insertion point for a new `(id, priority)` pair that keeps `ready`
    /// sorted by descending priority with FIFO tie-breaking.
    fn insert_sorted(&mut self, id: ThreadId, priority: u8) {
        let pos = self
            .ready
            .iter()
            .position(|(_, p)| *p < priority)
            .unwrap_or(self.ready.len());
        self.ready.insert(pos, (id, priority));
    }
}

impl Default for PriorityScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for PriorityScheduler {
    fn enqueue(&mut self, id: ThreadId, priority: u8) {
        self.insert_sorted(id, priority);
    }

    fn pop_next(&mut self) -> Option<ThreadId> {
        if self.ready.is_empty() {
            None
        } else {
            Some(self.ready.remove(0).0)
        }
    }

    fn peek_max_priority(&self) -> Option<u8> {
        self.ready.first().map(|(_, p)| *p)
    }

    fn remove(&mut self, id: ThreadId) {
        self.ready.retain(|(tid, _)| *tid != id);
    }

    fn resort(&mut self, lookup: &dyn Fn(ThreadId) -> u8) {
        for (id, priority) in self.ready.iter_mut() {
            *priority = lookup(*id);
        }
        // Stable sort preserves FIFO order among threads whose priority
        // didn't change relative to one another.
        self.ready.sort_by(|a, b| b.1.cmp(&a.1));
    }

    fn len(&self) -> usize {
        self.ready.len()
    }

    fn iter_ids(&self) -> Vec<ThreadId> {
        self.ready.iter().map(|(id, _)| *id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_highest_priority_first() {
        let mut s = PriorityScheduler::new();
        s.enqueue(ThreadId::new(1), 10);
        s.enqueue(ThreadId::new(2), 30);
        s.enqueue(ThreadId::new(3), 20);
        assert_eq!(s.pop_next(), Some(ThreadId::new(2)));
        assert_eq!(s.pop_next(), Some(ThreadId::new(3)));
        assert_eq!(s.pop_next(), Some(ThreadId::new(1)));
        assert_eq!(s.pop_next(), None);
    }

    #[test]
    fn equal_priority_is_fifo() {
        let mut s = PriorityScheduler::new();
        s.enqueue(ThreadId::new(1), 10);
        s.enqueue(ThreadId::new(2), 10);
        assert_eq!(s.pop_next(), Some(ThreadId::new(1)));
        assert_eq!(s.pop_next(), Some(ThreadId::new(2)));
    }

    #[test]
    fn resort_reorders_after_priority_change() {
        let mut s = PriorityScheduler::new();
        s.enqueue(ThreadId::new(1), 10);
        s.enqueue(ThreadId::new(2), 20);
        // Donation bumps thread 1 above thread 2.
        s.resort(&|id| if id == ThreadId::new(1) { 50 } else { 20 });
        assert_eq!(s.peek_max_priority(), Some(50));
        assert_eq!(s.pop_next(), Some(ThreadId::new(1)));
    }

    #[test]
    fn remove_drops_a_specific_thread() {
        let mut s = PriorityScheduler::new();
        s.enqueue(ThreadId::new(1), 10);
        s.enqueue(ThreadId::new(2), 20);
        s.remove(ThreadId::new(2));
        assert_eq!(s.len(), 1);
        assert_eq!(s.pop_next(), Some(ThreadId::new(1)));
    }
}
