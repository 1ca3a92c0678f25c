//! The ready-queue scheduling policy.
//!
//! Kept from the teacher crate's `Scheduler` trait shape (`enqueue`/
//! `pick_next`/`stats`), but re-scoped from a lock-free per-CPU design to the
//! single global, priority-sorted ready queue this core's single-CPU model
//! needs (spec §3 "Ready queue", §4.1). A `Scheduler` owns no thread data
//! itself — it only orders [`ThreadId`]s — so any operation that needs a
//! thread's current priority takes a closure back into the caller's
//! [`crate::thread::ThreadArena`] rather than holding a reference to it.

extern crate alloc;

use alloc::vec::Vec;

use crate::thread::ThreadId;

/// Orders ready threads by priority. Implementations must keep the
/// invariant that iterating front-to-back yields descending priority (spec
/// §3 "Ready queue is sorted strictly by descending priority").
pub trait Scheduler: Send + Sync {
    /// Insert `id` into the ready set at the position `priority` implies.
    fn enqueue(&mut self, id: ThreadId, priority: u8);

    /// Remove and return the highest-priority ready thread, or `None` if
    /// the ready set is empty.
    fn pop_next(&mut self) -> Option<ThreadId>;

    /// Priority of the highest-priority ready thread, without removing it.
    /// Used by `test_max_priority` (spec §4.1 preemption rule).
    fn peek_max_priority(&self) -> Option<u8>;

    /// Remove `id` from the ready set if present.
    fn remove(&mut self, id: ThreadId);

    /// Re-sort the ready set using freshly looked-up priorities. Called
    /// after any operation that can change priorities while threads are
    /// already enqueued (donation refresh, `set_priority`, MLFQS recompute;
    /// spec §5 "Ordering guarantees").
    fn resort(&mut self, lookup: &dyn Fn(ThreadId) -> u8);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every currently-enqueued id, highest priority first.
    fn iter_ids(&self) -> Vec<ThreadId>;
}

/// Reference priority levels for kernel-internal bookkeeping threads.
/// User/test threads use the `PRI_MIN..=PRI_MAX` scale from the crate root
/// directly; these are convenience names for the idle thread and similar.
pub mod priority {
    /// Idle priority - only runs when nothing else is ready.
    pub const IDLE: u8 = crate::PRI_MIN;
    /// Default priority newly created threads start at.
    pub const DEFAULT: u8 = crate::PRI_DEFAULT;
    /// Highest legal priority.
    pub const MAX: u8 = crate::PRI_MAX;
}
