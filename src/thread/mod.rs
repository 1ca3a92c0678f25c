//! The thread control block and the thread arena.
//!
//! The teacher crate modeled a thread as an `ArcLite<ThreadInner>` with a
//! typestate wrapper (`ReadyRef`/`RunningRef`) layered on top to make
//! illegal state transitions hard to express. This rewrite keeps `ThreadId`
//! (a `NonZeroUsize` wrapper) but drops the per-thread shared-pointer graph
//! in favor of a single arena owned by the kernel, keyed by `ThreadId` (see
//! `DESIGN.md`, "Cyclic parent-child references"): every `Thread` lives in
//! exactly one place, and parent/child/donation/wait_on_lock references are
//! plain `ThreadId`s rather than pointers or `Arc`s.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::num::NonZeroUsize;

use alloc::boxed::Box;

use crate::mem::Stack;
use crate::process::{AddressSpace, FdTable, FileHandle};
use crate::sync::Semaphore;
use crate::time::Fp;

/// Dense thread identifier. Never zero, so `Option<ThreadId>` is
/// pointer-sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroUsize);

impl ThreadId {
    /// Construct from a raw value; panics if `id == 0`.
    pub fn new(id: usize) -> Self {
        Self(NonZeroUsize::new(id).expect("thread id must be nonzero"))
    }

    /// # Safety
    /// `id` must be nonzero.
    pub unsafe fn new_unchecked(id: usize) -> Self {
        Self(unsafe { NonZeroUsize::new_unchecked(id) })
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

/// Thread lifecycle state (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// Magic canary written at the top of every thread's kernel stack; checked
/// on every tick to detect overflow (spec §4.1 failure semantics).
pub const STACK_MAGIC: u64 = 0xCD6A_A94C_3577_8FE9;

/// The thread control block.
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
    pub status: ThreadState,

    /// Base priority, set at creation or by an explicit `set_priority` call.
    pub init_priority: u8,
    /// Effective priority: `init_priority` plus any donation.
    pub priority: u8,

    /// Absolute tick at which a sleeping thread should wake; meaningful only
    /// while `status == Blocked` and the thread is on the sleep list.
    pub wakeup_tick: u64,

    /// The lock this thread is currently blocked trying to acquire, if any.
    /// Identity only (for `remove_donations_for` comparisons and the spec
    /// §3 invariant check); never dereferenced.
    pub wait_on_lock: Option<LockId>,
    /// The thread currently holding `wait_on_lock`, if any. Kept in sync by
    /// `Kernel::lock_acquire`/`lock_release` alongside `wait_on_lock` itself
    /// and used to walk the donation chain (spec §4.4) without needing to
    /// dereference a `LockId` back into a `Lock` (locks are not
    /// arena-owned, so that identity token alone cannot be walked safely;
    /// see `DESIGN.md`).
    pub wait_on_lock_holder: Option<ThreadId>,
    /// Threads that have donated priority to this thread because they are
    /// waiting on a lock this thread holds.
    pub donations: Vec<ThreadId>,

    /// Parent thread, if this is a user process spawned via `fork`.
    pub parent: Option<ThreadId>,
    /// Children spawned via `fork` that have not yet been reaped by `wait`.
    pub children: Vec<ThreadId>,
    /// Exit status, valid once `status == Dying` (or once a parent has
    /// observed it via `wait`).
    pub exit_status: i32,

    /// MLFQS niceness, in `[-20, 20]`.
    pub nice: i32,
    /// MLFQS recent CPU usage, fixed point.
    pub recent_cpu: Fp,

    /// Ticks the thread has run in its current time slice (strict-priority
    /// mode only; reset on every schedule and every MLFQS priority
    /// recompute).
    pub ticks_in_slice: u32,

    /// Per-process file descriptor table. Kernel (non-user) threads leave
    /// this at its default empty state.
    pub fd_table: FdTable,

    /// Fork/wait/exit coordination semaphores (spec §4.7, §5).
    pub fork_sema: Semaphore,
    pub wait_sema: Semaphore,
    pub free_sema: Semaphore,

    /// User address space, present only for user processes (spec §3). `None`
    /// for kernel/bookkeeping threads, and for user threads before their
    /// first `exec`.
    pub address_space: Option<Box<dyn AddressSpace>>,
    /// The executable file this thread is currently running, kept open with
    /// writes denied for the process's lifetime (spec §3 "owned executable
    /// file handle").
    pub running_file: Option<Box<dyn FileHandle>>,

    /// Kernel stack backing this thread's execution context. `None` for
    /// bookkeeping-only threads used in some tests.
    pub stack: Option<Stack>,
}

/// Opaque identifier naming a `sync::Lock`, used only so a blocked thread
/// can say which lock it is waiting on without holding a pointer into it
/// (locks are not arena-owned; they live wherever their creator placed
/// them). In practice this is the lock's address, treated as an opaque
/// token — the thread module never dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockId(pub usize);

impl Thread {
    /// Construct a new thread control block. `stack` is `None` only for
    /// bookkeeping/test threads that never actually run.
    pub fn new(id: ThreadId, name: String, priority: u8, stack: Option<Stack>) -> Self {
        Self {
            id,
            name,
            status: ThreadState::Blocked,
            init_priority: priority,
            priority,
            wakeup_tick: 0,
            wait_on_lock: None,
            wait_on_lock_holder: None,
            donations: Vec::new(),
            parent: None,
            children: Vec::new(),
            exit_status: 0,
            nice: 0,
            recent_cpu: Fp::ZERO,
            ticks_in_slice: 0,
            fd_table: FdTable::new(),
            fork_sema: Semaphore::new(0),
            wait_sema: Semaphore::new(0),
            free_sema: Semaphore::new(0),
            address_space: None,
            running_file: None,
            stack,
        }
    }

    /// Recompute this thread's effective priority from its base priority and
    /// the priorities of its current donors (spec §4.4 `refresh_priority`).
    /// The caller passes the live donor priorities (looked up from the
    /// arena), since a `Thread` cannot see other threads on its own.
    pub fn refresh_priority(&mut self, donor_priorities: impl Iterator<Item = u8>) {
        let max_donor = donor_priorities.max().unwrap_or(0);
        self.priority = core::cmp::max(self.init_priority, max_donor);
    }

    /// Recompute MLFQS priority from `recent_cpu`/`nice` (spec §4.6):
    /// `PRI_MAX - recent_cpu/4 - nice*2`, clamped to `[PRI_MIN, PRI_MAX]`.
    pub fn recompute_mlfqs_priority(&mut self) {
        let pri_max = Fp::from_int(crate::PRI_MAX as i32);
        let recent_cpu_term = self.recent_cpu.div_int(4);
        let nice_term = Fp::from_int(self.nice * 2);
        let raw = pri_max.sub(recent_cpu_term).sub(nice_term).to_int_round();
        self.priority = raw.clamp(crate::PRI_MIN as i32, crate::PRI_MAX as i32) as u8;
    }
}

/// Owns every live `Thread`, keyed by id. The kernel's ready queue, sleep
/// list, and destruction list store `ThreadId`s that index into this arena.
pub struct ThreadArena {
    threads: BTreeMap<ThreadId, Thread>,
    next_id: usize,
}

impl ThreadArena {
    pub fn new() -> Self {
        Self {
            threads: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Allocate the next dense thread id.
    pub fn next_id(&mut self) -> ThreadId {
        let id = ThreadId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, thread: Thread) {
        self.threads.insert(thread.id, thread);
    }

    pub fn remove(&mut self, id: ThreadId) -> Option<Thread> {
        self.threads.remove(&id)
    }

    pub fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(&id)
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Iterate over every live thread.
    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Thread> {
        self.threads.values_mut()
    }
}

impl Default for ThreadArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_id_roundtrips() {
        let id = ThreadId::new(7);
        assert_eq!(id.get(), 7);
    }

    #[test]
    fn arena_assigns_increasing_ids() {
        let mut arena = ThreadArena::new();
        let a = arena.next_id();
        let b = arena.next_id();
        assert!(b.get() > a.get());
    }

    #[test]
    fn refresh_priority_takes_max_of_base_and_donors() {
        let mut t = Thread::new(ThreadId::new(1), String::from("t"), 10, None);
        t.refresh_priority([5, 20, 8].into_iter());
        assert_eq!(t.priority, 20);
        t.refresh_priority(core::iter::empty());
        assert_eq!(t.priority, 10);
    }

    #[test]
    fn mlfqs_priority_clamps_to_range() {
        let mut t = Thread::new(ThreadId::new(1), String::from("t"), 31, None);
        t.recent_cpu = Fp::from_int(1000);
        t.nice = 20;
        t.recompute_mlfqs_priority();
        assert_eq!(t.priority, crate::PRI_MIN);

        t.recent_cpu = Fp::ZERO;
        t.nice = 0;
        t.recompute_mlfqs_priority();
        assert_eq!(t.priority, crate::PRI_MAX);
    }
}
