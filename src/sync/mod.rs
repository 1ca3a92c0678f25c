//! Synchronization primitives: semaphore, lock with priority donation, and
//! Mesa-style condition variable.
//!
//! Grounded on `original_source/threads/synch.c` for the semaphore and
//! condition-variable shapes. That draft's `lock_acquire`/`lock_release`
//! have no donation logic (donation fields are declared in `thread.h` but
//! never wired up in `synch.c`), so the donation algorithm here follows
//! spec.md §4.4 directly, which is fully specified and authoritative.
//!
//! These types hold no reference to the kernel: like Pintos's
//! `sema_down`/`lock_acquire`/`cond_wait`, the operations that need to touch
//! the current thread or the ready queue are inherent methods on
//! [`crate::kernel::Kernel`] (see `kernel.rs`), which has access to the
//! thread arena these primitives' waiter lists index into.

extern crate alloc;

pub mod condvar;
pub mod lock;
pub mod semaphore;

pub use condvar::Condvar;
pub use lock::{Lock, DONATION_DEPTH_LIMIT};
pub use semaphore::Semaphore;
