//! Counting semaphore.
//!
//! Grounded on `original_source/threads/synch.c` (`sema_init`, `sema_down`,
//! `sema_try_down`, `sema_up`). The blocking operations themselves live on
//! [`crate::kernel::Kernel`] since they need to move the current thread
//! between the ready queue and this semaphore's waiter list; this type only
//! holds the data (spec §3, §4.3).

extern crate alloc;

use alloc::vec::Vec;

use crate::thread::ThreadId;

/// A counting semaphore: a non-negative value plus a waiter list.
pub struct Semaphore {
    pub(crate) value: u32,
    pub(crate) waiters: Vec<ThreadId>,
}

impl Semaphore {
    pub fn new(value: u32) -> Self {
        Self {
            value,
            waiters: Vec::new(),
        }
    }

    /// Current value, for diagnostics and tests; not meaningful for deciding
    /// whether a `down` will block once other threads are involved, since
    /// that determination must happen atomically with the kernel's critical
    /// section.
    pub fn value(&self) -> u32 {
        self.value
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_given_value_with_no_waiters() {
        let sema = Semaphore::new(3);
        assert_eq!(sema.value(), 3);
        assert_eq!(sema.waiter_count(), 0);
    }
}
