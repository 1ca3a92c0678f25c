//! The global tick counter.
//!
//! Ticks are the kernel's only notion of time: the external timer
//! collaborator calls [`TickCounter::increment`] once per tick, and
//! everything else (sleep wakeups, time-slice preemption, MLFQS recompute)
//! is keyed off [`TickCounter::ticks`]. Kept from the teacher crate's
//! `time::tick` module; the wall-clock-scaled `TimeSlice`/vruntime machinery
//! that used to live alongside it has been dropped in favor of the fixed
//! `TIME_SLICE` ticks this crate's scheduler uses (see `sched`).

use portable_atomic::{AtomicU64, Ordering};

/// Global monotonic tick counter, incremented on every timer interrupt.
pub struct TickCounter {
    ticks: AtomicU64,
    frequency: u32,
}

impl TickCounter {
    pub const fn new(frequency: u32) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            frequency,
        }
    }

    /// Advance the counter by one tick. Only the timer collaborator should
    /// call this.
    pub fn increment(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Current tick count.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Timer frequency in Hz (ticks per second).
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Whether `ticks()` is an exact multiple of one second at this
    /// frequency (used to gate the MLFQS load-average recompute).
    pub fn is_second_boundary(&self) -> bool {
        self.frequency != 0 && self.ticks() % self.frequency as u64 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increments_monotonically() {
        let counter = TickCounter::new(1000);
        assert_eq!(counter.ticks(), 0);
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert_eq!(counter.ticks(), 2);
    }

    #[test]
    fn second_boundary_at_frequency_multiples() {
        let counter = TickCounter::new(4);
        for _ in 0..3 {
            counter.increment();
            assert!(!counter.is_second_boundary());
        }
        counter.increment();
        assert!(counter.is_second_boundary());
    }
}
