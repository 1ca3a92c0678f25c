//! Ticks, durations, and fixed-point arithmetic.
//!
//! The scheduler in this crate is entirely tick-driven (see [`crate::sched`]):
//! there is no wall-clock quantum scaling by priority. [`Duration`]/[`Instant`]
//! are kept as general-purpose nanosecond-resolution values for logging and
//! for architectures that can read a real clock; scheduling decisions never
//! consult them, only [`tick::TickCounter`].

pub mod fixed_point;
pub mod tick;

pub use fixed_point::Fp;
pub use tick::TickCounter;

/// Frequency in Hz at which the external timer collaborator calls
/// [`crate::sched::PriorityScheduler::on_tick`] (see spec §6).
pub const TIMER_FREQUENCY_HZ: u32 = 1000;

/// Nanoseconds since an arbitrary epoch. Informational only; never consulted
/// by scheduling decisions, which operate purely on tick counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant(u64);

impl Instant {
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// The zero instant. Real wall-clock reads are an architecture concern
    /// (`Arch` does not currently expose one); this is the value used where
    /// no clock collaborator is wired up.
    pub fn now() -> Self {
        Self(0)
    }

    pub fn duration_since(self, earlier: Instant) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl core::ops::Add<Duration> for Instant {
    type Output = Self;

    fn add(self, duration: Duration) -> Self {
        Self(self.0 + duration.as_nanos())
    }
}

/// A duration of time in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(u64);

impl Duration {
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn from_micros(micros: u64) -> Self {
        Self(micros * 1_000)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000_000)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    pub fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }
}
