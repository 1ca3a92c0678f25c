//! Boot-time kernel configuration.
//!
//! The upstream Pintos-derived design takes a single meaningful command-line
//! option, `-o mlfqs`, to switch scheduling modes. This module holds that
//! option plus the handful of related constants that are naturally
//! configuration rather than hard-coded policy.

/// Kernel-wide configuration, fixed at boot and read thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// When `true`, the scheduler runs in multi-level feedback queue mode:
    /// priorities are derived from `recent_cpu`/`nice` and priority donation
    /// is inert. When `false` (the default), strict priority scheduling with
    /// donation is used.
    pub mlfqs: bool,
    /// Number of ticks a thread may run before preemption is requested.
    pub time_slice_ticks: u32,
    /// Timer interrupt frequency in Hz, used to convert between ticks and
    /// wall-clock seconds for the MLFQS load-average recompute.
    pub timer_freq_hz: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            mlfqs: false,
            time_slice_ticks: crate::TIME_SLICE,
            timer_freq_hz: 1000,
        }
    }
}

impl KernelConfig {
    /// Configuration with MLFQS scheduling enabled, mirroring `-o mlfqs`.
    pub fn mlfqs() -> Self {
        Self {
            mlfqs: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_priority_donation_mode() {
        let cfg = KernelConfig::default();
        assert!(!cfg.mlfqs);
        assert_eq!(cfg.time_slice_ticks, 4);
    }

    #[test]
    fn mlfqs_constructor_sets_flag() {
        assert!(KernelConfig::mlfqs().mlfqs);
    }
}
