//! The ready-queue scheduler and the MLFQS recompute it can be switched to.
//!
//! Two scheduling modes share one [`Scheduler`] trait surface: strict
//! priority with donation (the default; see [`crate::sync::lock`]) and
//! MLFQS (`mlfqs` module), which recomputes priorities from `recent_cpu`
//! and `nice` instead of accepting donation (spec §4.6). Both modes use the
//! same [`PriorityScheduler`] ready-queue implementation — MLFQS only
//! changes how priorities are computed, never how the ready queue orders
//! them once computed (spec §4.6 "Mutual exclusivity").

pub mod mlfqs;
pub mod priority;
pub mod trait_def;

pub use priority::PriorityScheduler;
pub use trait_def::{priority as priority_levels, Scheduler};

/// Default scheduler type.
pub type DefaultScheduler = PriorityScheduler;
