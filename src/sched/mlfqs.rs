//! Multi-level feedback queue scheduling (spec §4.6).
//!
//! Grounded on `original_source/threads/thread.c`'s MLFQS section and
//! `threads/fixed_point.c`'s worked formulas. Pure recompute functions over
//! a [`ThreadArena`]; the tick/second cadence gating these calls lives in
//! [`crate::kernel::Kernel::on_tick`].

use crate::thread::{ThreadArena, ThreadId};
use crate::time::Fp;

/// Every tick, the running thread's `recent_cpu` increments by 1 (unless it
/// is the idle thread).
pub fn tick_increment_recent_cpu(arena: &mut ThreadArena, current: ThreadId, idle: ThreadId) {
    if current == idle {
        return;
    }
    if let Some(t) = arena.get_mut(current) {
        t.recent_cpu = t.recent_cpu.add_int(1);
    }
}

/// Every 4 ticks: recompute every non-idle thread's priority from its
/// current `recent_cpu`/`nice`.
pub fn recompute_all_priorities(arena: &mut ThreadArena, idle: ThreadId) {
    for t in arena.iter_mut() {
        if t.id != idle {
            t.recompute_mlfqs_priority();
        }
    }
}

/// Every `TIMER_FREQ` ticks: `load_avg = (59/60)*load_avg + (1/60)*ready_threads`,
/// where `ready_threads` counts READY threads plus 1 if the current thread is
/// non-idle.
pub fn recompute_load_avg(load_avg: Fp, ready_count: usize, current_is_idle: bool) -> Fp {
    let ready_threads = ready_count + usize::from(!current_is_idle);
    let fifty_nine_sixtieths = Fp::from_int(59).div_int(60);
    let one_sixtieth = Fp::from_int(1).div_int(60);
    fifty_nine_sixtieths
        .mul(load_avg)
        .add(one_sixtieth.mul_int(ready_threads as i32))
}

/// Every `TIMER_FREQ` ticks, after `load_avg` is refreshed: recompute every
/// non-idle thread's `recent_cpu = (2*load_avg)/(2*load_avg + 1) * recent_cpu + nice`.
pub fn recompute_all_recent_cpu(arena: &mut ThreadArena, load_avg: Fp, idle: ThreadId) {
    let two_load_avg = load_avg.mul_int(2);
    let coefficient = two_load_avg.div(two_load_avg.add_int(1));
    for t in arena.iter_mut() {
        if t.id != idle {
            t.recent_cpu = coefficient.mul(t.recent_cpu).add_int(t.nice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    extern crate alloc;

    #[test]
    fn load_avg_converges_from_zero_with_one_busy_thread() {
        let mut load_avg = Fp::ZERO;
        for _ in 0..200 {
            load_avg = recompute_load_avg(load_avg, 0, false);
        }
        // One constantly-ready thread: converges toward 1.0 (F), not beyond.
        assert!(load_avg.to_int_trunc() <= 1);
        assert!(load_avg.raw() > 0);
    }

    #[test]
    fn recent_cpu_increments_only_for_non_idle_current() {
        let mut arena = ThreadArena::new();
        let idle = arena.next_id();
        arena.insert(crate::thread::Thread::new(idle, String::from("idle"), 0, None));
        let worker = arena.next_id();
        arena.insert(crate::thread::Thread::new(worker, String::from("w"), 31, None));

        tick_increment_recent_cpu(&mut arena, idle, idle);
        assert_eq!(arena.get(idle).unwrap().recent_cpu, Fp::ZERO);

        tick_increment_recent_cpu(&mut arena, worker, idle);
        assert_eq!(arena.get(worker).unwrap().recent_cpu, Fp::from_int(1));
    }
}
