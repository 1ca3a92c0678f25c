//! x86_64 context switching and interrupt control.
//!
//! Mirrors the structural idiom of the teacher crate's aarch64
//! implementation (a `#[repr(C)]` saved-context struct with a `Default` impl,
//! inline assembly using scratch registers to address both contexts, and a
//! label marking the point execution resumes at) but uses the classic
//! System-V callee-saved-register/stack-swap technique rather than a literal
//! port of the aarch64 register set: `context_switch` saves `rbx, rbp, r12,
//! r13, r14, r15` and the stack pointer into `prev`, then loads the same
//! fields from `next` and returns — the return address popped off the new
//! stack is whatever the new thread's stack was set up to resume at (either
//! a prior `context_switch` call site, or the initial trampoline a freshly
//! spawned thread's stack is primed with).

use super::Arch;
use core::sync::atomic::{AtomicBool, Ordering};

/// Saved x86_64 execution context: the six System-V callee-saved general
/// purpose registers plus the stack pointer. The instruction pointer is not
/// stored explicitly — it lives on the stack at `[rsp]` as the return address
/// `context_switch` itself will `ret` to.
#[repr(C)]
pub struct X86_64Context {
    rsp: u64,
    rbx: u64,
    rbp: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
    #[cfg(feature = "full-fpu")]
    fxsave_area: [u8; 512],
}

impl Default for X86_64Context {
    fn default() -> Self {
        Self {
            rsp: 0,
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            #[cfg(feature = "full-fpu")]
            fxsave_area: [0u8; 512],
        }
    }
}

// SAFETY: a saved context is inert register data; it carries no borrows.
unsafe impl Send for X86_64Context {}
unsafe impl Sync for X86_64Context {}

impl X86_64Context {
    /// Prepare a fresh context for a stack that has never run: `rsp` points
    /// at the top of a stack primed so that the first `ret` performed by
    /// `context_switch` lands on `entry_trampoline`, which is responsible for
    /// calling the thread's real entry point.
    ///
    /// # Safety
    ///
    /// `stack_top` must be a valid, 16-byte-aligned pointer to the highest
    /// usable address of a stack allocation at least large enough to hold
    /// the priming frame this function writes.
    pub unsafe fn new_thread_context(stack_top: *mut u8, entry_trampoline: extern "C" fn() -> !) -> Self {
        // Reserve one word for the return address the initial `ret` in
        // context_switch consumes, matching how a real call frame looks.
        let rsp = (stack_top as usize) & !0xF;
        let frame = (rsp - 8) as *mut u64;
        unsafe {
            frame.write(entry_trampoline as usize as u64);
        }
        Self {
            rsp: frame as u64,
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            #[cfg(feature = "full-fpu")]
            fxsave_area: [0u8; 512],
        }
    }
}

/// Unit struct implementing [`Arch`] for x86_64.
pub struct X86_64Arch;

impl Arch for X86_64Arch {
    type SavedContext = X86_64Context;

    /// # Safety
    /// See [`Arch::context_switch`].
    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext) {
        // r8 and r9 hold the base addresses of `prev`/`next`; they are
        // caller-saved on System-V so no save/restore is needed for them.
        unsafe {
            core::arch::asm!(
                // Save prev's callee-saved registers and stack pointer.
                "mov [r8 + 0], rsp",
                "mov [r8 + 8], rbx",
                "mov [r8 + 16], rbp",
                "mov [r8 + 24], r12",
                "mov [r8 + 32], r13",
                "mov [r8 + 40], r14",
                "mov [r8 + 48], r15",
                // Load next's stack pointer and callee-saved registers.
                "mov rsp, [r9 + 0]",
                "mov rbx, [r9 + 8]",
                "mov rbp, [r9 + 16]",
                "mov r12, [r9 + 24]",
                "mov r13, [r9 + 32]",
                "mov r14, [r9 + 40]",
                "mov r15, [r9 + 48]",
                // Resume at whatever address is on top of the new stack:
                // either a previous context_switch call site, or the thread
                // entry trampoline for a never-before-run thread.
                "ret",
                in("r8") prev,
                in("r9") next,
                options(noreturn),
            );
        }
    }

    #[cfg(feature = "full-fpu")]
    unsafe fn save_fpu(ctx: &mut Self::SavedContext) {
        unsafe {
            core::arch::asm!(
                "fxsave [{0}]",
                in(reg) ctx.fxsave_area.as_mut_ptr(),
                options(nostack),
            );
        }
    }

    #[cfg(feature = "full-fpu")]
    unsafe fn restore_fpu(ctx: &Self::SavedContext) {
        unsafe {
            core::arch::asm!(
                "fxrstor [{0}]",
                in(reg) ctx.fxsave_area.as_ptr(),
                options(nostack),
            );
        }
    }

    fn enable_interrupts() {
        unsafe {
            core::arch::asm!("sti", options(nomem, nostack));
        }
        INTERRUPTS_ENABLED.store(true, Ordering::Release);
    }

    fn disable_interrupts() {
        unsafe {
            core::arch::asm!("cli", options(nomem, nostack));
        }
        INTERRUPTS_ENABLED.store(false, Ordering::Release);
    }

    fn interrupts_enabled() -> bool {
        // `pushfq`/`popfq` would be the precise way to read IF directly from
        // RFLAGS; this crate tracks the flag in software at each
        // enable/disable call site (which are the only legal ways to change
        // it) to avoid the extra asm round-trip on the hot preemption-check
        // path.
        INTERRUPTS_ENABLED.load(Ordering::Acquire)
    }
}

static INTERRUPTS_ENABLED: AtomicBool = AtomicBool::new(false);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_is_zeroed() {
        let ctx = X86_64Context::default();
        assert_eq!(ctx.rsp, 0);
        assert_eq!(ctx.rbx, 0);
    }
}
