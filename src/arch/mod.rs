//! Architecture abstraction layer for context switching and interrupt handling.
//!
//! Kept from the teacher crate: a narrow `Arch` trait separating context
//! switching from interrupt control, plus a `NoOpArch` stand-in for hosts
//! without a concrete implementation. The teacher's concrete implementation
//! was aarch64-specific (Raspberry Pi Zero 2 W); this crate targets the
//! x86_64 System-V ABI the syscall layer is specified against (spec §4.8),
//! so `arch::x86_64` is a new implementation in the same idiom as the
//! teacher's `aarch64` module (fixed-offset saved-context struct, inline asm
//! using scratch/base registers, a label-marking the resume point) rather
//! than a port of the aarch64 assembly itself.

/// Architecture abstraction trait.
///
/// # Safety
///
/// Implementations involve direct hardware manipulation and inline assembly.
/// Methods marked `unsafe` have preconditions the caller must uphold.
pub trait Arch {
    /// Architecture-specific saved context type: every register needed to
    /// fully resume a thread's execution.
    type SavedContext: Send + Sync + Default;

    /// Switch from one thread context to another.
    ///
    /// # Safety
    ///
    /// - `prev` and `next` must point to valid, properly aligned contexts
    /// - both must remain valid for the duration of the call
    /// - must be called with interrupts disabled
    unsafe fn context_switch(prev: *mut Self::SavedContext, next: *const Self::SavedContext);

    /// Save floating point/SIMD state into `ctx`.
    ///
    /// # Safety
    /// `ctx` must be valid and the current thread must own the FPU.
    #[cfg(feature = "full-fpu")]
    unsafe fn save_fpu(ctx: &mut Self::SavedContext);

    /// Restore floating point/SIMD state from `ctx`.
    ///
    /// # Safety
    /// `ctx` must hold previously-saved valid FPU state.
    #[cfg(feature = "full-fpu")]
    unsafe fn restore_fpu(ctx: &Self::SavedContext);

    /// Enable interrupt delivery on the current CPU.
    fn enable_interrupts();

    /// Disable interrupt delivery on the current CPU.
    fn disable_interrupts();

    /// Whether interrupts are currently enabled.
    fn interrupts_enabled() -> bool;
}

/// A no-op architecture for hosts without a concrete implementation, and for
/// tests that only exercise scheduling logic, not real context switches.
pub struct NoOpArch;

impl Arch for NoOpArch {
    type SavedContext = ();

    unsafe fn context_switch(_prev: *mut Self::SavedContext, _next: *const Self::SavedContext) {}

    #[cfg(feature = "full-fpu")]
    unsafe fn save_fpu(_ctx: &mut Self::SavedContext) {}

    #[cfg(feature = "full-fpu")]
    unsafe fn restore_fpu(_ctx: &Self::SavedContext) {}

    fn enable_interrupts() {}

    fn disable_interrupts() {}

    fn interrupts_enabled() -> bool {
        true
    }
}

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

// `std-shim` builds run as an ordinary ring-3 process (tests, host tools),
// where privileged instructions like `cli`/`sti` fault; they always get the
// no-op architecture regardless of host CPU. Only a genuine bare-metal,
// non-std-shim x86_64 build uses the real context-switch implementation.
#[cfg(all(target_arch = "x86_64", not(feature = "std-shim")))]
pub use self::x86_64::X86_64Arch as DefaultArch;

#[cfg(feature = "std-shim")]
pub use NoOpArch as DefaultArch;

#[cfg(all(not(target_arch = "x86_64"), not(feature = "std-shim")))]
compile_error!("This kernel targets x86_64; enable the std-shim feature for host-side testing on other architectures.");

/// RAII interrupt-disable guard, modeling the "disable interrupts" critical
/// section the spec uses as the sole serializing primitive on this
/// single-CPU kernel (§5 Concurrency & Resource Model). Restores the prior
/// interrupt-enabled state on drop, mirroring `intr_disable`/`intr_set_level`
/// pairing in the source material.
pub struct CriticalSection<A: Arch> {
    was_enabled: bool,
    _arch: core::marker::PhantomData<A>,
}

impl<A: Arch> CriticalSection<A> {
    /// Disable interrupts, remembering whether they were enabled so they can
    /// be restored (not unconditionally re-enabled) when this guard drops.
    pub fn enter() -> Self {
        let was_enabled = A::interrupts_enabled();
        A::disable_interrupts();
        Self {
            was_enabled,
            _arch: core::marker::PhantomData,
        }
    }
}

impl<A: Arch> Drop for CriticalSection<A> {
    fn drop(&mut self) {
        if self.was_enabled {
            A::enable_interrupts();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_section_restores_prior_state() {
        assert!(NoOpArch::interrupts_enabled());
        {
            let _guard = CriticalSection::<NoOpArch>::enter();
            assert!(NoOpArch::interrupts_enabled());
        }
        assert!(NoOpArch::interrupts_enabled());
    }
}
