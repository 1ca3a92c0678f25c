//! User-process lifecycle: address spaces, fork, exec, wait, exit.
//!
//! Grounded on `original_source/userprog/process.c`'s `process_fork`,
//! `process_exec`/`load`, `process_wait`, `process_exit`. The page-table and
//! physical-memory layer those functions drive is an external collaborator
//! (spec §6), so this module depends only on the narrow [`AddressSpace`]
//! trait rather than a concrete page table; `FlatAddressSpace` stands in for
//! it in tests.

extern crate alloc;

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

pub mod elf;
pub mod fd;

pub use elf::{
    Elf64Header, Elf64ProgramHeader, ELF_MAGIC, EM_X86_64, ET_EXEC, PF_R, PF_W, PF_X, PT_LOAD,
};
pub use fd::{FdTable, FileHandle, FDCOUNT_LIMIT, STDIN_FILENO, STDOUT_FILENO};

use crate::arch::Arch;
use crate::errors::ProcessError;
use crate::kernel::Kernel;
use crate::sched::Scheduler;
use crate::thread::{Thread, ThreadId, ThreadState};

/// Narrow external-collaborator interface standing in for the page-table /
/// physical-memory layer (spec §6: "out of scope ... the page-table / MMU
/// layer"). A user thread's [`crate::thread::Thread::address_space`] is a
/// boxed trait object over this so `process::exec`/`process::fork` never
/// need to know the concrete representation.
pub trait AddressSpace: Send + Sync {
    /// Map `data` (the segment's file contents) at `vaddr`, zero-filling the
    /// remaining `memsz - data.len()` bytes (bss), with `writable` governing
    /// the segment's page protection.
    fn map_segment(&mut self, vaddr: u64, data: &[u8], memsz: u64, writable: bool) -> Result<(), ProcessError>;

    /// Write `data` at `addr`, used to build the argv stack (spec §4.7, §10).
    fn write_bytes(&mut self, addr: u64, data: &[u8]) -> Result<(), ProcessError>;

    /// Read `len` bytes starting at `addr`, used by the syscall layer to
    /// move `read`/`write` buffers and NUL-terminated path strings between
    /// user and kernel memory (spec §4.8). Unmapped bytes read as zero;
    /// callers are expected to have already validated the range with
    /// `check_user_address`.
    fn read_bytes(&self, addr: u64, len: u64) -> Vec<u8>;

    /// Page-by-page duplication for `fork` (spec §4.7 step 4: "for every
    /// user-space page in the parent, allocate a new page, copy bytes").
    fn duplicate(&self) -> Box<dyn AddressSpace>;

    /// Whether `[addr, addr+len)` lies entirely within the user address
    /// range and maps to pages actually present in this address space
    /// (spec §4.8 `check_user_address`).
    fn check_user_address(&self, addr: u64, len: u64) -> bool;
}

/// Narrow external-collaborator interface for the filesystem (spec §6):
/// `filesys_open`/`filesys_create`/`filesys_remove`.
pub trait Filesystem: Send + Sync {
    fn open(&self, path: &str) -> Option<Box<dyn FileHandle>>;
    fn create(&self, path: &str, initial_size: u64) -> bool;
    fn remove(&self, path: &str) -> bool;
}

/// A page-keyed, sparsely-allocated test double for [`AddressSpace`]. Only
/// pages actually written are allocated, so tests don't need to reserve the
/// full ~2^47-byte user range ([`elf::USER_BASE`]..[`elf::USER_TOP`]).
pub struct FlatAddressSpace {
    pages: BTreeMap<u64, Box<[u8; elf::PAGE_SIZE as usize]>>,
}

impl FlatAddressSpace {
    pub fn new() -> Self {
        Self { pages: BTreeMap::new() }
    }

    fn page_base(addr: u64) -> u64 {
        addr & !(elf::PAGE_SIZE - 1)
    }

    fn page_mut(&mut self, base: u64) -> &mut [u8; elf::PAGE_SIZE as usize] {
        self.pages
            .entry(base)
            .or_insert_with(|| Box::new([0u8; elf::PAGE_SIZE as usize]))
    }
}

impl Default for FlatAddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace for FlatAddressSpace {
    fn map_segment(&mut self, vaddr: u64, data: &[u8], memsz: u64, _writable: bool) -> Result<(), ProcessError> {
        let mut offset = 0u64;
        while offset < memsz {
            let addr = vaddr + offset;
            let base = Self::page_base(addr);
            let page_offset = (addr - base) as usize;
            let chunk = (elf::PAGE_SIZE as usize - page_offset).min((memsz - offset) as usize);
            let page = self.page_mut(base);
            if offset < data.len() as u64 {
                let data_chunk = chunk.min((data.len() as u64 - offset) as usize);
                page[page_offset..page_offset + data_chunk].copy_from_slice(&data[offset as usize..offset as usize + data_chunk]);
                for b in &mut page[page_offset + data_chunk..page_offset + chunk] {
                    *b = 0;
                }
            } else {
                for b in &mut page[page_offset..page_offset + chunk] {
                    *b = 0;
                }
            }
            offset += chunk as u64;
        }
        Ok(())
    }

    fn write_bytes(&mut self, addr: u64, data: &[u8]) -> Result<(), ProcessError> {
        let mut written = 0usize;
        while written < data.len() {
            let cur = addr + written as u64;
            let base = Self::page_base(cur);
            let offset = (cur - base) as usize;
            let chunk = (elf::PAGE_SIZE as usize - offset).min(data.len() - written);
            let page = self.page_mut(base);
            page[offset..offset + chunk].copy_from_slice(&data[written..written + chunk]);
            written += chunk;
        }
        Ok(())
    }

    /// Unallocated pages read as zero.
    fn read_bytes(&self, addr: u64, len: u64) -> Vec<u8> {
        let len = len as usize;
        let mut out = Vec::with_capacity(len);
        let mut cur = addr;
        while out.len() < len {
            let base = Self::page_base(cur);
            let offset = (cur - base) as usize;
            let chunk = (elf::PAGE_SIZE as usize - offset).min(len - out.len());
            match self.pages.get(&base) {
                Some(page) => out.extend_from_slice(&page[offset..offset + chunk]),
                None => out.extend(core::iter::repeat(0u8).take(chunk)),
            }
            cur += chunk as u64;
        }
        out
    }

    fn duplicate(&self) -> Box<dyn AddressSpace> {
        let mut pages = BTreeMap::new();
        for (&base, page) in self.pages.iter() {
            pages.insert(base, page.clone());
        }
        Box::new(FlatAddressSpace { pages })
    }

    fn check_user_address(&self, addr: u64, len: u64) -> bool {
        if addr == 0 || len == 0 {
            return false;
        }
        let Some(end) = addr.checked_add(len) else { return false };
        if addr < elf::USER_BASE || end > elf::USER_TOP {
            return false;
        }
        let mut base = Self::page_base(addr);
        let last = Self::page_base(end - 1);
        while base <= last {
            if !self.pages.contains_key(&base) {
                return false;
            }
            base += elf::PAGE_SIZE;
        }
        true
    }
}

/// Build a System-V AMD64 argv stack (spec §4.7, §10, scenario 6): arg
/// strings pushed in reverse order with NUL terminators, 8-byte alignment,
/// a NULL `argv[argc]` sentinel, the argv pointer array (so `argv[0]` sits
/// at the lowest address of the array), and one more word below that for a
/// fake return address.
///
/// Returns `(initial_rsp, argv_ptr, argc)`.
pub fn build_argv_stack(
    address_space: &mut dyn AddressSpace,
    stack_top: u64,
    argv: &[&str],
) -> Result<(u64, u64, u64), ProcessError> {
    let mut sp = stack_top;
    let mut str_addrs = Vec::with_capacity(argv.len());
    for arg in argv.iter().rev() {
        let bytes = arg.as_bytes();
        sp -= bytes.len() as u64 + 1;
        address_space.write_bytes(sp, bytes)?;
        address_space.write_bytes(sp + bytes.len() as u64, &[0])?;
        str_addrs.push(sp);
    }
    sp &= !7;

    sp -= 8;
    address_space.write_bytes(sp, &0u64.to_le_bytes())?;

    for &addr in str_addrs.iter() {
        sp -= 8;
        address_space.write_bytes(sp, &addr.to_le_bytes())?;
    }
    let argv_ptr = sp;

    sp -= 8;
    address_space.write_bytes(sp, &0u64.to_le_bytes())?;

    Ok((sp, argv_ptr, argv.len() as u64))
}

/// Take a thread's semaphore field out, run `f` on it with full kernel
/// access, then put it back. Needed because the blocking operations on
/// [`Kernel`] take `&mut Semaphore` and `&mut Kernel` simultaneously, and a
/// thread's coordination semaphores live inside the arena `Kernel` itself
/// owns.
fn with_thread_sema<A, S, F, R>(kernel: &mut Kernel<A, S>, id: ThreadId, select: fn(&mut Thread) -> &mut crate::sync::Semaphore, f: F) -> Option<R>
where
    A: Arch,
    S: Scheduler,
    F: FnOnce(&mut Kernel<A, S>, &mut crate::sync::Semaphore) -> R,
{
    let mut sema = core::mem::replace(select(kernel.arena.get_mut(id)?), crate::sync::Semaphore::new(0));
    let result = f(kernel, &mut sema);
    *select(kernel.arena.get_mut(id)?) = sema;
    Some(result)
}

impl<A: Arch, S: Scheduler> Kernel<A, S> {
    /// `fork(name)` (spec §4.7). Duplicates the parent's address space and
    /// file-descriptor table into a fresh child thread, parented to the
    /// caller. Returns the child's id, or `None` if address-space
    /// duplication or child creation failed (the syscall layer maps this to
    /// `-1`).
    ///
    /// The real `process_fork` snapshots the parent's trap frame and runs
    /// the address-space/FD duplication on the *child's* bootstrap stack,
    /// with the parent blocked on `child.fork_sema` the whole time. This
    /// crate performs the duplication synchronously on the caller's stack
    /// instead (there is no trap frame or second stack to bootstrap in the
    /// host-testable model) and then immediately signals and waits on
    /// `fork_sema` so the observable protocol — parent downs it, child ups
    /// it once duplication is complete — still holds.
    pub fn process_fork(&mut self, name: &str, priority: u8) -> Option<ThreadId> {
        let parent = self.current?;
        let child_as = self
            .arena
            .get(parent)?
            .address_space
            .as_ref()
            .map(|a| a.duplicate());
        let fd_table = self.arena.get(parent)?.fd_table.fork_duplicate();

        let child_id = self.arena.next_id();
        let mut child = Thread::new(child_id, String::from(name), priority, None);
        child.parent = Some(parent);
        child.fd_table = fd_table;
        child.address_space = child_as;
        self.arena.insert(child);
        if let Some(p) = self.arena.get_mut(parent) {
            p.children.push(child_id);
        }
        self.unblock(child_id);

        with_thread_sema(self, child_id, |t| &mut t.fork_sema, |k, sema| k.sema_up(sema));
        with_thread_sema(self, child_id, |t| &mut t.fork_sema, |k, sema| k.sema_down(sema));

        Some(child_id)
    }

    /// `exec(path)` (spec §4.7). Validates and loads `image`'s `PT_LOAD`
    /// segments into `address_space`, builds the argv stack, and installs
    /// the address space as the current thread's. Returns `(entry, rsp)` for
    /// the caller to install into the trap frame; on failure the current
    /// thread's address space is left untouched (the syscall layer maps a
    /// failure to `exit(-1)`, per spec §4.7).
    pub fn process_exec(
        &mut self,
        mut address_space: Box<dyn AddressSpace>,
        image: &[u8],
        argv: &[&str],
    ) -> Result<(u64, u64), ProcessError> {
        let header = Elf64Header::parse(image)?;
        header.validate()?;
        let headers = elf::parse_program_headers(image, &header)?;
        for ph in &headers {
            if ph.p_type == PT_LOAD {
                ph.validate_load_segment(image.len() as u64)?;
                let file_end = (ph.p_offset + ph.p_filesz) as usize;
                let data = image
                    .get(ph.p_offset as usize..file_end)
                    .ok_or(ProcessError::InvalidExecutable)?;
                address_space.map_segment(ph.p_vaddr, data, ph.p_memsz, ph.p_flags & PF_W != 0)?;
            }
        }
        let (rsp, _argv_ptr, _argc) = build_argv_stack(address_space.as_mut(), elf::USER_TOP, argv)?;

        let cur = self.current.ok_or(ProcessError::StackSetupFailed)?;
        if let Some(t) = self.arena.get_mut(cur) {
            t.address_space = Some(address_space);
        }
        Ok((header.e_entry, rsp))
    }

    /// `wait(pid)` (spec §4.7). Blocks until the named child of the current
    /// thread exits, then reaps it. Returns `-1` if `pid` does not name a
    /// living, unwaited child.
    pub fn process_wait(&mut self, pid: ThreadId) -> i32 {
        let Some(cur) = self.current else { return -1 };
        let is_child = self.arena.get(cur).map(|t| t.children.contains(&pid)).unwrap_or(false);
        if !is_child {
            return -1;
        }

        with_thread_sema(self, pid, |t| &mut t.wait_sema, |k, sema| k.sema_down(sema));

        let status = self.arena.get(pid).map(|t| t.exit_status).unwrap_or(-1);
        if let Some(t) = self.arena.get_mut(cur) {
            t.children.retain(|&c| c != pid);
        }

        with_thread_sema(self, pid, |t| &mut t.free_sema, |k, sema| k.sema_up(sema));

        status
    }

    /// `exit(status)`, part one (spec §4.7): record the status, tear down
    /// file descriptors and the address space, print the termination
    /// message, and release a waiting parent. Split from
    /// [`Kernel::process_exit_finish`] because the thread must not actually
    /// die (transition to DYING and schedule away) until the parent has had
    /// a chance to call `wait` and observe the status.
    pub fn process_exit_prepare(&mut self, status: i32) {
        let Some(cur) = self.current else { return };
        let name = self.arena.get(cur).map(|t| t.name.clone()).unwrap_or_default();
        if let Some(t) = self.arena.get_mut(cur) {
            t.exit_status = status;
            t.fd_table.close_all();
            if let Some(file) = t.running_file.take() {
                file.allow_write();
            }
            t.address_space = None;
        }
        self.console.putbuf(alloc::format!("{name}: exit({status})\n").as_bytes());
        with_thread_sema(self, cur, |t| &mut t.wait_sema, |k, sema| k.sema_up(sema));
    }

    /// `exit(status)`, part two: wait for the parent's acknowledgement, then
    /// transition to DYING and schedule away. The thread's arena slot is
    /// freed by the *next* `schedule` call, not this one (spec §5
    /// "Dying-thread reaping").
    pub fn process_exit_finish(&mut self) {
        let Some(cur) = self.current else { return };
        with_thread_sema(self, cur, |t| &mut t.free_sema, |k, sema| k.sema_down(sema));
        if let Some(t) = self.arena.get_mut(cur) {
            t.status = ThreadState::Dying;
        }
        self.schedule();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_address_space_roundtrips_written_bytes() {
        let mut space = FlatAddressSpace::new();
        space.write_bytes(elf::USER_BASE + 10, b"hello").unwrap();
        assert_eq!(space.read_bytes(elf::USER_BASE + 10, 5), b"hello");
    }

    #[test]
    fn map_segment_zero_fills_bss_beyond_filesz() {
        let mut space = FlatAddressSpace::new();
        space.map_segment(elf::USER_BASE, b"ab", 8, true).unwrap();
        assert_eq!(space.read_bytes(elf::USER_BASE, 8), b"ab\0\0\0\0\0\0");
    }

    #[test]
    fn duplicate_is_independent_of_the_original() {
        let mut space = FlatAddressSpace::new();
        space.write_bytes(elf::USER_BASE, b"x").unwrap();
        let mut child = space.duplicate();
        child.write_bytes(elf::USER_BASE, b"y").unwrap();
        assert_eq!(space.read_bytes(elf::USER_BASE, 1), b"x");
        assert_eq!(child.read_bytes(elf::USER_BASE, 1), b"y");
    }

    #[test]
    fn check_user_address_rejects_null_and_unmapped() {
        let mut space = FlatAddressSpace::new();
        assert!(!space.check_user_address(0, 4));
        assert!(!space.check_user_address(elf::USER_BASE, 4));
        space.write_bytes(elf::USER_BASE, b"abcd").unwrap();
        assert!(space.check_user_address(elf::USER_BASE, 4));
    }

    #[test]
    fn argv_stack_places_argv0_lowest_and_stays_aligned() {
        let mut space = FlatAddressSpace::new();
        let argv = ["echo", "x", "y", "z"];
        let (rsp, argv_ptr, argc) = build_argv_stack(&mut space, elf::USER_TOP, &argv).unwrap();
        assert_eq!(argc, 4);
        assert_eq!(argv_ptr % 8, 0);
        assert_eq!(rsp, argv_ptr - 8);
        assert_eq!(space.read_bytes(rsp, 8), 0u64.to_le_bytes());

        let mut ptrs = [0u64; 4];
        for (i, p) in ptrs.iter_mut().enumerate() {
            let bytes = space.read_bytes(argv_ptr + (i as u64) * 8, 8);
            *p = u64::from_le_bytes(bytes.try_into().unwrap());
        }
        for (expected, &addr) in argv.iter().zip(ptrs.iter()) {
            let bytes = space.read_bytes(addr, expected.len() as u64);
            assert_eq!(bytes, expected.as_bytes());
        }
        let null_word = space.read_bytes(argv_ptr + 4 * 8, 8);
        assert_eq!(null_word, 0u64.to_le_bytes());
    }
}
