//! System-call trap entry and dispatch (spec §4.8).
//!
//! Grounded on `original_source/userprog/syscall2.c`: the register mapping
//! (`rax` = call number, `rdi, rsi, rdx, r10, r8, r9` = args 1..6) and the
//! per-call handler semantics below follow that file, taken as ground truth
//! over an earlier, incomplete `syscall.c` draft also present in the
//! original sources (SPEC_FULL.md §10).

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::arch::Arch;
use crate::kernel::Kernel;
use crate::process::{AddressSpace, FileHandle, Filesystem, FlatAddressSpace, STDIN_FILENO, STDOUT_FILENO};
use crate::sched::Scheduler;
use crate::thread::ThreadId;

const MAX_PATH_LEN: usize = 4096;

/// A user trap frame, reduced to the registers the syscall ABI actually
/// uses: the call number and up to six arguments (spec §4.8, §9 "Trap frame
/// as polymorphic data").
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub rax: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub r10: u64,
    pub r8: u64,
    pub r9: u64,
}

impl TrapFrame {
    /// Read the `n`th argument register (0-indexed), per the ABI order
    /// `rdi, rsi, rdx, r10, r8, r9`.
    pub fn arg(&self, n: usize) -> u64 {
        match n {
            0 => self.rdi,
            1 => self.rsi,
            2 => self.rdx,
            3 => self.r10,
            4 => self.r8,
            5 => self.r9,
            _ => 0,
        }
    }
}

/// The fixed syscall table, in declaration order (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    Halt = 0,
    Exit = 1,
    Fork = 2,
    Exec = 3,
    Wait = 4,
    Create = 5,
    Remove = 6,
    Open = 7,
    Filesize = 8,
    Read = 9,
    Write = 10,
    Seek = 11,
    Tell = 12,
    Close = 13,
}

impl SyscallNumber {
    pub fn from_u64(n: u64) -> Option<Self> {
        Some(match n {
            0 => Self::Halt,
            1 => Self::Exit,
            2 => Self::Fork,
            3 => Self::Exec,
            4 => Self::Wait,
            5 => Self::Create,
            6 => Self::Remove,
            7 => Self::Open,
            8 => Self::Filesize,
            9 => Self::Read,
            10 => Self::Write,
            11 => Self::Seek,
            12 => Self::Tell,
            13 => Self::Close,
            _ => return None,
        })
    }
}

impl<A: Arch, S: Scheduler> Kernel<A, S> {
    /// Validate a user pointer argument: non-null, in the user address
    /// range, and mapped in the current thread's address space (spec §4.8
    /// step 4). A thread with no address space (a kernel thread, or a user
    /// thread that hasn't `exec`'d yet) never passes this check.
    pub fn check_user_address(&self, addr: u64, len: u64) -> bool {
        let Some(cur) = self.current else { return false };
        self.arena
            .get(cur)
            .and_then(|t| t.address_space.as_ref())
            .is_some_and(|space| space.check_user_address(addr, len))
    }

    /// Dispatch one trapped syscall. Stores the handler's return value into
    /// `frame.rax`. An unknown call number terminates the calling thread
    /// with status -1 instead of returning (spec §4.8 step 6, §9 resolved
    /// "divergent syscall_handler drafts").
    pub fn syscall_dispatch(&mut self, frame: &mut TrapFrame) {
        let Some(number) = SyscallNumber::from_u64(frame.rax) else {
            self.syscall_exit(-1);
            return;
        };

        if number == SyscallNumber::Exit {
            self.syscall_exit(frame.arg(0) as i64 as i32);
            return;
        }

        let result = match number {
            SyscallNumber::Halt => self.syscall_halt(),
            SyscallNumber::Exit => unreachable!("handled above"),
            SyscallNumber::Fork => self.syscall_fork(frame),
            SyscallNumber::Exec => self.syscall_exec(frame),
            SyscallNumber::Wait => self.syscall_wait(frame),
            SyscallNumber::Create => self.syscall_create(frame),
            SyscallNumber::Remove => self.syscall_remove(frame),
            SyscallNumber::Open => self.syscall_open(frame),
            SyscallNumber::Filesize => self.syscall_filesize(frame),
            SyscallNumber::Read => self.syscall_read(frame),
            SyscallNumber::Write => self.syscall_write(frame),
            SyscallNumber::Seek => self.syscall_seek(frame),
            SyscallNumber::Tell => self.syscall_tell(frame),
            SyscallNumber::Close => self.syscall_close(frame),
        };
        frame.rax = result as u64;
    }

    /// Real hardware would power the machine off here; this host-testable
    /// build has no such device to drive, so `halt` is a documented no-op.
    fn syscall_halt(&mut self) -> i64 {
        0
    }

    fn syscall_exit(&mut self, status: i32) {
        self.process_exit_prepare(status);
        self.process_exit_finish();
    }

    fn syscall_fork(&mut self, frame: &TrapFrame) -> i64 {
        let Some(name) = self.read_user_cstr(frame.arg(0)) else {
            self.syscall_exit(-1);
            return -1;
        };
        match self.process_fork(&name, crate::PRI_DEFAULT) {
            Some(id) => id.get() as i64,
            None => -1,
        }
    }

    /// Loads and replaces the calling thread's image with the executable
    /// named by the first whitespace-delimited token of `path`, passing every
    /// token as argv (spec §4.7: "Parse `path` into argv (whitespace-
    /// delimited), open the executable"). This dispatcher instantiates a
    /// fresh [`FlatAddressSpace`] for the new image — the only concrete
    /// `AddressSpace` this crate provides; a real kernel would substitute its
    /// page-table implementation here instead.
    fn syscall_exec(&mut self, frame: &TrapFrame) -> i64 {
        let Some(command) = self.read_user_cstr(frame.arg(0)) else {
            self.syscall_exit(-1);
            return -1;
        };
        let argv: Vec<&str> = command.split_whitespace().collect();
        let Some(program) = argv.first() else {
            return -1;
        };
        let Some(handle) = self.filesystem.as_ref().and_then(|fs| fs.open(program)) else {
            return -1;
        };
        let mut image = vec![0u8; handle.length() as usize];
        handle.read(&mut image);

        let space: Box<dyn AddressSpace> = Box::new(FlatAddressSpace::new());
        match self.process_exec(space, &image, &argv) {
            Ok(_entry_and_rsp) => 0,
            Err(_) => {
                self.syscall_exit(-1);
                -1
            }
        }
    }

    fn syscall_wait(&mut self, frame: &TrapFrame) -> i64 {
        let raw = frame.arg(0);
        if raw == 0 {
            return -1;
        }
        self.process_wait(ThreadId::new(raw as usize)) as i64
    }

    /// `create`/`remove` delegate to the filesystem under no kernel-wide
    /// lock beyond what it requires itself (spec §4.8 handler semantics).
    fn syscall_create(&mut self, frame: &TrapFrame) -> i64 {
        let Some(path) = self.read_user_cstr(frame.arg(0)) else {
            self.syscall_exit(-1);
            return -1;
        };
        let size = frame.arg(1);
        self.filesystem
            .as_ref()
            .is_some_and(|fs| fs.create(&path, size)) as i64
    }

    fn syscall_remove(&mut self, frame: &TrapFrame) -> i64 {
        let Some(path) = self.read_user_cstr(frame.arg(0)) else {
            self.syscall_exit(-1);
            return -1;
        };
        self.filesystem.as_ref().is_some_and(|fs| fs.remove(&path)) as i64
    }

    fn syscall_open(&mut self, frame: &TrapFrame) -> i64 {
        let Some(path) = self.read_user_cstr(frame.arg(0)) else {
            self.syscall_exit(-1);
            return -1;
        };
        let Some(handle) = self.filesystem.as_ref().and_then(|fs| fs.open(&path)) else {
            return -1;
        };
        let Some(cur) = self.current else { return -1 };
        let Some(t) = self.arena.get_mut(cur) else { return -1 };
        match t.fd_table.open(handle) {
            Some(fd) => fd as i64,
            None => -1,
        }
    }

    fn syscall_filesize(&mut self, frame: &TrapFrame) -> i64 {
        let fd = frame.arg(0) as i32;
        let Some(cur) = self.current else { return -1 };
        self.arena
            .get(cur)
            .and_then(|t| t.fd_table.file(fd))
            .map(|f| f.length() as i64)
            .unwrap_or(-1)
    }

    /// `read`: fd 0 fills the buffer one byte at a time from the console
    /// until `size` bytes have been read, fd 1 is write-only (returns -1),
    /// fd >= 2 delegates to the file layer under `filesys_lock` (spec §4.8
    /// handler semantics, grounded on `syscall2.c:319`'s
    /// `for (read_count = 0; read_count < size; read_count++)` loop).
    fn syscall_read(&mut self, frame: &TrapFrame) -> i64 {
        let fd = frame.arg(0) as i32;
        let addr = frame.arg(1);
        let len = frame.arg(2);
        if len > 0 && !self.check_user_address(addr, len) {
            self.syscall_exit(-1);
            return -1;
        }
        if fd == STDIN_FILENO {
            let mut buf = vec![0u8; len as usize];
            for byte in buf.iter_mut() {
                *byte = self.console.input_getc();
            }
            self.write_user_bytes(addr, &buf);
            return len as i64;
        }
        if fd == STDOUT_FILENO {
            return -1;
        }
        let Some(cur) = self.current else { return -1 };
        let read = self.with_filesys_lock(|k| {
            k.with_fd_file(cur, fd, |file| {
                let mut buf = vec![0u8; len as usize];
                let n = file.read(&mut buf);
                buf.truncate(n);
                buf
            })
        });
        match read {
            Some(buf) => {
                let n = buf.len();
                self.write_user_bytes(addr, &buf);
                n as i64
            }
            None => -1,
        }
    }

    /// `write`: fd 1 writes to the console via `putbuf`, fd 0 is read-only
    /// (returns -1), fd >= 2 delegates under `filesys_lock`.
    fn syscall_write(&mut self, frame: &TrapFrame) -> i64 {
        let fd = frame.arg(0) as i32;
        let addr = frame.arg(1);
        let len = frame.arg(2);
        if len > 0 && !self.check_user_address(addr, len) {
            self.syscall_exit(-1);
            return -1;
        }
        if fd == STDIN_FILENO {
            return -1;
        }
        let bytes = self.read_user_bytes(addr, len);
        if fd == STDOUT_FILENO {
            return self.console.putbuf(&bytes) as i64;
        }
        let Some(cur) = self.current else { return -1 };
        self.with_filesys_lock(|k| k.with_fd_file(cur, fd, |file| file.write(&bytes)))
            .map(|n| n as i64)
            .unwrap_or(-1)
    }

    fn syscall_seek(&mut self, frame: &TrapFrame) -> i64 {
        let fd = frame.arg(0) as i32;
        let pos = frame.arg(1);
        let Some(cur) = self.current else { return -1 };
        self.with_fd_file(cur, fd, |file| file.seek(pos));
        0
    }

    fn syscall_tell(&mut self, frame: &TrapFrame) -> i64 {
        let fd = frame.arg(0) as i32;
        let Some(cur) = self.current else { return -1 };
        self.arena
            .get(cur)
            .and_then(|t| t.fd_table.file(fd))
            .map(|f| f.tell() as i64)
            .unwrap_or(-1)
    }

    /// `close`: no-op for fd < 2, otherwise closes the descriptor.
    fn syscall_close(&mut self, frame: &TrapFrame) -> i64 {
        let fd = frame.arg(0) as i32;
        let Some(cur) = self.current else { return 0 };
        if let Some(t) = self.arena.get_mut(cur) {
            t.fd_table.close(fd);
        }
        0
    }

    fn with_fd_file<F, R>(&self, thread: ThreadId, fd: i32, f: F) -> Option<R>
    where
        F: FnOnce(&dyn FileHandle) -> R,
    {
        let file = self.arena.get(thread)?.fd_table.file(fd)?;
        Some(f(file))
    }

    /// Run `f` with `filesys_lock` held, via the take-operate-restore
    /// pattern ([`crate::process::with_thread_sema`]'s sibling for a
    /// kernel-owned lock rather than a thread-owned semaphore).
    fn with_filesys_lock<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        let mut lock = core::mem::take(&mut self.filesys_lock);
        self.lock_acquire(&mut lock);
        let result = f(self);
        let _ = self.lock_release(&mut lock);
        self.filesys_lock = lock;
        result
    }

    fn read_user_bytes(&self, addr: u64, len: u64) -> Vec<u8> {
        let Some(cur) = self.current else { return Vec::new() };
        self.arena
            .get(cur)
            .and_then(|t| t.address_space.as_ref())
            .map(|space| space.read_bytes(addr, len))
            .unwrap_or_default()
    }

    fn write_user_bytes(&mut self, addr: u64, data: &[u8]) {
        let Some(cur) = self.current else { return };
        if let Some(t) = self.arena.get_mut(cur) {
            if let Some(space) = t.address_space.as_mut() {
                let _ = space.write_bytes(addr, data);
            }
        }
    }

    /// Read a NUL-terminated string out of user memory, one validated byte
    /// at a time, up to [`MAX_PATH_LEN`].
    fn read_user_cstr(&self, addr: u64) -> Option<String> {
        let cur = self.current?;
        let space = self.arena.get(cur)?.address_space.as_ref()?;
        let mut out = Vec::new();
        let mut cursor = addr;
        loop {
            if !space.check_user_address(cursor, 1) || out.len() >= MAX_PATH_LEN {
                return None;
            }
            let byte = space.read_bytes(cursor, 1);
            if byte[0] == 0 {
                break;
            }
            out.push(byte[0]);
            cursor += 1;
        }
        String::from_utf8(out).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::NoOpArch;
    use crate::config::KernelConfig;
    use crate::console::NullConsole;
    use crate::sched::PriorityScheduler;

    static CONSOLE: NullConsole = NullConsole;

    fn new_kernel() -> Kernel<NoOpArch, PriorityScheduler> {
        let mut k = Kernel::new(KernelConfig::default(), &CONSOLE);
        k.init("main", crate::PRI_DEFAULT);
        k
    }

    #[test]
    fn unknown_call_number_terminates_the_thread() {
        let mut k = new_kernel();
        let mut frame = TrapFrame { rax: 999, ..Default::default() };
        k.syscall_dispatch(&mut frame);
        let main = k.arena().iter().find(|t| t.name == "main");
        assert!(main.map(|t| t.status == crate::ThreadState::Dying).unwrap_or(true));
    }

    #[test]
    fn read_from_stdout_is_rejected() {
        let mut k = new_kernel();
        let mut frame = TrapFrame {
            rax: SyscallNumber::Read as u64,
            rdi: STDOUT_FILENO as u64,
            ..Default::default()
        };
        k.syscall_dispatch(&mut frame);
        assert_eq!(frame.rax as i64, -1);
    }

    #[test]
    fn write_to_stdin_is_rejected() {
        let mut k = new_kernel();
        let mut frame = TrapFrame {
            rax: SyscallNumber::Write as u64,
            rdi: STDIN_FILENO as u64,
            ..Default::default()
        };
        k.syscall_dispatch(&mut frame);
        assert_eq!(frame.rax as i64, -1);
    }

    #[test]
    fn close_on_reserved_fd_is_a_no_op_and_returns_zero() {
        let mut k = new_kernel();
        let mut frame = TrapFrame {
            rax: SyscallNumber::Close as u64,
            rdi: 0,
            ..Default::default()
        };
        k.syscall_dispatch(&mut frame);
        assert_eq!(frame.rax, 0);
    }

    #[test]
    fn write_to_stdout_forwards_user_bytes_to_the_console() {
        let mut k = new_kernel();
        let cur = k.current().unwrap();
        let mut space = FlatAddressSpace::new();
        space.write_bytes(0x1000, b"hi").unwrap();
        if let Some(t) = k.arena.get_mut(cur) {
            t.address_space = Some(alloc::boxed::Box::new(space));
        }
        let mut frame = TrapFrame {
            rax: SyscallNumber::Write as u64,
            rdi: STDOUT_FILENO as u64,
            rsi: 0x1000,
            rdx: 2,
            ..Default::default()
        };
        k.syscall_dispatch(&mut frame);
        assert_eq!(frame.rax, 2);
    }

    #[test]
    fn read_from_stdin_fills_the_whole_requested_length() {
        use crate::console::BufferConsole;

        let console: &'static BufferConsole = alloc::boxed::Box::leak(alloc::boxed::Box::new(BufferConsole::new()));
        console.feed_input(b"abc");
        let mut k = Kernel::<NoOpArch, PriorityScheduler>::new(KernelConfig::default(), console);
        k.init("main", crate::PRI_DEFAULT);
        let cur = k.current().unwrap();
        if let Some(t) = k.arena.get_mut(cur) {
            t.address_space = Some(alloc::boxed::Box::new(FlatAddressSpace::new()));
        }
        let mut frame = TrapFrame {
            rax: SyscallNumber::Read as u64,
            rdi: STDIN_FILENO as u64,
            rsi: 0x1000,
            rdx: 3,
            ..Default::default()
        };
        k.syscall_dispatch(&mut frame);
        assert_eq!(frame.rax, 3);
        let cur = k.current().unwrap();
        let read = k
            .arena
            .get(cur)
            .and_then(|t| t.address_space.as_ref())
            .map(|s| s.read_bytes(0x1000, 3))
            .unwrap();
        assert_eq!(read, b"abc");
    }
}
