//! The per-process file-descriptor table.
//!
//! Grounded on `original_source/include/threads/thread.h`
//! (`FDT_PAGES = 3`, `FDCOUNT_LIMIT = FDT_PAGES * (1 << 9) = 1536`) and
//! `original_source/userprog/syscall2.c` (`add_file_to_fd_table`,
//! `fd_to_struct_filep`, `remove_file_to_fd_table`). Resolved open question
//! (SPEC_FULL.md §9): the two spellings of the capacity can never diverge
//! because `FDCOUNT_LIMIT` is derived from `FDT_PAGES` once, here.

extern crate alloc;

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

/// Number of 512-entry pages backing the descriptor table.
pub const FDT_PAGES: usize = 3;
/// Total descriptor table capacity: `FDT_PAGES * 512`.
pub const FDCOUNT_LIMIT: usize = FDT_PAGES * 512;

/// Reserved descriptor for standard input.
pub const STDIN_FILENO: i32 = 0;
/// Reserved descriptor for standard output.
pub const STDOUT_FILENO: i32 = 1;

/// Narrow external-collaborator interface for an open file (spec §6): the
/// kernel only needs byte-oriented I/O, length, seek/tell, and the
/// deny-write toggle used to protect a running executable.
pub trait FileHandle: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> usize;
    fn write(&self, buf: &[u8]) -> usize;
    fn length(&self) -> u64;
    fn seek(&self, position: u64);
    fn tell(&self) -> u64;
    /// Produce an independent handle onto the same underlying file, sharing
    /// the inode and copying the current seek offset (used by `fork`'s FD
    /// duplication, grounded on `file_duplicate` in `process.c`, which
    /// copies both position and deny-write state — spec §4.7).
    fn duplicate(&self) -> Box<dyn FileHandle>;
    fn deny_write(&self);
    fn allow_write(&self);
}

enum Slot {
    Empty,
    Stdin,
    Stdout,
    File(Box<dyn FileHandle>),
}

/// A process's open-file table. Slots 0/1 are reserved sentinels; user
/// `open` calls are served starting at slot 2 by a linear scan from
/// `fdidx`, matching `add_file_to_fd_table`'s allocation policy exactly
/// (not a generic free-list).
pub struct FdTable {
    slots: Vec<Slot>,
    /// Hint for the next free slot, advanced optimistically on `open`.
    fdidx: usize,
}

impl FdTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(FDCOUNT_LIMIT);
        slots.push(Slot::Stdin);
        slots.push(Slot::Stdout);
        slots.resize_with(FDCOUNT_LIMIT, || Slot::Empty);
        Self { slots, fdidx: 2 }
    }

    /// Insert a file handle, returning its descriptor, or `None` if the
    /// table has no free slot at or after index 2.
    pub fn open(&mut self, handle: Box<dyn FileHandle>) -> Option<i32> {
        for i in self.fdidx..FDCOUNT_LIMIT {
            if matches!(self.slots[i], Slot::Empty) {
                self.slots[i] = Slot::File(handle);
                self.fdidx = i + 1;
                return Some(i as i32);
            }
        }
        // The hint may have skipped an earlier freed slot; fall back to a
        // full scan before declaring the table full.
        for i in 2..self.fdidx {
            if matches!(self.slots[i], Slot::Empty) {
                self.slots[i] = Slot::File(handle);
                self.fdidx = i + 1;
                return Some(i as i32);
            }
        }
        None
    }

    /// Close `fd`. A no-op for `fd < 2` (the standard stream sentinels),
    /// matching `process_close_file`'s handling of reserved descriptors.
    pub fn close(&mut self, fd: i32) {
        if fd < 2 || fd as usize >= FDCOUNT_LIMIT {
            return;
        }
        self.slots[fd as usize] = Slot::Empty;
        if (fd as usize) < self.fdidx {
            self.fdidx = fd as usize;
        }
    }

    /// Close every descriptor from 2 upward, leaving the sentinels alone.
    /// Used by `exit` (spec §4.7).
    pub fn close_all(&mut self) {
        for slot in self.slots.iter_mut().skip(2) {
            *slot = Slot::Empty;
        }
        self.fdidx = 2;
    }

    fn get(&self, fd: i32) -> Option<&Slot> {
        if fd < 0 {
            return None;
        }
        self.slots.get(fd as usize)
    }

    /// Resolve `fd` to a file handle, or `None` if it names a reserved
    /// stream, an empty slot, or an out-of-range index (`fd_to_struct_filep`).
    pub fn file(&self, fd: i32) -> Option<&dyn FileHandle> {
        match self.get(fd)? {
            Slot::File(f) => Some(f.as_ref()),
            _ => None,
        }
    }

    pub fn is_stdin(&self, fd: i32) -> bool {
        matches!(self.get(fd), Some(Slot::Stdin))
    }

    pub fn is_stdout(&self, fd: i32) -> bool {
        matches!(self.get(fd), Some(Slot::Stdout))
    }

    /// Duplicate every open descriptor for a forked child: slots 0/1 inherit
    /// fresh sentinels, slots `>= 2` reopen the underlying file via
    /// `FileHandle::duplicate` (spec §4.7 `fork`).
    pub fn fork_duplicate(&self) -> Self {
        let mut clone = Self {
            slots: (0..FDCOUNT_LIMIT).map(|_| Slot::Empty).collect(),
            fdidx: self.fdidx,
        };
        clone.slots[0] = Slot::Stdin;
        clone.slots[1] = Slot::Stdout;
        for i in 2..FDCOUNT_LIMIT {
            if let Slot::File(f) = &self.slots[i] {
                clone.slots[i] = Slot::File(f.duplicate());
            }
        }
        clone
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use spin::Mutex;

    struct MemFile {
        data: Arc<Mutex<Vec<u8>>>,
        pos: Arc<Mutex<u64>>,
    }

    impl MemFile {
        fn new(data: Vec<u8>) -> Self {
            Self {
                data: Arc::new(Mutex::new(data)),
                pos: Arc::new(Mutex::new(0)),
            }
        }
    }

    impl FileHandle for MemFile {
        fn read(&self, buf: &mut [u8]) -> usize {
            let data = self.data.lock();
            let mut pos = self.pos.lock();
            let start = *pos as usize;
            let n = buf.len().min(data.len().saturating_sub(start));
            buf[..n].copy_from_slice(&data[start..start + n]);
            *pos += n as u64;
            n
        }
        fn write(&self, buf: &[u8]) -> usize {
            let mut data = self.data.lock();
            data.extend_from_slice(buf);
            buf.len()
        }
        fn length(&self) -> u64 {
            self.data.lock().len() as u64
        }
        fn seek(&self, position: u64) {
            *self.pos.lock() = position;
        }
        fn tell(&self) -> u64 {
            *self.pos.lock()
        }
        fn duplicate(&self) -> Box<dyn FileHandle> {
            Box::new(MemFile {
                data: self.data.clone(),
                pos: Arc::new(Mutex::new(*self.pos.lock())),
            })
        }
        fn deny_write(&self) {}
        fn allow_write(&self) {}
    }

    #[test]
    fn open_allocates_lowest_free_slot_at_or_after_two() {
        let mut table = FdTable::new();
        let fd1 = table.open(Box::new(MemFile::new(vec![]))).unwrap();
        let fd2 = table.open(Box::new(MemFile::new(vec![]))).unwrap();
        assert_eq!(fd1, 2);
        assert_eq!(fd2, 3);
    }

    #[test]
    fn close_frees_the_slot_for_reuse() {
        let mut table = FdTable::new();
        let fd = table.open(Box::new(MemFile::new(vec![]))).unwrap();
        table.close(fd);
        assert!(table.file(fd).is_none());
        let fd2 = table.open(Box::new(MemFile::new(vec![]))).unwrap();
        assert_eq!(fd2, fd);
    }

    #[test]
    fn close_on_reserved_descriptors_is_a_no_op() {
        let mut table = FdTable::new();
        table.close(0);
        table.close(1);
        assert!(table.is_stdin(0));
        assert!(table.is_stdout(1));
    }

    #[test]
    fn seek_then_tell_roundtrips() {
        let mut table = FdTable::new();
        let fd = table.open(Box::new(MemFile::new(vec![1, 2, 3, 4]))).unwrap();
        let file = table.file(fd).unwrap();
        file.seek(2);
        assert_eq!(file.tell(), 2);
    }

    #[test]
    fn fork_duplicate_shares_data_and_position() {
        let mut table = FdTable::new();
        let fd = table.open(Box::new(MemFile::new(vec![9, 9, 9]))).unwrap();
        table.file(fd).unwrap().seek(2);

        let child = table.fork_duplicate();
        assert_eq!(child.file(fd).unwrap().tell(), 2);
        assert_eq!(child.file(fd).unwrap().length(), 3);

        // positions diverge independently after duplication
        child.file(fd).unwrap().seek(0);
        assert_eq!(child.file(fd).unwrap().tell(), 0);
        assert_eq!(table.file(fd).unwrap().tell(), 2);
    }

    #[test]
    fn table_full_when_every_slot_from_two_is_taken() {
        let mut table = FdTable::new();
        for _ in 2..FDCOUNT_LIMIT {
            assert!(table.open(Box::new(MemFile::new(vec![]))).is_some());
        }
        assert!(table.open(Box::new(MemFile::new(vec![]))).is_none());
    }
}
