//! ELF64 header and program-header validation.
//!
//! Grounded on `original_source/userprog/process.c`'s `load()` and
//! `validate_segment()`: this is a supplemented feature (SPEC_FULL.md §10)
//! — the distilled spec names "parse its ELF64 header and program headers"
//! in one line, and this module implements the full validation sequence the
//! original performs.

extern crate alloc;

use alloc::vec::Vec;

use crate::errors::ProcessError;

/// Expected `e_ident` magic: `\x7fELF`, class 2 (64-bit), encoding 1
/// (little-endian), version 1.
pub const ELF_MAGIC: [u8; 7] = [0x7f, b'E', b'L', b'F', 2, 1, 1];

/// `e_type` for an executable file.
pub const ET_EXEC: u16 = 2;
/// `e_machine` for x86_64.
pub const EM_X86_64: u16 = 0x3E;

/// `p_type` values this loader understands.
pub const PT_NULL: u32 = 0;
pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;
pub const PT_INTERP: u32 = 3;
pub const PT_NOTE: u32 = 4;
pub const PT_SHLIB: u32 = 5;
pub const PT_PHDR: u32 = 6;
pub const PT_STACK: u32 = 0x6474_e551;

/// `p_flags` bits: execute, write, read.
pub const PF_X: u32 = 1;
pub const PF_W: u32 = 2;
pub const PF_R: u32 = 4;

pub(crate) const PAGE_SIZE: u64 = 4096;
/// Lowest address a user segment may be mapped at; page zero is reserved so
/// null-pointer dereferences fault (`validate_segment`'s page-0 rejection).
pub(crate) const USER_BASE: u64 = PAGE_SIZE;
/// Highest address of the user address space (exclusive), matching a
/// classic 47-bit canonical user range split for a small education kernel.
/// Also the initial stack pointer a freshly exec'd process starts with
/// (`process.c`'s `USER_STACK`, `load()`'s `*esp = USER_STACK`).
pub(crate) const USER_TOP: u64 = 0x0000_7FFF_FFFF_F000;

/// ELF64 file header, the fields this loader consults.
#[derive(Debug, Clone, Copy)]
pub struct Elf64Header {
    pub e_ident: [u8; 7],
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_phentsize: u16,
    pub e_phnum: u16,
}

/// ELF64 program header.
#[derive(Debug, Clone, Copy)]
pub struct Elf64ProgramHeader {
    pub p_type: u32,
    pub p_flags: u32,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
}

impl Elf64Header {
    /// Parse a 64-byte ELF64 header out of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProcessError> {
        if bytes.len() < 64 {
            return Err(ProcessError::InvalidExecutable);
        }
        let mut e_ident = [0u8; 7];
        e_ident.copy_from_slice(&bytes[0..7]);
        Ok(Self {
            e_ident,
            e_type: u16::from_le_bytes([bytes[16], bytes[17]]),
            e_machine: u16::from_le_bytes([bytes[18], bytes[19]]),
            e_version: u32::from_le_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]),
            e_entry: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
            e_phoff: u64::from_le_bytes(bytes[32..40].try_into().unwrap()),
            e_phentsize: u16::from_le_bytes([bytes[54], bytes[55]]),
            e_phnum: u16::from_le_bytes([bytes[56], bytes[57]]),
        })
    }

    /// Validate magic, type, machine, version, and program-header bounds
    /// (`load()`'s header checks, `e_phnum <= 1024`).
    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.e_ident != ELF_MAGIC {
            return Err(ProcessError::InvalidExecutable);
        }
        if self.e_type != ET_EXEC {
            return Err(ProcessError::InvalidExecutable);
        }
        if self.e_machine != EM_X86_64 {
            return Err(ProcessError::InvalidExecutable);
        }
        if self.e_version != 1 {
            return Err(ProcessError::InvalidExecutable);
        }
        if self.e_phnum > 1024 {
            return Err(ProcessError::InvalidExecutable);
        }
        Ok(())
    }
}

impl Elf64ProgramHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self, ProcessError> {
        if bytes.len() < 56 {
            return Err(ProcessError::InvalidExecutable);
        }
        Ok(Self {
            p_type: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            p_flags: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            p_offset: u64::from_le_bytes(bytes[8..16].try_into().unwrap()),
            p_vaddr: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            p_filesz: u64::from_le_bytes(bytes[32..40].try_into().unwrap()),
            p_memsz: u64::from_le_bytes(bytes[40..48].try_into().unwrap()),
        })
    }

    /// Validates a `PT_LOAD` segment per `validate_segment`: page-offset
    /// alignment, file-length bounds, `memsz >= filesz`, user-range
    /// containment with no address wraparound, and page-zero rejection.
    pub fn validate_load_segment(&self, file_len: u64) -> Result<(), ProcessError> {
        if self.p_offset % PAGE_SIZE != self.p_vaddr % PAGE_SIZE {
            return Err(ProcessError::InvalidExecutable);
        }
        if self.p_offset > file_len {
            return Err(ProcessError::InvalidExecutable);
        }
        if self.p_filesz > file_len - self.p_offset {
            return Err(ProcessError::InvalidExecutable);
        }
        if self.p_memsz < self.p_filesz {
            return Err(ProcessError::InvalidExecutable);
        }
        if self.p_memsz == 0 {
            return Err(ProcessError::InvalidExecutable);
        }
        let end = self
            .p_vaddr
            .checked_add(self.p_memsz)
            .ok_or(ProcessError::InvalidExecutable)?;
        if self.p_vaddr < USER_BASE || end > USER_TOP {
            return Err(ProcessError::InvalidExecutable);
        }
        Ok(())
    }
}

/// Parse every program header out of `image`, per `e_phoff`/`e_phentsize`/`e_phnum`.
pub fn parse_program_headers(image: &[u8], header: &Elf64Header) -> Result<Vec<Elf64ProgramHeader>, ProcessError> {
    let mut headers = Vec::with_capacity(header.e_phnum as usize);
    for i in 0..header.e_phnum as u64 {
        let start = header.e_phoff + i * header.e_phentsize as u64;
        let end = start + 56;
        if end as usize > image.len() {
            return Err(ProcessError::InvalidExecutable);
        }
        headers.push(Elf64ProgramHeader::parse(&image[start as usize..end as usize])?);
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn valid_header_bytes(e_phnum: u16) -> Vec<u8> {
        let mut h = vec![0u8; 64];
        h[0..7].copy_from_slice(&ELF_MAGIC);
        h[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        h[18..20].copy_from_slice(&EM_X86_64.to_le_bytes());
        h[20..24].copy_from_slice(&1u32.to_le_bytes());
        h[24..32].copy_from_slice(&0x401000u64.to_le_bytes());
        h[32..40].copy_from_slice(&64u64.to_le_bytes());
        h[54..56].copy_from_slice(&56u16.to_le_bytes());
        h[56..58].copy_from_slice(&e_phnum.to_le_bytes());
        h
    }

    #[test]
    fn parses_and_validates_a_well_formed_header() {
        let bytes = valid_header_bytes(1);
        let header = Elf64Header::parse(&bytes).unwrap();
        assert!(header.validate().is_ok());
        assert_eq!(header.e_entry, 0x401000);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = valid_header_bytes(0);
        bytes[0] = 0;
        let header = Elf64Header::parse(&bytes).unwrap();
        assert!(header.validate().is_err());
    }

    #[test]
    fn rejects_wrong_machine() {
        let mut bytes = valid_header_bytes(0);
        bytes[18..20].copy_from_slice(&0x28u16.to_le_bytes()); // ARM, not x86_64
        let header = Elf64Header::parse(&bytes).unwrap();
        assert!(header.validate().is_err());
    }

    #[test]
    fn rejects_too_many_program_headers() {
        let bytes = valid_header_bytes(1025);
        let header = Elf64Header::parse(&bytes).unwrap();
        assert!(header.validate().is_err());
    }

    #[test]
    fn load_segment_rejects_page_zero() {
        let ph = Elf64ProgramHeader {
            p_type: PT_LOAD,
            p_flags: 0,
            p_offset: 0,
            p_vaddr: 0,
            p_filesz: 100,
            p_memsz: 100,
        };
        assert!(ph.validate_load_segment(1000).is_err());
    }

    #[test]
    fn load_segment_rejects_memsz_less_than_filesz() {
        let ph = Elf64ProgramHeader {
            p_type: PT_LOAD,
            p_flags: 0,
            p_offset: 0,
            p_vaddr: USER_BASE,
            p_filesz: 200,
            p_memsz: 100,
        };
        assert!(ph.validate_load_segment(1000).is_err());
    }

    #[test]
    fn load_segment_accepts_well_formed_segment() {
        let ph = Elf64ProgramHeader {
            p_type: PT_LOAD,
            p_flags: 0,
            p_offset: 0,
            p_vaddr: USER_BASE,
            p_filesz: 100,
            p_memsz: 200,
        };
        assert!(ph.validate_load_segment(1000).is_ok());
    }
}
