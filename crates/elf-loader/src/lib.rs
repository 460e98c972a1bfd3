//! ELF32/ELF64 program-header loader (spec.md §6).
//!
//! Grounded on the original lab's `MemoryStorage::LoadElf`/
//! `LoadElfSpecific`: read the whole file into host memory, validate the
//! magic and class, then for each `PT_LOAD` program header with nonzero
//! `p_memsz`, copy `p_filesz` bytes from the file at `p_offset` to guest
//! physical address `p_paddr`, zero-filling the remaining
//! `p_memsz - p_filesz` bytes. No relocation, no dynamic linking, no
//! section headers — this is a flat physical-address loader for
//! statically-linked bare-metal images, same as the original.

use std::path::Path;

use mem_hier::MainMemory;
use thiserror::Error;

const EI_CLASS: usize = 4;
const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const PT_LOAD: u32 = 1;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read elf file: {0}")]
    Io(#[from] std::io::Error),
    #[error("file too small to be a valid elf file")]
    TooSmallForHeader,
    #[error("file is not an elf file")]
    NotElf,
    #[error("file is neither 32-bit nor 64-bit")]
    UnknownClass,
    #[error("file too small for expected number of program header tables")]
    ProgramHeaderTableOverflow,
    #[error("segment file size ({filesz}) is larger than its memory size ({memsz})")]
    SegmentFileSizeExceedsMemSize { filesz: u64, memsz: u64 },
    #[error("segment file section overflows the file (offset {offset} + size {filesz} > file length {file_len})")]
    FileSectionOverflow { offset: u64, filesz: u64, file_len: u64 },
}

struct Segment {
    file_offset: u64,
    paddr: u64,
    filesz: u64,
    memsz: u64,
}

fn u16_le(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}
fn u32_le(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
fn u64_le(buf: &[u8], off: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(bytes)
}

/// Parse `buf`'s program header table, returning every `PT_LOAD` segment
/// with nonzero `p_memsz`.
fn parse_segments(buf: &[u8]) -> Result<Vec<Segment>, LoadError> {
    if buf.len() < 20 || buf[0..4] != ELF_MAGIC {
        return Err(LoadError::NotElf);
    }
    match buf[EI_CLASS] {
        c if c == ELFCLASS32 => parse_segments_32(buf),
        c if c == ELFCLASS64 => parse_segments_64(buf),
        _ => Err(LoadError::UnknownClass),
    }
}

fn parse_segments_32(buf: &[u8]) -> Result<Vec<Segment>, LoadError> {
    const EHDR_SIZE: usize = 52;
    const PHDR_SIZE: usize = 32;
    if buf.len() < EHDR_SIZE {
        return Err(LoadError::TooSmallForHeader);
    }
    let e_phoff = u32_le(buf, 28) as usize;
    let e_phnum = u16_le(buf, 44) as usize;

    if buf.len() < e_phoff + e_phnum * PHDR_SIZE {
        return Err(LoadError::ProgramHeaderTableOverflow);
    }

    let mut segments = Vec::new();
    for i in 0..e_phnum {
        let base = e_phoff + i * PHDR_SIZE;
        let p_type = u32_le(buf, base);
        let p_memsz = u64::from(u32_le(buf, base + 20));
        if p_type == PT_LOAD && p_memsz > 0 {
            segments.push(Segment {
                file_offset: u64::from(u32_le(buf, base + 4)),
                paddr: u64::from(u32_le(buf, base + 12)),
                filesz: u64::from(u32_le(buf, base + 16)),
                memsz: p_memsz,
            });
        }
    }
    Ok(segments)
}

fn parse_segments_64(buf: &[u8]) -> Result<Vec<Segment>, LoadError> {
    const EHDR_SIZE: usize = 64;
    const PHDR_SIZE: usize = 56;
    if buf.len() < EHDR_SIZE {
        return Err(LoadError::TooSmallForHeader);
    }
    let e_phoff = u64_le(buf, 32) as usize;
    let e_phnum = u16_le(buf, 56) as usize;

    if buf.len() < e_phoff + e_phnum * PHDR_SIZE {
        return Err(LoadError::ProgramHeaderTableOverflow);
    }

    let mut segments = Vec::new();
    for i in 0..e_phnum {
        let base = e_phoff + i * PHDR_SIZE;
        let p_type = u32_le(buf, base);
        let p_memsz = u64_le(buf, base + 40);
        if p_type == PT_LOAD && p_memsz > 0 {
            segments.push(Segment {
                file_offset: u64_le(buf, base + 8),
                paddr: u64_le(buf, base + 24),
                filesz: u64_le(buf, base + 32),
                memsz: p_memsz,
            });
        }
    }
    Ok(segments)
}

/// Load `buf` (the full contents of an ELF file) into `mem`, per its
/// `PT_LOAD` program headers.
pub fn load_elf_bytes(buf: &[u8], mem: &mut MainMemory) -> Result<(), LoadError> {
    let segments = parse_segments(buf)?;
    let mem_len_bytes = u64::try_from(mem.len_words()).expect("word count fits u64") * 4;

    for seg in segments {
        if seg.memsz < seg.filesz {
            return Err(LoadError::SegmentFileSizeExceedsMemSize {
                filesz: seg.filesz,
                memsz: seg.memsz,
            });
        }
        if seg.paddr + seg.memsz > mem_len_bytes {
            // Matches the original lab's unchecked memcpy: a segment whose
            // p_paddr exceeds configured memory is silently ignored rather
            // than aborting the whole load.
            log::debug!(
                "elf: ignoring segment at paddr {:#x} (memsz {}) — exceeds configured memory ({} bytes)",
                seg.paddr,
                seg.memsz,
                mem_len_bytes
            );
            continue;
        }
        if seg.filesz > 0 {
            let end = seg.file_offset + seg.filesz;
            if end > buf.len() as u64 {
                return Err(LoadError::FileSectionOverflow {
                    offset: seg.file_offset,
                    filesz: seg.filesz,
                    file_len: buf.len() as u64,
                });
            }
            let file_bytes = &buf[seg.file_offset as usize..end as usize];
            log::debug!(
                "elf: loading {} bytes at paddr {:#x} (memsz {})",
                seg.filesz,
                seg.paddr,
                seg.memsz
            );
            mem.poke_bytes(seg.paddr as u32, file_bytes);
        }
        if seg.memsz > seg.filesz {
            let zeros_len = (seg.memsz - seg.filesz) as usize;
            let zeros = vec![0u8; zeros_len];
            mem.poke_bytes((seg.paddr + seg.filesz) as u32, &zeros);
        }
    }
    Ok(())
}

/// Read `path` and load it into `mem`.
pub fn load_elf_file(path: &Path, mem: &mut MainMemory) -> Result<(), LoadError> {
    let buf = std::fs::read(path)?;
    load_elf_bytes(&buf, mem)
}
