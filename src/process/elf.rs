//! ELF32 loader: validates the header, places `PT_LOAD` segments, and
//! applies `REL` relocations for position-independent executables
//! (spec §4.6).
//!
//! `ET_EXEC` images load at their link-time addresses; `ET_DYN` (PIE)
//! images get a base chosen from the user address allocator
//! (`config::ELF_USER_VADDR_MIN`) and their `DT_REL`/`DT_RELSZ` table
//! relocated relative to it. `DT_RELA` is rejected outright: this loader
//! only understands the non-addend `REL` relocation format.

use crate::config::ELF_USER_VADDR_MIN;
use crate::error::{KernelError, KernelResult};
use crate::memory::paging::{self, PageFlags};
use core::mem::size_of;

const EI_NIDENT: usize = 16;
const ELFMAG: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;

const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;

const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;

const DT_NULL: u32 = 0;
const DT_RELA: u32 = 7;
const DT_REL: u32 = 17;
const DT_RELSZ: u32 = 18;
const DT_RELENT: u32 = 19;

const R_386_NONE: u32 = 0;
const R_386_32: u32 = 1;
const R_386_PC32: u32 = 2;
const R_386_GLOB_DAT: u32 = 6;
const R_386_JMP_SLOT: u32 = 7;
const R_386_RELATIVE: u32 = 8;

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf32Header {
    e_ident: [u8; EI_NIDENT],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u32,
    e_phoff: u32,
    e_shoff: u32,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf32ProgramHeader {
    p_type: u32,
    p_offset: u32,
    p_vaddr: u32,
    p_paddr: u32,
    p_filesz: u32,
    p_memsz: u32,
    p_flags: u32,
    p_align: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf32Dyn {
    d_tag: u32,
    d_val: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf32Rel {
    r_offset: u32,
    r_info: u32,
}

impl Elf32Rel {
    const fn sym(self) -> u32 {
        self.r_info >> 8
    }
    const fn kind(self) -> u32 {
        self.r_info & 0xFF
    }
}

/// Result of successfully loading an image: where it ended up and at
/// what entry point a fresh process should start executing.
pub struct LoadedImage {
    pub entry: u32,
    pub base: u32,
    pub size: u32,
}

fn read<T: Copy>(data: &[u8], offset: usize) -> KernelResult<T> {
    let end = offset.checked_add(size_of::<T>()).ok_or(KernelError::InvalidElf)?;
    if end > data.len() {
        return Err(KernelError::InvalidElf);
    }
    // SAFETY: bounds checked above; `T` is one of this module's `repr(C)`
    // plain-data header types with no padding-sensitive invariants.
    unsafe { Ok(core::ptr::read_unaligned(data.as_ptr().add(offset).cast::<T>())) }
}

fn validate_header(header: &Elf32Header) -> KernelResult<()> {
    if header.e_ident[0..4] != ELFMAG {
        return Err(KernelError::InvalidElf);
    }
    if header.e_ident[4] != ELFCLASS32 || header.e_ident[5] != ELFDATA2LSB {
        return Err(KernelError::InvalidElf);
    }
    if header.e_type != ET_EXEC && header.e_type != ET_DYN {
        return Err(KernelError::InvalidElf);
    }
    if header.e_phnum == 0 || header.e_phentsize as usize != size_of::<Elf32ProgramHeader>() {
        return Err(KernelError::InvalidElf);
    }
    Ok(())
}

/// Loads an ELF32 image from `data` into freshly allocated, mapped user
/// pages in the currently loaded address space.
///
/// # Safety
///
/// The caller must have already switched CR3 to the target process's
/// private page directory, so the mappings this function creates land in
/// the right address space.
pub unsafe fn load(data: &[u8]) -> KernelResult<LoadedImage> {
    let header: Elf32Header = read(data, 0)?;
    validate_header(&header)?;

    let base = if header.e_type == ET_DYN { ELF_USER_VADDR_MIN } else { 0 };

    let mut lowest = u32::MAX;
    let mut highest = 0u32;
    let mut dynamic_off = None;
    let mut dynamic_vaddr = 0u32;

    for i in 0..header.e_phnum as usize {
        let ph_off = header.e_phoff as usize + i * size_of::<Elf32ProgramHeader>();
        let ph: Elf32ProgramHeader = read(data, ph_off)?;

        if ph.p_type == PT_DYNAMIC {
            dynamic_off = Some(ph.p_offset as usize);
            dynamic_vaddr = ph.p_vaddr;
            continue;
        }
        if ph.p_type != PT_LOAD {
            continue;
        }

        let vaddr = base.checked_add(ph.p_vaddr).ok_or(KernelError::InvalidElf)?;
        lowest = lowest.min(vaddr);
        highest = highest.max(vaddr + ph.p_memsz);

        let mut flags = PageFlags::PRESENT | PageFlags::USER;
        if ph.p_flags & 0x2 != 0 {
            flags |= PageFlags::WRITABLE;
        }
        // Every segment is mapped writable during load so we can copy
        // file bytes and zero BSS tail; read-only enforcement of
        // PF_W==0 segments is a hardening step this loader does not
        // perform, matching the original's flat "load and go" behavior.
        paging::map_range_alloc(vaddr, ph.p_memsz.max(1), flags | PageFlags::WRITABLE)?;

        let file_bytes = &data
            .get(ph.p_offset as usize..(ph.p_offset as usize + ph.p_filesz as usize))
            .ok_or(KernelError::InvalidElf)?;
        // SAFETY: `vaddr` was just mapped writable for `p_memsz` bytes.
        core::ptr::copy_nonoverlapping(file_bytes.as_ptr(), vaddr as *mut u8, file_bytes.len());
        if ph.p_memsz > ph.p_filesz {
            core::ptr::write_bytes(
                (vaddr + ph.p_filesz) as *mut u8,
                0,
                (ph.p_memsz - ph.p_filesz) as usize,
            );
        }
    }

    if let Some(off) = dynamic_off {
        apply_relocations(data, off, base)?;
    }
    let _ = dynamic_vaddr;

    if lowest == u32::MAX {
        return Err(KernelError::InvalidElf);
    }

    Ok(LoadedImage {
        entry: base.checked_add(header.e_entry).ok_or(KernelError::InvalidElf)?,
        base: lowest,
        size: highest - lowest,
    })
}

/// Walks the `PT_DYNAMIC` tag array looking for `DT_REL`/`DT_RELSZ`, and
/// applies each relocation. Rejects `DT_RELA` outright: this loader does
/// not support addend-carrying relocations.
unsafe fn apply_relocations(data: &[u8], dynamic_off: usize, base: u32) -> KernelResult<()> {
    let mut rel_off = None;
    let mut rel_size = 0u32;
    let mut rel_ent = size_of::<Elf32Rel>() as u32;

    let mut i = 0usize;
    loop {
        let entry: Elf32Dyn = read(data, dynamic_off + i * size_of::<Elf32Dyn>())?;
        if entry.d_tag == DT_NULL {
            break;
        }
        match entry.d_tag {
            DT_RELA => return Err(KernelError::InvalidElf),
            DT_REL => rel_off = Some(entry.d_val as usize),
            DT_RELSZ => rel_size = entry.d_val,
            DT_RELENT => rel_ent = entry.d_val,
            _ => {}
        }
        i += 1;
        if i > 4096 {
            return Err(KernelError::InvalidElf);
        }
    }

    let Some(rel_off) = rel_off else { return Ok(()) };
    if rel_ent == 0 {
        return Err(KernelError::InvalidElf);
    }
    let count = rel_size / rel_ent;

    for j in 0..count {
        let rel: Elf32Rel = read(data, rel_off + j as usize * rel_ent as usize)?;
        let target = base.checked_add(rel.r_offset).ok_or(KernelError::InvalidElf)? as *mut u32;
        match rel.kind() {
            R_386_NONE => {}
            R_386_RELATIVE => {
                // SAFETY: `target` lies within a `PT_LOAD` segment just
                // mapped writable by `load`.
                let addend = *target;
                *target = base.wrapping_add(addend);
            }
            R_386_32 | R_386_GLOB_DAT | R_386_JMP_SLOT => {
                // No symbol table resolution in this loader: these types
                // only apply to dynamically-resolved symbols, which a
                // statically-linked user image never references.
                let _ = rel.sym();
                return Err(KernelError::InvalidElf);
            }
            R_386_PC32 => return Err(KernelError::InvalidElf),
            _ => return Err(KernelError::InvalidElf),
        }
    }
    Ok(())
}
