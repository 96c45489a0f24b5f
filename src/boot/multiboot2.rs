//! Hand-rolled Multiboot2 information-structure reader.
//!
//! Grounded on `TitanHZZ-rsos`'s own `rsos::multiboot2` module, which
//! hand-rolls its Multiboot2 tag reader rather than pulling in the
//! `multiboot2` crate (that crate assumes a kernel shape this linker script
//! does not produce). We follow the same precedent; the tag layout itself
//! matches the Multiboot2 specification and `original_source/mm/pmm.c`'s
//! manual tag walk.

use core::mem::size_of;

const TAG_TYPE_END: u32 = 0;
const TAG_TYPE_MODULE: u32 = 3;
const TAG_TYPE_MMAP: u32 = 6;

/// Entry type value meaning "available RAM" in the Multiboot2 memory map.
const MMAP_TYPE_AVAILABLE: u32 = 1;

#[repr(C)]
struct TagHeader {
    typ: u32,
    size: u32,
}

#[repr(C)]
struct MmapTag {
    header: TagHeader,
    entry_size: u32,
    entry_version: u32,
    // followed by `entry_size`-strided entries
}

#[repr(C)]
struct MmapEntry {
    addr: u64,
    len: u64,
    entry_type: u32,
    reserved: u32,
}

#[repr(C)]
struct ModuleTag {
    header: TagHeader,
    mod_start: u32,
    mod_end: u32,
    // followed by a NUL-terminated string
}

/// A single usable physical memory region, as reported by the bootloader.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    /// Physical start address.
    pub start: u64,
    /// Length in bytes.
    pub len: u64,
}

/// A loaded module's physical extent (e.g. the in-memory filesystem image).
#[derive(Debug, Clone, Copy)]
pub struct ModuleRegion {
    /// Physical start address (inclusive).
    pub start: u32,
    /// Physical end address (exclusive).
    pub end: u32,
}

/// A parsed view over the Multiboot2 information structure.
///
/// # Safety
///
/// The caller must ensure `addr` is the physical address the bootloader
/// passed in EBX at kernel entry, still mapped and unmodified.
pub struct BootInfo {
    addr: u32,
    total_size: u32,
}

impl BootInfo {
    /// Reads the structure's 8-byte header (`total_size`, `reserved`).
    ///
    /// # Safety
    ///
    /// `addr` must point at a valid Multiboot2 info structure.
    pub unsafe fn new(addr: u32) -> Self {
        let total_size = *(addr as *const u32);
        Self { addr, total_size }
    }

    /// The physical address of the structure itself (for PMM reservation).
    #[must_use]
    pub const fn phys_addr(&self) -> u32 {
        self.addr
    }

    /// The total byte size of the structure (for PMM reservation).
    #[must_use]
    pub const fn total_size(&self) -> u32 {
        self.total_size
    }

    fn tags(&self) -> TagIter {
        TagIter {
            // Tags start 8 bytes in, past `total_size`/`reserved`.
            current: self.addr + 8,
            end: self.addr + self.total_size,
        }
    }

    /// Iterates the usable RAM regions from the memory-map tag, if present.
    pub fn memory_regions(&self) -> impl Iterator<Item = MemoryRegion> + '_ {
        self.tags()
            .filter(|tag| tag.typ == TAG_TYPE_MMAP)
            .flat_map(|tag| {
                // SAFETY: `tag.addr` was validated to point at an in-range
                // tag header of type MMAP by `TagIter`.
                let mmap = unsafe { &*(tag.addr as *const MmapTag) };
                let entries_start = tag.addr + size_of::<MmapTag>() as u32;
                let entry_count =
                    (mmap.header.size - size_of::<MmapTag>() as u32) / mmap.entry_size;
                (0..entry_count).filter_map(move |i| {
                    let entry_addr = entries_start + i * mmap.entry_size;
                    // SAFETY: within the tag's declared bounds.
                    let entry = unsafe { &*(entry_addr as *const MmapEntry) };
                    if entry.entry_type == MMAP_TYPE_AVAILABLE {
                        Some(MemoryRegion {
                            start: entry.addr,
                            len: entry.len,
                        })
                    } else {
                        None
                    }
                })
            })
    }

    /// Iterates every loaded module's physical extent.
    pub fn modules(&self) -> impl Iterator<Item = ModuleRegion> + '_ {
        self.tags().filter(|t| t.typ == TAG_TYPE_MODULE).map(|tag| {
            // SAFETY: validated by `TagIter` to be a module tag in range.
            let module = unsafe { &*(tag.addr as *const ModuleTag) };
            ModuleRegion {
                start: module.mod_start,
                end: module.mod_end,
            }
        })
    }
}

struct RawTag {
    addr: u32,
    typ: u32,
    size: u32,
}

struct TagIter {
    current: u32,
    end: u32,
}

impl Iterator for TagIter {
    type Item = RawTag;

    fn next(&mut self) -> Option<RawTag> {
        if self.current + size_of::<TagHeader>() as u32 > self.end {
            return None;
        }
        // SAFETY: bounds checked above against the structure's `total_size`.
        let header = unsafe { &*(self.current as *const TagHeader) };
        if header.typ == TAG_TYPE_END {
            return None;
        }
        let tag = RawTag {
            addr: self.current,
            typ: header.typ,
            size: header.size,
        };
        // Tags are 8-byte aligned.
        self.current += (header.size + 7) & !7;
        Some(tag)
    }
}
