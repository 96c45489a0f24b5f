//! Two-level (directory + table) paged virtual memory with recursive
//! self-mapping.
//!
//! Ported from `original_source/mm/paging.c`; see spec §4.2 and the
//! "recursive page-table self-mapping" design note in spec §9, which we
//! follow literally: all post-init page-table edits go through the fixed
//! recursive windows `RECURSIVE_PT_BASE`/`RECURSIVE_PD_BASE`, never through
//! a temporary mapping window.

use crate::config::{
    KERNEL_HALF_END_SLOT, KERNEL_HALF_START_SLOT, LOW_WINDOW_DIR_SLOTS, PAGE_SIZE,
    RECURSIVE_PD_BASE, RECURSIVE_PT_BASE, RECURSIVE_SLOT,
};
use crate::error::{KernelError, KernelResult};
use crate::memory::pmm;
use bitflags::bitflags;
use core::arch::asm;
use spin::Mutex;

bitflags! {
    /// Page directory / page table entry flag bits.
    #[derive(Clone, Copy)]
    pub struct PageFlags: u32 {
        /// Entry is present / valid.
        const PRESENT = 1 << 0;
        /// Page is writable (otherwise read-only).
        const WRITABLE = 1 << 1;
        /// Page is accessible from ring 3.
        const USER = 1 << 2;
        /// Write-through caching.
        const WRITE_THROUGH = 1 << 3;
        /// Cache disabled.
        const CACHE_DISABLE = 1 << 4;
        /// Page attribute table bit (PAT, bit 7 on 4 KiB PTEs).
        const PAT = 1 << 7;
    }
}

const ADDR_MASK: u32 = 0xFFFF_F000;

fn dir_index(virt: u32) -> usize {
    (virt >> 22) as usize
}

fn table_index(virt: u32) -> usize {
    ((virt >> 12) & 0x3FF) as usize
}

fn paging_enabled() -> bool {
    let cr0: u32;
    // SAFETY: reading CR0 has no side effects.
    unsafe {
        asm!("mov {0}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
    }
    cr0 & 0x8000_0000 != 0
}

fn load_cr3(phys: u32) {
    // SAFETY: `phys` must be the physical address of a valid page directory.
    // Caller upholds this invariant (enforced by `set_current_dir`/`init`).
    unsafe {
        asm!("mov cr3, {0}", in(reg) phys, options(nostack, preserves_flags));
    }
}

fn enable_paging() {
    // SAFETY: only called once, after the kernel directory is fully built
    // and loaded into CR3.
    unsafe {
        asm!(
            "mov eax, cr0",
            "or eax, 0x80000000",
            "mov cr0, eax",
            out("eax") _,
            options(nostack, preserves_flags),
        );
    }
}

fn invlpg(virt: u32) {
    // SAFETY: invalidating a single TLB entry is always safe.
    unsafe {
        asm!("invlpg [{0}]", in(reg) virt, options(nostack));
    }
}

fn cpuid_edx_features() -> u32 {
    let edx: u32;
    // SAFETY: CPUID leaf 1 is always available.
    unsafe {
        asm!(
            "cpuid",
            inlateout("eax") 1u32 => _,
            lateout("ecx") _,
            lateout("edx") edx,
            lateout("ebx") _,
            options(nostack, preserves_flags),
        );
    }
    edx
}

fn rdmsr(msr: u32) -> u64 {
    let (lo, hi): (u32, u32);
    // SAFETY: MSR 0x277 (IA32_PAT) is architectural on any CPU that reports
    // the PAT feature bit, which the caller has already checked.
    unsafe {
        asm!("rdmsr", in("ecx") msr, out("eax") lo, out("edx") hi, options(nomem, nostack));
    }
    (u64::from(hi) << 32) | u64::from(lo)
}

fn wrmsr(msr: u32, value: u64) {
    let lo = value as u32;
    let hi = (value >> 32) as u32;
    // SAFETY: see `rdmsr`.
    unsafe {
        asm!("wrmsr", in("ecx") msr, in("eax") lo, in("edx") hi, options(nomem, nostack));
    }
}

const MSR_IA32_PAT: u32 = 0x277;
const CPUID_FEAT_EDX_MSR: u32 = 1 << 5;
const CPUID_FEAT_EDX_PAT: u32 = 1 << 16;
const PAT_TYPE_WC: u64 = 0x01;

fn init_pat() -> bool {
    let edx = cpuid_edx_features();
    if edx & CPUID_FEAT_EDX_MSR == 0 || edx & CPUID_FEAT_EDX_PAT == 0 {
        return false;
    }
    let pat = rdmsr(MSR_IA32_PAT);
    let entry_mask: u64 = 0xFF << 32;
    let new_pat = (pat & !entry_mask) | (PAT_TYPE_WC << 32);
    if new_pat != pat {
        wrmsr(MSR_IA32_PAT, new_pat);
    }
    true
}

#[repr(align(4096))]
struct Directory([u32; 1024]);

struct PagingState {
    kernel_dir_phys: u32,
    current_dir_phys: u32,
    pat_wc_enabled: bool,
}

static mut KERNEL_DIR: Directory = Directory([0; 1024]);
static mut FIRST_PAGE_TABLE: Directory = Directory([0; 1024]);

static STATE: Mutex<PagingState> = Mutex::new(PagingState {
    kernel_dir_phys: 0,
    current_dir_phys: 0,
    pat_wc_enabled: false,
});

/// Reads/writes a directory's entries through whichever window is valid
/// right now: the recursive self-map once paging is live, or the
/// physical identity mapping before `init()` turns paging on.
unsafe fn dir_slot_ptr(dir_virt_or_phys: u32, slot: usize) -> *mut u32 {
    (dir_virt_or_phys as *mut u32).add(slot)
}

/// Installs a mapping for `virt -> phys` in `dir` (given as a pointer valid
/// right now — physical identity address pre-paging, or `RECURSIVE_PD_BASE`
/// once the directory in question is the live one), allocating a page
/// table frame on demand.
///
/// # Safety
///
/// If paging is enabled, `dir` must be the directory currently loaded in
/// CR3 (so the recursive window reaches its tables).
unsafe fn map_page_in(dir: *mut u32, virt: u32, phys: u32, flags: PageFlags) -> KernelResult<()> {
    let di = dir_index(virt);
    let ti = table_index(virt);
    let enabled = paging_enabled();

    let pde = *dir.add(di);
    if pde & PageFlags::PRESENT.bits() == 0 {
        let table_phys = pmm::alloc_page()?;
        let mut new_pde = (table_phys & ADDR_MASK) | PageFlags::PRESENT.bits() | PageFlags::WRITABLE.bits();
        if flags.contains(PageFlags::USER) {
            new_pde |= PageFlags::USER.bits();
        }
        *dir.add(di) = new_pde;

        let table_ptr = if enabled {
            (RECURSIVE_PT_BASE + (di as u32) * PAGE_SIZE) as *mut u32
        } else {
            table_phys as *mut u32
        };
        for i in 0..1024usize {
            *table_ptr.add(i) = 0;
        }
    } else if flags.contains(PageFlags::USER) {
        *dir.add(di) |= PageFlags::USER.bits();
    }

    let table_ptr = if enabled {
        (RECURSIVE_PT_BASE + (di as u32) * PAGE_SIZE) as *mut u32
    } else {
        ((*dir.add(di)) & ADDR_MASK) as *mut u32
    };
    *table_ptr.add(ti) = (phys & ADDR_MASK) | flags.bits();
    Ok(())
}

/// Builds the kernel directory: identity-maps the low 64 MiB window, maps
/// the high kernel image, pre-populates kernel-half slots, installs the
/// self-map, loads CR3, and enables paging.
///
/// # Safety
///
/// Must be called exactly once, early in boot, before any other paging
/// operation. `kernel_start`/`kernel_end` must be the kernel image's
/// physical (== virtual, pre-paging) extent.
pub unsafe fn init(kernel_start: u32, kernel_end: u32) {
    let dir = core::ptr::addr_of_mut!(KERNEL_DIR.0).cast::<u32>();
    let first_table = core::ptr::addr_of_mut!(FIRST_PAGE_TABLE.0).cast::<u32>();
    for i in 0..1024usize {
        *dir.add(i) = 0;
        *first_table.add(i) = 0;
    }

    let pat_enabled = init_pat();

    // 1) identity-map [0, 4MiB) via the static first page table.
    let mut addr = 0u32;
    while addr < 0x0040_0000 {
        *first_table.add((addr >> 12) as usize) =
            (addr & ADDR_MASK) | PageFlags::PRESENT.bits() | PageFlags::WRITABLE.bits();
        addr += PAGE_SIZE;
    }
    *dir = (first_table as u32) | PageFlags::PRESENT.bits() | PageFlags::WRITABLE.bits();

    // 2) identity-map [4MiB, 64MiB) via pmm-backed tables.
    let mut addr = 0x0040_0000u32;
    while addr < 0x0400_0000 {
        map_page_in(dir, addr, addr, PageFlags::PRESENT | PageFlags::WRITABLE)
            .expect("identity-mapping the low window must not fail this early in boot");
        addr += PAGE_SIZE;
    }

    // 3) high kernel mapping.
    let mut addr = kernel_start;
    while addr < kernel_end {
        let offset = addr - kernel_start;
        map_page_in(
            dir,
            crate::config::KERNEL_VIRT_BASE + offset,
            addr,
            PageFlags::PRESENT | PageFlags::WRITABLE,
        )
        .expect("mapping the kernel image must not fail this early in boot");
        addr += PAGE_SIZE;
    }

    // self-map
    *dir.add(RECURSIVE_SLOT) = (dir as u32) | PageFlags::PRESENT.bits() | PageFlags::WRITABLE.bits();

    // pre-populate kernel-half slots so they are shared by reference later.
    for slot in KERNEL_HALF_START_SLOT..KERNEL_HALF_END_SLOT {
        if *dir.add(slot) & PageFlags::PRESENT.bits() != 0 {
            continue;
        }
        match pmm::alloc_page() {
            Ok(table_phys) => {
                *dir.add(slot) =
                    (table_phys & ADDR_MASK) | PageFlags::PRESENT.bits() | PageFlags::WRITABLE.bits();
                let table_ptr = table_phys as *mut u32;
                for i in 0..1024usize {
                    *table_ptr.add(i) = 0;
                }
            }
            Err(_) => break,
        }
    }

    load_cr3(dir as u32);
    enable_paging();

    let mut state = STATE.lock();
    state.kernel_dir_phys = dir as u32;
    state.current_dir_phys = dir as u32;
    state.pat_wc_enabled = pat_enabled;
    log::info!("paging: enabled, kernel dir @ {:#010x}", dir as u32);
}

/// Whether PAT write-combining was successfully enabled at init.
#[must_use]
pub fn pat_wc_enabled() -> bool {
    STATE.lock().pat_wc_enabled
}

/// Physical address of the kernel directory.
#[must_use]
pub fn kernel_dir_phys() -> u32 {
    STATE.lock().kernel_dir_phys
}

/// Physical address of the directory currently loaded in CR3.
#[must_use]
pub fn current_dir_phys() -> u32 {
    STATE.lock().current_dir_phys
}

/// Maps `virt -> phys` in the currently loaded directory, invalidating the
/// TLB entry for `virt`.
pub fn map(virt: u32, phys: u32, flags: PageFlags) -> KernelResult<()> {
    let current = current_dir_phys();
    let dir_ptr = if paging_enabled() {
        RECURSIVE_PD_BASE as *mut u32
    } else {
        current as *mut u32
    };
    // SAFETY: `dir_ptr` addresses the live directory (recursive window) or
    // its physical identity address pre-paging, matching `map_page_in`'s
    // precondition.
    unsafe { map_page_in(dir_ptr, virt, phys, flags)? };
    if paging_enabled() {
        invlpg(virt);
    }
    Ok(())
}

/// Allocates a fresh physical frame and maps it at `virt`.
pub fn map_alloc(virt: u32, flags: PageFlags) -> KernelResult<u32> {
    let phys = pmm::alloc_page()?;
    map(virt, phys, flags)?;
    Ok(phys)
}

/// Maps every page in `[virt, virt + size)`, page-aligned outward, each
/// backed by a freshly allocated frame.
pub fn map_range_alloc(virt: u32, size: u32, flags: PageFlags) -> KernelResult<()> {
    if size == 0 {
        return Ok(());
    }
    let start = virt & ADDR_MASK;
    let end = (virt + size + (PAGE_SIZE - 1)) & ADDR_MASK;
    let mut addr = start;
    while addr < end {
        map_alloc(addr, flags)?;
        addr += PAGE_SIZE;
    }
    Ok(())
}

/// Translates a virtual address to its mapped physical address in the
/// currently loaded directory, by walking the recursive self-map.
pub fn virt_to_phys(virt: u32) -> KernelResult<u32> {
    if !paging_enabled() {
        return Ok(virt);
    }
    let di = dir_index(virt);
    let ti = table_index(virt);
    // SAFETY: the recursive window always reflects the currently loaded
    // directory once paging is enabled.
    unsafe {
        let pd = RECURSIVE_PD_BASE as *const u32;
        let pde = *pd.add(di);
        if pde & PageFlags::PRESENT.bits() == 0 {
            return Err(KernelError::NotMapped);
        }
        let pt = (RECURSIVE_PT_BASE + (di as u32) * PAGE_SIZE) as *const u32;
        let pte = *pt.add(ti);
        if pte & PageFlags::PRESENT.bits() == 0 {
            return Err(KernelError::NotMapped);
        }
        Ok((pte & ADDR_MASK) | (virt & 0xFFF))
    }
}

/// Re-maps every page in `[virt, virt + size)` with the USER bit set,
/// preserving the existing physical backing. Used when transferring
/// kernel-heap-allocated pages into user address space.
pub fn mark_user_range(virt: u32, size: u32) -> KernelResult<()> {
    if size == 0 {
        return Ok(());
    }
    let start = virt & ADDR_MASK;
    let end = (virt + size + (PAGE_SIZE - 1)) & ADDR_MASK;
    let mut addr = start;
    while addr < end {
        let phys = virt_to_phys(addr)?;
        map(addr, phys, PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER)?;
        addr += PAGE_SIZE;
    }
    Ok(())
}

/// Loads `phys` into CR3 and records it as the current directory. The
/// caller is responsible for restoring the previous directory afterwards.
pub fn set_current_dir(phys: u32) {
    STATE.lock().current_dir_phys = phys;
    load_cr3(phys);
}

/// Allocates and populates a fresh user page directory: kernel-low slots
/// `0..16` are cloned by value with the USER bit cleared, kernel-half
/// slots `768..1023` are copied by reference (same frame), and slot 1023
/// is the new directory's own self-map.
///
/// Returns `(dir_virt_heap_addr, dir_phys, low_tables)`; the directory
/// itself lives in kernel-heap memory (so it is reachable like any other
/// kernel object) but its *physical* address is what CR3/self-map care
/// about. `low_tables` holds the kernel-heap virtual address of each
/// cloned low-window table (zero where the kernel's own slot was absent);
/// the caller must retain it and free each non-zero entry on teardown —
/// see [`destroy_user_dir`] for the rest of the directory's resources.
pub fn create_user_dir() -> KernelResult<(u32, u32, [u32; LOW_WINDOW_DIR_SLOTS])> {
    let (dir_virt, dir_phys) = crate::memory::heap::alloc_aligned_with_phys(PAGE_SIZE as usize, PAGE_SIZE as usize)
        .ok_or(KernelError::HeapExhausted)?;
    let dir = dir_virt as *mut u32;
    // SAFETY: freshly allocated, page-sized, page-aligned buffer.
    unsafe {
        for i in 0..1024usize {
            *dir.add(i) = 0;
        }
    }

    let prev_phys = current_dir_phys();
    let mut low_tables = [0u32; LOW_WINDOW_DIR_SLOTS];

    set_current_dir(kernel_dir_phys());
    let result: KernelResult<()> = (|| {
        for i in 0..LOW_WINDOW_DIR_SLOTS {
            // SAFETY: reading through the recursive window of the now-live
            // kernel directory.
            let kernel_pde = unsafe { *(RECURSIVE_PD_BASE as *const u32).add(i) };
            if kernel_pde & PageFlags::PRESENT.bits() == 0 {
                continue;
            }
            let (pt_virt, pt_phys) =
                crate::memory::heap::alloc_aligned_with_phys(PAGE_SIZE as usize, PAGE_SIZE as usize)
                    .ok_or(KernelError::HeapExhausted)?;
            // SAFETY: copying one page-sized page table out of the
            // recursive window into a freshly allocated page-sized buffer.
            unsafe {
                let src = (RECURSIVE_PT_BASE + (i as u32) * PAGE_SIZE) as *const u32;
                core::ptr::copy_nonoverlapping(src, pt_virt as *mut u32, 1024);
                let flags = (kernel_pde & 0xFFF) & !PageFlags::USER.bits();
                *dir.add(i) = (pt_phys & ADDR_MASK) | flags;
            }
            low_tables[i] = pt_virt;
        }
        Ok(())
    })();
    set_current_dir(prev_phys);
    result?;

    // SAFETY: `dir` is a private, fully-owned buffer at this point; no
    // other address space can observe it.
    unsafe {
        for slot in KERNEL_HALF_START_SLOT..KERNEL_HALF_END_SLOT {
            *dir.add(slot) = *(kernel_dir_ptr_for_copy()).add(slot);
        }
        *dir.add(RECURSIVE_SLOT) = (dir_phys & ADDR_MASK) | PageFlags::PRESENT.bits() | PageFlags::WRITABLE.bits();
    }

    Ok((dir_virt, dir_phys, low_tables))
}

/// Tears down every physical resource a process directory privately owns,
/// other than the top-level directory frame and the cloned low-window
/// tables (heap-backed; the caller frees those with `heap::free` using the
/// `dir_virt`/`low_tables` returned by [`create_user_dir`]).
///
/// Walks every directory slot outside the cloned low window (`0..16`), the
/// shared kernel half (`768..1023`), and the self-map (`1023`) — i.e. the
/// process's private user-range mappings (ELF image, user stack) — and
/// frees each present PTE's backing frame plus the page-table frame itself
/// back to the PMM, since both were allocated directly from it by `map`/
/// `map_alloc` rather than from the kernel heap.
///
/// # Safety
///
/// `dir_phys` must not be the directory currently loaded for any other live
/// process, and must not be reused after this call.
pub unsafe fn destroy_user_dir(dir_phys: u32) {
    let prev = current_dir_phys();
    set_current_dir(dir_phys);
    for slot in 0..1024usize {
        if slot == RECURSIVE_SLOT || (KERNEL_HALF_START_SLOT..KERNEL_HALF_END_SLOT).contains(&slot) || slot < LOW_WINDOW_DIR_SLOTS {
            continue;
        }
        let pde = *(RECURSIVE_PD_BASE as *const u32).add(slot);
        if pde & PageFlags::PRESENT.bits() == 0 {
            continue;
        }
        let table_ptr = (RECURSIVE_PT_BASE + (slot as u32) * PAGE_SIZE) as *const u32;
        for ti in 0..1024usize {
            let pte = *table_ptr.add(ti);
            if pte & PageFlags::PRESENT.bits() != 0 {
                pmm::free_page(pte & ADDR_MASK);
            }
        }
        pmm::free_page(pde & ADDR_MASK);
    }
    set_current_dir(prev);
}

/// Reads kernel-half slot values out of the kernel directory regardless of
/// whether it is currently loaded, by temporarily switching CR3 if needed.
fn kernel_dir_ptr_for_copy() -> *const u32 {
    if current_dir_phys() == kernel_dir_phys() {
        RECURSIVE_PD_BASE as *const u32
    } else {
        // Kernel-half slot *values* are plain PDEs (frame + flags); they
        // can be read directly out of the kernel directory's own backing
        // storage since that static is always identity-visible pre- and
        // post-paging in the low window.
        // SAFETY: `KERNEL_DIR` is only ever mutated during `init()`, which
        // has already completed by the time any user directory is created.
        unsafe { core::ptr::addr_of!(KERNEL_DIR.0).cast::<u32>() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn page_flags_roundtrip_through_bits() {
        let flags = PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER;
        assert_eq!(PageFlags::from_bits_truncate(flags.bits()), flags);
    }

    #[test_case]
    fn dir_and_table_index_decompose_address() {
        let virt = 0xC004_2000u32;
        assert_eq!(dir_index(virt), 0x300);
        assert_eq!(table_index(virt), 0x42);
    }
}
