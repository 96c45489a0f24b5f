//! Physical Memory Manager: a bitmap frame allocator driven by the
//! Multiboot2 memory map.
//!
//! Ported from `original_source/mm/pmm.c`; see spec §4.1.

use crate::boot::BootInfo;
use crate::config::PAGE_SIZE;
use crate::error::{KernelError, KernelResult};
use lazy_static::lazy_static;
use spin::Mutex;

/// 4 GiB / 4 KiB = 1,048,576 frames; one bit each.
const MAX_PAGES: usize = 1024 * 1024;
const BITMAP_BYTES: usize = MAX_PAGES / 8;

struct Bitmap {
    bits: [u8; BITMAP_BYTES],
    max_physical_page: u64,
    total_memory: u64,
    free_memory: u64,
}

impl Bitmap {
    const fn new() -> Self {
        Self {
            bits: [0xFF; BITMAP_BYTES],
            max_physical_page: 0,
            total_memory: 0,
            free_memory: 0,
        }
    }

    fn test(&self, idx: u64) -> bool {
        let idx = idx as usize;
        self.bits[idx / 8] & (1 << (idx % 8)) != 0
    }

    fn set(&mut self, idx: u64) {
        let idx = idx as usize;
        self.bits[idx / 8] |= 1 << (idx % 8);
    }

    fn clear(&mut self, idx: u64) {
        let idx = idx as usize;
        self.bits[idx / 8] &= !(1 << (idx % 8));
    }

    fn mark_free(&mut self, idx: u64) {
        if idx < self.max_physical_page {
            self.clear(idx);
        }
    }

    fn mark_used(&mut self, idx: u64) {
        if idx < self.max_physical_page {
            self.set(idx);
        }
    }

    fn find_free(&self) -> Option<u64> {
        (0..self.max_physical_page).find(|&i| !self.test(i))
    }

    fn reserve_region(&mut self, start: u32, end: u32) {
        let s = u64::from(start) / u64::from(PAGE_SIZE);
        let e = (u64::from(end) + u64::from(PAGE_SIZE) - 1) / u64::from(PAGE_SIZE);
        for i in s..e {
            if i < self.max_physical_page {
                if !self.test(i) {
                    self.free_memory -= u64::from(PAGE_SIZE);
                }
                self.set(i);
            }
        }
    }
}

lazy_static! {
    static ref PMM: Mutex<Bitmap> = Mutex::new(Bitmap::new());
}

/// Parses the Multiboot2 memory map, marks usable regions free, then
/// reserves the BIOS area, kernel image, Multiboot info structure, and any
/// loaded modules.
///
/// # Safety
///
/// `kernel_start`/`kernel_end` must be the kernel image's physical extent
/// as provided by the linker script.
pub unsafe fn init(boot_info: &BootInfo, kernel_start: u32, kernel_end: u32) {
    let mut pmm = PMM.lock();
    *pmm = Bitmap::new();

    for region in boot_info.memory_regions() {
        let s = region.start / u64::from(PAGE_SIZE);
        let e = (region.start + region.len) / u64::from(PAGE_SIZE);
        if e > pmm.max_physical_page {
            pmm.max_physical_page = e;
        }
        let mut p = s;
        while p < e && (p as usize) < MAX_PAGES {
            pmm.mark_free(p);
            p += 1;
        }
        pmm.free_memory += region.len;
        pmm.total_memory += region.len;
    }

    pmm.reserve_region(0, 0x0010_0000);
    pmm.reserve_region(kernel_start, kernel_end);
    pmm.reserve_region(boot_info.phys_addr(), boot_info.phys_addr() + boot_info.total_size());

    for module in boot_info.modules() {
        pmm.reserve_region(module.start, module.end);
    }

    log::info!(
        "pmm: total={}MiB free={}MiB",
        pmm.total_memory / 1024 / 1024,
        pmm.free_memory / 1024 / 1024
    );
}

/// Allocates one 4 KiB physical frame, first-fit.
pub fn alloc_page() -> KernelResult<u32> {
    let mut pmm = PMM.lock();
    let idx = pmm.find_free().ok_or(KernelError::OutOfFrames)?;
    pmm.mark_used(idx);
    pmm.free_memory -= u64::from(PAGE_SIZE);
    Ok((idx * u64::from(PAGE_SIZE)) as u32)
}

/// Frees a previously allocated 4 KiB physical frame. A no-op if the frame
/// is already free or outside the tracked range.
pub fn free_page(addr: u32) {
    let mut pmm = PMM.lock();
    let idx = u64::from(addr) / u64::from(PAGE_SIZE);
    if idx >= pmm.max_physical_page {
        return;
    }
    if pmm.test(idx) {
        pmm.clear(idx);
        pmm.free_memory += u64::from(PAGE_SIZE);
    }
}

/// Marks every frame intersecting `[start, end)` as used.
pub fn reserve_region(start: u32, end: u32) {
    PMM.lock().reserve_region(start, end);
}

/// Total usable memory discovered at `init`, in bytes.
#[must_use]
pub fn total_memory() -> u64 {
    PMM.lock().total_memory
}

/// Currently free memory, in bytes.
#[must_use]
pub fn free_memory() -> u64 {
    PMM.lock().free_memory
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn alloc_then_free_restores_free_memory() {
        {
            let mut pmm = PMM.lock();
            *pmm = Bitmap::new();
            pmm.max_physical_page = 256;
            pmm.total_memory = 256 * u64::from(PAGE_SIZE);
            pmm.free_memory = 256 * u64::from(PAGE_SIZE);
            for i in 0..256 {
                pmm.mark_free(i);
            }
        }
        let before = free_memory();
        let frame = alloc_page().expect("frame available");
        assert_eq!(free_memory(), before - u64::from(PAGE_SIZE));
        free_page(frame);
        assert_eq!(free_memory(), before);
    }

    #[test_case]
    fn freeing_already_free_frame_is_noop() {
        {
            let mut pmm = PMM.lock();
            *pmm = Bitmap::new();
            pmm.max_physical_page = 64;
            pmm.total_memory = 64 * u64::from(PAGE_SIZE);
            pmm.free_memory = 64 * u64::from(PAGE_SIZE);
            for i in 0..64 {
                pmm.mark_free(i);
            }
        }
        let before = free_memory();
        free_page(0);
        assert_eq!(free_memory(), before);
    }

    #[test_case]
    fn freeing_out_of_range_frame_is_noop() {
        let before = free_memory();
        free_page(u32::MAX - u32::MAX % PAGE_SIZE);
        assert_eq!(free_memory(), before);
    }
}
