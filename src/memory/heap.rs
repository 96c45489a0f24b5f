//! First-fit coalescing kernel heap with lazy per-page commit.
//!
//! Ported from `original_source/mm/mem.c`; see spec §4.3 and the data
//! model in spec §3. Replaces the teacher's `linked_list_allocator`
//! dependency, which has no notion of lazy commit from the VMM.

use crate::config::{HEAP_END, HEAP_START, PAGE_SIZE};
use crate::memory::paging::{self, PageFlags};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use spin::Mutex;

const MIN_SPLIT_SIZE: usize = 8;
const HEADER_SIZE: usize = core::mem::size_of::<BlockHeader>();
const MIN_BLOCK_SIZE: usize = HEADER_SIZE + MIN_SPLIT_SIZE;

#[repr(C)]
struct BlockHeader {
    size: usize,
    next: *mut BlockHeader,
    prev: *mut BlockHeader,
    free: bool,
}

struct Heap {
    base: usize,
    curr: usize,
    commit_end: usize,
    end: usize,
    head: *mut BlockHeader,
    tail: *mut BlockHeader,
}

// SAFETY: the heap is only ever accessed through `HEAP`'s `Mutex`, and the
// kernel is single-threaded except for interrupts, which never touch the
// heap (spec §5's "heap is non-reentrant" rule).
unsafe impl Send for Heap {}

impl Heap {
    const fn empty() -> Self {
        Self {
            base: HEAP_START as usize,
            curr: HEAP_START as usize,
            commit_end: HEAP_START as usize,
            end: HEAP_END as usize,
            head: core::ptr::null_mut(),
            tail: core::ptr::null_mut(),
        }
    }

    fn align_up(val: usize, align: usize) -> usize {
        if align == 0 {
            val
        } else {
            (val + align - 1) & !(align - 1)
        }
    }

    fn normalize_align(align: usize) -> usize {
        if align < 2 {
            return 0;
        }
        let mut p = align;
        if p & (p - 1) != 0 {
            let mut pow = 1usize;
            while pow < p {
                pow <<= 1;
            }
            p = pow;
        }
        if p < 4 {
            p = 4;
        }
        p
    }

    unsafe fn block_end(block: *mut BlockHeader) -> usize {
        block as usize + HEADER_SIZE + (*block).size
    }

    unsafe fn adjacent(a: *mut BlockHeader, b: *mut BlockHeader) -> bool {
        Self::block_end(a) == b as usize
    }

    fn commit_to(&mut self, need_end: usize) -> bool {
        let new_commit_end = Self::align_up(need_end, PAGE_SIZE as usize);
        if new_commit_end <= self.commit_end {
            return true;
        }
        let mut addr = self.commit_end;
        while addr < new_commit_end {
            if paging::map_alloc(addr as u32, PageFlags::PRESENT | PageFlags::WRITABLE).is_err() {
                return false;
            }
            addr += PAGE_SIZE as usize;
        }
        self.commit_end = new_commit_end;
        true
    }

    unsafe fn split_block(&mut self, block: *mut BlockHeader, size: usize) {
        if (*block).size <= size {
            return;
        }
        let remaining = (*block).size - size;
        if remaining < MIN_BLOCK_SIZE {
            return;
        }
        let next = (block as usize + HEADER_SIZE + size) as *mut BlockHeader;
        (*next).size = remaining - HEADER_SIZE;
        (*next).free = true;
        (*next).prev = block;
        (*next).next = (*block).next;
        if !(*block).next.is_null() {
            (*(*block).next).prev = next;
        }
        (*block).next = next;
        if self.tail == block {
            self.tail = next;
        }
        (*block).size = size;
    }

    unsafe fn block_can_fit(block: *mut BlockHeader, size: usize, align: usize) -> Option<usize> {
        let start = block as usize;
        let payload = start + HEADER_SIZE;
        let aligned_payload = if align != 0 { Self::align_up(payload, align) } else { payload };
        let aligned_header = aligned_payload - HEADER_SIZE;
        let end = Self::block_end(block);
        if aligned_payload + size > end {
            return None;
        }
        let leading = aligned_header - start;
        if leading != 0 && leading < MIN_BLOCK_SIZE {
            return None;
        }
        Some(aligned_header)
    }

    unsafe fn find_free_block(&self, size: usize, align: usize) -> Option<(*mut BlockHeader, usize)> {
        let mut cur = self.head;
        while !cur.is_null() {
            if (*cur).free {
                if let Some(header) = Self::block_can_fit(cur, size, align) {
                    return Some((cur, header));
                }
            }
            cur = (*cur).next;
        }
        None
    }

    unsafe fn allocate_from_block(&mut self, mut block: *mut BlockHeader, aligned_header: usize, size: usize) -> *mut u8 {
        let start = block as usize;
        let end = Self::block_end(block);

        if aligned_header != start {
            let leading = aligned_header - start;
            let lead = block;
            (*lead).size = leading - HEADER_SIZE;
            (*lead).free = true;

            let aligned = aligned_header as *mut BlockHeader;
            (*aligned).size = end - (aligned_header + HEADER_SIZE);
            (*aligned).free = true;
            (*aligned).prev = lead;
            (*aligned).next = (*lead).next;
            if !(*lead).next.is_null() {
                (*(*lead).next).prev = aligned;
            }
            (*lead).next = aligned;
            if self.tail == lead {
                self.tail = aligned;
            }
            block = aligned;
        }

        self.split_block(block, size);
        (*block).free = false;
        (block as usize + HEADER_SIZE) as *mut u8
    }

    unsafe fn allocate_new_block(&mut self, size: usize, align: usize) -> *mut u8 {
        let start = self.curr;
        let payload = start + HEADER_SIZE;
        let aligned_payload = if align != 0 { Self::align_up(payload, align) } else { payload };
        let aligned_header = aligned_payload - HEADER_SIZE;
        let end = aligned_header + HEADER_SIZE + size;

        if end > self.end {
            return core::ptr::null_mut();
        }
        if !self.commit_to(end) {
            return core::ptr::null_mut();
        }

        if aligned_header > start {
            let gap = aligned_header - start;
            if gap >= MIN_BLOCK_SIZE {
                let gap_block = start as *mut BlockHeader;
                (*gap_block).size = gap - HEADER_SIZE;
                (*gap_block).free = true;
                (*gap_block).prev = self.tail;
                (*gap_block).next = core::ptr::null_mut();
                if !self.tail.is_null() {
                    (*self.tail).next = gap_block;
                } else {
                    self.head = gap_block;
                }
                self.tail = gap_block;
            } else if gap > 0 && !self.tail.is_null() && (*self.tail).free && Self::adjacent(self.tail, start as *mut BlockHeader) {
                (*self.tail).size += gap;
            }
        }

        let block = aligned_header as *mut BlockHeader;
        (*block).size = size;
        (*block).free = false;
        (*block).prev = self.tail;
        (*block).next = core::ptr::null_mut();
        if !self.tail.is_null() {
            (*self.tail).next = block;
        } else {
            self.head = block;
        }
        self.tail = block;

        self.curr = end;
        (block as usize + HEADER_SIZE) as *mut u8
    }

    unsafe fn alloc_internal(&mut self, size: usize, align: usize) -> *mut u8 {
        if size == 0 {
            return core::ptr::null_mut();
        }
        let size = (size + 3) & !3;
        let align = Self::normalize_align(align);

        if let Some((block, header)) = self.find_free_block(size, align) {
            return self.allocate_from_block(block, header, size);
        }
        self.allocate_new_block(size, align)
    }

    unsafe fn free_internal(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let block = (ptr as usize - HEADER_SIZE) as *mut BlockHeader;
        (*block).free = true;

        if !(*block).next.is_null() && (*(*block).next).free && Self::adjacent(block, (*block).next) {
            let next = (*block).next;
            (*block).size += HEADER_SIZE + (*next).size;
            (*block).next = (*next).next;
            if !(*next).next.is_null() {
                (*(*next).next).prev = block;
            }
            if self.tail == next {
                self.tail = block;
            }
        }

        if !(*block).prev.is_null() && (*(*block).prev).free && Self::adjacent((*block).prev, block) {
            let prev = (*block).prev;
            (*prev).size += HEADER_SIZE + (*block).size;
            (*prev).next = (*block).next;
            if !(*block).next.is_null() {
                (*(*block).next).prev = prev;
            }
            if self.tail == block {
                self.tail = prev;
            }
        }
    }
}

static HEAP: Mutex<Heap> = Mutex::new(Heap::empty());

/// Commits the first heap page so the allocator has somewhere to place its
/// first block header.
pub fn init() {
    let mut heap = HEAP.lock();
    if !heap.commit_to(heap.base + 1) {
        log::error!("heap: failed to map initial heap page");
        return;
    }
    log::info!(
        "heap: virt [{:#010x} - {:#010x})",
        heap.base,
        heap.end
    );
}

/// Allocates `size` bytes at `align` alignment (0/1 meaning "no particular
/// alignment"). Returns `None` on exhaustion.
pub fn alloc(size: usize, align: usize) -> Option<NonNull<u8>> {
    // SAFETY: `alloc_internal` only touches heap-owned memory reached
    // through the lock.
    let ptr = unsafe { HEAP.lock().alloc_internal(size, align) };
    NonNull::new(ptr)
}

/// Allocates `size` bytes aligned to `align`, also returning the backing
/// physical address (used when installing kernel objects like page
/// directories that must be handed to hardware by physical address).
pub fn alloc_aligned_with_phys(size: usize, align: usize) -> Option<(u32, u32)> {
    let ptr = alloc(size, align)?;
    let virt = ptr.as_ptr() as u32;
    let phys = paging::virt_to_phys(virt).unwrap_or(virt);
    Some((virt, phys))
}

/// Frees a pointer previously returned by `alloc`. A no-op for a null
/// pointer.
///
/// # Safety
///
/// `ptr` must have been returned by `alloc` and not already freed.
pub unsafe fn free(ptr: *mut u8) {
    HEAP.lock().free_internal(ptr);
}

struct KernelAllocator;

// SAFETY: `alloc`/`dealloc` forward to the heap's own internal locking and
// respect `Layout`'s size/align contract.
unsafe impl GlobalAlloc for KernelAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        HEAP.lock().alloc_internal(layout.size(), layout.align())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        HEAP.lock().free_internal(ptr);
    }
}

#[global_allocator]
static ALLOCATOR: KernelAllocator = KernelAllocator;

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn alloc_write_read_free() {
        let p1 = alloc(16, 16).expect("p1");
        // SAFETY: freshly allocated 16-byte buffer.
        unsafe {
            for i in 0..16u8 {
                *p1.as_ptr().add(i as usize) = i;
            }
        }
        let p2 = alloc(1, 1).expect("p2");
        assert_ne!(p1.as_ptr(), p2.as_ptr());
        // SAFETY: still within the 16-byte allocation, unmodified.
        unsafe {
            for i in 0..16u8 {
                assert_eq!(*p1.as_ptr().add(i as usize), i);
            }
            free(p1.as_ptr());
            free(p2.as_ptr());
        }
    }

    #[test_case]
    fn alignment_is_respected() {
        for align in [4usize, 16, 64, 4096] {
            let p = alloc(3, align).expect("alloc");
            assert_eq!(p.as_ptr() as usize % align, 0);
            // SAFETY: `p` was just allocated and not yet freed elsewhere.
            unsafe { free(p.as_ptr()) };
        }
    }
}
