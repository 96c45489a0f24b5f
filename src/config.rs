//! Build-time constants for the kernel's memory map, segment selectors,
//! and scheduling policy.
//!
//! Centralising these mirrors the teacher's per-concern constant modules
//! (`allocator.rs::HEAP_START`, `userspace/mod.rs::USER_CODE_START`), but
//! gathered into one module since this kernel's constants are referenced
//! across memory, process, and interrupt subsystems alike.

/// Page size on 32-bit x86: 4 KiB.
pub const PAGE_SIZE: u32 = 4096;

/// Number of entries in a page directory or page table.
pub const PAGE_TABLE_ENTRIES: usize = 1024;

// ---- Virtual memory map (spec §6) ----

/// Start of the identity-mapped low window (kernel image + early MMIO).
pub const LOW_WINDOW_START: u32 = 0x0000_0000;
/// End (exclusive) of the identity-mapped low window: 64 MiB.
pub const LOW_WINDOW_END: u32 = 0x0400_0000;
/// Number of directory slots covered by the low window (64 MiB / 4 MiB).
pub const LOW_WINDOW_DIR_SLOTS: usize = 16;

/// Start of the user-mode address range.
pub const USER_RANGE_START: u32 = 0x0800_0000;
/// End (inclusive-ish upper bound) of the user-mode address range.
pub const USER_RANGE_END: u32 = 0xBFFF_FFFF;
/// Top of the user stack; stacks grow down from here.
pub const USER_STACK_TOP: u32 = 0xBFF0_0000;
/// Default user stack size.
pub const USER_STACK_SIZE: u32 = 16 * 1024;

/// Minimum ET_DYN (PIE) load base, and the monotonic allocator's start point.
pub const ELF_USER_VADDR_MIN: u32 = 0x0800_0000;

/// Start of the high kernel mapping.
pub const KERNEL_VIRT_BASE: u32 = 0xC000_0000;

/// Default kernel heap start.
pub const HEAP_START: u32 = 0xC100_0000;
/// Default kernel heap size: 64 MiB.
pub const HEAP_SIZE: u32 = 64 * 1024 * 1024;
/// Default kernel heap end (exclusive).
pub const HEAP_END: u32 = HEAP_START + HEAP_SIZE;

/// Recursive page-table window: table *i* of the live directory.
pub const RECURSIVE_PT_BASE: u32 = 0xFFC0_0000;
/// Recursive page-directory window: the live directory itself.
pub const RECURSIVE_PD_BASE: u32 = 0xFFFF_F000;
/// Directory/table slot used for the recursive self-map.
pub const RECURSIVE_SLOT: usize = 1023;

/// First kernel-half directory slot (`0xC0000000 / 4MiB`).
pub const KERNEL_HALF_START_SLOT: usize = 768;
/// One past the last kernel-half directory slot (`1023` is the self-map).
pub const KERNEL_HALF_END_SLOT: usize = 1023;

// ---- Segment selectors (GDT convention, spec §6) ----

/// Kernel code selector, ring 0.
pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
/// Kernel data selector, ring 0.
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
/// User code selector, ring 3 (RPL bits already set).
pub const USER_CODE_SELECTOR: u16 = 0x1B;
/// User data selector, ring 3 (RPL bits already set).
pub const USER_DATA_SELECTOR: u16 = 0x23;

/// `EFLAGS` value used for freshly created trap frames: interrupts enabled,
/// reserved bit 1 set.
pub const INITIAL_EFLAGS: u32 = 0x202;

// ---- Interrupts ----

/// PIC master command/data base vector after remap.
pub const PIC1_OFFSET: u8 = 32;
/// PIC slave command/data base vector after remap.
pub const PIC2_OFFSET: u8 = 40;
/// Timer IRQ vector (`PIC1_OFFSET + 0`).
pub const TIMER_VECTOR: u8 = PIC1_OFFSET;
/// Keyboard IRQ vector (`PIC1_OFFSET + 1`).
pub const KEYBOARD_VECTOR: u8 = PIC1_OFFSET + 1;
/// Syscall gate vector.
pub const SYSCALL_VECTOR: u8 = 0xA5;

/// PIT input clock frequency in Hz.
pub const PIT_INPUT_FREQUENCY: u32 = 1_193_180;
/// Target timer tick frequency.
pub const TIMER_FREQUENCY_HZ: u32 = 100;
/// Number of timer ticks in one process time slice (50 ms at 100 Hz).
pub const TIME_SLICE_TICKS: u32 = 5;

// ---- Process table ----

/// Maximum number of simultaneously live processes.
pub const MAX_PROCESSES: usize = 16;
/// Maximum process name length, including the terminator.
pub const PROC_NAME_MAX: usize = 32;
/// Default kernel stack size for any process.
pub const KERNEL_STACK_SIZE: u32 = 64 * 1024;

/// Syscall number reserved for `exit`; used by the user exit stub.
pub const SYS_EXIT: u32 = 8;
