//! Boot-handoff parsing.
//!
//! Replaces the teacher's dependency on the `bootloader` crate's `BootInfo`
//! (designed around x86_64 long-mode handoff) with a hand-rolled Multiboot2
//! reader, since this kernel boots in 32-bit protected mode. See
//! `SPEC_FULL.md` §0.

pub mod multiboot2;

// Side-effect only: emits the Multiboot2 header and the `_start`
// trampoline via `global_asm!`. Pulled in once here so every binary
// that links this library (the kernel proper, each integration test)
// shares a single boot stub and just supplies its own `kernel_entry`.
mod start;

pub use multiboot2::BootInfo;
