//! Crate-wide recoverable-error type.
//!
//! Every fallible kernel operation (frame allocation, page mapping, heap
//! growth, ELF validation, process-table exhaustion) returns
//! `Result<T, KernelError>` instead of panicking, per spec §7's "resource
//! exhaustion is recoverable" policy. Kernel-fatal conditions still go
//! through `panic!`, handled in `entry_point.rs`.

use core::fmt;

/// A recoverable kernel failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// The physical memory manager has no free frames left.
    OutOfFrames,
    /// A requested virtual address is already mapped.
    AlreadyMapped,
    /// A requested virtual address has no mapping.
    NotMapped,
    /// The kernel heap could not grow (frontier would exceed `heap_end`).
    HeapExhausted,
    /// An ELF image failed validation; the reason is not further typed,
    /// mirroring the source's boolean `load_bin` contract.
    InvalidElf,
    /// The process table has no free slot.
    ProcessTableFull,
    /// A syscall argument failed validation (bad pointer, length, pid, fd).
    BadArgument,
    /// No PCB exists for the given PID.
    NoSuchProcess,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::OutOfFrames => "out of physical frames",
            Self::AlreadyMapped => "virtual address already mapped",
            Self::NotMapped => "virtual address not mapped",
            Self::HeapExhausted => "kernel heap exhausted",
            Self::InvalidElf => "invalid ELF image",
            Self::ProcessTableFull => "process table full",
            Self::BadArgument => "bad syscall argument",
            Self::NoSuchProcess => "no such process",
        };
        f.write_str(msg)
    }
}

/// Convenience alias used throughout the kernel.
pub type KernelResult<T> = Result<T, KernelError>;
