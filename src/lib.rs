//! `orion_kernel`: a small Multiboot2-booted x86 kernel.
//!
//! Library crate shared by the kernel binary (`entry_point.rs`) and every
//! integration test under `tests/`: it owns the Multiboot2 boot stub
//! (`boot::start`'s `_start` trampoline, pulled in once here so it is not
//! duplicated per binary) plus every subsystem module. Each binary that
//! links against this crate supplies its own `kernel_entry`, the symbol
//! `_start` hands off to once the stack is set up.

#![no_std]
#![cfg_attr(test, no_main)]
#![feature(custom_test_frameworks)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use core::panic::PanicInfo;

pub mod boot;
pub mod config;
pub mod error;
#[macro_use]
pub mod serial;
pub mod gdt;
pub mod interrupts;
pub mod log_backend;
pub mod memory;
pub mod process;
pub mod syscall;

extern "C" {
    static kernel_start: u8;
    static kernel_end: u8;
}

/// The kernel image's physical (== virtual, pre-paging) extent, read from
/// the symbols `linker.ld` brackets the image with.
pub fn kernel_image_bounds() -> (u32, u32) {
    // SAFETY: `kernel_start`/`kernel_end` are linker-defined addresses,
    // never dereferenced, only taken.
    unsafe {
        (
            core::ptr::addr_of!(kernel_start) as u32,
            core::ptr::addr_of!(kernel_end) as u32,
        )
    }
}

/// `kernel_entry` used only when this library itself is built as a test
/// binary (`cargo test --lib`), exercising the `#[test_case]`s embedded in
/// modules like `memory::heap`. Production boot lives in `entry_point.rs`;
/// each integration test under `tests/` supplies its own minimal variant.
#[cfg(test)]
#[no_mangle]
pub unsafe extern "C" fn kernel_entry(_magic: u32, _multiboot_addr: u32) -> ! {
    log_backend::init();
    test_main();
    // SAFETY: nothing left to do after the test harness exits QEMU.
    loop {
        core::arch::asm!("hlt", options(nomem, nostack));
    }
}

////////////////////////
// Qemu exit handler  //
////////////////////////

const QEMU_EXIT_PORT: u16 = 0xf4;

/// Possible exit codes signalled to QEMU's `isa-debug-exit` device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    /// A successful exit status.
    Success = 0x10,
    /// A failure exit status.
    Failure = 0x11,
}

/// Exits QEMU with `exit_code` via the `isa-debug-exit` I/O port.
pub fn exit_qemu(exit_code: QemuExitCode) {
    // SAFETY: `QEMU_EXIT_PORT` is only valid under the `isa-debug-exit`
    // test harness device this kernel's test profile configures.
    unsafe {
        x86::io::outb(QEMU_EXIT_PORT, exit_code as u8);
    }
}

/// Shared panic handler for integration tests: reports the failure over
/// serial and exits QEMU with a failure status.
pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {info}\n");
    exit_qemu(QemuExitCode::Failure);
    // SAFETY: QEMU exits on the port write above; this only covers the
    // (never taken in practice) case where it doesn't.
    unsafe {
        loop {
            core::arch::asm!("hlt");
        }
    }
}

/// Custom test runner for `no_std` testing.
pub fn test_runner(tests: &[&dyn Testable]) {
    serial_println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

/// Generalizes a test case so the runner can print its name before and
/// "[ok]" after it runs.
pub trait Testable {
    /// Runs the test, wrapped with name/status printing.
    fn run(&self);
}

impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        use core::any::type_name;

        serial_print!("{}...\t", type_name::<T>());
        self();
        serial_println!("[ok]");
    }
}
