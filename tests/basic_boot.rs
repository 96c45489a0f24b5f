//! Simple boot test for the kernel.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(orion_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::panic::PanicInfo;

use orion_kernel::{log_backend, serial_println};

/// Entry point for the test, called from the shared `_start` trampoline.
///
/// # Safety
///
/// Same contract as the kernel's own `kernel_entry`: called once, by
/// `_start`, immediately after GRUB hands off control.
#[no_mangle]
pub unsafe extern "C" fn kernel_entry(_magic: u32, _multiboot_addr: u32) -> ! {
    log_backend::init();
    test_main();

    loop {
        core::arch::asm!("hlt", options(nomem, nostack));
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    orion_kernel::test_panic_handler(info)
}

/// Test that the serial backend is up and can print a line.
#[test_case]
fn test_serial_println() {
    serial_println!("test_serial_println output");
}
