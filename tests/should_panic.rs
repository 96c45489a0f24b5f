//! Test that should panic.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(test_runner)]
#![reexport_test_harness_main = "test_main"]

use core::panic::PanicInfo;
use orion_kernel::{exit_qemu, serial_println, QemuExitCode};

/// Entry point for the test, called from the shared `_start` trampoline.
///
/// # Safety
///
/// Same contract as the kernel's own `kernel_entry`.
#[no_mangle]
pub unsafe extern "C" fn kernel_entry(_magic: u32, _multiboot_addr: u32) -> ! {
    test_main();

    loop {
        core::arch::asm!("hlt", options(nomem, nostack));
    }
}

/// Test runner for this test file: a test that returns normally (doesn't
/// panic) is the failure case here.
pub fn test_runner(tests: &[&dyn Fn()]) {
    serial_println!("Running {} tests", tests.len());
    for test in tests {
        test();
        serial_println!("[test did not panic]");
        exit_qemu(QemuExitCode::Failure);
    }
    exit_qemu(QemuExitCode::Success);
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    serial_println!("[ok]");
    exit_qemu(QemuExitCode::Success);
    loop {}
}

/// Test that should panic.
/// # Panics
/// Fail if the test does not panic.
#[test_case]
fn should_fail() {
    serial_println!("should_panic::should_fail...\t");
    assert_eq!(0, 1, "This test should panic.");
}
