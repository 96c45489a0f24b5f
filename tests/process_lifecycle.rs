//! Integration tests for the process table: spawning kernel-mode
//! workers, pid allocation, table exhaustion, and `kill` against a
//! process that never runs (the scheduler's timer isn't armed in this
//! test, so spawned PCBs stay `Ready` and are safe to inspect through
//! the table's own API without a context switch ever firing).

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(orion_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]
#![allow(missing_docs)]

use core::panic::PanicInfo;

use orion_kernel::config::MAX_PROCESSES;
use orion_kernel::process;
use orion_kernel::{boot::BootInfo, gdt, kernel_image_bounds, log_backend, memory};

extern "C" fn idle_worker() -> ! {
    loop {
        // SAFETY: halting is always safe; this worker is never scheduled
        // onto the CPU in this test (the timer is never armed).
        unsafe {
            core::arch::asm!("hlt", options(nomem, nostack));
        }
    }
}

/// Entry point for the test, called from the shared `_start` trampoline.
///
/// # Safety
///
/// Same contract as the kernel's own `kernel_entry`.
#[no_mangle]
pub unsafe extern "C" fn kernel_entry(_magic: u32, multiboot_addr: u32) -> ! {
    log_backend::init();

    let boot_info = BootInfo::new(multiboot_addr);
    let (kstart, kend) = kernel_image_bounds();
    memory::init(&boot_info, kstart, kend);
    gdt::init();
    process::init();

    test_main();

    loop {
        core::arch::asm!("hlt", options(nomem, nostack));
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    orion_kernel::test_panic_handler(info)
}

#[test_case]
fn current_pid_is_zero_before_any_process_runs() {
    assert_eq!(process::current_pid(), 0);
}

#[test_case]
fn spawn_kernel_assigns_distinct_increasing_pids() {
    let a = process::spawn_kernel("lifecycle-a", idle_worker).expect("first spawn must succeed");
    let b = process::spawn_kernel("lifecycle-b", idle_worker).expect("second spawn must succeed");
    assert_ne!(a, b);
    assert!(b > a);
}

#[test_case]
fn kill_rejects_pid_zero_and_unknown_pid() {
    assert!(process::kill(0, false).is_err());
    assert!(process::kill(0xFFFF, false).is_err());
}

#[test_case]
fn spawn_kernel_fails_once_table_is_full() {
    let mut spawned = 0usize;
    while process::spawn_kernel("lifecycle-filler", idle_worker).is_ok() {
        spawned += 1;
        if spawned > MAX_PROCESSES + 1 {
            break;
        }
    }
    assert!(
        process::spawn_kernel("lifecycle-overflow", idle_worker).is_err(),
        "process table must reject spawns once MAX_PROCESSES is reached"
    );
}
