//! Tests for heap allocation in a `no_std` environment using a custom allocator.
#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(orion_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]
#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_assert_message)]
extern crate alloc;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::panic::PanicInfo;

use orion_kernel::config::HEAP_SIZE;
use orion_kernel::{boot::BootInfo, kernel_image_bounds, log_backend, memory};

/// Entry point for the test, called from the shared `_start` trampoline.
///
/// # Safety
///
/// Same contract as the kernel's own `kernel_entry`: called once, by
/// `_start`, before any other code touches memory.
#[no_mangle]
pub unsafe extern "C" fn kernel_entry(_magic: u32, multiboot_addr: u32) -> ! {
    log_backend::init();

    let boot_info = BootInfo::new(multiboot_addr);
    let (kstart, kend) = kernel_image_bounds();
    memory::init(&boot_info, kstart, kend);

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
fn when_creating_simple_allocation_then_memory_is_allocated() {
    let heap_value_1 = Box::new(41);
    let heap_value_2 = Box::new(42);

    assert_eq!(*heap_value_1, 41);
    assert_eq!(*heap_value_2, 42);
}

#[test_case]
fn when_creating_large_vec_then_memory_is_allocated() {
    let mut vec = Vec::new();
    for i in 0..1000 {
        vec.push(i);
    }
    assert_eq!(vec.iter().sum::<u64>(), (0..1000).sum());
}

#[test_case]
fn when_many_boxes_are_allocated_then_memory_is_allocated() {
    for i in 0..HEAP_SIZE / 4096 {
        let x = Box::new(i);
        assert_eq!(*x, i);
    }
}
