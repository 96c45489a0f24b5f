//! Kernel entry point: brings up every subsystem in dependency order and
//! hands off to the first user process.
//!
//! This binary supplies `kernel_entry`, the Rust-side handoff
//! `orion_kernel::boot::start`'s `_start` trampoline calls once GRUB has
//! jumped to it and a boot stack is live.

#![feature(custom_test_frameworks)]
#![test_runner(orion_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]
#![no_std]
#![no_main]

use core::panic::PanicInfo;

use orion_kernel::{boot::BootInfo, gdt, interrupts, kernel_image_bounds, log_backend, memory, process, serial_println};

/// The very first Rust code to run, called from `boot::start`'s `_start`
/// trampoline with the Multiboot2 magic and information-structure
/// address GRUB left in EAX/EBX.
///
/// # Safety
///
/// Must only ever be called once, by `_start`, immediately after GRUB
/// hands off control with interrupts disabled and a flat 32-bit address
/// space.
#[no_mangle]
pub unsafe extern "C" fn kernel_entry(_magic: u32, multiboot_addr: u32) -> ! {
    log_backend::init();
    log::info!("orion_kernel: booting");

    let boot_info = BootInfo::new(multiboot_addr);
    let (kstart, kend) = kernel_image_bounds();
    memory::init(&boot_info, kstart, kend);

    gdt::init();
    interrupts::init();
    process::init();

    interrupts::register_timer_handler(process::scheduler::on_timer_tick);
    interrupts::init_timer();

    process::reaper::start();

    #[cfg(test)]
    test_main();

    match boot_info
        .modules()
        .next()
        .map(|m| (m.start as *const u8, (m.end - m.start) as usize))
    {
        Some((ptr, len)) => {
            // SAFETY: `ptr`/`len` come from a Multiboot2 module tag
            // describing a physical region still identity-mapped at
            // this point in boot.
            let image = core::slice::from_raw_parts(ptr, len);
            match process::exec_elf("init", image) {
                Ok(pid) => {
                    log::info!("orion_kernel: entering init process (pid {pid})");
                    core::arch::asm!("sti", options(nomem, nostack));
                    process::scheduler::enter_first_process(pid);
                }
                Err(e) => log::error!("orion_kernel: failed to load init module: {e}"),
            }
        }
        None => log::error!("orion_kernel: no Multiboot2 module supplied as init"),
    }

    // No init process to run: idle forever, servicing the reaper and
    // whatever else the timer schedules.
    core::arch::asm!("sti", options(nomem, nostack));
    loop {
        core::arch::asm!("hlt", options(nomem, nostack));
    }
}

/// Panic handler for a normal (non-test) boot: dumps the message over
/// serial and halts. A kernel panic is always fatal — recoverable
/// resource exhaustion returns an `Err` instead; this is reserved for
/// violated kernel-internal invariants.
#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("KERNEL PANIC: {info}");
    log::error!("kernel panic: {info}");
    // SAFETY: halting forever is the only sound response to a violated
    // kernel invariant.
    unsafe {
        core::arch::asm!("cli");
        loop {
            core::arch::asm!("hlt");
        }
    }
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    orion_kernel::test_panic_handler(info)
}
