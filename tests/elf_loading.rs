//! Integration tests for the ELF32 loader: a minimal hand-built `ET_EXEC`
//! image must load and spawn a process; malformed images must be
//! rejected rather than accepted or faulted on.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(orion_kernel::test_runner)]
#![reexport_test_harness_main = "test_main"]
#![allow(missing_docs)]

extern crate alloc;

use core::panic::PanicInfo;

use orion_kernel::process;
use orion_kernel::{boot::BootInfo, kernel_image_bounds, log_backend, memory};

mod fixture {
    use alloc::vec;
    /// Builds a minimal, valid ELF32 `ET_EXEC` image: one `PT_LOAD`
    /// segment holding a two-byte body (`hlt; jmp $`), entry point at
    /// the segment's start.
    pub fn minimal_exec() -> alloc::vec::Vec<u8> {
        build(4, |body: &mut [u8]| {
            body[0] = 0xF4; // hlt
            body[1] = 0xEB; // jmp $-2
            body[2] = 0xFE;
        })
    }

    pub fn bad_magic() -> alloc::vec::Vec<u8> {
        let mut img = minimal_exec();
        img[0] = 0x00; // corrupt the ELF magic
        img
    }

    const EHDR_SIZE: usize = 52;
    const PHDR_SIZE: usize = 32;
    const LOAD_VADDR: u32 = 0x0900_0000;

    fn build(body_len: usize, fill: impl FnOnce(&mut [u8])) -> alloc::vec::Vec<u8> {
        let mut img = alloc::vec![0u8; EHDR_SIZE + PHDR_SIZE + body_len.max(4)];

        img[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        img[4] = 1; // ELFCLASS32
        img[5] = 1; // ELFDATA2LSB
        img[6] = 1; // EI_VERSION

        write_u16(&mut img, 16, 2); // e_type = ET_EXEC
        write_u16(&mut img, 18, 3); // e_machine = EM_386
        write_u32(&mut img, 20, 1); // e_version
        write_u32(&mut img, 24, LOAD_VADDR); // e_entry
        write_u32(&mut img, 28, EHDR_SIZE as u32); // e_phoff
        write_u32(&mut img, 32, 0); // e_shoff
        write_u32(&mut img, 36, 0); // e_flags
        write_u16(&mut img, 40, EHDR_SIZE as u16); // e_ehsize
        write_u16(&mut img, 42, PHDR_SIZE as u16); // e_phentsize
        write_u16(&mut img, 44, 1); // e_phnum
        write_u16(&mut img, 46, 0); // e_shentsize
        write_u16(&mut img, 48, 0); // e_shnum
        write_u16(&mut img, 50, 0); // e_shstrndx

        let ph = EHDR_SIZE;
        write_u32(&mut img, ph, 1); // p_type = PT_LOAD
        write_u32(&mut img, ph + 4, EHDR_SIZE as u32 + PHDR_SIZE as u32); // p_offset
        write_u32(&mut img, ph + 8, LOAD_VADDR); // p_vaddr
        write_u32(&mut img, ph + 12, LOAD_VADDR); // p_paddr
        write_u32(&mut img, ph + 16, body_len as u32); // p_filesz
        write_u32(&mut img, ph + 20, body_len as u32); // p_memsz
        write_u32(&mut img, ph + 24, 0x5); // p_flags = R+X
        write_u32(&mut img, ph + 28, 4096); // p_align

        fill(&mut img[EHDR_SIZE + PHDR_SIZE..]);
        img
    }

    fn write_u16(img: &mut [u8], off: usize, v: u16) {
        img[off..off + 2].copy_from_slice(&v.to_le_bytes());
    }
    fn write_u32(img: &mut [u8], off: usize, v: u32) {
        img[off..off + 4].copy_from_slice(&v.to_le_bytes());
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
fn minimal_exec_image_loads_and_spawns() {
    let image = fixture::minimal_exec();
    let pid = process::exec_elf("elf_test_init", &image).expect("valid ET_EXEC image must load");
    assert_ne!(pid, 0);
}

#[test_case]
fn image_with_bad_magic_is_rejected() {
    let image = fixture::bad_magic();
    assert!(process::exec_elf("elf_test_bad_magic", &image).is_err());
}

#[test_case]
fn truncated_image_is_rejected() {
    let image = fixture::minimal_exec();
    let truncated = &image[..image.len() - 8];
    assert!(process::exec_elf("elf_test_truncated", truncated).is_err());
}
