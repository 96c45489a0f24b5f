//! Exception names, the user-fault kill policy, and the fatal kernel-fault
//! panic dump.
//!
//! Ported from `original_source/cpu/isr.c` (`exception_messages`,
//! `user_privileged_opcode_name`, `handle_user_exception`, `isr_panic`);
//! see spec §4.4 and §7.

use super::trap_frame::TrapFrame;
use crate::config::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR, RECURSIVE_PD_BASE, RECURSIVE_PT_BASE};
use crate::memory::paging;
use core::arch::asm;

pub const EXCEPTION_MESSAGES: [&str; 32] = [
    "Division By Zero",
    "Debug",
    "Non Maskable Interrupt",
    "Breakpoint",
    "Overflow",
    "Bound Range Exceeded",
    "Invalid Opcode",
    "Device Not Available",
    "Double Fault",
    "Coprocessor Segment Overrun",
    "Invalid TSS",
    "Segment Not Present",
    "Stack-Segment Fault",
    "General Protection Fault",
    "Page Fault",
    "Reserved",
    "x87 Floating-Point Exception",
    "Alignment Check",
    "Machine Check",
    "SIMD Floating-Point Exception",
    "Virtualization Exception",
    "Control Protection Exception",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
    "Reserved",
];

/// Names a handful of privileged opcodes a killed user process might have
/// faulted on, by peeking at the faulting EIP through the current address
/// space. Returns `None` if the page is unmapped (never dereferences
/// unmapped user memory from kernel context) or the opcode is not one of
/// the recognized ones.
fn user_privileged_opcode_name(eip: u32) -> Option<&'static str> {
    if paging::virt_to_phys(eip).is_err() {
        return None;
    }
    // SAFETY: `virt_to_phys` above proved `eip` is mapped in the current
    // (the faulting process's) address space.
    let opcode = unsafe { *(eip as *const u8) };
    match opcode {
        0xF4 => Some("HLT"),
        0xFA => Some("CLI"),
        0xFB => Some("STI"),
        0xE4 | 0xE5 | 0xE6 | 0xE7 | 0xEC | 0xED | 0xEE | 0xEF => Some("IN/OUT"),
        _ => None,
    }
}

/// Policy for exceptions 0-31 raised from a user process with no
/// registered handler: kill the process, and redirect resumption either
/// to the kernel's exit trampoline (if it was foreground) or to the
/// scheduler.
///
/// Returns `true` if handled (the dispatcher should not panic).
pub fn handle_user_exception(frame: &mut TrapFrame) -> bool {
    if frame.int_no >= 32 || !frame.from_user_mode() {
        return false;
    }
    if !crate::process::current_is_user() {
        return false;
    }

    let pid = crate::process::current_pid();
    let name = crate::process::current_name();
    let foreground = crate::process::is_foreground_pid(pid);

    if frame.int_no == 13 {
        if let Some(priv_name) = user_privileged_opcode_name(frame.eip) {
            log::warn!("[user] privileged instruction {priv_name} at {:#010x}", frame.eip);
        }
    }

    log::warn!(
        "[user] killed pid={pid} ({name}): exception {} ({})",
        frame.int_no,
        EXCEPTION_MESSAGES[frame.int_no as usize]
    );

    crate::process::exit_current(frame.int_no);

    if foreground || !crate::process::scheduler::schedule(frame, false) {
        frame.eip = crate::process::exit_trampoline as usize as u32;
        frame.cs = u32::from(KERNEL_CODE_SELECTOR);
        frame.ds = u32::from(KERNEL_DATA_SELECTOR);
    }
    true
}

fn read_cr2() -> u32 {
    let cr2: u32;
    // SAFETY: reading CR2 has no side effects.
    unsafe { asm!("mov {0}, cr2", out(reg) cr2, options(nomem, nostack, preserves_flags)) };
    cr2
}

fn read_cr(which: &str) -> u32 {
    let val: u32;
    // SAFETY: reading a control register has no side effects.
    unsafe {
        match which {
            "cr0" => asm!("mov {0}, cr0", out(reg) val, options(nomem, nostack, preserves_flags)),
            "cr3" => asm!("mov {0}, cr3", out(reg) val, options(nomem, nostack, preserves_flags)),
            "cr4" => asm!("mov {0}, cr4", out(reg) val, options(nomem, nostack, preserves_flags)),
            _ => unreachable!("read_cr only supports cr0/cr3/cr4"),
        }
    };
    val
}

/// Fatal kernel fault: full diagnostic dump, then halt forever.
///
/// Never returns. Called only for exceptions with no registered handler,
/// raised from ring 0, or for unrecognized vectors — per spec §7's
/// "kernel fault: panic" policy.
pub fn panic_dump(frame: &TrapFrame) -> ! {
    log::error!("========[ FATAL CPU EXCEPTION / KERNEL PANIC ]==========");
    log::error!("Interrupt Number : {}", frame.int_no);
    if frame.int_no < 32 {
        log::error!("Description      : {}", EXCEPTION_MESSAGES[frame.int_no as usize]);
    } else {
        log::error!("Description      : Unknown IRQ or user-defined interrupt");
    }

    let cr2 = read_cr2();
    log::error!("Fault Address    : {cr2:#010x}");
    log::error!(
        "EAX={:#010x}  EBX={:#010x}  ECX={:#010x}  EDX={:#010x}",
        frame.eax, frame.ebx, frame.ecx, frame.edx
    );
    log::error!(
        "ESI={:#010x}  EDI={:#010x}  EBP={:#010x}",
        frame.esi, frame.edi, frame.ebp
    );
    log::error!("EIP={:#010x}  EFLAGS={:#010x}", frame.eip, frame.eflags);
    log::error!("CS={:#06x}  DS={:#06x}", frame.cs, frame.ds);

    let cr0 = read_cr("cr0");
    let cr3 = read_cr("cr3");
    let cr4 = read_cr("cr4");
    log::error!("CR0={cr0:#010x}  CR2={cr2:#010x}  CR3={cr3:#010x}  CR4={cr4:#010x}");

    if frame.int_no == 14 {
        let err = frame.err_code;
        log::error!(
            "Error Code = {err:#010x} ({}{}{}{}{})",
            if err & 1 != 0 { "P " } else { "NP " },
            if err & 2 != 0 { "W " } else { "R " },
            if err & 4 != 0 { "U " } else { "S " },
            if err & 8 != 0 { "RES " } else { "" },
            if err & 16 != 0 { "IF " } else { "" },
        );

        let dir_idx = cr2 >> 22;
        let table_idx = (cr2 >> 12) & 0x3FF;
        // SAFETY: diagnostic-only read through the recursive window;
        // bounded indices (10-bit) into a 1024-entry table.
        unsafe {
            let pd = RECURSIVE_PD_BASE as *const u32;
            let pde = *pd.add(dir_idx as usize);
            log::error!("PDE[{dir_idx}] = {pde:#010x}");
            if pde & 1 != 0 {
                let pt = (RECURSIVE_PT_BASE + dir_idx * 4096) as *const u32;
                let pte = *pt.add(table_idx as usize);
                log::error!("PTE[{table_idx}] = {pte:#010x}");
            }
        }
    }

    let dump_esp = if frame.from_user_mode() { frame.user_esp } else { frame.kernel_esp() };
    log::error!("--- STACK DUMP ---");
    for i in 0..8u32 {
        let addr = dump_esp + i * 4;
        match paging::virt_to_phys(addr) {
            Ok(_) => {
                // SAFETY: `virt_to_phys` just proved `addr` is mapped.
                let value = unsafe { *(addr as *const u32) };
                log::error!("{addr:#010x}: {value:#010x}");
            }
            Err(_) => {
                log::error!("{addr:#010x}: <unmapped>");
                break;
            }
        }
    }

    log::error!("System Halted.");
    loop {
        // SAFETY: halting forever is the defined terminal action here.
        unsafe { asm!("cli", "hlt", options(nomem, nostack)) };
    }
}
