//! Assembly entry stubs for every installed interrupt vector.
//!
//! Grounded in the classic JamesM/OSDev low-level ISR stub pattern that
//! `original_source/cpu/isr.c` itself follows (`isr0..isr31`, `irq0..irq15`,
//! a dedicated syscall entry): each stub pushes a dummy error code (for
//! vectors the CPU does not supply one for), pushes the vector number,
//! then falls into one common stub that finishes building the
//! `TrapFrame`, switches to kernel data segments, and calls
//! [`crate::interrupts::dispatch`].
//!
//! After the dispatcher returns, the stub checks `sched_next_esp`
//! (written by [`crate::process::scheduler`] when it decides to switch
//! processes): if nonzero, it swaps onto that stack before unwinding the
//! trap frame, so the final `iretd` resumes whichever process the
//! scheduler picked rather than the one that was interrupted.

use core::arch::global_asm;

macro_rules! isr_stub_noerr {
    ($name:ident, $vec:expr) => {
        global_asm!(
            concat!(
                ".global ", stringify!($name), "\n",
                stringify!($name), ":\n",
                "push 0\n",
                "push ", $vec, "\n",
                "jmp isr_common_stub\n",
            )
        );
    };
}

macro_rules! isr_stub_err {
    ($name:ident, $vec:expr) => {
        global_asm!(
            concat!(
                ".global ", stringify!($name), "\n",
                stringify!($name), ":\n",
                // CPU already pushed the error code for this vector.
                "push ", $vec, "\n",
                "jmp isr_common_stub\n",
            )
        );
    };
}

macro_rules! irq_stub {
    ($name:ident, $vec:expr) => {
        global_asm!(
            concat!(
                ".global ", stringify!($name), "\n",
                stringify!($name), ":\n",
                "push 0\n",
                "push ", $vec, "\n",
                "jmp isr_common_stub\n",
            )
        );
    };
}

global_asm!(
    r#"
.intel_syntax noprefix

.global isr_common_stub
isr_common_stub:
    pusha
    mov ax, ds
    push eax
    mov ax, 0x10
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    push esp
    call trap_dispatch_entry
    add esp, 4
    cmp dword ptr [sched_next_esp], 0
    je 1f
    mov eax, [sched_next_esp]
    mov dword ptr [sched_next_esp], 0
    mov esp, eax
1:
    pop eax
    mov ds, ax
    mov es, ax
    mov fs, ax
    mov gs, ax
    popa
    add esp, 8
    iretd
"#
);

isr_stub_noerr!(isr0, "0");
isr_stub_noerr!(isr1, "1");
isr_stub_noerr!(isr2, "2");
isr_stub_noerr!(isr3, "3");
isr_stub_noerr!(isr4, "4");
isr_stub_noerr!(isr5, "5");
isr_stub_noerr!(isr6, "6");
isr_stub_noerr!(isr7, "7");
isr_stub_err!(isr8, "8");
isr_stub_noerr!(isr9, "9");
isr_stub_err!(isr10, "10");
isr_stub_err!(isr11, "11");
isr_stub_err!(isr12, "12");
isr_stub_err!(isr13, "13");
isr_stub_err!(isr14, "14");
isr_stub_noerr!(isr15, "15");
isr_stub_noerr!(isr16, "16");
isr_stub_err!(isr17, "17");
isr_stub_noerr!(isr18, "18");
isr_stub_noerr!(isr19, "19");
isr_stub_noerr!(isr20, "20");
isr_stub_noerr!(isr21, "21");
isr_stub_noerr!(isr22, "22");
isr_stub_noerr!(isr23, "23");
isr_stub_noerr!(isr24, "24");
isr_stub_noerr!(isr25, "25");
isr_stub_noerr!(isr26, "26");
isr_stub_noerr!(isr27, "27");
isr_stub_noerr!(isr28, "28");
isr_stub_noerr!(isr29, "29");
isr_stub_noerr!(isr30, "30");
isr_stub_noerr!(isr31, "31");

irq_stub!(irq0, "32");
irq_stub!(irq1, "33");
irq_stub!(irq2, "34");
irq_stub!(irq3, "35");
irq_stub!(irq4, "36");
irq_stub!(irq5, "37");
irq_stub!(irq6, "38");
irq_stub!(irq7, "39");
irq_stub!(irq8, "40");
irq_stub!(irq9, "41");
irq_stub!(irq10, "42");
irq_stub!(irq11, "43");
irq_stub!(irq12, "44");
irq_stub!(irq13, "45");
irq_stub!(irq14, "46");
irq_stub!(irq15, "47");

// Syscall gate, vector 0xA5 (165).
irq_stub!(isr_syscall, "165");

extern "C" {
    pub fn isr0();
    pub fn isr1();
    pub fn isr2();
    pub fn isr3();
    pub fn isr4();
    pub fn isr5();
    pub fn isr6();
    pub fn isr7();
    pub fn isr8();
    pub fn isr9();
    pub fn isr10();
    pub fn isr11();
    pub fn isr12();
    pub fn isr13();
    pub fn isr14();
    pub fn isr15();
    pub fn isr16();
    pub fn isr17();
    pub fn isr18();
    pub fn isr19();
    pub fn isr20();
    pub fn isr21();
    pub fn isr22();
    pub fn isr23();
    pub fn isr24();
    pub fn isr25();
    pub fn isr26();
    pub fn isr27();
    pub fn isr28();
    pub fn isr29();
    pub fn isr30();
    pub fn isr31();

    pub fn irq0();
    pub fn irq1();
    pub fn irq2();
    pub fn irq3();
    pub fn irq4();
    pub fn irq5();
    pub fn irq6();
    pub fn irq7();
    pub fn irq8();
    pub fn irq9();
    pub fn irq10();
    pub fn irq11();
    pub fn irq12();
    pub fn irq13();
    pub fn irq14();
    pub fn irq15();

    pub fn isr_syscall();
}

/// Entry point called by `isr_common_stub`; hands off to the Rust
/// dispatcher proper.
///
/// # Safety
///
/// Only ever called from assembly, with `frame` pointing at a fully
/// constructed `TrapFrame` on the current kernel stack.
#[no_mangle]
unsafe extern "C" fn trap_dispatch_entry(frame: *mut super::trap_frame::TrapFrame) {
    super::dispatch(&mut *frame);
}
