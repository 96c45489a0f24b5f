//! Interrupt Descriptor Table: 256 gate descriptors, installed with
//! `lidt`.
//!
//! Hand-rolled rather than built on the teacher's `x86_64::structures::idt`
//! (that type's `extern "x86-interrupt"` handlers assume the x86_64 ABI and
//! cannot produce the spec's fused `TrapFrame`). Gate layout and the
//! DPL=3 syscall-gate convention mirror `original_source/cpu/isr.c`'s
//! `set_idt_gate`/`set_idt_gate_syscall`.

use crate::config::SYSCALL_VECTOR;
use core::arch::asm;
use core::mem::size_of;

const GATE_TYPE_INTERRUPT_32: u8 = 0x0E;
const PRESENT: u8 = 0x80;
const DPL_RING0: u8 = 0x00;
const DPL_RING3: u8 = 0x60;

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    zero: u8,
    type_attr: u8,
    offset_high: u16,
}

impl GateDescriptor {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            zero: 0,
            type_attr: 0,
            offset_high: 0,
        }
    }

    fn new(handler: u32, selector: u16, dpl: u8) -> Self {
        Self {
            offset_low: handler as u16,
            selector,
            zero: 0,
            type_attr: PRESENT | dpl | GATE_TYPE_INTERRUPT_32,
            offset_high: (handler >> 16) as u16,
        }
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

#[repr(align(8))]
struct IdtTable([GateDescriptor; 256]);

static mut IDT: IdtTable = IdtTable([GateDescriptor::missing(); 256]);

fn set_gate(vector: u8, handler: unsafe extern "C" fn(), selector: u16, dpl: u8) {
    // SAFETY: `IDT` is only mutated during single-threaded init, before
    // `lidt` is ever executed.
    unsafe {
        IDT.0[vector as usize] = GateDescriptor::new(handler as usize as u32, selector, dpl);
    }
}

fn load() {
    // SAFETY: `IDT` has been fully populated by `init` before this runs.
    unsafe {
        let ptr = IdtPointer {
            limit: (size_of::<[GateDescriptor; 256]>() - 1) as u16,
            base: core::ptr::addr_of!(IDT.0) as u32,
        };
        asm!("lidt [{0}]", in(reg) &ptr, options(readonly, nostack, preserves_flags));
    }
}

/// Installs all exception (0-31), IRQ (32-47), and syscall (0xA5) gates,
/// then loads the table with `lidt`.
pub fn init() {
    use super::stubs::*;
    use crate::config::KERNEL_CODE_SELECTOR as CS;

    let exceptions: [unsafe extern "C" fn(); 32] = [
        isr0, isr1, isr2, isr3, isr4, isr5, isr6, isr7, isr8, isr9, isr10, isr11, isr12, isr13,
        isr14, isr15, isr16, isr17, isr18, isr19, isr20, isr21, isr22, isr23, isr24, isr25,
        isr26, isr27, isr28, isr29, isr30, isr31,
    ];
    for (vector, handler) in exceptions.into_iter().enumerate() {
        set_gate(vector as u8, handler, CS, DPL_RING0);
    }

    let irqs: [unsafe extern "C" fn(); 16] = [
        irq0, irq1, irq2, irq3, irq4, irq5, irq6, irq7, irq8, irq9, irq10, irq11, irq12, irq13,
        irq14, irq15,
    ];
    for (i, handler) in irqs.into_iter().enumerate() {
        set_gate(32 + i as u8, handler, CS, DPL_RING0);
    }

    set_gate(SYSCALL_VECTOR, isr_syscall, CS, DPL_RING3);

    load();
}
