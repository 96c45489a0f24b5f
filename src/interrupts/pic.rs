//! 8259 PIC remap and EOI, hand-rolled over `x86::io` port primitives.
//!
//! Replaces the teacher's `pic8259` crate dependency (tied to the
//! `x86_64` crate's `Port` type); the ICW byte sequence is taken verbatim
//! from `original_source/cpu/isr.c::isr_install` / spec §6.

use crate::config::{PIC1_OFFSET, PIC2_OFFSET};
use spin::Mutex;
use x86::io::{inb, outb};

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const ICW1_INIT: u8 = 0x11;
const ICW4_8086: u8 = 0x01;
const PIC_EOI: u8 = 0x20;

struct Pics;

impl Pics {
    /// Remaps the master PIC to `PIC1_OFFSET` and the slave to
    /// `PIC2_OFFSET`, per the ICW sequence in spec §6.
    ///
    /// # Safety
    ///
    /// Performs raw port I/O against fixed PIC ports; must only run once
    /// during IDT bring-up.
    unsafe fn remap(&self) {
        outb(PIC1_COMMAND, ICW1_INIT);
        outb(PIC2_COMMAND, ICW1_INIT);
        outb(PIC1_DATA, PIC1_OFFSET);
        outb(PIC2_DATA, PIC2_OFFSET);
        outb(PIC1_DATA, 0x04); // tell master about slave at IRQ2
        outb(PIC2_DATA, 0x02); // tell slave its cascade identity
        outb(PIC1_DATA, ICW4_8086);
        outb(PIC2_DATA, ICW4_8086);
        outb(PIC1_DATA, 0x00); // unmask all master lines
        outb(PIC2_DATA, 0x00); // unmask all slave lines
    }

    /// Sends an end-of-interrupt to the slave (if `vector >= 40`) and
    /// always to the master.
    ///
    /// # Safety
    ///
    /// Must be called once per IRQ, after the registered handler runs.
    unsafe fn notify_end_of_interrupt(&self, vector: u8) {
        if vector >= PIC2_OFFSET {
            outb(PIC2_COMMAND, PIC_EOI);
        }
        outb(PIC1_COMMAND, PIC_EOI);
    }

    /// Re-masks both PICs to only timer, keyboard, and cascade (used by
    /// the original kernel's `allow_keyboard_only`; kept as a documented
    /// collaborator hook even though no in-scope driver currently calls
    /// it, since spec §6 specifies the exact mask bytes).
    ///
    /// # Safety
    ///
    /// Raw port I/O against fixed PIC ports.
    #[expect(dead_code, reason = "documented collaborator hook, see spec §6")]
    unsafe fn allow_keyboard_only(&self) {
        outb(PIC1_DATA, 0xF8);
        outb(PIC2_DATA, 0xEF);
    }
}

static PICS: Mutex<Pics> = Mutex::new(Pics);

/// Remaps both PICs. Must run before `sti`.
pub fn init() {
    // SAFETY: runs once during single-threaded IDT bring-up.
    unsafe { PICS.lock().remap() };
}

/// Sends end-of-interrupt for the given vector.
pub fn notify_end_of_interrupt(vector: u8) {
    // SAFETY: called from IRQ context only, once per IRQ.
    unsafe { PICS.lock().notify_end_of_interrupt(vector) };
}

/// Reads a byte from an I/O port.
///
/// # Safety
///
/// The caller must ensure reading `port` has no unexpected side effects.
pub unsafe fn port_in(port: u16) -> u8 {
    inb(port)
}

/// Writes a byte to an I/O port.
///
/// # Safety
///
/// The caller must ensure writing `value` to `port` is well-defined for
/// that device.
pub unsafe fn port_out(port: u16, value: u8) {
    outb(port, value);
}
