//! Interrupt Descriptor Table and trap dispatcher (spec §4.4).
//!
//! Brings together the gate table (`idt`), the PIC (`pic`), the uniform
//! `TrapFrame`, and the exception kill/panic policy (`exceptions`) behind
//! one dispatcher entered from [`stubs::trap_dispatch_entry`].

pub mod exceptions;
mod idt;
mod pic;
pub mod pit;
mod stubs;
pub mod trap_frame;

pub use trap_frame::TrapFrame;

use crate::config::{KEYBOARD_VECTOR, SYSCALL_VECTOR, TIMER_VECTOR};
use spin::Mutex;

/// A registered IRQ handler. Takes the trap frame so a handler (e.g. the
/// timer) can make scheduling decisions that rewrite it.
pub type IrqHandler = fn(&mut TrapFrame);

const IRQ_COUNT: usize = 16;

static IRQ_HANDLERS: Mutex<[Option<IrqHandler>; IRQ_COUNT]> = Mutex::new([None; IRQ_COUNT]);

/// Registers a handler for IRQ number `irq` (0-15, i.e. vector `32+irq`).
pub fn register_irq_handler(irq: u8, handler: IrqHandler) {
    IRQ_HANDLERS.lock()[irq as usize] = Some(handler);
}

/// Brings up the PIC and IDT. Must run before `sti`.
pub fn init() {
    pic::init();
    idt::init();
}

/// Central trap dispatcher, called by every ISR/IRQ/syscall stub with a
/// fully-built [`TrapFrame`] on the current kernel stack.
///
/// Routing, per spec §4.4:
/// - vector `SYSCALL_VECTOR` goes to the syscall dispatcher;
/// - vectors 32-47 (IRQs) run their registered handler, send EOI, then
///   check for a pending kill request;
/// - vectors 0-31 with no registered handler fall to the user-fault kill
///   policy, or (from ring 0, or with nothing to kill) a panic dump.
pub fn dispatch(frame: &mut TrapFrame) {
    let vector = frame.int_no;

    if vector == u32::from(SYSCALL_VECTOR) {
        crate::syscall::dispatch(frame);
        return;
    }

    if (32..48).contains(&vector) {
        let irq = (vector - 32) as u8;
        if let Some(handler) = IRQ_HANDLERS.lock()[irq as usize] {
            handler(frame);
        }
        pic::notify_end_of_interrupt(vector as u8);
        crate::process::handle_pending_kill(frame);
        return;
    }

    if exceptions::handle_user_exception(frame) {
        return;
    }

    exceptions::panic_dump(frame);
}

/// Registers the timer tick handler. Kept separate from `init` so the
/// scheduler can be wired up after process bring-up, mirroring
/// `original_source/cpu/timer.c`'s two-stage (`timer_install`, then
/// `register_interrupt_handler`) startup.
pub fn register_timer_handler(handler: IrqHandler) {
    register_irq_handler((TIMER_VECTOR - 32) as u8, handler);
}

/// Programs the PIT at [`crate::config::TIMER_FREQUENCY_HZ`]. Call once
/// during boot, after [`init`], alongside [`register_timer_handler`].
pub fn init_timer() {
    pit::init(crate::config::TIMER_FREQUENCY_HZ);
}

/// Registers the keyboard IRQ handler, if/when a keyboard driver exists.
#[expect(dead_code, reason = "documented collaborator hook, see spec §6")]
pub fn register_keyboard_handler(handler: IrqHandler) {
    register_irq_handler((KEYBOARD_VECTOR - 32) as u8, handler);
}
