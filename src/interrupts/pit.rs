//! Programmable Interval Timer bring-up: programs channel 0 to fire
//! IRQ0 at [`crate::config::TIMER_FREQUENCY_HZ`].
//!
//! Grounded in `original_source/cpu/timer.c::init_timer`: same command
//! byte (`0x36`, channel 0, lobyte/hibyte, square wave) and the same
//! `1193180 / freq` divisor arithmetic. The original's per-tick
//! screen-cursor/USB polling is left out: this build has no VGA cursor
//! or USB stack to service.

use crate::config::PIT_INPUT_FREQUENCY;
use core::sync::atomic::{AtomicU32, Ordering};
use x86::io::outb;

const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;
const PIT_SET_CH0_LOBYTE_HIBYTE_SQUARE_WAVE: u8 = 0x36;

static TICKS: AtomicU32 = AtomicU32::new(0);

/// Programs the PIT to fire at `freq_hz`. Must run before `sti`.
pub fn init(freq_hz: u32) {
    let divisor = PIT_INPUT_FREQUENCY / freq_hz;
    let low = (divisor & 0xFF) as u8;
    let high = ((divisor >> 8) & 0xFF) as u8;
    // SAFETY: fixed PIT ports, standard command sequence, runs once
    // during single-threaded bring-up.
    unsafe {
        outb(PIT_COMMAND, PIT_SET_CH0_LOBYTE_HIBYTE_SQUARE_WAVE);
        outb(PIT_CHANNEL0, low);
        outb(PIT_CHANNEL0, high);
    }
}

/// Advances and returns the tick counter. Called once per timer IRQ by
/// [`crate::process::scheduler::on_timer_tick`]'s caller.
pub fn tick() -> u32 {
    TICKS.fetch_add(1, Ordering::Relaxed) + 1
}

/// Ticks elapsed since boot.
#[must_use]
pub fn ticks() -> u32 {
    TICKS.load(Ordering::Relaxed)
}
