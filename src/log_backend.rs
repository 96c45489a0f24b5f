//! A `log`-crate backend writing to the serial port.
//!
//! The teacher logs ad hoc with `serial_println!`; this generalizes that
//! into a `log::Log` implementor so kernel subsystems can use
//! `log::{info, warn, error}` uniformly, the way `TitanHZZ-rsos` and
//! `HelixOS-Org-helix` wire a serial/VGA sink behind the `log` facade.

use log::{Level, Metadata, Record};

struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= Level::Trace
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        crate::serial_println!("[{:<5}] {}", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Installs the serial-backed logger as the `log` crate's global logger.
///
/// Must be called exactly once, early in kernel init, before any subsystem
/// uses the `log` macros.
pub fn init() {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Trace))
        .unwrap_or(());
}
