//! The reaper kernel thread, and the watchdog that respawns it.
//!
//! Shape grounded in `original_source/kernel/proc/sysmgr.c`'s
//! `sysmgr_idle_loop` (spawn once, then loop: wait for an interrupt,
//! reap, yield) with the original's shell/USB/workqueue concerns left
//! out — this kernel has no shell or device hot-plug to service. The
//! watchdog reuses the same spawn-a-kernel-thread/poll-on-wake shape to
//! keep the reaper itself alive.

const REAPER_NAME: &str = "orion-sysmgr";
const WATCHDOG_NAME: &str = "orion-sysmgr-watchdog";

/// Spawns the reaper thread and its watchdog if they are not already
/// running. Call once during boot, after interrupts are enabled.
pub fn start() {
    spawn_reaper();
    if super::MANAGER.lock().table.iter().any(|p| p.is_kernel && p.name_str() == WATCHDOG_NAME && p.is_runnable()) {
        return;
    }
    match super::spawn_kernel(WATCHDOG_NAME, watchdog_loop) {
        Ok(pid) => log::info!("reaper watchdog: started as pid {pid}"),
        Err(e) => log::error!("reaper watchdog: failed to start: {e}"),
    }
}

fn spawn_reaper() {
    if super::MANAGER.lock().table.iter().any(|p| p.is_kernel && p.name_str() == REAPER_NAME && p.is_runnable()) {
        return;
    }
    match super::spawn_kernel(REAPER_NAME, idle_loop) {
        Ok(pid) => log::info!("reaper: started as pid {pid}"),
        Err(e) => log::error!("reaper: failed to start: {e}"),
    }
}

extern "C" fn idle_loop() -> ! {
    loop {
        // SAFETY: halting with interrupts enabled just waits for the next
        // tick; this thread owns no other resource that could be
        // corrupted by servicing an interrupt here.
        unsafe { core::arch::asm!("sti", "hlt", options(nomem, nostack)) };
        super::reap();
    }
}

/// Watches the reaper's slot and spawns a fresh one the moment it is no
/// longer runnable (exited or reaped out of the table entirely). A
/// dedicated thread rather than folding this check into the scheduler or
/// `reap()` itself, since those run on the IRQ path and shouldn't carry
/// the spawn-on-demand logic.
extern "C" fn watchdog_loop() -> ! {
    loop {
        // SAFETY: same as `idle_loop` above.
        unsafe { core::arch::asm!("sti", "hlt", options(nomem, nostack)) };
        let reaper_alive =
            super::MANAGER.lock().table.iter().any(|p| p.is_kernel && p.name_str() == REAPER_NAME && p.is_runnable());
        if !reaper_alive {
            log::warn!("reaper watchdog: reaper not running, respawning");
            spawn_reaper();
        }
    }
}
