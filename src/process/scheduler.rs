//! Round-robin preemptive scheduler driven by the timer IRQ (spec §4.8).
//!
//! Ground truth is `original_source/kernel/proc/proc.c`'s
//! `proc_schedule`/`proc_find_next`/`sched_next_esp` trio: picking the
//! next runnable slot never allocates or blocks, and the actual stack
//! switch happens by writing the chosen process's saved `context_esp`
//! into `sched_next_esp`, which `interrupts::stubs::isr_common_stub`
//! reads on its way out of the trap.

use super::pcb::ProcessState;
use super::MANAGER;
use crate::config::TIME_SLICE_TICKS;
use crate::gdt;
use crate::interrupts::TrapFrame;
use crate::memory::paging;
use core::sync::atomic::{AtomicU32, Ordering};

/// Read by `isr_common_stub` after every trap dispatch. Nonzero means
/// "switch the kernel stack to this address before returning".
#[no_mangle]
pub static mut sched_next_esp: u32 = 0;

static TICKS_THIS_SLICE: AtomicU32 = AtomicU32::new(0);

/// Picks the next runnable process (round-robin from the current slot)
/// and arranges for the trap about to return to resume it instead of the
/// process that was interrupted.
///
/// If `save_current` is true, the interrupted process's live register
/// state (`frame`) is copied into its own PCB first, so it can resume
/// exactly here next time it is picked. Pass `false` when the current
/// process has already been torn down (exited/killed) and must not be
/// resumed.
///
/// Returns `false` if there is nothing else runnable (the caller should
/// fall back to the exit trampoline).
pub fn schedule(frame: &mut TrapFrame, save_current: bool) -> bool {
    let mut mgr = MANAGER.lock();

    let next = match mgr.find_next_runnable(mgr.current_index) {
        Some(n) => n,
        None => return false,
    };
    if Some(next) == mgr.current_index {
        return false;
    }

    if save_current {
        if let Some(cur) = mgr.current_mut() {
            if cur.state == ProcessState::Running {
                cur.context_esp = frame as *mut TrapFrame as u32;
                cur.state = ProcessState::Ready;
            }
        }
    } else if let Some(cur) = mgr.current_mut() {
        if cur.state == ProcessState::Running {
            cur.state = ProcessState::Ready;
        }
    }

    mgr.current_index = Some(next);
    let p = &mut mgr.table[next];
    p.state = ProcessState::Running;
    let next_esp = p.context_esp;
    let kstack_top = p.kstack_base + p.kstack_size;
    let page_dir_phys = if p.is_kernel { None } else { Some(p.page_dir_phys) };
    drop(mgr);

    gdt::set_kernel_stack(kstack_top);
    if let Some(phys) = page_dir_phys {
        paging::set_current_dir(phys);
    }

    // SAFETY: single-core kernel; this write only races with the stub's
    // own read of the same static, which happens strictly after this
    // function returns on the same core.
    unsafe { sched_next_esp = next_esp };
    TICKS_THIS_SLICE.store(0, Ordering::SeqCst);
    true
}

/// Timer tick handler: advances the current time slice, and forces a
/// reschedule once it expires. Registered against the timer IRQ by
/// [`crate::process::init`]'s caller during boot.
///
/// Kernel-process PIDs do not consume a slice — mirrors
/// `original_source/cpu/timer.c: timer_callback`'s early return for
/// `pid == 0`, so kernel threads (the reaper, its watchdog) are never
/// preempted mid-slice by this accounting path.
pub fn on_timer_tick(frame: &mut TrapFrame) {
    crate::interrupts::pit::tick();
    if MANAGER.lock().current().is_some_and(|p| p.is_kernel) {
        return;
    }
    let ticks = TICKS_THIS_SLICE.fetch_add(1, Ordering::SeqCst) + 1;
    if ticks < TIME_SLICE_TICKS {
        return;
    }
    schedule(frame, true);
}

/// Whether any process other than kernel-only workers is runnable.
#[must_use]
pub fn has_runnable_user_process() -> bool {
    let mgr = MANAGER.lock();
    mgr.table.iter().any(|p| p.is_runnable() && p.context_esp != 0 && !p.is_kernel)
}

/// Switches directly into `pid`'s saved context without waiting for a
/// trap. Used once at boot to enter the very first process: builds the
/// same `sched_next_esp` handoff the timer uses, then performs the
/// register-restore/`iretd` sequence by hand since there is no
/// in-flight trap to return from.
///
/// # Safety
///
/// Must only be called once, with interrupts disabled, after `pid`'s PCB
/// has a fully built initial trap frame at `context_esp`.
pub unsafe fn enter_first_process(pid: u32) -> ! {
    let (context_esp, kstack_top, page_dir_phys, is_kernel) = {
        let mut mgr = MANAGER.lock();
        let idx = mgr
            .table
            .iter()
            .position(|p| p.pid == pid)
            .expect("enter_first_process: no such pid");
        mgr.current_index = Some(idx);
        let p = &mut mgr.table[idx];
        p.state = ProcessState::Running;
        (p.context_esp, p.kstack_base + p.kstack_size, p.page_dir_phys, p.is_kernel)
    };

    gdt::set_kernel_stack(kstack_top);
    if !is_kernel {
        paging::set_current_dir(page_dir_phys);
    }

    core::arch::asm!(
        "mov esp, {esp}",
        "pop eax",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "popa",
        "add esp, 8",
        "iretd",
        esp = in(reg) context_esp,
        options(noreturn),
    );
}
