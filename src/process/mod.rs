//! Process table and lifecycle: create, fork, exec, exit, kill, reap
//! (spec §4.7).
//!
//! Grounded in `original_source/kernel/proc/proc.c`'s single global
//! `proc_table`/`current_proc` design, reworked around a `spin::Mutex`
//! instead of raw globals plus manual `irq_save`/`irq_restore`.

pub mod elf;
pub mod pcb;
pub mod reaper;
pub mod scheduler;

use crate::config::{KERNEL_STACK_SIZE, LOW_WINDOW_DIR_SLOTS, MAX_PROCESSES, USER_CODE_SELECTOR, USER_DATA_SELECTOR, USER_STACK_SIZE, USER_STACK_TOP};
use crate::error::{KernelError, KernelResult};
use crate::interrupts::TrapFrame;
use crate::memory::{heap, paging};
use core::sync::atomic::{AtomicU32, Ordering};
use pcb::{Pcb, ProcessState};
use spin::Mutex;

/// The fixed-size process table plus the bookkeeping `proc_table`'s
/// sibling globals held in the original: current index, next pid, and
/// the reaper/foreground tracking state.
struct ProcessManager {
    table: [Pcb; MAX_PROCESSES],
    current_index: Option<usize>,
    next_pid: u32,
}

impl ProcessManager {
    const fn new() -> Self {
        Self {
            table: [Pcb::unused(); MAX_PROCESSES],
            current_index: None,
            next_pid: 1,
        }
    }

    fn find_free_slot(&self) -> Option<usize> {
        self.table
            .iter()
            .position(|p| matches!(p.state, ProcessState::Unused | ProcessState::Zombie))
    }

    fn current(&self) -> Option<&Pcb> {
        self.current_index.map(|i| &self.table[i])
    }

    fn current_mut(&mut self) -> Option<&mut Pcb> {
        match self.current_index {
            Some(i) => Some(&mut self.table[i]),
            None => None,
        }
    }

    fn lookup_mut(&mut self, pid: u32) -> Option<&mut Pcb> {
        self.table.iter_mut().find(|p| p.pid == pid && !matches!(p.state, ProcessState::Unused))
    }

    fn find_next_runnable(&self, start: Option<usize>) -> Option<usize> {
        let start = start.map_or(0, |i| i + 1);
        for offset in 0..MAX_PROCESSES {
            let idx = (start + offset) % MAX_PROCESSES;
            let p = &self.table[idx];
            if p.is_runnable() && p.context_esp != 0 {
                return Some(idx);
            }
        }
        None
    }
}

static MANAGER: Mutex<ProcessManager> = Mutex::new(ProcessManager::new());
static FOREGROUND_PID: AtomicU32 = AtomicU32::new(0);
static KILL_REQUESTED_PID: AtomicU32 = AtomicU32::new(0);

/// Clears the table. Called once during boot, before any process exists.
pub fn init() {
    let mut mgr = MANAGER.lock();
    *mgr = ProcessManager::new();
    FOREGROUND_PID.store(0, Ordering::SeqCst);
    KILL_REQUESTED_PID.store(0, Ordering::SeqCst);
}

/// Builds a fresh kernel-mode PCB (own address space = the kernel's, own
/// kernel stack, entry point running at ring 0) and marks it ready to
/// run. Used for the reaper thread and any other kernel-side worker.
pub fn spawn_kernel(name: &str, entry: extern "C" fn() -> !) -> KernelResult<u32> {
    let mut mgr = MANAGER.lock();
    let slot = mgr.find_free_slot().ok_or(KernelError::ProcessTableFull)?;

    let kstack_size = KERNEL_STACK_SIZE;
    let kstack_base = heap::alloc(kstack_size as usize, 16)
        .ok_or(KernelError::HeapExhausted)?
        .as_ptr() as u32;

    let pid = mgr.next_pid;
    mgr.next_pid += 1;

    let p = &mut mgr.table[slot];
    *p = Pcb::unused();
    p.pid = pid;
    p.set_name(name);
    p.entry = entry as usize as u32;
    p.is_kernel = true;
    p.kstack_base = kstack_base;
    p.kstack_size = kstack_size;
    p.state = ProcessState::Ready;
    p.context_esp = build_kernel_frame(kstack_base, kstack_size, entry as usize as u32);

    Ok(pid)
}

fn build_kernel_frame(kstack_base: u32, kstack_size: u32, entry: u32) -> u32 {
    use crate::config::{INITIAL_EFLAGS, KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};

    let kstack_top = kstack_base + kstack_size;
    let frame_addr = kstack_top - core::mem::size_of::<TrapFrame>() as u32;
    // SAFETY: `frame_addr` lies within the kernel stack we just allocated
    // and own exclusively.
    unsafe {
        let frame = &mut *(frame_addr as *mut TrapFrame);
        *frame = core::mem::zeroed();
        frame.ds = u32::from(KERNEL_DATA_SELECTOR);
        frame.eip = entry;
        frame.cs = u32::from(KERNEL_CODE_SELECTOR);
        frame.eflags = INITIAL_EFLAGS;
        frame.user_esp = kstack_top;
        frame.user_ss = u32::from(KERNEL_DATA_SELECTOR);
    }
    frame_addr
}

/// Builds the initial user-mode trap frame for a freshly ELF-loaded
/// process: ring-3 segment selectors, a private page directory, and a
/// dedicated user stack mapped at the top of the user address range.
fn spawn_user(
    name: &str,
    entry: u32,
    image_base: u32,
    image_size: u32,
    page_dir_virt: u32,
    page_dir_phys: u32,
    low_tables: [u32; LOW_WINDOW_DIR_SLOTS],
) -> KernelResult<u32> {
    let mut mgr = MANAGER.lock();
    let slot = mgr.find_free_slot().ok_or(KernelError::ProcessTableFull)?;

    let kstack_size = KERNEL_STACK_SIZE;
    let kstack_base = heap::alloc(kstack_size as usize, 16)
        .ok_or(KernelError::HeapExhausted)?
        .as_ptr() as u32;

    let stack_size = USER_STACK_SIZE;
    let stack_base = USER_STACK_TOP - stack_size;

    let pid = mgr.next_pid;
    mgr.next_pid += 1;

    let p = &mut mgr.table[slot];
    *p = Pcb::unused();
    p.pid = pid;
    p.set_name(name);
    p.entry = entry;
    p.image_base = image_base;
    p.image_size = image_size;
    p.is_kernel = false;
    p.kstack_base = kstack_base;
    p.kstack_size = kstack_size;
    p.stack_base = stack_base;
    p.stack_size = stack_size;
    p.page_dir_virt = page_dir_virt;
    p.page_dir_phys = page_dir_phys;
    p.low_tables = low_tables;
    p.state = ProcessState::Ready;

    let prev_dir_phys = paging::current_dir_phys();
    drop(mgr);
    paging::set_current_dir(page_dir_phys);
    let map_result = (|| {
        for offset in (0..stack_size).step_by(crate::config::PAGE_SIZE as usize) {
            paging::map_alloc(
                stack_base + offset,
                paging::PageFlags::PRESENT | paging::PageFlags::WRITABLE | paging::PageFlags::USER,
            )?;
        }
        // SAFETY: the stack range just mapped above is writable in the
        // address space CR3 now points at.
        let initial_esp = unsafe { write_exit_stub(stack_base + stack_size) };
        Ok::<u32, KernelError>(initial_esp)
    })();
    paging::set_current_dir(prev_dir_phys);
    let initial_esp = map_result?;

    let mut mgr = MANAGER.lock();
    let p = &mut mgr.table[slot];
    p.context_esp = build_user_frame(p.kstack_base, p.kstack_size, entry, initial_esp);

    Ok(pid)
}

/// Writes the fixed 11-byte "exit stub" (`mov eax,8; xor ebx,ebx; int
/// 0xA5; jmp $`) just below the top of a user stack, and returns the
/// initial user `esp`: one word below the stub, holding the stub's own
/// address as a synthetic return address. A user entry point that
/// returns naturally (rather than calling `exit` itself) pops that
/// address and falls into the stub, which invokes `exit(0)`.
///
/// # Safety
///
/// The caller must have already mapped `[stack_top - 16, stack_top)`
/// writable in the currently loaded address space.
unsafe fn write_exit_stub(stack_top: u32) -> u32 {
    const STUB: [u8; 11] = [
        0xB8, 0x08, 0x00, 0x00, 0x00, // mov eax, 8 (SYS_EXIT)
        0x31, 0xDB, // xor ebx, ebx
        0xCD, 0xA5, // int 0xA5
        0xEB, 0xFE, // jmp $
    ];
    let stub_addr = stack_top - STUB.len() as u32;
    core::ptr::copy_nonoverlapping(STUB.as_ptr(), stub_addr as *mut u8, STUB.len());

    let initial_esp = stub_addr - 4;
    *(initial_esp as *mut u32) = stub_addr;
    initial_esp
}

fn build_user_frame(kstack_base: u32, kstack_size: u32, entry: u32, user_esp: u32) -> u32 {
    use crate::config::INITIAL_EFLAGS;

    let kstack_top = kstack_base + kstack_size;
    let frame_addr = kstack_top - core::mem::size_of::<TrapFrame>() as u32;
    // SAFETY: `frame_addr` lies within the kernel stack we just allocated
    // and own exclusively.
    unsafe {
        let frame = &mut *(frame_addr as *mut TrapFrame);
        *frame = core::mem::zeroed();
        frame.ds = u32::from(USER_DATA_SELECTOR);
        frame.eip = entry;
        frame.cs = u32::from(USER_CODE_SELECTOR);
        frame.eflags = INITIAL_EFLAGS;
        frame.user_esp = user_esp;
        frame.user_ss = u32::from(USER_DATA_SELECTOR);
    }
    frame_addr
}

/// Loads an ELF32 image into a fresh private address space and spawns it
/// as a new user process. Ties together [`paging::create_user_dir`] and
/// [`elf::load`] the way `proc_exec`/`proc_spawn` do in the original:
/// build the space first, then load into it, then hand the result to
/// [`spawn_user`].
pub fn exec_elf(name: &str, data: &[u8]) -> KernelResult<u32> {
    let (page_dir_virt, page_dir_phys, low_tables) = paging::create_user_dir()?;
    let prev = paging::current_dir_phys();
    paging::set_current_dir(page_dir_phys);
    // SAFETY: CR3 was just switched to the freshly built directory above.
    let loaded = unsafe { elf::load(data) };
    paging::set_current_dir(prev);
    let loaded = loaded?;
    spawn_user(name, loaded.entry, loaded.base, loaded.size, page_dir_virt, page_dir_phys, low_tables)
}

/// Duplicates the currently running user process: a fresh page
/// directory, a physical (not copy-on-write) copy of its image and user
/// stack, and a copy of `frame` with `eax` zeroed as the child's saved
/// context, per spec §4.7's fork semantics.
///
/// Grounded in `proc_fork`'s eager-copy behavior; simplified by this
/// kernel's per-process page directories, which let the child's image
/// and stack be copied at the *same* virtual addresses as the parent
/// (so, unlike the original, no EBP-chain fixup is needed — each
/// process's stack frames already point at valid addresses in its own
/// address space).
pub fn fork(frame: &TrapFrame, is_vfork: bool) -> KernelResult<u32> {
    let (parent_pid, parent_entry, parent_image_base, parent_image_size, parent_stack_base, parent_stack_size, parent_name) = {
        let mgr = MANAGER.lock();
        let p = mgr.current().ok_or(KernelError::NoSuchProcess)?;
        if p.is_kernel {
            return Err(KernelError::BadArgument);
        }
        (p.pid, p.entry, p.image_base, p.image_size, p.stack_base, p.stack_size, p.name)
    };

    let (child_dir_virt, child_dir_phys, child_low_tables) = paging::create_user_dir()?;
    let prev = paging::current_dir_phys();

    let copy_result: KernelResult<()> = (|| {
        let image_scratch = if parent_image_size > 0 {
            let buf = heap::alloc(parent_image_size as usize, 16).ok_or(KernelError::HeapExhausted)?;
            // SAFETY: parent's address space is still loaded (CR3 unchanged
            // at this point); `parent_image_base`/`parent_image_size` are
            // its own mapped range.
            unsafe { core::ptr::copy_nonoverlapping(parent_image_base as *const u8, buf.as_ptr(), parent_image_size as usize) };
            Some(buf)
        } else {
            None
        };
        let stack_scratch = if parent_stack_size > 0 {
            let buf = heap::alloc(parent_stack_size as usize, 16).ok_or(KernelError::HeapExhausted)?;
            // SAFETY: see above.
            unsafe { core::ptr::copy_nonoverlapping(parent_stack_base as *const u8, buf.as_ptr(), parent_stack_size as usize) };
            Some(buf)
        } else {
            None
        };

        paging::set_current_dir(child_dir_phys);
        let result = (|| {
            if let Some(buf) = image_scratch {
                paging::map_range_alloc(
                    parent_image_base,
                    parent_image_size,
                    paging::PageFlags::PRESENT | paging::PageFlags::WRITABLE | paging::PageFlags::USER,
                )?;
                // SAFETY: just mapped writable for exactly this many bytes.
                unsafe { core::ptr::copy_nonoverlapping(buf.as_ptr(), parent_image_base as *mut u8, parent_image_size as usize) };
            }
            if let Some(buf) = stack_scratch {
                paging::map_range_alloc(
                    parent_stack_base,
                    parent_stack_size,
                    paging::PageFlags::PRESENT | paging::PageFlags::WRITABLE | paging::PageFlags::USER,
                )?;
                // SAFETY: see above.
                unsafe { core::ptr::copy_nonoverlapping(buf.as_ptr(), parent_stack_base as *mut u8, parent_stack_size as usize) };
            }
            Ok(())
        })();
        paging::set_current_dir(prev);

        // SAFETY: both buffers were allocated from the kernel heap just above.
        unsafe {
            if let Some(buf) = image_scratch {
                heap::free(buf.as_ptr());
            }
            if let Some(buf) = stack_scratch {
                heap::free(buf.as_ptr());
            }
        }
        result
    })();
    copy_result?;

    let kstack_size = KERNEL_STACK_SIZE;
    let kstack_base = heap::alloc(kstack_size as usize, 16)
        .ok_or(KernelError::HeapExhausted)?
        .as_ptr() as u32;
    let kstack_top = kstack_base + kstack_size;
    let child_frame_addr = kstack_top - core::mem::size_of::<TrapFrame>() as u32;
    // SAFETY: freshly allocated kernel stack, owned exclusively here.
    unsafe {
        let child_frame = &mut *(child_frame_addr as *mut TrapFrame);
        *child_frame = *frame;
        child_frame.eax = 0;
    }

    let mut mgr = MANAGER.lock();
    let slot = mgr.find_free_slot().ok_or(KernelError::ProcessTableFull)?;
    let pid = mgr.next_pid;
    mgr.next_pid += 1;

    let child = &mut mgr.table[slot];
    *child = Pcb::unused();
    child.pid = pid;
    child.parent_pid = parent_pid;
    child.vfork_parent_pid = if is_vfork { parent_pid } else { 0 };
    child.name = parent_name;
    child.entry = parent_entry;
    child.image_base = parent_image_base;
    child.image_size = parent_image_size;
    child.stack_base = parent_stack_base;
    child.stack_size = parent_stack_size;
    child.is_kernel = false;
    child.kstack_base = kstack_base;
    child.kstack_size = kstack_size;
    child.page_dir_virt = child_dir_virt;
    child.page_dir_phys = child_dir_phys;
    child.low_tables = child_low_tables;
    child.context_esp = child_frame_addr;
    child.state = ProcessState::Ready;

    Ok(pid)
}

/// The currently running process's pid, or 0 if none (early boot).
#[must_use]
pub fn current_pid() -> u32 {
    MANAGER.lock().current().map_or(0, |p| p.pid)
}

/// Whether the currently running process is a user (ring 3) process.
#[must_use]
pub fn current_is_user() -> bool {
    MANAGER.lock().current().is_some_and(|p| !p.is_kernel)
}

/// The currently running process's name, copied out to avoid holding the
/// process table lock across a log call.
#[must_use]
pub fn current_name() -> heapless_name::Name {
    MANAGER.lock().current().map_or(heapless_name::Name::unnamed(), |p| heapless_name::Name::from_pcb(p))
}

/// Minimal fixed-capacity string so logging a process name doesn't need
/// to hold the process table lock or allocate.
pub mod heapless_name {
    use crate::config::PROC_NAME_MAX;
    use core::fmt;

    pub struct Name {
        bytes: [u8; PROC_NAME_MAX],
        len: usize,
    }

    impl Name {
        pub fn unnamed() -> Self {
            let mut bytes = [0; PROC_NAME_MAX];
            bytes[..7].copy_from_slice(b"unnamed");
            Self { bytes, len: 7 }
        }

        pub fn from_pcb(p: &super::Pcb) -> Self {
            let s = p.name_str();
            let mut bytes = [0; PROC_NAME_MAX];
            let len = s.len().min(PROC_NAME_MAX);
            bytes[..len].copy_from_slice(&s.as_bytes()[..len]);
            Self { bytes, len }
        }
    }

    impl fmt::Display for Name {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("?"))
        }
    }
}

pub fn set_foreground_pid(pid: u32) {
    FOREGROUND_PID.store(pid, Ordering::SeqCst);
}

#[must_use]
pub fn foreground_pid() -> u32 {
    FOREGROUND_PID.load(Ordering::SeqCst)
}

#[must_use]
pub fn is_foreground_pid(pid: u32) -> bool {
    pid != 0 && FOREGROUND_PID.load(Ordering::SeqCst) == pid
}

/// Marks the current process exited with `exit_code`, waking a blocked
/// parent if one is waiting on it (either via `vfork` or a `waitpid`
/// call). Does not itself switch away from the process; the caller
/// (syscall handler or exception policy) is responsible for calling
/// [`scheduler::schedule`] or redirecting to [`exit_trampoline`] next.
pub fn exit_current(exit_code: u32) {
    let mut mgr = MANAGER.lock();
    let (parent_pid, pid) = match mgr.current_mut() {
        Some(p) => {
            p.exit_code = exit_code as i32;
            p.state = ProcessState::Zombie;
            (p.parent_pid, p.pid)
        }
        None => return,
    };
    if is_foreground_pid(pid) {
        set_foreground_pid(0);
    }
    if parent_pid != 0 {
        if let Some(parent) = mgr.lookup_mut(parent_pid) {
            if parent.state == ProcessState::Blocked {
                parent.state = ProcessState::Ready;
            }
        }
    }
}

/// Blocks the calling process until the child it just `vfork`ed exits,
/// per spec §4.7's vfork-style parent-block variant.
pub fn block_current_for_vfork(_child_pid: u32) -> KernelResult<()> {
    let mut mgr = MANAGER.lock();
    let p = mgr.current_mut().ok_or(KernelError::NoSuchProcess)?;
    p.state = ProcessState::Blocked;
    Ok(())
}

/// Blocks the calling process until a matching child (`pid`, or any
/// child if `pid == 0`) becomes a zombie, for `waitpid`.
pub fn block_current_for_waitpid(_pid: u32) -> KernelResult<()> {
    let mut mgr = MANAGER.lock();
    let p = mgr.current_mut().ok_or(KernelError::NoSuchProcess)?;
    p.state = ProcessState::Blocked;
    Ok(())
}

/// Looks for a zombie child of `parent_pid` matching `pid` (or any
/// child, if `pid == 0`); if found, reclaims its resources immediately
/// and returns its `(pid, exit_code)`. Returns `Ok(None)` if no matching
/// child has exited yet (the caller should block and retry), and
/// `Err(NoSuchProcess)` if `parent_pid` has no child matching `pid` at
/// all (exited or not).
pub fn reap_child(parent_pid: u32, pid: u32) -> KernelResult<Option<(u32, i32)>> {
    let mut mgr = MANAGER.lock();
    let has_any_match = mgr
        .table
        .iter()
        .any(|p| p.parent_pid == parent_pid && !matches!(p.state, ProcessState::Unused) && (pid == 0 || p.pid == pid));
    if !has_any_match {
        return Err(KernelError::NoSuchProcess);
    }
    let slot = mgr
        .table
        .iter()
        .position(|p| p.parent_pid == parent_pid && p.state == ProcessState::Zombie && (pid == 0 || p.pid == pid));
    let Some(slot) = slot else { return Ok(None) };

    let p = &mut mgr.table[slot];
    let found_pid = p.pid;
    let exit_code = p.exit_code;
    // SAFETY: a zombie process is no longer referenced by any live
    // context, and its directory is privately owned (never shared with
    // another PCB).
    unsafe { free_process_resources(p) };
    *p = Pcb::unused();

    Ok(Some((found_pid, exit_code)))
}

/// Frees every resource a zombie PCB owns: the user stack and ELF image
/// frames and the private page-table frames backing them (if a user
/// process), the cloned low-window tables and the page directory itself
/// (if a user process), and the kernel stack. Spec line 201 requires all
/// four of these off a reaped process; see `DESIGN.md` for why individual
/// frames, not just the top-level directory, must be walked.
///
/// # Safety
///
/// `p` must be a zombie slot that is not the currently running process and
/// whose page directory is not shared with any other live PCB.
unsafe fn free_process_resources(p: &Pcb) {
    if !p.is_kernel && p.page_dir_phys != 0 {
        paging::destroy_user_dir(p.page_dir_phys);
        for &table_virt in &p.low_tables {
            if table_virt != 0 {
                heap::free(table_virt as *mut u8);
            }
        }
    }
    if p.page_dir_virt != 0 {
        heap::free(p.page_dir_virt as *mut u8);
    }
    if p.kstack_base != 0 {
        heap::free(p.kstack_base as *mut u8);
    }
}

/// Requests that `pid` be killed. If it is the currently running
/// process, the kill is deferred to the next [`handle_pending_kill`]
/// check (mirrors the original's `kill_requested_pid` one-shot flag, so
/// a process can never be torn down underneath the instruction that
/// requested its own death).
pub fn kill(pid: u32, force: bool) -> KernelResult<()> {
    if pid == 0 {
        return Err(KernelError::BadArgument);
    }
    let mut mgr = MANAGER.lock();
    if mgr.current().is_some_and(|p| p.pid == pid) {
        if mgr.current().is_some_and(|p| p.is_kernel) && !force {
            return Err(KernelError::BadArgument);
        }
        KILL_REQUESTED_PID.store(pid, Ordering::SeqCst);
        return Ok(());
    }
    let target = mgr.lookup_mut(pid).ok_or(KernelError::NoSuchProcess)?;
    if target.is_kernel && !force {
        return Err(KernelError::BadArgument);
    }
    target.exit_code = 0;
    target.state = ProcessState::Zombie;
    let was_foreground = is_foreground_pid(pid);
    drop(mgr);
    if was_foreground {
        set_foreground_pid(0);
    }
    Ok(())
}

pub fn request_self_kill() {
    KILL_REQUESTED_PID.store(current_pid(), Ordering::SeqCst);
}

/// Called at the end of every IRQ dispatch: if the running process has a
/// pending kill request targeting itself, tears it down and rewrites
/// `frame` to resume either the kernel exit trampoline (foreground) or
/// whatever the scheduler picks next.
pub fn handle_pending_kill(frame: &mut TrapFrame) {
    let requested = KILL_REQUESTED_PID.load(Ordering::SeqCst);
    if requested == 0 || requested != current_pid() {
        return;
    }
    let foreground = is_foreground_pid(requested);
    KILL_REQUESTED_PID.store(0, Ordering::SeqCst);
    exit_current(0);
    if foreground || !scheduler::schedule(frame, false) {
        redirect_to_exit_trampoline(frame);
    }
}

/// Rewrites `frame` so execution resumes in the kernel exit trampoline
/// (used when a killed/faulted process was foreground, or there is
/// nothing else runnable to schedule).
pub fn redirect_to_exit_trampoline(frame: &mut TrapFrame) {
    use crate::config::{KERNEL_CODE_SELECTOR, KERNEL_DATA_SELECTOR};
    frame.eip = exit_trampoline as usize as u32;
    frame.cs = u32::from(KERNEL_CODE_SELECTOR);
    frame.ds = u32::from(KERNEL_DATA_SELECTOR);
}

/// Reclaims every zombie process's resources — user stack, ELF image,
/// kernel stack, and (if user) page directory, per spec line 201 — skipping
/// the currently running one and any zombie that still has a live parent
/// (that parent is expected to collect it through [`reap_child`]/`waitpid`).
pub fn reap() {
    let mut mgr = MANAGER.lock();
    let current_kstack = mgr.current().map(|p| (p.kstack_base, p.kstack_size));
    for p in &mut mgr.table {
        if p.state != ProcessState::Zombie {
            continue;
        }
        if p.parent_pid != 0 {
            continue;
        }
        if let Some((base, size)) = current_kstack {
            if p.kstack_base == base && p.kstack_size == size {
                continue;
            }
        }
        // SAFETY: a zombie process is no longer referenced by any live
        // context, and its directory is privately owned.
        unsafe { free_process_resources(p) };
        *p = Pcb::unused();
    }
}

/// The kernel-mode exit trampoline: what a killed/foreground process's
/// trap frame is rewritten to resume into. Simply halts until the next
/// timer tick reschedules away from it, matching `proc_exit_trampoline`'s
/// naked `hlt` loop in the original.
pub extern "C" fn exit_trampoline() -> ! {
    loop {
        // SAFETY: re-enabling interrupts here is required for the timer
        // to ever schedule something else; nothing else runs on this
        // "process" so there is nothing to corrupt.
        unsafe { core::arch::asm!("sti", "hlt", options(nomem, nostack)) };
    }
}
