//! The process control block and its lifecycle states.
//!
//! Field set mirrors `original_source/kernel/proc/proc.h`'s `process_t`,
//! trimmed to what spec §3/§4.7 actually specify (the original's file
//! descriptor table and image relocation bookkeeping live elsewhere, per
//! spec's explicit file-I/O non-goal).

use crate::config::{LOW_WINDOW_DIR_SLOTS, PROC_NAME_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Unused,
    Ready,
    Running,
    Blocked,
    Zombie,
}

/// One process's complete kernel-visible state.
#[derive(Clone, Copy)]
pub struct Pcb {
    pub pid: u32,
    pub parent_pid: u32,
    pub name: [u8; PROC_NAME_MAX],
    pub entry: u32,
    pub image_base: u32,
    pub image_size: u32,
    pub stack_base: u32,
    pub stack_size: u32,
    pub kstack_base: u32,
    pub kstack_size: u32,
    pub context_esp: u32,
    pub page_dir_virt: u32,
    pub page_dir_phys: u32,
    /// Kernel-heap virtual address of each cloned low-window page table
    /// this process's directory owns (zero entries are unused slots);
    /// freed alongside `page_dir_virt` on reap. See
    /// `memory::paging::create_user_dir`/`destroy_user_dir`.
    pub low_tables: [u32; LOW_WINDOW_DIR_SLOTS],
    pub exit_code: i32,
    pub vfork_parent_pid: u32,
    pub state: ProcessState,
    pub is_kernel: bool,
}

impl Pcb {
    pub const fn unused() -> Self {
        Self {
            pid: 0,
            parent_pid: 0,
            name: [0; PROC_NAME_MAX],
            entry: 0,
            image_base: 0,
            image_size: 0,
            stack_base: 0,
            stack_size: 0,
            kstack_base: 0,
            kstack_size: 0,
            context_esp: 0,
            page_dir_virt: 0,
            page_dir_phys: 0,
            low_tables: [0; LOW_WINDOW_DIR_SLOTS],
            exit_code: 0,
            vfork_parent_pid: 0,
            state: ProcessState::Unused,
            is_kernel: false,
        }
    }

    pub fn is_runnable(&self) -> bool {
        matches!(self.state, ProcessState::Ready | ProcessState::Running)
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = [0; PROC_NAME_MAX];
        let bytes = name.as_bytes();
        let len = bytes.len().min(PROC_NAME_MAX - 1);
        self.name[..len].copy_from_slice(&bytes[..len]);
    }

    /// Renders the name as a `&str`, stopping at the first NUL. Falls
    /// back to `"unnamed"` for a process that never got a name, matching
    /// `proc_list`'s behavior in the original.
    #[must_use]
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(PROC_NAME_MAX);
        core::str::from_utf8(&self.name[..len]).unwrap_or("unnamed")
    }
}
