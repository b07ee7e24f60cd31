/*
 * Context-Switch Bookkeeping and Initial Stack Frames
 *
 * The CPU-side half of a context switch (saving and restoring the
 * callee-saved register files) belongs to the board port. This module
 * owns everything the port needs decided for it:
 *
 * - the work-mode state machine (kernel stack vs user stack)
 * - slice-timer bookkeeping and the per-slice time measurement
 * - the stack pre-image a fresh thread starts from
 *
 * Switch sequence:
 * 1. A system call or the slice timer asks for kernel mode
 *    (`request_kernel_mode`), which pends the switch interrupt.
 * 2. The port's switch handler saves the callee-saved integer and float
 *    registers onto the active stack and calls `switch_context`.
 * 3. `switch_context` flips the mode. Leaving user mode stops the slice
 *    timer and records how long the thread actually ran; entering user
 *    mode re-arms the timer with the configured period.
 * 4. The port restores the registers of the stack the kernel selected
 *    and returns from the interrupt.
 *
 * Initial stack pre-image (what the restore path finds for a thread
 * that has never run): program-status word with the thumb bit, the
 * entry point as return address, and a trap routine as link register so
 * a thread that falls off its entry function terminates cleanly. The
 * general-purpose and floating-point registers start as zeros.
 */

use crate::config::THREADS_HEAP_SIZE;
use crate::memory::Arena;
use crate::platform;
use crate::scheduler::thread::ThreadEntry;

/// Status word a fresh thread starts with: thumb bit set, no flags.
pub const INIT_XPSR: u32 = 0x0100_0000;

/// Words in the initial frame: 18 float (reserved, FPSCR, S16..S31) +
/// 8 integer (xPSR, PC, LR, R12, R3..R0).
pub const INIT_FRAME_WORDS: u32 = 26;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkMode {
    Kernel,
    User,
}

/// The shared globals of the switch machinery. One instance lives in
/// the kernel singleton; the port reads the stack-pointer fields when it
/// programs the CPU.
#[derive(Debug, Clone, Copy)]
pub struct MainGlobals {
    pub mode: WorkMode,
    /// The pending switch was caused by the slice timer, not a call.
    pub switched_by_tick: bool,
    /// Microseconds the interrupted thread ran in its last slice.
    pub thr_dt_us: u32,
    /// Configured slice period.
    pub time_period_us: u32,
    /// Saved stack pointer of the interrupted user thread (arena offset).
    pub user_sp: u32,
    /// Saved kernel stack pointer.
    pub kernel_sp: u32,
}

impl MainGlobals {
    pub fn new(time_period_us: u32) -> Self {
        MainGlobals {
            mode: WorkMode::Kernel,
            switched_by_tick: false,
            thr_dt_us: 0,
            time_period_us,
            user_sp: 0,
            kernel_sp: 0,
        }
    }
}

/// Ask for kernel mode (system calls and the tick handler).
pub fn request_kernel_mode(mgv: &mut MainGlobals, by_tick: bool) {
    if mgv.mode != WorkMode::Kernel {
        mgv.switched_by_tick = by_tick;
        platform::port().pend_switch();
    }
}

/// Ask for user mode (end of a kernel pass with a thread selected).
pub fn request_user_mode(mgv: &MainGlobals) {
    if mgv.mode != WorkMode::User {
        platform::port().pend_switch();
    }
}

/// The mode flip the port's switch handler performs between saving and
/// restoring register files.
pub fn switch_context(mgv: &mut MainGlobals) {
    let p = platform::port();
    match mgv.mode {
        WorkMode::Kernel => {
            mgv.mode = WorkMode::User;
            p.start_slice_timer(mgv.time_period_us);
        }
        WorkMode::User => {
            p.stop_slice_timer();
            mgv.thr_dt_us = if mgv.switched_by_tick {
                mgv.time_period_us
            } else {
                p.read_slice_us()
            };
            mgv.switched_by_tick = false;
            mgv.mode = WorkMode::Kernel;
        }
    }
}

/// Build the initial stack image for a thread that has never run.
///
/// The region is cleared first so the watermark scan sees a fresh
/// stack even when the arena block was used before. Returns the initial
/// stack pointer (arena offset).
pub fn init_thread_stack(
    arena: &mut Arena<THREADS_HEAP_SIZE>,
    base: u32,
    stack_size: u32,
    entry: ThreadEntry,
) -> u32 {
    arena.bytes_mut(base, stack_size).fill(0);

    // Top of stack, aligned down to 8 bytes.
    let mut sp = (base + stack_size - 1) / 8 * 8;

    let mut push = |arena: &mut Arena<THREADS_HEAP_SIZE>, val: u32| {
        sp -= 4;
        arena.write_u32(sp, val);
    };

    // Float half of the frame: reserved word, FPSCR, S16..S31.
    push(arena, 0);
    push(arena, 0);
    for _ in 0..16 {
        push(arena, 0);
    }

    // Integer half: xPSR, PC, LR, R12, R3..R0.
    push(arena, INIT_XPSR);
    push(arena, entry as usize as u32);
    push(arena, thread_return_trap as usize as u32);
    for _ in 0..5 {
        push(arena, 0);
    }

    sp
}

/// Where a thread lands if its entry function returns. Terminating over
/// the system-call gate is the clean exit; the loop only exists for the
/// window until the reaper takes the stack away.
extern "C" fn thread_return_trap() {
    loop {
        let _ = crate::api::terminate(0);
    }
}
