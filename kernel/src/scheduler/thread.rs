/*
 * Thread Control Block
 *
 * A thread is described by an index and a descriptor: the index is its
 * slot in the kernel's thread table, the descriptor is the opaque token
 * user code holds. This module owns the per-thread record and its state
 * machinery; the table itself lives in the kernel core.
 *
 * State vs mode:
 * - `state` is what the scheduler looks at each pass
 *   (SUSPEND / BLOCKED / READY / RUNNING)
 * - `mode` is the lifecycle position
 *   (NO_INIT -> INIT -> READY_TO_RUN -> RUN -> TERMINATING -> TERMINATED)
 * A TERMINATING thread is parked in SUSPEND, so it can never be
 * scheduled while the reaper is dismantling it.
 *
 * Blocking is the combination of two conditions:
 * - time-waiting: `wake_up_time != 0` (0 means sleep forever)
 * - lock-waiting: any bit set in the lock mask
 * A BLOCKED thread becomes READY when the wake time has passed AND the
 * lock mask is clear.
 */

use bitflags::bitflags;

use crate::config::{ERROR_STACK_WML, STACK_CHECK_PERIOD_MS, THR_NAME_LEN};
use crate::types::{FosError, INF_TIME, UserDesc, WRONG_USER_DESC, bounded};

/// Entry point of a user thread.
pub type ThreadEntry = fn();

bitflags! {
    /// Why a thread is lock-waiting. The low 16 bits are free for user
    /// purposes; the object bit is owned by the blocker machinery.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LockMask: u32 {
        const USER = 0x0000_FFFF;
        const OBJ  = 0x0001_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Suspend,
    Blocked,
    Ready,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadMode {
    NoInit,
    Init,
    ReadyToRun,
    Run,
    Terminating,
    Terminated,
}

/// How the thread's memory was obtained, which decides who frees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocMode {
    Auto,
    Static,
    Dynamic,
}

/// Constant settings fixed at creation.
#[derive(Debug, Clone, Copy)]
pub struct ThreadCSet {
    /// Stack base: payload offset of the thread's memory region in the
    /// threads arena.
    pub base_sp: u32,
    pub stack_size: u32,
    pub entry: ThreadEntry,
    pub alloc: AllocMode,
    /// The thread's own binary semaphore; taken by joiners, deleted at
    /// reap time which releases them.
    pub semb: UserDesc,
}

/// Mutable per-thread variables.
#[derive(Debug, Clone, Copy)]
pub struct ThreadVar {
    pub init_sp: u32,
    pub sp: u32,
    /// Absolute wake time in ms; 0 = no wake-on-time.
    pub wake_up_time: u32,
    pub lock: LockMask,
    pub terminate_code: i32,
    pub state: ThreadState,
    pub mode: ThreadMode,
}

/// Stack high-water-mark instrumentation.
///
/// `low`/`high` are offsets bounding the stack region. The watermark
/// scan walks from the low end towards the top looking for the first
/// non-zero byte; everything above it has been touched at some point.
#[derive(Debug, Clone, Copy, Default)]
pub struct StackDbg {
    pub low: u32,
    pub high: u32,
    pub size: u32,
    pub watermark: u32,
    pub max_usage_b: u32,
    pub max_usage_p: f32,
    ts: u32,
}

impl StackDbg {
    pub fn new(low: u32, size: u32) -> Self {
        StackDbg {
            low,
            high: low + size,
            size,
            watermark: low + size,
            max_usage_b: 0,
            max_usage_p: 0.0,
            ts: 0,
        }
    }

    /// Probe the stack usage; rate-limited to STACK_CHECK_PERIOD_MS.
    /// `stack` is the byte region [low, high). Returns true when usage
    /// crossed the warning level.
    pub fn probe(&mut self, stack: &[u8], now_ms: u32) -> bool {
        if now_ms.wrapping_sub(self.ts) < STACK_CHECK_PERIOD_MS {
            return false;
        }
        self.ts = now_ms;

        let first_used = stack.iter().position(|&b| b != 0);
        self.watermark = match first_used {
            Some(i) => self.low + i as u32,
            None => self.high,
        };
        self.max_usage_b = self.high - self.watermark;
        self.max_usage_p = self.max_usage_b as f32 / self.size as f32 * 100.0;

        self.max_usage_p > ERROR_STACK_WML
    }
}

/// Creation parameters as user code supplies them.
#[derive(Debug, Clone, Copy)]
pub struct ThreadUserInit {
    pub name: &'static str,
    pub entry: ThreadEntry,
    pub stack_size: u32,
    pub heap_size: u32,
    pub priority: u8,
    pub alloc: AllocMode,
}

pub struct Thread {
    pub name: heapless::String<THR_NAME_LEN>,
    pub user_desc: UserDesc,
    pub parent_desc: UserDesc,
    pub cset: ThreadCSet,
    pub priority: u8,
    pub var: ThreadVar,
    pub dbg: StackDbg,
    /// Kernel-arena allocation backing this control block, 0 for static
    /// threads.
    pub(crate) kmem: u32,
}

impl Thread {
    pub fn new(name: &str, cset: ThreadCSet, priority: u8) -> Self {
        Thread {
            name: bounded(name),
            user_desc: WRONG_USER_DESC,
            parent_desc: WRONG_USER_DESC,
            cset,
            priority,
            var: ThreadVar {
                init_sp: 0,
                sp: 0,
                wake_up_time: 0,
                lock: LockMask::empty(),
                terminate_code: 0,
                state: ThreadState::Suspend,
                mode: ThreadMode::Init,
            },
            dbg: StackDbg::new(cset.base_sp, cset.stack_size),
            kmem: 0,
        }
    }

    /// Registration: INIT -> READY_TO_RUN.
    pub fn set_registered(&mut self) -> Result<(), FosError> {
        if self.var.mode != ThreadMode::Init {
            return Err(FosError::WrongState);
        }
        self.var.mode = ThreadMode::ReadyToRun;
        Ok(())
    }

    /// Launch: READY_TO_RUN -> RUN; the scheduler may now pick it.
    pub fn set_running(&mut self) -> Result<(), FosError> {
        if self.var.mode != ThreadMode::ReadyToRun {
            return Err(FosError::WrongState);
        }
        self.var.mode = ThreadMode::Run;
        self.var.state = ThreadState::Ready;
        Ok(())
    }

    /// Mark for the reaper: READY_TO_RUN / RUN -> TERMINATING. The
    /// thread is parked so it cannot be scheduled again.
    pub fn set_terminate(&mut self, code: i32) -> Result<(), FosError> {
        match self.var.mode {
            ThreadMode::ReadyToRun | ThreadMode::Run => {
                self.var.mode = ThreadMode::Terminating;
                self.var.state = ThreadState::Suspend;
                self.var.terminate_code = code;
                Ok(())
            }
            _ => Err(FosError::WrongState),
        }
    }

    /// Block for `time_ms` (INF_TIME = until explicitly woken).
    pub fn sleep(&mut self, time_ms: u32, now_ms: u32) {
        if self.var.state == ThreadState::Suspend {
            return;
        }
        self.var.wake_up_time = if time_ms == INF_TIME {
            0
        } else {
            now_ms.wrapping_add(time_ms)
        };
        self.var.state = ThreadState::Blocked;
    }

    /// Let the next state pass promote the thread to READY.
    pub fn wake(&mut self, now_ms: u32) {
        if self.var.state == ThreadState::Suspend {
            return;
        }
        self.var.wake_up_time = now_ms;
    }

    /// Set lock bits; a non-empty mask parks the thread indefinitely.
    pub fn lock(&mut self, mask: LockMask, now_ms: u32) {
        if self.var.state == ThreadState::Suspend {
            return;
        }
        self.var.lock |= mask;
        if !self.var.lock.is_empty() {
            self.sleep(INF_TIME, now_ms);
        }
    }

    /// Clear lock bits; the thread wakes once the mask is empty.
    pub fn unlock(&mut self, mask: LockMask, now_ms: u32) {
        if self.var.state == ThreadState::Suspend {
            return;
        }
        self.var.lock &= !mask;
        if self.var.lock.is_empty() {
            self.wake(now_ms);
        }
    }

    /// Per-pass state handling: timed wake-up of a blocked thread.
    pub fn proc_state(&mut self, now_ms: u32) {
        if self.var.mode != ThreadMode::Run {
            return;
        }
        let v = &mut self.var;
        if v.state == ThreadState::Blocked
            && v.wake_up_time != 0
            && v.lock.is_empty()
            && now_ms >= v.wake_up_time
        {
            v.state = ThreadState::Ready;
        }
    }
}
