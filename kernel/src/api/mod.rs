/*
 * User API
 *
 * What application threads call. Every function here builds an
 * argument block on the caller's stack and crosses the system-call
 * gate; the kernel never trusts anything but the block contents.
 *
 * Exceptions to the trap route, kept from the original design:
 * - `is_thread_alive` reads the registry directly under the kernel
 *   lock; a liveness poll is not worth a trap.
 * - the `*_from_isr` variants call the kernel side directly. Interrupt
 *   handlers cannot trap (they are already above the trap priority)
 *   and must never block, which these entry points respect.
 *
 * Failure is a single word across the gate, so everything fallible
 * returns `FosError::Fail`. The take calls re-query the timeout status
 * after the take so a timeout wake is reported as an error to the
 * caller, matching the blocking contract.
 */

use crate::fwriter::WriterService;
use crate::ipc::queue32::{Blocking, QueueMode};
use crate::platform;
use crate::scheduler::thread::{AllocMode, ThreadUserInit};
use crate::scheduler::with_fos;
use crate::sync::semaphore::SembState;
use crate::syscall::numbers::*;
use crate::syscall::{ArgBlock, system_call};
use crate::types::{FosError, UserDesc, WRONG_USER_DESC};

const RET_OK: usize = 0;

fn call1(id: u16, a1: usize) -> Result<(), FosError> {
    let mut args: ArgBlock = [usize::MAX, a1, 0, 0];
    system_call(id, &mut args);
    status(&args)
}

fn call2(id: u16, a1: usize, a2: usize) -> Result<(), FosError> {
    let mut args: ArgBlock = [usize::MAX, a1, a2, 0];
    system_call(id, &mut args);
    status(&args)
}

fn status(args: &ArgBlock) -> Result<(), FosError> {
    if args[0] == RET_OK {
        Ok(())
    } else {
        Err(FosError::Fail)
    }
}

fn desc_of(args: &ArgBlock) -> Result<UserDesc, FosError> {
    match args[0] as UserDesc {
        WRONG_USER_DESC => Err(FosError::Fail),
        d => Ok(d),
    }
}

/// Cooperative yield. Has no effect outside a thread.
pub fn yield_now() {
    let mut args: ArgBlock = [0; 4];
    system_call(SYSCALL_YIELD, &mut args);
}

/// Block the calling thread for `time_ms`. `INF_TIME` sleeps until an
/// explicit wake; 0 behaves like `yield_now`.
pub fn sleep(time_ms: u32) -> Result<(), FosError> {
    call1(SYSCALL_SLEEP, time_ms as usize)
}

// ----------------------------------------------------------------------
// Threads
// ----------------------------------------------------------------------

/// Create a thread from a full init record. The record only needs to
/// outlive the call.
pub fn create_thread(init: &ThreadUserInit) -> Result<UserDesc, FosError> {
    let mut args: ArgBlock = [0, init as *const ThreadUserInit as usize, 0, 0];
    system_call(SYSCALL_CREATE_THREAD, &mut args);
    desc_of(&args)
}

/// Create a thread with default stack/heap sizes and automatic
/// allocation.
pub fn create_thread_def(
    name: &'static str,
    entry: fn(),
    priority: u8,
) -> Result<UserDesc, FosError> {
    create_thread(&ThreadUserInit {
        name,
        entry,
        stack_size: crate::config::DEF_THR_STACK_SIZE,
        heap_size: crate::config::DEF_THR_HEAP_SIZE,
        priority,
        alloc: AllocMode::Auto,
    })
}

/// Create a thread with default sizes and dynamic allocation.
pub fn create_thread_dyn(
    name: &'static str,
    entry: fn(),
    priority: u8,
) -> Result<UserDesc, FosError> {
    create_thread(&ThreadUserInit {
        name,
        entry,
        stack_size: crate::config::DEF_THR_STACK_SIZE,
        heap_size: crate::config::DEF_THR_HEAP_SIZE,
        priority,
        alloc: AllocMode::Dynamic,
    })
}

/// Launch a created thread.
pub fn run(desc: UserDesc) -> Result<(), FosError> {
    call1(SYSCALL_THREAD_RUN, desc as usize)
}

/// Terminate the calling thread. 0 is a clean exit; other codes are
/// user-defined.
pub fn terminate(code: u8) -> Result<(), FosError> {
    call1(SYSCALL_THREAD_TERMINATE, code as i32 as usize)
}

/// Terminate another thread. The code is stored negated, marking the
/// termination as external.
pub fn terminate_desc(desc: UserDesc, code: u8) -> Result<(), FosError> {
    call2(
        SYSCALL_THREAD_TERMINATE_DESC,
        desc as usize,
        (-(code as i32)) as usize,
    )
}

/// Whether the descriptor still names a registered thread.
pub fn is_thread_alive(desc: UserDesc) -> bool {
    with_fos(|f| f.is_thread_alive(desc))
}

/// Block until the target thread terminates. Implemented as a take on
/// the target's private binary semaphore; the reaper deletes that
/// semaphore, which releases every joiner.
pub fn join(desc: UserDesc) -> Result<(), FosError> {
    let mut args: ArgBlock = [0, desc as usize, 0, 0];
    system_call(SYSCALL_GET_THREAD_SEMB, &mut args);
    let semb = args[0] as UserDesc;
    if semb == WRONG_USER_DESC {
        return Err(FosError::Fail);
    }
    call1(SYSCALL_SEMB_TAKE, semb as usize)
}

// ----------------------------------------------------------------------
// Binary semaphores
// ----------------------------------------------------------------------

pub fn create_sem_binary(init_state: SembState) -> Result<UserDesc, FosError> {
    let word = match init_state {
        SembState::Locked => 0,
        SembState::Unlocked => 1,
    };
    let mut args: ArgBlock = [0, word, 0, 0];
    system_call(SYSCALL_CREATE_SEMB, &mut args);
    desc_of(&args)
}

pub fn delete_sem_binary(desc: UserDesc) -> Result<(), FosError> {
    call1(SYSCALL_DELETE_SEMB, desc as usize)
}

/// Take, then report a timeout wake as failure.
pub fn sem_binary_take(desc: UserDesc) -> Result<(), FosError> {
    call1(SYSCALL_SEMB_TAKE, desc as usize)?;
    call1(SYSCALL_SEMB_TAKE_STAT, desc as usize)
}

pub fn sem_binary_take_stat(desc: UserDesc) -> Result<(), FosError> {
    call1(SYSCALL_SEMB_TAKE_STAT, desc as usize)
}

pub fn sem_binary_give(desc: UserDesc) -> Result<(), FosError> {
    call1(SYSCALL_SEMB_GIVE, desc as usize)
}

/// Give from an interrupt handler: no trap, no blocking.
pub fn sem_binary_give_from_isr(desc: UserDesc) -> Result<(), FosError> {
    let now = platform::now_ms();
    with_fos(|f| f.semb_give(desc, now))
}

/// 0 or INF_TIME disables the timeout.
pub fn sem_binary_set_timeout(desc: UserDesc, timeout_ms: u32) -> Result<(), FosError> {
    call2(SYSCALL_SEMB_SET_TIMEOUT, desc as usize, timeout_ms as usize)
}

// ----------------------------------------------------------------------
// Counting semaphores
// ----------------------------------------------------------------------

pub fn create_sem_cnt(max_cnt: u32, init_cnt: u32) -> Result<UserDesc, FosError> {
    let mut args: ArgBlock = [0, max_cnt as usize, init_cnt as usize, 0];
    system_call(SYSCALL_CREATE_SEMC, &mut args);
    desc_of(&args)
}

pub fn delete_sem_cnt(desc: UserDesc) -> Result<(), FosError> {
    call1(SYSCALL_DELETE_SEMC, desc as usize)
}

pub fn sem_cnt_take(desc: UserDesc) -> Result<(), FosError> {
    call1(SYSCALL_SEMC_TAKE, desc as usize)?;
    call1(SYSCALL_SEMC_TAKE_STAT, desc as usize)
}

pub fn sem_cnt_take_stat(desc: UserDesc) -> Result<(), FosError> {
    call1(SYSCALL_SEMC_TAKE_STAT, desc as usize)
}

pub fn sem_cnt_give(desc: UserDesc) -> Result<(), FosError> {
    call1(SYSCALL_SEMC_GIVE, desc as usize)
}

pub fn sem_cnt_give_from_isr(desc: UserDesc) -> Result<(), FosError> {
    let now = platform::now_ms();
    with_fos(|f| f.semc_give(desc, now))
}

pub fn sem_cnt_set_timeout(desc: UserDesc, timeout_ms: u32) -> Result<(), FosError> {
    call2(SYSCALL_SEMC_SET_TIMEOUT, desc as usize, timeout_ms as usize)
}

// ----------------------------------------------------------------------
// Queue32
// ----------------------------------------------------------------------

pub fn create_queue32(size: u16, mode: QueueMode, timeout_ms: u32) -> Result<UserDesc, FosError> {
    let mode_word = match mode {
        QueueMode::PollOnly => 0,
        QueueMode::PollAndBlock => 1,
    };
    let mut args: ArgBlock = [0, size as usize, mode_word, timeout_ms as usize];
    system_call(SYSCALL_QUEUE32_CREATE, &mut args);
    desc_of(&args)
}

pub fn delete_queue32(desc: UserDesc) -> Result<(), FosError> {
    call1(SYSCALL_QUEUE32_DELETE, desc as usize)
}

/// Ask for data (poll or block per `blocking` and the queue mode), then
/// read the element.
pub fn queue32_read(desc: UserDesc, blocking: Blocking) -> Result<u32, FosError> {
    let blocking_word = match blocking {
        Blocking::Poll => 0,
        Blocking::Block => 1,
    };
    call2(SYSCALL_QUEUE32_ASK, desc as usize, blocking_word)?;

    let mut args: ArgBlock = [usize::MAX, desc as usize, 0, 0];
    system_call(SYSCALL_QUEUE32_READ, &mut args);
    status(&args)?;
    Ok(args[2] as u32)
}

pub fn queue32_write(desc: UserDesc, data: u32) -> Result<(), FosError> {
    call2(SYSCALL_QUEUE32_WRITE, desc as usize, data as usize)
}

/// Post from an interrupt handler: no trap, no blocking.
pub fn queue32_write_from_isr(desc: UserDesc, data: u32) -> Result<(), FosError> {
    let now = platform::now_ms();
    with_fos(|f| f.queue32_write(desc, data, now))
}

// ----------------------------------------------------------------------
// Errors, files, diagnostics
// ----------------------------------------------------------------------

/// Latch an unrecoverable error. On production ports the platform sink
/// halts and this call never returns.
pub fn error_set(code: u32, msg: &str) {
    let mut args: ArgBlock = [0, code as usize, msg.as_ptr() as usize, msg.len()];
    system_call(SYSCALL_ERROR_SET, &mut args);
}

pub fn file_mount(dev: u8) -> Result<(), FosError> {
    call1(SYSCALL_FILE_MOUNT, dev as usize)
}

pub fn file_unmount(dev: u8) -> Result<(), FosError> {
    call1(SYSCALL_FILE_UNMOUNT, dev as usize)
}

/// Register a writer object with a buffered-write block of `buf_len`
/// bytes (capped at `FILEWR_MAX_BUF_LEN`). Runs under the kernel lock
/// rather than the gate, like the other registration-time calls.
pub fn create_fwriter(
    service: &'static dyn WriterService,
    buf_len: u16,
) -> Result<(), FosError> {
    with_fos(|f| f.fwriter_reg(service, buf_len).map(|_| ()))
}

/// Raise the reserved fault id; only fault-handler tests want this.
pub fn hard_fault_call() {
    let mut args: ArgBlock = [0; 4];
    system_call(HARD_FAULT_CALL_ID, &mut args);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::test_port;
    use crate::run;
    use crate::types::INF_TIME;
    use std::sync::Mutex;

    // The API layer drives the one global kernel; its tests take turns.
    static API_LOCK: Mutex<()> = Mutex::new(());

    fn boot() -> std::sync::MutexGuard<'static, ()> {
        let guard = API_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        test_port::setup();
        run::init();
        run::start().unwrap();
        guard
    }

    #[test]
    fn test_create_and_run_thread_over_the_gate() {
        let _g = boot();
        let desc = create_thread_def("worker", || {}, 3).unwrap();
        assert!(is_thread_alive(desc));
        run(desc).unwrap();

        // Duplicate run is refused by the lifecycle.
        assert_eq!(run(desc), Err(FosError::Fail));

        terminate_desc(desc, 5).unwrap();
        run::main_loop_proc(); // reaper
        assert!(!is_thread_alive(desc));
    }

    #[test]
    fn test_semaphore_api_roundtrip() {
        let _g = boot();
        let sem = create_sem_binary(SembState::Unlocked).unwrap();
        sem_binary_take(sem).unwrap();
        sem_binary_give(sem).unwrap();
        sem_binary_set_timeout(sem, INF_TIME).unwrap();
        sem_binary_give_from_isr(sem).unwrap();
        delete_sem_binary(sem).unwrap();
        assert_eq!(sem_binary_give(sem), Err(FosError::Fail));
    }

    #[test]
    fn test_counting_semaphore_api() {
        let _g = boot();
        let sem = create_sem_cnt(2, 1).unwrap();
        sem_cnt_take(sem).unwrap();
        sem_cnt_give(sem).unwrap();
        sem_cnt_give_from_isr(sem).unwrap();
        delete_sem_cnt(sem).unwrap();
        assert_eq!(sem_cnt_take_stat(sem), Err(FosError::Fail));
    }

    #[test]
    fn test_queue_api_roundtrip_preserves_order() {
        let _g = boot();
        let q = create_queue32(4, QueueMode::PollOnly, 0).unwrap();
        for v in [7u32, 11, 13] {
            queue32_write(q, v).unwrap();
        }
        assert_eq!(queue32_read(q, Blocking::Poll), Ok(7));
        assert_eq!(queue32_read(q, Blocking::Poll), Ok(11));
        assert_eq!(queue32_read(q, Blocking::Poll), Ok(13));
        assert_eq!(queue32_read(q, Blocking::Poll), Err(FosError::Fail));
        delete_queue32(q).unwrap();
    }

    #[test]
    fn test_bad_descriptors_fail_without_side_effects() {
        let _g = boot();
        assert_eq!(run(0), Err(FosError::Fail));
        assert_eq!(sem_binary_take(0x7777_7777), Err(FosError::Fail));
        assert_eq!(queue32_write(0x7777_7777, 1), Err(FosError::Fail));
        assert_eq!(join(0x7777_7777), Err(FosError::Fail));
        assert!(!is_thread_alive(0x7777_7777));
    }

    #[test]
    fn test_error_set_latches_through_the_gate() {
        let _g = boot();
        error_set(77, "application fault");
        let (code, text) = crate::scheduler::with_fos(|f| {
            let e = f.latched_error();
            (e.code, e.text.clone())
        });
        assert_eq!(code, 77);
        assert_eq!(text.as_str(), "application fault");
        assert!(test_port::sunk_errors().iter().any(|(c, _)| *c == 77));
    }

    #[test]
    fn test_sleep_from_main_context_reports_ok() {
        let _g = boot();
        // Outside a thread the call lands on the current slot like the
        // original; it still reports OK.
        assert_eq!(sleep(0), Ok(()));
        yield_now();
    }
}
